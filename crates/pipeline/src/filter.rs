//! Filter tree normalization.
//!
//! Planner output frequently drops the `$` prefix from operators
//! (`{"price": {"lte": 500}}`). The structured store only understands the
//! prefixed grammar, so every known operator key is rewritten to `$op`.

use serde_json::{Map, Value};

/// Operators understood by the structured store, without their `$` prefix.
pub const OPERATORS: &[&str] = &[
    "eq",
    "eqi",
    "ne",
    "nei",
    "lt",
    "lte",
    "gt",
    "gte",
    "in",
    "notIn",
    "contains",
    "notContains",
    "containsi",
    "notContainsi",
    "null",
    "notNull",
    "between",
    "startsWith",
    "startsWithi",
    "endsWith",
    "endsWithi",
    "or",
    "and",
    "not",
];

/// Rewrite bare operator keys to their `$`-prefixed form, recursively.
///
/// Unknown keys pass through untouched and scalars are returned as is, so
/// `sanitize(&sanitize(x)) == sanitize(x)`. When both `op` and `$op` are
/// present the prefixed value wins.
pub fn sanitize(node: &Value) -> Value {
    match node {
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let normalized = normalize_key(key);
                if normalized != *key && map.contains_key(&normalized) {
                    tracing::debug!(
                        "Filter has both '{}' and '{}', keeping the latter",
                        key,
                        normalized
                    );
                    continue;
                }
                out.insert(normalized, sanitize(value));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Whether `key` is a known operator, with or without its prefix.
pub fn is_operator(key: &str) -> bool {
    let bare = key.strip_prefix('$').unwrap_or(key);
    OPERATORS.contains(&bare)
}

fn normalize_key(key: &str) -> String {
    if OPERATORS.contains(&key) {
        format!("${}", key)
    } else {
        key.to_string()
    }
}
