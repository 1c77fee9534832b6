//! Intent classification and query planning.
//!
//! The model is asked for a JSON plan; everything it returns is validated
//! here against the enabled collections before it can reach retrieval. Any
//! doubt resolves to the FAQ path.

use crate::deadline;
use crate::filter::{is_operator, sanitize};
use crate::reasoning::{PlanInput, ReasoningService};
use crate::types::{CollectionDescriptor, Intent, JsonMap, Operation, QueryPlan};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// A validated plan plus any personal facts the model extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub plan: QueryPlan,
    pub facts: JsonMap,
}

impl PlanOutcome {
    fn faq(facts: JsonMap) -> Self {
        Self {
            plan: QueryPlan::faq(),
            facts,
        }
    }
}

/// Plan a question. Never fails; failures yield an FAQ plan.
pub async fn plan(
    reasoner: &dyn ReasoningService,
    question: &str,
    collections: &[CollectionDescriptor],
    samples: &BTreeMap<String, Vec<JsonMap>>,
    facts: &JsonMap,
    timeout: Duration,
) -> PlanOutcome {
    if collections.is_empty() {
        tracing::debug!("No collections enabled, planning skipped");
        return PlanOutcome::faq(JsonMap::new());
    }

    let input = PlanInput {
        question,
        collections,
        samples,
        facts,
    };

    match deadline::within(timeout, "plan", reasoner.plan(input)).await {
        Ok(raw) => {
            tracing::debug!("Planner output: {}", raw);
            parse_plan(&raw, collections)
        }
        Err(e) => {
            tracing::warn!("Planning failed, falling back to FAQ: {}", e);
            PlanOutcome::faq(JsonMap::new())
        }
    }
}

/// Parse and validate raw planner output.
pub fn parse_plan(raw: &str, collections: &[CollectionDescriptor]) -> PlanOutcome {
    let object = match extract_object(raw) {
        Some(object) => object,
        None => {
            tracing::warn!("Planner output is not a JSON object, falling back to FAQ");
            return PlanOutcome::faq(JsonMap::new());
        }
    };

    let facts = match object.get("facts") {
        Some(Value::Object(facts)) => facts.clone(),
        _ => JsonMap::new(),
    };

    let collection = object
        .get("collection")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let intent = match object.get("intent").and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("realtime") => Intent::Realtime,
        Some(_) => Intent::Faq,
        None if collection.is_some() => Intent::Realtime,
        None => Intent::Faq,
    };

    if intent == Intent::Faq {
        return PlanOutcome::faq(facts);
    }

    let descriptor = match collection.and_then(|name| collections.iter().find(|c| c.name == name)) {
        Some(descriptor) => descriptor,
        None => {
            tracing::warn!(
                "Planner chose unknown collection {:?}, falling back to FAQ",
                collection
            );
            return PlanOutcome::faq(facts);
        }
    };

    let operation = match object.get("operation").and_then(Value::as_str) {
        Some(op) if op.eq_ignore_ascii_case("count") => Operation::Count,
        _ => Operation::List,
    };

    let filters = match object.get("filters") {
        Some(filters @ Value::Object(_)) => restrict_filters(&sanitize(filters), descriptor),
        _ => Value::Object(JsonMap::new()),
    };

    let sort = object
        .get("sort")
        .map(|s| normalize_sort(s, descriptor))
        .unwrap_or_default();

    PlanOutcome {
        plan: QueryPlan {
            intent: Intent::Realtime,
            collection: Some(descriptor.name.clone()),
            filters,
            sort,
            operation,
        },
        facts,
    }
}

/// Drop filter conditions on fields the collection does not expose.
///
/// Applies at record level: combinator values (`$or`, `$and`, `$not`) are
/// restricted recursively and branches left empty are removed, conditions
/// below an exposed field are kept whole.
pub fn restrict_filters(filters: &Value, descriptor: &CollectionDescriptor) -> Value {
    match filters {
        Value::Object(map) => {
            let mut kept = JsonMap::new();
            for (key, value) in map {
                if is_operator(key) {
                    if let Some(value) = restrict_branch(value, descriptor) {
                        kept.insert(key.clone(), value);
                    }
                } else if descriptor.exposes(key) {
                    kept.insert(key.clone(), value.clone());
                } else {
                    tracing::debug!("Dropping filter on unexposed field '{}'", key);
                }
            }
            Value::Object(kept)
        }
        other => other.clone(),
    }
}

fn restrict_branch(value: &Value, descriptor: &CollectionDescriptor) -> Option<Value> {
    let is_empty = |v: &Value| v.as_object().is_some_and(|m| m.is_empty());
    match value {
        Value::Array(items) => {
            let kept: Vec<Value> = items
                .iter()
                .filter(|item| !is_empty(*item))
                .map(|item| restrict_filters(item, descriptor))
                .filter(|item| !is_empty(item))
                .collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        Value::Object(_) => {
            let kept = restrict_filters(value, descriptor);
            (!is_empty(&kept)).then_some(kept)
        }
        other => Some(other.clone()),
    }
}

/// Normalize the accepted sort shapes into `field:dir` strings.
///
/// Accepts `"price:asc"`, `"price:asc,date:desc"`, `["price:asc"]`,
/// `{"price": "asc"}` and lists mixing strings and objects. Entries whose
/// field is not exposed or whose direction is not asc/desc are dropped.
pub fn normalize_sort(sort: &Value, descriptor: &CollectionDescriptor) -> Vec<String> {
    let mut entries: Vec<(String, Option<String>)> = Vec::new();
    collect_sort_entries(sort, &mut entries);

    entries
        .into_iter()
        .filter_map(|(field, direction)| {
            let direction = direction
                .map(|d| d.trim().to_lowercase())
                .unwrap_or_else(|| "asc".to_string());
            if !matches!(direction.as_str(), "asc" | "desc") || !descriptor.exposes(&field) {
                tracing::debug!("Dropping sort entry {}:{}", field, direction);
                return None;
            }
            Some(format!("{}:{}", field, direction))
        })
        .collect()
}

fn collect_sort_entries(sort: &Value, entries: &mut Vec<(String, Option<String>)>) {
    match sort {
        Value::String(s) => {
            for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (field, direction) = match part.split_once(':') {
                    Some((field, direction)) => (field, Some(direction.to_string())),
                    None => (part, None),
                };
                entries.push((field.trim().to_string(), direction));
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_sort_entries(item, entries);
            }
        }
        Value::Object(map) => {
            for (field, direction) in map {
                entries.push((
                    field.clone(),
                    Some(direction.as_str().unwrap_or_default().to_string()),
                ));
            }
        }
        _ => {}
    }
}

/// Strip code fences and surrounding prose, then parse the outermost object.
fn extract_object(raw: &str) -> Option<JsonMap> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flights() -> Vec<CollectionDescriptor> {
        vec![CollectionDescriptor::new(
            "flight-data",
            vec![
                "destination".to_string(),
                "price".to_string(),
                "departure".to_string(),
            ],
        )]
    }

    #[test]
    fn test_valid_realtime_plan() {
        let raw = r#"```json
{"intent":"realtime","collection":"flight-data","operation":"list",
 "filters":{"destination":{"containsi":"Paris"}},"sort":["price:asc"]}
```"#;
        let outcome = parse_plan(raw, &flights());
        let plan = outcome.plan;
        assert_eq!(plan.intent, Intent::Realtime);
        assert_eq!(plan.collection.as_deref(), Some("flight-data"));
        assert_eq!(plan.filters, json!({"destination": {"$containsi": "Paris"}}));
        assert_eq!(plan.sort, vec!["price:asc"]);
        assert_eq!(plan.operation, Operation::List);
    }

    #[test]
    fn test_unknown_collection_falls_back_to_faq() {
        let raw = r#"{"intent":"realtime","collection":"hotels","operation":"count"}"#;
        let outcome = parse_plan(raw, &flights());
        assert_eq!(outcome.plan, QueryPlan::faq());
    }

    #[test]
    fn test_missing_intent_is_inferred_from_collection() {
        let raw = r#"{"collection":"flight-data","operation":"COUNT"}"#;
        let plan = parse_plan(raw, &flights()).plan;
        assert!(plan.is_realtime());
        assert_eq!(plan.operation, Operation::Count);

        let plan = parse_plan(r#"{"operation":"list"}"#, &flights()).plan;
        assert_eq!(plan.intent, Intent::Faq);
    }

    #[test]
    fn test_malformed_output_falls_back_to_faq() {
        assert_eq!(parse_plan("I think flights", &flights()).plan, QueryPlan::faq());
        assert_eq!(parse_plan("[1, 2]", &flights()).plan, QueryPlan::faq());
        assert_eq!(parse_plan("} {", &flights()).plan, QueryPlan::faq());
    }

    #[test]
    fn test_facts_survive_faq_fallback() {
        let raw = r#"{"intent":"faq","facts":{"child_count":2}}"#;
        let outcome = parse_plan(raw, &flights());
        assert_eq!(outcome.plan, QueryPlan::faq());
        assert_eq!(outcome.facts["child_count"], json!(2));
    }

    #[test]
    fn test_filters_on_unexposed_fields_are_dropped() {
        let raw = r#"{"collection":"flight-data","operation":"count",
            "filters":{"internal_code":{"eq":"X1"},"price":{"lte":200},
                       "or":[{"secret":"a"},{"destination":"Paris"}],
                       "not":{"internal_code":"X2"}}}"#;
        let plan = parse_plan(raw, &flights()).plan;
        assert_eq!(
            plan.filters,
            json!({"price": {"$lte": 200}, "$or": [{"destination": "Paris"}]})
        );
    }

    #[test]
    fn test_non_object_filters_become_empty() {
        let raw = r#"{"intent":"realtime","collection":"flight-data","filters":"paris"}"#;
        let plan = parse_plan(raw, &flights()).plan;
        assert_eq!(plan.filters, json!({}));
    }

    #[test]
    fn test_sort_normalization() {
        let desc = &flights()[0];
        assert_eq!(normalize_sort(&json!("price"), desc), vec!["price:asc"]);
        assert_eq!(
            normalize_sort(&json!("price:DESC, departure:asc"), desc),
            vec!["price:desc", "departure:asc"]
        );
        assert_eq!(
            normalize_sort(&json!({"price": "desc"}), desc),
            vec!["price:desc"]
        );
        assert_eq!(
            normalize_sort(&json!(["secret:asc", "price:sideways", {"departure": "asc"}]), desc),
            vec!["departure:asc"]
        );
        assert!(normalize_sort(&json!(42), desc).is_empty());
    }
}
