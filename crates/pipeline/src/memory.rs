//! In-memory structured store.
//!
//! Evaluates the `$operator` filter grammar over JSON records. Used as the
//! reference backend for the CLI and in tests.

use crate::structured::{QueryOutput, StructuredQuery, StructuredStore};
use crate::types::{JsonMap, Operation};
use async_trait::async_trait;
use faqroute_core::{AppError, AppResult};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Records grouped by collection name.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<JsonMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_collection(&mut self, name: impl Into<String>, records: Vec<JsonMap>) {
        self.collections.insert(name.into(), records);
    }

    fn records(&self, collection: &str) -> AppResult<&[JsonMap]> {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .ok_or_else(|| AppError::Backend(format!("Unknown collection: {}", collection)))
    }
}

#[async_trait]
impl StructuredStore for MemoryStore {
    async fn query(&self, query: &StructuredQuery) -> AppResult<QueryOutput> {
        let records = self.records(&query.collection)?;

        let mut matched = Vec::new();
        for record in records {
            if matches_filter(record, &query.filters)? {
                matched.push(record);
            }
        }

        if query.operation == Operation::Count {
            return Ok(QueryOutput::Count(matched.len() as u64));
        }

        let keys = parse_sort(&query.sort)?;
        matched.sort_by(|a, b| compare_records(a, b, &keys));

        Ok(QueryOutput::Records(
            matched.into_iter().take(query.limit).cloned().collect(),
        ))
    }

    async fn sample(&self, collection: &str, limit: usize) -> AppResult<Vec<JsonMap>> {
        Ok(self
            .records(collection)?
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Whether `record` satisfies a filter tree.
pub fn matches_filter(record: &JsonMap, filter: &Value) -> AppResult<bool> {
    let map = match filter {
        Value::Object(map) => map,
        Value::Null => return Ok(true),
        other => {
            return Err(AppError::Backend(format!(
                "Filter must be an object, got {}",
                other
            )))
        }
    };

    for (key, condition) in map {
        let ok = match key.as_str() {
            "$or" => any_of(condition, |f| matches_filter(record, f))?,
            "$and" => all_of(condition, |f| matches_filter(record, f))?,
            "$not" => !matches_filter(record, condition)?,
            op if op.starts_with('$') => {
                return Err(AppError::Backend(format!(
                    "Operator {} is not valid at record level",
                    op
                )))
            }
            field => matches_field(record.get(field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

fn matches_field(value: Option<&Value>, condition: &Value) -> AppResult<bool> {
    let map = match condition {
        Value::Object(map) => map,
        // Shorthand equality: {"destination": "Paris"}
        scalar => return Ok(value.is_some_and(|v| loosely_equal(v, scalar))),
    };

    if !map.keys().any(|k| k.starts_with('$')) {
        // Nested relation: {"airline": {"name": {...}}}
        return match value {
            Some(Value::Object(related)) => matches_filter(related, condition),
            _ => Ok(false),
        };
    }

    for (op, operand) in map {
        if !apply_operator(value, op, operand)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply_operator(value: Option<&Value>, op: &str, operand: &Value) -> AppResult<bool> {
    let present = value.filter(|v| !v.is_null());

    let result = match op {
        "$eq" => present.is_some_and(|v| loosely_equal(v, operand)),
        "$ne" => !present.is_some_and(|v| loosely_equal(v, operand)),
        "$eqi" => text_test(present, operand, |v, o| v.to_lowercase() == o.to_lowercase()),
        "$nei" => !text_test(present, operand, |v, o| v.to_lowercase() == o.to_lowercase()),
        "$lt" => compare_op(present, operand, |o| o == Ordering::Less),
        "$lte" => compare_op(present, operand, |o| o != Ordering::Greater),
        "$gt" => compare_op(present, operand, |o| o == Ordering::Greater),
        "$gte" => compare_op(present, operand, |o| o != Ordering::Less),
        "$in" => in_list(present, operand)?,
        "$notIn" => !in_list(present, operand)?,
        "$contains" => text_test(present, operand, |v, o| v.contains(o)),
        "$notContains" => !text_test(present, operand, |v, o| v.contains(o)),
        "$containsi" => text_test(present, operand, |v, o| {
            v.to_lowercase().contains(&o.to_lowercase())
        }),
        "$notContainsi" => !text_test(present, operand, |v, o| {
            v.to_lowercase().contains(&o.to_lowercase())
        }),
        "$startsWith" => text_test(present, operand, |v, o| v.starts_with(o)),
        "$startsWithi" => text_test(present, operand, |v, o| {
            v.to_lowercase().starts_with(&o.to_lowercase())
        }),
        "$endsWith" => text_test(present, operand, |v, o| v.ends_with(o)),
        "$endsWithi" => text_test(present, operand, |v, o| {
            v.to_lowercase().ends_with(&o.to_lowercase())
        }),
        "$null" => present.is_none() == truthy(operand),
        "$notNull" => present.is_some() == truthy(operand),
        "$between" => match operand.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                compare_op(present, low, |o| o != Ordering::Less)
                    && compare_op(present, high, |o| o != Ordering::Greater)
            }
            _ => {
                return Err(AppError::Backend(
                    "$between expects [low, high]".to_string(),
                ))
            }
        },
        "$or" => any_of(operand, |c| matches_field(value, c))?,
        "$and" => all_of(operand, |c| matches_field(value, c))?,
        "$not" => !matches_field(value, operand)?,
        unknown => {
            return Err(AppError::Backend(format!(
                "Unsupported filter operator: {}",
                unknown
            )))
        }
    };

    Ok(result)
}

fn any_of<F>(items: &Value, mut test: F) -> AppResult<bool>
where
    F: FnMut(&Value) -> AppResult<bool>,
{
    for item in as_list(items)? {
        if test(item)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn all_of<F>(items: &Value, mut test: F) -> AppResult<bool>
where
    F: FnMut(&Value) -> AppResult<bool>,
{
    for item in as_list(items)? {
        if !test(item)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn as_list(items: &Value) -> AppResult<&[Value]> {
    items
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| AppError::Backend("Combinator expects an array".to_string()))
}

fn in_list(value: Option<&Value>, operand: &Value) -> AppResult<bool> {
    let options = as_list(operand)?;
    Ok(value.is_some_and(|v| options.iter().any(|o| loosely_equal(v, o))))
}

fn text_test(value: Option<&Value>, operand: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    match (value.map(scalar_text), scalar_text(operand)) {
        (Some(Some(v)), Some(o)) => test(&v, &o),
        _ => false,
    }
}

fn compare_op(value: Option<&Value>, operand: &Value, test: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|v| compare_values(v, operand))
        .is_some_and(test)
}

fn truthy(operand: &Value) -> bool {
    match operand {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numbers compare numerically (numeric strings included), everything else as text.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (scalar_text(a), scalar_text(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => None,
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || compare_values(a, b) == Some(Ordering::Equal)
}

#[derive(Debug)]
struct SortKey {
    field: String,
    descending: bool,
}

fn parse_sort(sort: &[String]) -> AppResult<Vec<SortKey>> {
    sort.iter()
        .map(|entry| {
            let (field, direction) = entry.split_once(':').unwrap_or((entry.as_str(), "asc"));
            let descending = match direction.to_lowercase().as_str() {
                "asc" => false,
                "desc" => true,
                other => {
                    return Err(AppError::Backend(format!(
                        "Invalid sort direction '{}' for {}",
                        other, field
                    )))
                }
            };
            Ok(SortKey {
                field: field.to_string(),
                descending,
            })
        })
        .collect()
}

/// Nulls and missing values sort last in either direction.
fn compare_records(a: &JsonMap, b: &JsonMap, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get(&key.field).filter(|v| !v.is_null());
        let right = b.get(&key.field).filter(|v| !v.is_null());
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => {
                let o = compare_values(l, r).unwrap_or(Ordering::Equal);
                if key.descending {
                    o.reverse()
                } else {
                    o
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flights() -> MemoryStore {
        let records = json!([
            {"destination": "Paris", "price": 320, "departure": "2024-05-03", "airline": {"name": "Air France"}},
            {"destination": "Paris Orly", "price": 180, "departure": "2024-05-01", "airline": {"name": "Transavia"}},
            {"destination": "Amsterdam", "price": 95, "departure": "2024-05-02", "airline": null},
            {"destination": "Rome", "price": 410, "departure": null}
        ]);
        let records = records
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect();
        let mut store = MemoryStore::new();
        store.insert_collection("flight-data", records);
        store
    }

    fn query(filters: Value, sort: &[&str], operation: Operation) -> StructuredQuery {
        StructuredQuery {
            collection: "flight-data".to_string(),
            filters,
            sort: sort.iter().map(|s| s.to_string()).collect(),
            operation,
            limit: 10,
        }
    }

    async fn destinations(store: &MemoryStore, filters: Value, sort: &[&str]) -> Vec<String> {
        match store.query(&query(filters, sort, Operation::List)).await.unwrap() {
            QueryOutput::Records(records) => records
                .iter()
                .map(|r| r["destination"].as_str().unwrap().to_string())
                .collect(),
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_containsi_with_price_sort() {
        let store = flights();
        let found = destinations(
            &store,
            json!({"destination": {"$containsi": "paris"}}),
            &["price:asc"],
        )
        .await;
        assert_eq!(found, vec!["Paris Orly", "Paris"]);
    }

    #[tokio::test]
    async fn test_lte_and_between() {
        let store = flights();
        let cheap = destinations(&store, json!({"price": {"$lte": 180}}), &["price:desc"]).await;
        assert_eq!(cheap, vec!["Paris Orly", "Amsterdam"]);

        let mid = destinations(&store, json!({"price": {"$between": [100, 350]}}), &[]).await;
        assert_eq!(mid, vec!["Paris", "Paris Orly"]);
    }

    #[tokio::test]
    async fn test_or_and_not() {
        let store = flights();
        let found = destinations(
            &store,
            json!({"$or": [
                {"destination": {"$containsi": "rome"}},
                {"destination": {"$containsi": "amsterdam"}}
            ]}),
            &["destination:asc"],
        )
        .await;
        assert_eq!(found, vec!["Amsterdam", "Rome"]);

        let not_paris = destinations(
            &store,
            json!({"$not": {"destination": {"$startsWith": "Paris"}}}),
            &["price:asc"],
        )
        .await;
        assert_eq!(not_paris, vec!["Amsterdam", "Rome"]);
    }

    #[tokio::test]
    async fn test_null_operators_and_nulls_sort_last() {
        let store = flights();
        let undated = destinations(&store, json!({"departure": {"$null": true}}), &[]).await;
        assert_eq!(undated, vec!["Rome"]);

        let by_date = destinations(&store, json!({}), &["departure:desc"]).await;
        assert_eq!(by_date, vec!["Paris", "Amsterdam", "Paris Orly", "Rome"]);
    }

    #[tokio::test]
    async fn test_nested_relation_and_shorthand_equality() {
        let store = flights();
        let found = destinations(
            &store,
            json!({"airline": {"name": {"$eqi": "air france"}}}),
            &[],
        )
        .await;
        assert_eq!(found, vec!["Paris"]);

        let exact = destinations(&store, json!({"destination": "Rome"}), &[]).await;
        assert_eq!(exact, vec!["Rome"]);
    }

    #[tokio::test]
    async fn test_count_and_limit() {
        let store = flights();
        let output = store
            .query(&query(json!({"price": {"$gt": 100}}), &[], Operation::Count))
            .await
            .unwrap();
        assert_eq!(output, QueryOutput::Count(3));

        let mut limited = query(json!({}), &["price:asc"], Operation::List);
        limited.limit = 2;
        match store.query(&limited).await.unwrap() {
            QueryOutput::Records(records) => assert_eq!(records.len(), 2),
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_errors() {
        let store = flights();
        assert!(store
            .query(&query(json!({"price": {"$like": 1}}), &[], Operation::List))
            .await
            .is_err());

        let mut unknown = query(json!({}), &[], Operation::List);
        unknown.collection = "hotels".to_string();
        assert!(store.query(&unknown).await.is_err());
        assert!(store.sample("hotels", 5).await.is_err());
    }
}
