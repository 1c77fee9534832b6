//! Structured retrieval against the tabular store.

use crate::deadline;
use crate::filter::sanitize;
use crate::types::{CollectionDescriptor, JsonMap, Operation, QueryPlan, RetrievalResult};
use async_trait::async_trait;
use faqroute_core::AppResult;
use serde_json::Value;
use std::time::Duration;

/// A query as handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuery {
    pub collection: String,
    pub filters: Value,
    pub sort: Vec<String>,
    pub operation: Operation,
    pub limit: usize,
}

/// Raw store output, before projection.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Count(u64),
    Records(Vec<JsonMap>),
}

/// Structured data store.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Run a count or list query.
    async fn query(&self, query: &StructuredQuery) -> AppResult<QueryOutput>;

    /// Up to `limit` records of a collection, used as planner references.
    async fn sample(&self, collection: &str, limit: usize) -> AppResult<Vec<JsonMap>>;
}

/// Execute a realtime plan.
///
/// Backend failures and timeouts degrade to `RetrievalResult::None`.
pub async fn retrieve(
    store: &dyn StructuredStore,
    plan: &QueryPlan,
    descriptor: &CollectionDescriptor,
    limit: usize,
    timeout: Duration,
) -> RetrievalResult {
    let query = StructuredQuery {
        collection: descriptor.name.clone(),
        filters: sanitize(&plan.filters),
        sort: plan.sort.clone(),
        operation: plan.operation,
        limit,
    };

    tracing::debug!(
        "Structured {} on '{}' with filters {}",
        query.operation.as_str(),
        query.collection,
        query.filters
    );

    match deadline::within(timeout, "structured store", store.query(&query)).await {
        Ok(QueryOutput::Count(value)) => RetrievalResult::Count {
            collection: descriptor.name.clone(),
            value,
        },
        Ok(QueryOutput::Records(records)) => RetrievalResult::List {
            collection: descriptor.name.clone(),
            schema: descriptor.exposed_fields.clone(),
            items: records
                .iter()
                .take(limit)
                .map(|r| project(r, &descriptor.exposed_fields))
                .collect(),
        },
        Err(e) => {
            tracing::warn!("Structured retrieval on '{}' failed: {}", descriptor.name, e);
            RetrievalResult::None
        }
    }
}

/// Keep exactly `fields`, in order; missing fields become `null`.
pub fn project(record: &JsonMap, fields: &[String]) -> JsonMap {
    fields
        .iter()
        .map(|f| (f.clone(), record.get(f).cloned().unwrap_or(Value::Null)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Intent;
    use faqroute_core::AppError;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedStore {
        output: AppResult<QueryOutput>,
        seen: Mutex<Option<StructuredQuery>>,
    }

    #[async_trait]
    impl StructuredStore for FixedStore {
        async fn query(&self, query: &StructuredQuery) -> AppResult<QueryOutput> {
            *self.seen.lock().unwrap() = Some(query.clone());
            match &self.output {
                Ok(output) => Ok(output.clone()),
                Err(e) => Err(AppError::Backend(e.to_string())),
            }
        }

        async fn sample(&self, _collection: &str, _limit: usize) -> AppResult<Vec<JsonMap>> {
            Ok(Vec::new())
        }
    }

    fn plan(filters: Value, operation: Operation) -> QueryPlan {
        QueryPlan {
            intent: Intent::Realtime,
            collection: Some("flight-data".to_string()),
            filters,
            sort: vec!["price:asc".to_string()],
            operation,
        }
    }

    fn descriptor() -> CollectionDescriptor {
        CollectionDescriptor::new("flight-data", vec!["destination".to_string(), "price".to_string()])
    }

    #[tokio::test]
    async fn test_list_projects_to_exposed_fields() {
        let record = json!({"destination": "Paris", "price": 120, "internal_code": "X1"});
        let store = FixedStore {
            output: Ok(QueryOutput::Records(vec![
                record.as_object().cloned().unwrap(),
                json!({"destination": "Paris"}).as_object().cloned().unwrap(),
            ])),
            seen: Mutex::new(None),
        };

        let result = retrieve(
            &store,
            &plan(json!({"destination": {"containsi": "Paris"}}), Operation::List),
            &descriptor(),
            10,
            Duration::from_secs(1),
        )
        .await;

        match result {
            RetrievalResult::List { items, schema, .. } => {
                assert_eq!(schema, vec!["destination", "price"]);
                assert_eq!(items[0].len(), 2);
                assert!(!items[0].contains_key("internal_code"));
                assert_eq!(items[1]["price"], Value::Null);
            }
            other => panic!("expected list, got {:?}", other),
        }

        let seen = store.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.filters, json!({"destination": {"$containsi": "Paris"}}));
        assert_eq!(seen.limit, 10);
    }

    #[tokio::test]
    async fn test_count() {
        let store = FixedStore {
            output: Ok(QueryOutput::Count(4)),
            seen: Mutex::new(None),
        };
        let result = retrieve(
            &store,
            &plan(json!({}), Operation::Count),
            &descriptor(),
            10,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            result,
            RetrievalResult::Count {
                collection: "flight-data".to_string(),
                value: 4
            }
        );
    }

    #[tokio::test]
    async fn test_backend_failure_is_none() {
        let store = FixedStore {
            output: Err(AppError::Backend("down".to_string())),
            seen: Mutex::new(None),
        };
        let result = retrieve(
            &store,
            &plan(json!({}), Operation::List),
            &descriptor(),
            10,
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_none());
    }
}
