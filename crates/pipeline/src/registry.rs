//! Collection registry.
//!
//! Decides which structured collections the planner may target and which of
//! their fields can ever be returned to a caller.

use crate::types::CollectionDescriptor;
use async_trait::async_trait;
use faqroute_core::AppResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Fields managed by the store itself. Never exposed.
pub const SYSTEM_FIELDS: &[&str] = &[
    "id",
    "createdAt",
    "updatedAt",
    "publishedAt",
    "createdBy",
    "updatedBy",
    "locale",
    "localizations",
    "embedding",
];

/// Collections that back the FAQ index rather than structured answers.
pub const IGNORED_COLLECTIONS: &[&str] = &["faqitem", "item"];

/// Attribute types that can be filtered and shown as plain values.
const SIMPLE_TYPES: &[&str] = &[
    "string",
    "text",
    "email",
    "uid",
    "richtext",
    "enumeration",
    "integer",
    "biginteger",
    "decimal",
    "float",
    "date",
    "datetime",
    "time",
    "relation",
];

/// Source of enabled collections.
#[async_trait]
pub trait CollectionRegistry: Send + Sync {
    /// Enabled collections with at least one exposed field.
    async fn list_enabled_collections(&self) -> AppResult<Vec<CollectionDescriptor>>;
}

/// Field schema plus its admin enable toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub kind: String,
    #[serde(default)]
    pub enabled: bool,
}

fn default_field_type() -> String {
    "string".to_string()
}

/// A collection's schema as detected from the structured store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// Turn detected schemas and their toggles into descriptors.
pub fn resolve_descriptors(schemas: &[CollectionSchema]) -> Vec<CollectionDescriptor> {
    schemas
        .iter()
        .filter(|schema| !IGNORED_COLLECTIONS.contains(&schema.name.as_str()))
        .filter_map(|schema| {
            let exposed: Vec<String> = schema
                .fields
                .iter()
                .filter(|f| f.enabled)
                .filter(|f| !SYSTEM_FIELDS.contains(&f.name.as_str()))
                .filter(|f| SIMPLE_TYPES.contains(&f.kind.to_lowercase().as_str()))
                .map(|f| f.name.clone())
                .collect();

            if exposed.is_empty() {
                tracing::debug!("Collection '{}' has no exposed fields, skipping", schema.name);
                None
            } else {
                Some(CollectionDescriptor::new(schema.name.clone(), exposed))
            }
        })
        .collect()
}

/// Registry over a fixed set of descriptors.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    descriptors: Vec<CollectionDescriptor>,
}

impl StaticRegistry {
    pub fn new(descriptors: Vec<CollectionDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn from_schemas(schemas: &[CollectionSchema]) -> Self {
        Self::new(resolve_descriptors(schemas))
    }
}

#[async_trait]
impl CollectionRegistry for StaticRegistry {
    async fn list_enabled_collections(&self) -> AppResult<Vec<CollectionDescriptor>> {
        Ok(self.descriptors.clone())
    }
}

type Snapshot = (Instant, Arc<Vec<CollectionDescriptor>>);

/// Caches another registry and refreshes it lazily once the TTL has passed.
///
/// Refresh swaps in a new snapshot; readers holding the old `Arc` are unaffected.
pub struct CachedRegistry {
    inner: Arc<dyn CollectionRegistry>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl CachedRegistry {
    pub fn new(inner: Arc<dyn CollectionRegistry>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    async fn fresh_snapshot(&self) -> Option<Arc<Vec<CollectionDescriptor>>> {
        let guard = self.snapshot.read().await;
        guard
            .as_ref()
            .filter(|(fetched_at, _)| fetched_at.elapsed() < self.ttl)
            .map(|(_, descriptors)| Arc::clone(descriptors))
    }
}

#[async_trait]
impl CollectionRegistry for CachedRegistry {
    async fn list_enabled_collections(&self) -> AppResult<Vec<CollectionDescriptor>> {
        if let Some(descriptors) = self.fresh_snapshot().await {
            return Ok(descriptors.as_ref().clone());
        }

        match self.inner.list_enabled_collections().await {
            Ok(descriptors) => {
                tracing::debug!("Refreshed collection registry ({} enabled)", descriptors.len());
                let shared = Arc::new(descriptors);
                *self.snapshot.write().await = Some((Instant::now(), Arc::clone(&shared)));
                Ok(shared.as_ref().clone())
            }
            Err(e) => {
                // Serve the stale snapshot rather than nothing.
                let stale = self.snapshot.read().await;
                match stale.as_ref() {
                    Some((_, descriptors)) => {
                        tracing::warn!("Registry refresh failed, serving stale snapshot: {}", e);
                        Ok(descriptors.as_ref().clone())
                    }
                    None => Err(e),
                }
            }
        }
    }
}
