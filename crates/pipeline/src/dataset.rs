//! JSON dataset backing the reference stores.
//!
//! ```json
//! {
//!   "collections": [
//!     {
//!       "name": "flight-data",
//!       "fields": [{"name": "destination", "type": "string", "enabled": true}],
//!       "records": [{"destination": "Paris", "price": 120}]
//!     }
//!   ],
//!   "faqs": [{"id": "1", "question": "Can I cancel?", "answer": "Yes."}]
//! }
//! ```

use crate::faq::FaqEntry;
use crate::memory::MemoryStore;
use crate::registry::{CollectionSchema, FieldSchema};
use crate::types::JsonMap;
use faqroute_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One collection: schema, enable toggles and records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetCollection {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub records: Vec<JsonMap>,
}

/// Whole dataset file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub collections: Vec<DatasetCollection>,
    #[serde(default)]
    pub faqs: Vec<FaqEntry>,
}

impl Dataset {
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read dataset {:?}: {}", path, e))
        })?;
        let dataset: Dataset = serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse dataset {:?}: {}", path, e))
        })?;

        tracing::info!(
            "Loaded dataset {:?}: {} collections, {} FAQs",
            path,
            dataset.collections.len(),
            dataset.faqs.len()
        );
        Ok(dataset)
    }

    /// Detected schemas, for the collection registry.
    pub fn schemas(&self) -> Vec<CollectionSchema> {
        self.collections
            .iter()
            .map(|c| CollectionSchema {
                name: c.name.clone(),
                fields: c.fields.clone(),
            })
            .collect()
    }

    /// Structured store over the collection records.
    pub fn memory_store(&self) -> MemoryStore {
        let mut store = MemoryStore::new();
        for collection in &self.collections {
            store.insert_collection(collection.name.clone(), collection.records.clone());
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::resolve_descriptors;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_dataset() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{
              "collections": [{
                "name": "flight-data",
                "fields": [
                  {"name": "destination", "type": "string", "enabled": true},
                  {"name": "price", "type": "decimal", "enabled": true},
                  {"name": "notes", "enabled": false}
                ],
                "records": [{"destination": "Paris", "price": 120}]
              }],
              "faqs": [{"id": "1", "question": "Can I cancel?", "answer": "Yes."}]
            }"#,
        )
        .unwrap();

        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.faqs.len(), 1);

        let descriptors = resolve_descriptors(&dataset.schemas());
        assert_eq!(descriptors[0].exposed_fields, vec!["destination", "price"]);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{ not json").unwrap();
        assert!(Dataset::load(file.path()).is_err());
    }
}
