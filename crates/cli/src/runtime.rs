//! Process-wide wiring shared by `ask` and `serve`.

use faqroute_core::{config::AppConfig, AppError, AppResult};
use faqroute_llm::create_client;
use faqroute_pipeline::config::load_config;
use faqroute_pipeline::{
    CachedRegistry, Dataset, EmbeddingWorker, FaqStore, LlmReasoner, MemoryIndex, Pipeline,
    ReasoningService, SemanticIndex, StaticRegistry,
};
use faqroute_prompt::load_catalog;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A ready pipeline plus the FAQ write path feeding its index.
pub struct Runtime {
    pub pipeline: Arc<Pipeline>,
    pub faqs: Arc<FaqStore>,
    worker: JoinHandle<()>,
}

impl Runtime {
    /// Build the pipeline from configuration and the dataset file.
    ///
    /// FAQ entries from the dataset are embedded before this returns; later
    /// writes go through the background embedding worker.
    pub async fn build(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;
        let settings = load_config(&config.workspace)?;

        let api_key = config.resolve_api_key(&config.provider);
        let client = create_client(
            &config.provider,
            config.provider_endpoint(),
            api_key.as_deref(),
        )
        .map_err(AppError::Config)?;

        let prompts = load_catalog(&config.workspace)?;
        let model = settings
            .chat_model
            .clone()
            .unwrap_or_else(|| config.model.clone());
        let embedding_model = settings
            .embedding_model
            .clone()
            .unwrap_or_else(|| config.embedding_model.clone());
        tracing::debug!("Chat model: {}, embedding model: {}", model, embedding_model);

        let reasoner: Arc<dyn ReasoningService> =
            Arc::new(LlmReasoner::new(client, prompts, model, embedding_model));

        let dataset = match config.data {
            Some(ref path) => Dataset::load(path)?,
            None => {
                tracing::warn!("No dataset configured (--data), answering from an empty store");
                Dataset::default()
            }
        };

        let registry = CachedRegistry::new(
            Arc::new(StaticRegistry::from_schemas(&dataset.schemas())),
            settings.registry_ttl(),
        );
        let index: Arc<dyn SemanticIndex> = Arc::new(MemoryIndex::new());

        let faqs = Arc::new(FaqStore::new());
        let mut seeded = Vec::with_capacity(dataset.faqs.len());
        for entry in dataset.faqs.iter().cloned() {
            match faqs.upsert(entry).await {
                Ok(entry) => seeded.push(entry),
                Err(e) => tracing::warn!("Skipping dataset FAQ: {}", e),
            }
        }

        let worker = EmbeddingWorker::new(Arc::clone(&reasoner), Arc::clone(&index));
        let indexed = worker.backfill(&seeded).await;
        tracing::info!("Indexed {}/{} FAQ entries", indexed, seeded.len());
        let worker = worker.spawn(faqs.subscribe());

        let pipeline = Pipeline::new(
            reasoner,
            Arc::new(registry),
            Arc::new(dataset.memory_store()),
            index,
            settings,
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            faqs,
            worker,
        })
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
