//! FAQ entries and background embedding.
//!
//! Writes to the `FaqStore` publish a `FaqCommitted` event. The
//! `EmbeddingWorker` subscribes, embeds `Q: <question>\nA: <clean answer>`
//! and upserts the vector into the semantic index. Writers never wait on it.

use crate::reasoning::ReasoningService;
use crate::semantic::SemanticIndex;
use chrono::{DateTime, Utc};
use faqroute_core::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Capacity of the commit event channel.
const EVENT_CAPACITY: usize = 256;

/// A question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    #[serde(default)]
    pub id: String,
    pub question: String,
    pub answer: String,
}

/// Emitted after an entry is created or updated.
#[derive(Debug, Clone, PartialEq)]
pub struct FaqCommitted {
    pub entry: FaqEntry,
    pub committed_at: DateTime<Utc>,
}

/// FAQ entries keyed by id.
pub struct FaqStore {
    entries: RwLock<BTreeMap<String, FaqEntry>>,
    events: broadcast::Sender<FaqCommitted>,
}

impl Default for FaqStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FaqStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Commit events for every subsequent write.
    pub fn subscribe(&self) -> broadcast::Receiver<FaqCommitted> {
        self.events.subscribe()
    }

    /// Insert or replace an entry. An empty id gets a fresh one.
    pub async fn upsert(&self, mut entry: FaqEntry) -> AppResult<FaqEntry> {
        if entry.question.trim().is_empty() || entry.answer.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "FAQ entries need a question and an answer".to_string(),
            ));
        }
        if entry.id.trim().is_empty() {
            entry.id = uuid::Uuid::new_v4().to_string();
        }

        self.entries
            .write()
            .await
            .insert(entry.id.clone(), entry.clone());

        let event = FaqCommitted {
            entry: entry.clone(),
            committed_at: Utc::now(),
        };
        if self.events.send(event).is_err() {
            tracing::debug!("FAQ {} committed with no embedding subscriber", entry.id);
        }

        Ok(entry)
    }

    pub async fn get(&self, id: &str) -> Option<FaqEntry> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<FaqEntry> {
        self.entries.read().await.values().cloned().collect()
    }
}

/// Recomputes embeddings for committed FAQ entries.
#[derive(Clone)]
pub struct EmbeddingWorker {
    reasoner: Arc<dyn ReasoningService>,
    index: Arc<dyn SemanticIndex>,
}

impl EmbeddingWorker {
    pub fn new(reasoner: Arc<dyn ReasoningService>, index: Arc<dyn SemanticIndex>) -> Self {
        Self { reasoner, index }
    }

    /// Consume commit events until the store is dropped.
    pub fn spawn(self, mut events: broadcast::Receiver<FaqCommitted>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = self.index_entry(&event.entry).await {
                            tracing::error!("Embedding FAQ {} failed: {}", event.entry.id, e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Embedding worker lagged, {} commits skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Embedding worker stopped");
        })
    }

    /// Embed one entry and store it in the index.
    pub async fn index_entry(&self, entry: &FaqEntry) -> AppResult<()> {
        let text = embedding_text(entry);
        let embedding = self.reasoner.embed(&text).await?;
        self.index
            .upsert(&entry.id, embedding, entry.answer.clone())
            .await?;
        tracing::debug!("Indexed FAQ {}", entry.id);
        Ok(())
    }

    /// Index every entry, logging failures. Returns how many succeeded.
    pub async fn backfill(&self, entries: &[FaqEntry]) -> usize {
        let mut indexed = 0;
        for entry in entries {
            match self.index_entry(entry).await {
                Ok(()) => indexed += 1,
                Err(e) => tracing::warn!("Skipping FAQ {}: {}", entry.id, e),
            }
        }
        indexed
    }
}

/// Text embedded for an entry.
pub fn embedding_text(entry: &FaqEntry) -> String {
    format!("Q: {}\nA: {}", entry.question.trim(), clean_text(&entry.answer))
}

static MARKDOWN_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"```[\s\S]*?```", ""),
        (r"(?m)^#+\s+", ""),
        (r"\*\*(.*?)\*\*", "$1"),
        (r"__(.*?)__", "$1"),
        (r"\*(.*?)\*", "$1"),
        (r"\b_(.*?)_\b", "$1"),
        (r"~~(.*?)~~", "$1"),
        (r"<u>(.*?)</u>", "$1"),
        (r"(?m)^\s*[-*]\s+", ""),
        (r"(?m)^\s*\d+\.\s+", ""),
        (r"(?m)^>\s+", ""),
        (r"`([^`]+)`", "$1"),
        (r"\[([^\]]+)\]\([^)]+\)", "$1"),
        (r"\n{2,}", "\n"),
        (r"[ \t]{2,}", " "),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            tracing::error!("Invalid markdown pattern {}: {}", pattern, e);
            None
        }
    })
    .collect()
});

/// Strip markdown decoration from an answer.
pub fn clean_text(text: &str) -> String {
    let mut cleaned = text.to_string();
    for (re, replacement) in MARKDOWN_RULES.iter() {
        cleaned = re.replace_all(&cleaned, *replacement).into_owned();
    }
    cleaned.trim().to_string()
}
