//! Semantic FAQ retrieval.

use crate::deadline;
use crate::reasoning::ReasoningService;
use crate::types::FaqMatch;
use async_trait::async_trait;
use faqroute_core::AppResult;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Nearest-neighbor index over FAQ answer embeddings.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Up to `k` closest answers, closest first.
    async fn nearest(&self, embedding: &[f32], k: usize) -> AppResult<Vec<FaqMatch>>;

    /// Insert or replace the embedding of one FAQ entry.
    async fn upsert(&self, id: &str, embedding: Vec<f32>, answer: String) -> AppResult<()>;
}

/// Settings for one semantic lookup.
#[derive(Debug, Clone, Copy)]
pub struct SemanticSettings {
    pub top_k: usize,
    /// Maximum distance of the best match
    pub threshold: f32,
    pub timeout: Duration,
}

/// Embed the question and look up the closest FAQ answers.
///
/// Embedding or index failures yield an empty set.
pub async fn retrieve(
    reasoner: &dyn ReasoningService,
    index: &dyn SemanticIndex,
    question: &str,
    settings: SemanticSettings,
) -> Vec<FaqMatch> {
    let embedding = match deadline::within(settings.timeout, "embedding", reasoner.embed(question)).await {
        Ok(embedding) => embedding,
        Err(e) => {
            tracing::warn!("Question embedding failed, skipping FAQ lookup: {}", e);
            return Vec::new();
        }
    };

    let matches = match deadline::within(
        settings.timeout,
        "semantic index",
        index.nearest(&embedding, settings.top_k),
    )
    .await
    {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Semantic index unavailable: {}", e);
            return Vec::new();
        }
    };

    relevance_gate(matches, settings.threshold)
}

/// Drop the whole set when even the best match is farther than `threshold`.
pub fn relevance_gate(mut matches: Vec<FaqMatch>, threshold: f32) -> Vec<FaqMatch> {
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    match matches.first() {
        Some(best) if best.distance <= threshold => {
            tracing::debug!(
                "{} FAQ matches (best distance {:.3})",
                matches.len(),
                best.distance
            );
            matches
        }
        Some(best) => {
            tracing::info!(
                "Best FAQ distance {:.3} above {:.2}, no FAQ coverage",
                best.distance,
                threshold
            );
            Vec::new()
        }
        None => matches,
    }
}

/// Cosine distance in `[0, 1]`: `1 - cos`, clamped.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
struct IndexedAnswer {
    embedding: Vec<f32>,
    answer: String,
}

/// Brute-force in-memory index.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<String, IndexedAnswer>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SemanticIndex for MemoryIndex {
    async fn nearest(&self, embedding: &[f32], k: usize) -> AppResult<Vec<FaqMatch>> {
        let entries = self.entries.read().await;

        let mut scored: Vec<FaqMatch> = entries
            .values()
            .filter(|e| {
                let same_dim = e.embedding.len() == embedding.len();
                if !same_dim {
                    tracing::debug!(
                        "Skipping entry with {} dimensions (query has {})",
                        e.embedding.len(),
                        embedding.len()
                    );
                }
                same_dim
            })
            .map(|e| FaqMatch {
                answer: e.answer.clone(),
                distance: cosine_distance(&e.embedding, embedding),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn upsert(&self, id: &str, embedding: Vec<f32>, answer: String) -> AppResult<()> {
        self.entries
            .write()
            .await
            .insert(id.to_string(), IndexedAnswer { embedding, answer });
        Ok(())
    }
}
