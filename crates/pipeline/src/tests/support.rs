//! Scripted collaborators for pipeline tests.

use crate::config::PipelineConfig;
use crate::memory::MemoryStore;
use crate::reasoning::{PlanInput, ReasoningService, SynthesisInput, TokenStream};
use crate::registry::StaticRegistry;
use crate::semantic::SemanticIndex;
use crate::structured::{QueryOutput, StructuredQuery, StructuredStore};
use crate::types::{
    ChatTurn, CollectionDescriptor, FaqMatch, JsonMap, RetrievalResult, StreamEvent,
};
use crate::Pipeline;
use async_trait::async_trait;
use futures::StreamExt;
use faqroute_core::{AppError, AppResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One recorded synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesisCall {
    pub question: String,
    pub kind: &'static str,
    pub summary: Option<String>,
    pub faq: Vec<String>,
}

/// Reasoning service answering from a script. `None` entries fail.
pub struct ScriptedReasoner {
    pub rewrite: Option<String>,
    pub plan: Option<String>,
    pub summary: Option<String>,
    pub synthesis: Option<String>,
    pub tokens: Vec<String>,
    /// Fail the token stream after this many tokens
    pub fail_stream_after: Option<usize>,
    /// Stop producing tokens, without ending the stream, after this many
    pub stall_stream_after: Option<usize>,
    pub calls: Mutex<Vec<String>>,
    pub embedded: Mutex<Vec<String>>,
    pub synthesized: Mutex<Vec<SynthesisCall>>,
    pub planned_facts: Mutex<Vec<JsonMap>>,
}

impl Default for ScriptedReasoner {
    fn default() -> Self {
        Self {
            rewrite: None,
            plan: Some(r#"{"intent":"faq"}"#.to_string()),
            summary: None,
            synthesis: None,
            tokens: Vec::new(),
            fail_stream_after: None,
            stall_stream_after: None,
            calls: Mutex::new(Vec::new()),
            embedded: Mutex::new(Vec::new()),
            synthesized: Mutex::new(Vec::new()),
            planned_facts: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedReasoner {
    pub fn called(&self, name: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == name)
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn scripted(&self, name: &str, value: &Option<String>) -> AppResult<String> {
        self.record(name);
        value
            .clone()
            .ok_or_else(|| AppError::Llm(format!("scripted {} failure", name)))
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn rewrite(&self, _turns: &[ChatTurn], _question: &str) -> AppResult<String> {
        self.scripted("rewrite", &self.rewrite)
    }

    async fn plan(&self, input: PlanInput<'_>) -> AppResult<String> {
        self.planned_facts.lock().unwrap().push(input.facts.clone());
        self.scripted("plan", &self.plan)
    }

    async fn summarize(&self, _question: &str, _result: &RetrievalResult) -> AppResult<String> {
        self.scripted("summarize", &self.summary)
    }

    async fn synthesize(&self, input: SynthesisInput<'_>) -> AppResult<String> {
        self.synthesized.lock().unwrap().push(SynthesisCall {
            question: input.question.to_string(),
            kind: input.structured.kind(),
            summary: input.summary.map(str::to_string),
            faq: input.faq.iter().map(|m| m.answer.clone()).collect(),
        });
        self.scripted("synthesize", &self.synthesis)
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.record("embed");
        self.embedded.lock().unwrap().push(text.to_string());
        Ok(vec![1.0, 0.0])
    }

    async fn stream_answer(
        &self,
        _question: &str,
        _faq: &[FaqMatch],
        _facts: &JsonMap,
    ) -> AppResult<TokenStream> {
        self.record("stream_answer");
        let mut items: Vec<AppResult<String>> = Vec::new();
        for (i, token) in self.tokens.iter().enumerate() {
            if self.fail_stream_after == Some(i) {
                items.push(Err(AppError::Llm("connection reset".to_string())));
                break;
            }
            if self.stall_stream_after == Some(i) {
                break;
            }
            items.push(Ok(token.clone()));
        }
        let head = futures::stream::iter(items);
        if self.stall_stream_after.is_some() {
            return Ok(Box::pin(head.chain(futures::stream::pending())));
        }
        Ok(Box::pin(head))
    }
}

/// Index returning fixed matches regardless of the query vector.
#[derive(Default)]
pub struct FixedIndex {
    pub matches: Vec<FaqMatch>,
}

impl FixedIndex {
    pub fn with(matches: &[(&str, f32)]) -> Self {
        Self {
            matches: matches
                .iter()
                .map(|(answer, distance)| FaqMatch {
                    answer: answer.to_string(),
                    distance: *distance,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl SemanticIndex for FixedIndex {
    async fn nearest(&self, _embedding: &[f32], k: usize) -> AppResult<Vec<FaqMatch>> {
        Ok(self.matches.iter().take(k).cloned().collect())
    }

    async fn upsert(&self, _id: &str, _embedding: Vec<f32>, _answer: String) -> AppResult<()> {
        Ok(())
    }
}

/// Wraps a store and counts queries.
pub struct CountingStore {
    pub inner: MemoryStore,
    pub queries: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuredStore for CountingStore {
    async fn query(&self, query: &StructuredQuery) -> AppResult<QueryOutput> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(query).await
    }

    async fn sample(&self, collection: &str, limit: usize) -> AppResult<Vec<JsonMap>> {
        self.inner.sample(collection, limit).await
    }
}

pub fn flight_descriptor() -> CollectionDescriptor {
    CollectionDescriptor::new(
        "flight-data",
        vec![
            "destination".to_string(),
            "airline".to_string(),
            "price".to_string(),
        ],
    )
}

/// Twelve Paris flights priced 100..=650 in shuffled order, plus two others.
pub fn flight_store() -> MemoryStore {
    let mut records: Vec<Value> = [450, 100, 650, 300, 200, 550, 150, 400, 600, 250, 500, 350]
        .iter()
        .enumerate()
        .map(|(i, price)| {
            json!({
                "id": i + 1,
                "destination": if i % 2 == 0 { "Paris" } else { "Paris Orly" },
                "airline": format!("Airline {}", i),
                "price": price,
                "internal_code": format!("X{}", i)
            })
        })
        .collect();
    records.push(json!({"id": 13, "destination": "Rome", "airline": "Ita", "price": 50}));
    records.push(json!({"id": 14, "destination": "Oslo", "airline": "SAS", "price": 80}));

    let mut store = MemoryStore::new();
    store.insert_collection(
        "flight-data",
        records
            .into_iter()
            .filter_map(|r| r.as_object().cloned())
            .collect(),
    );
    store
}

pub fn pipeline(
    reasoner: Arc<ScriptedReasoner>,
    store: Arc<CountingStore>,
    index: FixedIndex,
) -> Pipeline {
    pipeline_with(reasoner, store, index, PipelineConfig::default())
}

pub fn pipeline_with(
    reasoner: Arc<ScriptedReasoner>,
    store: Arc<CountingStore>,
    index: FixedIndex,
    config: PipelineConfig,
) -> Pipeline {
    Pipeline::new(
        reasoner,
        Arc::new(StaticRegistry::new(vec![flight_descriptor()])),
        store,
        Arc::new(index),
        config,
    )
}

pub async fn collect_events(mut rx: mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn object(value: Value) -> JsonMap {
    value.as_object().cloned().unwrap_or_default()
}
