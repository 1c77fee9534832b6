//! Reasoning service: every model call the pipeline makes.
//!
//! Each operation renders one prompt contract from the catalog and runs it
//! through an `LlmClient`. The pipeline only sees the trait, so tests swap in
//! scripted implementations.

use crate::types::{ChatTurn, CollectionDescriptor, FaqMatch, JsonMap, RetrievalResult};
use async_trait::async_trait;
use faqroute_core::{AppError, AppResult};
use faqroute_llm::{LlmClient, LlmRequest};
use faqroute_prompt::{build_prompt, builtin, BuiltPrompt, PromptCatalog};
use futures::{Stream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::Arc;

/// Incremental answer text.
pub type TokenStream = Pin<Box<dyn Stream<Item = AppResult<String>> + Send>>;

/// Inputs of the planning contract.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    pub question: &'a str,
    pub collections: &'a [CollectionDescriptor],
    /// Reference records per collection, already projected to exposed fields
    pub samples: &'a BTreeMap<String, Vec<JsonMap>>,
    pub facts: &'a JsonMap,
}

/// Inputs of the final synthesis contract.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub question: &'a str,
    pub structured: &'a RetrievalResult,
    pub summary: Option<&'a str>,
    pub faq: &'a [FaqMatch],
    pub facts: &'a JsonMap,
}

/// Model-backed operations used by the pipeline.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Resolve a follow-up into a standalone search query.
    async fn rewrite(&self, turns: &[ChatTurn], question: &str) -> AppResult<String>;

    /// Raw planner output, expected to be a JSON object.
    async fn plan(&self, input: PlanInput<'_>) -> AppResult<String>;

    /// Short natural-language summary of a structured result.
    async fn summarize(&self, question: &str, result: &RetrievalResult) -> AppResult<String>;

    /// Final batched answer.
    async fn synthesize(&self, input: SynthesisInput<'_>) -> AppResult<String>;

    /// Embedding vector for `text`.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Streamed answer grounded in FAQ matches.
    async fn stream_answer(
        &self,
        question: &str,
        faq: &[FaqMatch],
        facts: &JsonMap,
    ) -> AppResult<TokenStream>;
}

/// `ReasoningService` backed by an LLM provider and the prompt catalog.
pub struct LlmReasoner {
    client: Arc<dyn LlmClient>,
    prompts: PromptCatalog,
    model: String,
    embedding_model: String,
}

impl LlmReasoner {
    pub fn new(
        client: Arc<dyn LlmClient>,
        prompts: PromptCatalog,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            prompts,
            model: model.into(),
            embedding_model: embedding_model.into(),
        }
    }

    fn render(&self, prompt_id: &str, variables: Vec<(&str, String)>) -> AppResult<BuiltPrompt> {
        let definition = self.prompts.get(prompt_id)?;
        let variables: HashMap<String, String> = variables
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        build_prompt(definition, variables)
    }

    fn to_request(&self, built: BuiltPrompt) -> LlmRequest {
        let mut request = LlmRequest::new(built.user, self.model.clone());
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let Some(temperature) = built.temperature {
            request = request.with_temperature(temperature);
        }
        if built.json_output {
            request = request.with_json_mode();
        }
        request
    }

    async fn complete(&self, prompt_id: &str, variables: Vec<(&str, String)>) -> AppResult<String> {
        let built = self.render(prompt_id, variables)?;
        let response = self.client.complete(&self.to_request(built)).await?;
        tracing::debug!(
            "{} used {} tokens ({})",
            prompt_id,
            response.usage.total_tokens,
            response.model
        );
        Ok(response.content)
    }
}

#[async_trait]
impl ReasoningService for LlmReasoner {
    async fn rewrite(&self, turns: &[ChatTurn], question: &str) -> AppResult<String> {
        self.complete(
            builtin::REWRITE,
            vec![
                ("history", format_turns(turns)),
                ("question", question.to_string()),
            ],
        )
        .await
    }

    async fn plan(&self, input: PlanInput<'_>) -> AppResult<String> {
        self.complete(
            builtin::PLAN,
            vec![
                ("collections", format_collections(input.collections)),
                ("samples", to_pretty_json(input.samples)?),
                ("facts", to_pretty_json(input.facts)?),
                ("question", input.question.to_string()),
            ],
        )
        .await
    }

    async fn summarize(&self, question: &str, result: &RetrievalResult) -> AppResult<String> {
        self.complete(
            builtin::SUMMARIZE,
            vec![
                ("question", question.to_string()),
                ("kind", result.kind().to_string()),
                ("data", to_pretty_json(result)?),
            ],
        )
        .await
    }

    async fn synthesize(&self, input: SynthesisInput<'_>) -> AppResult<String> {
        self.complete(
            builtin::SYNTHESIZE,
            vec![
                ("question", input.question.to_string()),
                ("kind", input.structured.kind().to_string()),
                ("summary", input.summary.unwrap_or("(none)").to_string()),
                ("faq", format_faq(input.faq)),
                ("facts", to_pretty_json(input.facts)?),
            ],
        )
        .await
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.client.embed(&self.embedding_model, text).await
    }

    async fn stream_answer(
        &self,
        question: &str,
        faq: &[FaqMatch],
        facts: &JsonMap,
    ) -> AppResult<TokenStream> {
        let built = self.render(
            builtin::ANSWER,
            vec![
                ("faq", format_faq(faq)),
                ("facts", to_pretty_json(facts)?),
                ("question", question.to_string()),
            ],
        )?;
        let request = self.to_request(built).with_streaming();
        let chunks = self.client.stream(&request).await?;

        let tokens = chunks.filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) if chunk.content.is_empty() => None,
                Ok(chunk) => Some(Ok(chunk.content)),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(tokens))
    }
}

fn format_turns(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_collections(collections: &[CollectionDescriptor]) -> String {
    collections
        .iter()
        .map(|c| format!("- {}: {}", c.name, c.exposed_fields.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_faq(faq: &[FaqMatch]) -> String {
    if faq.is_empty() {
        return "(none)".to_string();
    }
    faq.iter()
        .enumerate()
        .map(|(i, m)| format!("{}. {}", i + 1, m.answer.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn to_pretty_json<T: serde::Serialize + ?Sized>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(format!("Failed to render prompt data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use faqroute_llm::{LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
    use serde_json::json;
    use std::sync::Mutex;

    /// Echoes requests back and records them.
    struct RecordingClient {
        requests: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait]
    impl LlmClient for RecordingClient {
        fn provider_name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(LlmResponse {
                content: "ok".to_string(),
                model: request.model.clone(),
                usage: LlmUsage::new(1, 1),
                done: true,
            })
        }

        async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
            self.requests.lock().unwrap().push(request.clone());
            let chunk = |content: &str, done: bool| {
                Ok(LlmStreamChunk {
                    content: content.to_string(),
                    model: "m".to_string(),
                    done,
                    usage: None,
                })
            };
            Ok(Box::pin(futures::stream::iter(vec![
                chunk("Hel", false),
                chunk("lo", false),
                chunk("", true),
            ])))
        }

        async fn embed(&self, _model: &str, _text: &str) -> AppResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn reasoner() -> (Arc<RecordingClient>, LlmReasoner) {
        let client = Arc::new(RecordingClient {
            requests: Mutex::new(Vec::new()),
        });
        let reasoner = LlmReasoner::new(
            client.clone(),
            PromptCatalog::builtin().unwrap(),
            "chat-model",
            "embed-model",
        );
        (client, reasoner)
    }

    #[tokio::test]
    async fn test_plan_request_is_json_mode_with_collections() {
        let (client, reasoner) = reasoner();
        let collections = vec![CollectionDescriptor::new(
            "flight-data",
            vec!["destination".to_string(), "price".to_string()],
        )];
        let samples = BTreeMap::new();
        let facts = JsonMap::new();

        reasoner
            .plan(PlanInput {
                question: "cheapest flights to Paris",
                collections: &collections,
                samples: &samples,
                facts: &facts,
            })
            .await
            .unwrap();

        let requests = client.requests.lock().unwrap();
        let request = &requests[0];
        assert!(request.json_mode);
        assert_eq!(request.model, "chat-model");
        assert_eq!(request.temperature, Some(0.0));
        assert!(request
            .system
            .as_deref()
            .unwrap()
            .contains("- flight-data: destination, price"));
        assert!(request.prompt.contains("cheapest flights to Paris"));
    }

    #[tokio::test]
    async fn test_summarize_includes_result_data() {
        let (client, reasoner) = reasoner();
        let result = RetrievalResult::Count {
            collection: "flight-data".to_string(),
            value: 12,
        };
        reasoner.summarize("how many flights", &result).await.unwrap();

        let requests = client.requests.lock().unwrap();
        assert!(requests[0].prompt.contains("DATA (count)"));
        assert!(requests[0].prompt.contains("12"));
        assert!(!requests[0].json_mode);
    }

    #[tokio::test]
    async fn test_stream_answer_drops_empty_chunks() {
        let (_client, reasoner) = reasoner();
        let faq = vec![FaqMatch {
            answer: "Cancel up to 24h before.".to_string(),
            distance: 0.2,
        }];
        let facts = json!({"child_count": 2}).as_object().cloned().unwrap();

        let stream = reasoner
            .stream_answer("cancellation?", &faq, &facts)
            .await
            .unwrap();
        let tokens: Vec<String> = stream.map(|t| t.unwrap()).collect().await;
        assert_eq!(tokens, vec!["Hel", "lo"]);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(
            format_turns(&[ChatTurn::new("user", " hi "), ChatTurn::new("assistant", "hello")]),
            "user: hi\nassistant: hello"
        );
        assert_eq!(format_faq(&[]), "(none)");
    }
}
