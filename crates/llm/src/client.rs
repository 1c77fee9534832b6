//! LLM client abstraction and request/response types.

use futures::Stream;
use faqroute_core::AppResult;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// LLM completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The user message
    pub prompt: String,

    /// Model identifier (e.g., "gpt-4o-mini", "llama3.2")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Enable streaming responses
    #[serde(default)]
    pub stream: bool,

    /// Ask the provider to constrain output to a JSON object
    #[serde(default)]
    pub json_mode: bool,

    /// System prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl LlmRequest {
    /// Create a new LLM request with required fields.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            stream: false,
            json_mode: false,
            system: None,
        }
    }

    /// Enable streaming for this request.
    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Request JSON-only output.
    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// LLM completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Model that generated the response
    pub model: String,

    /// Usage statistics
    pub usage: LlmUsage,

    /// Whether the response was complete
    #[serde(default = "default_true")]
    pub done: bool,
}

fn default_true() -> bool {
    true
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    /// Create usage stats from prompt and completion token counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A chunk from a streaming LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStreamChunk {
    /// Incremental text content
    pub content: String,

    /// Model generating the stream
    pub model: String,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage statistics (only in final chunk, when the provider reports it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<LlmUsage>,
}

/// Stream of LLM chunks.
pub type LlmStream = Pin<Box<dyn Stream<Item = AppResult<LlmStreamChunk>> + Send>>;

/// Trait for LLM providers.
///
/// Abstracts the provider (OpenAI, Ollama, ...) behind completion, streaming
/// and embedding calls.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the provider name (e.g., "ollama", "openai").
    fn provider_name(&self) -> &str;

    /// Perform a non-streaming completion.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;

    /// Perform a streaming completion.
    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream>;

    /// Embed a single text with the given embedding model.
    async fn embed(&self, model: &str, text: &str) -> AppResult<Vec<f32>>;
}
