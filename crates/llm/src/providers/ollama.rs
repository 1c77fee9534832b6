//! Ollama LLM provider implementation.
//!
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use super::lines::line_stream;
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use faqroute_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Ollama generate request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama generate response format (also one line of a stream).
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Ollama LLM client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client with default settings.
    ///
    /// Default URL: http://localhost:11434
    pub fn new() -> Self {
        Self::with_base_url("http://localhost:11434")
    }

    /// Create a new Ollama client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn to_ollama_request(&self, request: &LlmRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            format: request.json_mode.then(|| "json".to_string()),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            stream: request.stream,
        }
    }

    fn convert_response(&self, response: OllamaResponse) -> LlmResponse {
        let usage = LlmUsage::new(
            response.prompt_eval_count.unwrap_or(0),
            response.eval_count.unwrap_or(0),
        );

        LlmResponse {
            content: response.response,
            model: response.model,
            usage,
            done: response.done,
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> AppResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_stream_line(line: &str) -> Option<AppResult<LlmStreamChunk>> {
    let parsed: OllamaResponse = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => return Some(Err(AppError::Llm(format!("Failed to parse chunk: {}", e)))),
    };

    let usage = parsed.done.then(|| {
        LlmUsage::new(
            parsed.prompt_eval_count.unwrap_or(0),
            parsed.eval_count.unwrap_or(0),
        )
    });

    Some(Ok(LlmStreamChunk {
        content: parsed.response,
        model: parsed.model,
        done: parsed.done,
        usage,
    }))
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!("Sending completion request to Ollama (model: {})", request.model);

        let mut ollama_request = self.to_ollama_request(request);
        ollama_request.stream = false;

        let response = self.post("/api/generate", &ollama_request).await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!("Received completion from Ollama");

        Ok(self.convert_response(ollama_response))
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!("Starting streaming request to Ollama (model: {})", request.model);

        let mut ollama_request = self.to_ollama_request(request);
        ollama_request.stream = true;

        let response = self.post("/api/generate", &ollama_request).await?;

        Ok(line_stream(response, parse_stream_line))
    }

    async fn embed(&self, model: &str, text: &str) -> AppResult<Vec<f32>> {
        let response = self
            .post("/api/embeddings", &OllamaEmbeddingRequest { model, prompt: text })
            .await?;

        let parsed: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama embedding: {}", e)))?;

        if parsed.embedding.is_empty() {
            return Err(AppError::Llm("Ollama returned an empty embedding".to_string()));
        }

        Ok(parsed.embedding)
    }
}
