//! OpenAI (and OpenAI-compatible) provider implementation.
//!
//! Uses `/chat/completions` for completion and SSE streaming, `/embeddings`
//! for vectors.

use super::lines::line_stream;
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use faqroute_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    model: String,
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI chat/embedding client.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client against the public OpenAI API.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url("https://api.openai.com/v1", api_key)
    }

    /// Create a client against an OpenAI-compatible endpoint.
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn to_chat_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        ChatRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request
                .json_mode
                .then_some(ResponseFormat { kind: "json_object" }),
            stream: request.stream,
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> AppResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to OpenAI: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

/// Parse one SSE line. Comments and non-data fields are skipped.
fn parse_sse_line(line: &str) -> Option<AppResult<LlmStreamChunk>> {
    let payload = line.strip_prefix("data:")?.trim();

    if payload == "[DONE]" {
        return Some(Ok(LlmStreamChunk {
            content: String::new(),
            model: String::new(),
            done: true,
            usage: None,
        }));
    }

    let envelope: StreamEnvelope = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(e) => return Some(Err(AppError::Llm(format!("Failed to parse chunk: {}", e)))),
    };

    // Usage-only envelopes carry no choices.
    let choice = envelope.choices.into_iter().next()?;
    let content = choice.delta.content.unwrap_or_default();
    if content.is_empty() && choice.finish_reason.is_none() {
        return None;
    }

    Some(Ok(LlmStreamChunk {
        content,
        model: envelope.model,
        done: false,
        usage: None,
    }))
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!("Sending completion request to OpenAI (model: {})", request.model);

        let mut chat_request = self.to_chat_request(request);
        chat_request.stream = false;

        let response = self.post("/chat/completions", &chat_request).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse OpenAI response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Llm("OpenAI returned no choices".to_string()))?;

        let usage = parsed
            .usage
            .map(|u| LlmUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: parsed.model,
            usage,
            done: true,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!("Starting streaming request to OpenAI (model: {})", request.model);

        let mut chat_request = self.to_chat_request(request);
        chat_request.stream = true;

        let response = self.post("/chat/completions", &chat_request).await?;

        Ok(line_stream(response, parse_sse_line))
    }

    async fn embed(&self, model: &str, text: &str) -> AppResult<Vec<f32>> {
        let response = self
            .post("/embeddings", &EmbeddingRequest { model, input: text })
            .await?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse OpenAI embedding: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::Llm("OpenAI returned no embedding".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_includes_system_and_json_mode() {
        let client = OpenAiClient::new("sk-test");
        let request = LlmRequest::new("cheapest flights", "gpt-4o-mini")
            .with_system("You are a planner")
            .with_json_mode();

        let chat = client.to_chat_request(&request);
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[1].content, "cheapest flights");

        let body = serde_json::to_value(&chat).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_parse_sse_delta() {
        let line = r#"data: {"model":"gpt-4o-mini","choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let chunk = parse_sse_line(line).unwrap().unwrap();
        assert_eq!(chunk.content, "Hel");
        assert!(!chunk.done);
    }

    #[test]
    fn test_parse_sse_done_marker() {
        let chunk = parse_sse_line("data: [DONE]").unwrap().unwrap();
        assert!(chunk.done);
    }

    #[test]
    fn test_parse_sse_skips_comments_and_role_deltas() {
        assert!(parse_sse_line(": keep-alive").is_none());
        let role_only = r#"data: {"model":"m","choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        assert!(parse_sse_line(role_only).is_none());
    }
}
