//! LLM transport crate for faqroute.
//!
//! Provider-agnostic access to chat completion, token streaming and text
//! embedding. The routing pipeline builds its Reasoning Service on top of
//! [`LlmClient`]; it never talks to a provider API directly.
//!
//! # Providers
//! - **OpenAI** (and OpenAI-compatible endpoints)
//! - **Ollama**: local runtime
//!
//! # Example
//! ```no_run
//! use faqroute_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::ProviderType;
