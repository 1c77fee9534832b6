//! LLM provider factory.
//!
//! Resolves a provider name to a concrete client, injecting the endpoint and
//! secret it needs.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("openai", "ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (for providers that require it)
///
/// # Errors
/// Returns error if the provider is unknown or a required secret is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> Result<Arc<dyn LlmClient>, String> {
    let provider_type =
        ProviderType::parse(provider).ok_or_else(|| format!("Unknown provider: {}", provider))?;

    let base_url = endpoint.unwrap_or(provider_type.default_endpoint());

    match provider_type {
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_base_url(base_url))),
        ProviderType::OpenAI => {
            let api_key = api_key.ok_or_else(|| "OpenAI provider requires API key".to_string())?;
            Ok(Arc::new(OpenAiClient::with_base_url(base_url, api_key)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None, None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        let client = create_client("ollama", Some("http://localhost:8080"), None);
        assert!(client.is_ok());
    }

    #[test]
    fn test_create_openai_client() {
        let client = create_client("openai", None, Some("sk-test")).unwrap();
        assert_eq!(client.provider_name(), "openai");
    }

    #[test]
    fn test_openai_requires_api_key() {
        match create_client("openai", None, None) {
            Err(err) => assert!(err.contains("OpenAI provider requires API key")),
            Ok(_) => panic!("Expected error for OpenAI without API key"),
        }
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", None, None) {
            Err(err) => assert!(err.contains("Unknown provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
