//! Prompt types for faqroute.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Behavioral settings
    pub behavior: PromptBehavior,

    /// System message template (Handlebars)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// User message template (Handlebars)
    pub template: String,

    /// Output specification
    pub output: PromptOutputSpec,
}

/// Behavioral settings for prompt execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBehavior {
    /// Tone (e.g., "neutral", "friendly")
    pub tone: String,

    /// Style (e.g., "terse", "concise", "strict")
    pub style: String,

    /// Sampling temperature the call should use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Expected shape of the model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
}

/// Output specification for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    pub format: OutputFormat,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Sampling temperature from the definition
    pub temperature: Option<f32>,

    /// Whether the output must be a JSON object
    pub json_output: bool,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Template variables that were resolved
    #[serde(rename = "resolvedVariables")]
    pub resolved_variables: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: test.prompt
title: Test Prompt
apiVersion: "1.0"
createdBy: test
behavior:
  tone: neutral
  style: terse
  temperature: 0.0
system: "Rules for {{topic}}"
template: "{{question}}"
output:
  format: json
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "test.prompt");
        assert_eq!(def.behavior.tone, "neutral");
        assert_eq!(def.behavior.temperature, Some(0.0));
        assert_eq!(def.system.as_deref(), Some("Rules for {{topic}}"));
        assert_eq!(def.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_system_is_optional() {
        let yaml = r#"
id: bare
title: Bare
apiVersion: "1.0"
behavior:
  tone: neutral
  style: terse
template: "{{question}}"
output:
  format: text
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.system.is_none());
        assert!(def.created_by.is_empty());
        assert_eq!(def.output.format, OutputFormat::Text);
    }
}
