//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, OutputFormat, PromptDefinition};
use faqroute_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Renders both the system and the user template with the same variables.
/// Missing variables render as empty strings.
///
/// # Example
/// ```no_run
/// use faqroute_prompt::{build_prompt, PromptDefinition};
/// use std::collections::HashMap;
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "Is the commuter pass refundable?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, &variables))
        .transpose()?;

    let user = render_template(&definition.template, &variables)?;

    Ok(BuiltPrompt {
        system,
        user,
        temperature: definition.behavior.temperature,
        json_output: definition.output.format == OutputFormat::Json,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            resolved_variables: variables,
        },
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Prompts are plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PromptBehavior, PromptOutputSpec};

    fn create_test_definition(format: OutputFormat) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            behavior: PromptBehavior {
                tone: "neutral".to_string(),
                style: "terse".to_string(),
                temperature: Some(0.2),
            },
            system: Some("Collections:\n{{collections}}".to_string()),
            template: "Question: {{question}}".to_string(),
            output: PromptOutputSpec { format },
        }
    }

    #[test]
    fn test_render_simple_template() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Hello, world!".to_string());

        let result = render_template("Question: {{question}}", &vars).unwrap();
        assert_eq!(result, "Question: Hello, world!");
    }

    #[test]
    fn test_render_does_not_html_escape() {
        let mut vars = HashMap::new();
        vars.insert("data".to_string(), r#"{"price": "<500 & >100"}"#.to_string());

        let result = render_template("{{data}}", &vars).unwrap();
        assert_eq!(result, r#"{"price": "<500 & >100"}"#);
    }

    #[test]
    fn test_build_prompt_renders_system_and_user() {
        let def = create_test_definition(OutputFormat::Json);
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "cheapest flights".to_string());
        vars.insert("collections".to_string(), "flight-data".to_string());

        let built = build_prompt(&def, vars).unwrap();
        assert_eq!(built.user, "Question: cheapest flights");
        assert_eq!(built.system.as_deref(), Some("Collections:\nflight-data"));
        assert_eq!(built.temperature, Some(0.2));
        assert!(built.json_output);
        assert_eq!(built.metadata.source_prompt_id, "test.prompt");
    }

    #[test]
    fn test_render_template_missing_variable() {
        let vars = HashMap::new();
        let result = render_template("Question: {{missing}}", &vars).unwrap();
        assert_eq!(result, "Question: ");
    }
}
