//! Prompt contracts for faqroute.
//!
//! Every call the pipeline makes to the Reasoning Service is described by a
//! YAML prompt definition:
//! - a Handlebars `system` template carrying the rules the model must follow
//! - a Handlebars `template` for the user message
//! - the expected output format (`text` or `json`)
//!
//! Built-in definitions ship with the crate; a workspace can override any of
//! them by placing `<id>.yml` in `.faqroute/prompts/`.

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{list_prompts, load_catalog, load_prompt, PromptCatalog};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, OutputFormat, PromptBehavior, PromptDefinition,
    PromptOutputSpec,
};
