//! Prompt loader.
//!
//! Resolution order for a prompt id: `.faqroute/prompts/<id>.yml` in the
//! workspace, then the built-in definition.

use crate::builtin;
use crate::types::PromptDefinition;
use faqroute_core::config::STATE_DIR;
use faqroute_core::{AppError, AppResult};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Load a prompt definition by ID.
///
/// # Example
/// ```no_run
/// use faqroute_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "route.plan")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    let (contents, origin) = if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);
        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;
        (contents, prompt_file.display().to_string())
    } else if let Some(yaml) = builtin::source(prompt_id) {
        (yaml.to_string(), "built-in".to_string())
    } else {
        return Err(AppError::Prompt(format!(
            "Prompt not found: {} (looked in {:?} and built-ins)",
            prompt_id, prompt_file
        )));
    };

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e))
    })?;

    validate_prompt(&definition)?;

    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "Prompt {} declares id '{}', expected '{}'",
            origin, definition.id, prompt_id
        )));
    }

    tracing::debug!("Loaded prompt: {} ({}) from {}", definition.id, definition.title, origin);

    Ok(definition)
}

/// List all available prompt IDs: built-ins plus workspace overrides and additions.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: BTreeSet<String> = builtin::ids().map(str::to_string).collect();

    let dir = prompts_dir(workspace_path);
    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    prompt_ids.insert(stem.to_string());
                }
            }
        }
    }

    Ok(prompt_ids.into_iter().collect())
}

/// The set of prompt contracts the pipeline needs, loaded once per process.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    definitions: HashMap<String, PromptDefinition>,
}

impl PromptCatalog {
    /// Catalog of the built-in definitions only.
    pub fn builtin() -> AppResult<Self> {
        load_catalog(Path::new(""))
    }

    /// Look up a loaded definition.
    pub fn get(&self, prompt_id: &str) -> AppResult<&PromptDefinition> {
        self.definitions
            .get(prompt_id)
            .ok_or_else(|| AppError::Prompt(format!("Prompt not loaded: {}", prompt_id)))
    }
}

/// Load every built-in prompt id, honoring workspace overrides.
pub fn load_catalog(workspace_path: &Path) -> AppResult<PromptCatalog> {
    let definitions = builtin::ids()
        .map(|id| load_prompt(workspace_path, id).map(|def| (id.to_string(), def)))
        .collect::<AppResult<HashMap<_, _>>>()?;

    Ok(PromptCatalog { definitions })
}

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
