//! Pipeline tuning.

use faqroute_core::config::STATE_DIR;
use faqroute_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Limits, thresholds and model overrides for the routing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Raw questions kept in the conversation history
    pub history_limit: usize,

    /// Chat turns handed to the rewriter
    pub rewrite_turns: usize,

    /// FAQ matches fetched per question
    pub faq_top_k: usize,

    /// Maximum cosine distance of the best FAQ match
    pub relevance_threshold: f32,

    /// Maximum records in a list answer
    pub list_limit: usize,

    /// Reference records per collection shown to the planner
    pub sample_limit: usize,

    /// Limit for every model or backend call
    pub call_timeout_secs: u64,

    /// How long a registry snapshot stays fresh
    pub registry_ttl_secs: u64,

    /// Chat model override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,

    /// Embedding model override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            rewrite_turns: 4,
            faq_top_k: 3,
            relevance_threshold: 0.85,
            list_limit: 10,
            sample_limit: 5,
            call_timeout_secs: 30,
            registry_ttl_secs: 60,
            chat_model: None,
            embedding_model: None,
        }
    }
}

impl PipelineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_secs)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.history_limit == 0 {
            return Err(AppError::Config("historyLimit must be at least 1".to_string()));
        }
        if self.faq_top_k == 0 || self.list_limit == 0 {
            return Err(AppError::Config(
                "faqTopK and listLimit must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(AppError::Config(format!(
                "relevanceThreshold must be within [0, 1], got {}",
                self.relevance_threshold
            )));
        }
        if self.call_timeout_secs == 0 {
            return Err(AppError::Config("callTimeoutSecs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Load `.faqroute/pipeline.yaml`, falling back to defaults when absent.
pub fn load_config(workspace: &Path) -> AppResult<PipelineConfig> {
    let config_path = get_config_path(workspace);

    if !config_path.exists() {
        tracing::debug!("Using default pipeline config (no {:?})", config_path);
        return Ok(PipelineConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let config: PipelineConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;

    config.validate()?;
    tracing::debug!("Loaded pipeline config from {:?}", config_path);
    Ok(config)
}

/// Write `.faqroute/pipeline.yaml`.
pub fn save_config(workspace: &Path, config: &PipelineConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))?;
    }

    let yaml = serde_yaml::to_string(config)?;
    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved pipeline config to {:?}", config_path);
    Ok(())
}

pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("pipeline.yaml")
}
