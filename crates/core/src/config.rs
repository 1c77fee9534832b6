//! Configuration management for faqroute.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - Config file (`.faqroute/config.yaml` or `--config`)
//! - Environment variables (`FAQROUTE_*`)
//! - Command-line flags

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".faqroute";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .faqroute/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Reasoning provider (e.g., "openai", "ollama")
    pub provider: String,

    /// Chat model identifier
    pub model: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// API key for the provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Dataset file backing the reference stores
    pub data: Option<PathBuf>,

    /// HTTP server settings
    pub server: ServerConfig,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind, e.g. "127.0.0.1:7878"
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7878".to_string(),
        }
    }
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    #[serde(rename = "activeEmbeddingProvider")]
    pub active_embedding_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Custom endpoint, if configured.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    server: Option<ServerConfig>,
    data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            data: None,
            server: ServerConfig::default(),
            llm: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, the config file and defaults.
    ///
    /// Environment variables:
    /// - `FAQROUTE_WORKSPACE`: Override workspace path
    /// - `FAQROUTE_CONFIG`: Path to config file
    /// - `FAQROUTE_PROVIDER`: Reasoning provider
    /// - `FAQROUTE_MODEL`: Chat model identifier
    /// - `FAQROUTE_EMBEDDING_MODEL`: Embedding model identifier
    /// - `FAQROUTE_API_KEY`: API key
    /// - `FAQROUTE_DATA`: Dataset file
    /// - `FAQROUTE_BIND`: HTTP bind address
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("FAQROUTE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("FAQROUTE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.state_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        if let Ok(provider) = std::env::var("FAQROUTE_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("FAQROUTE_MODEL") {
            config.model = model;
        }

        if let Ok(model) = std::env::var("FAQROUTE_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }

        if let Ok(data) = std::env::var("FAQROUTE_DATA") {
            config.data = Some(PathBuf::from(data));
        }

        if let Ok(bind) = std::env::var("FAQROUTE_BIND") {
            config.server.bind = bind;
        }

        config.api_key = std::env::var("FAQROUTE_API_KEY").ok();
        config.log_level = std::env::var("RUST_LOG").ok();

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(server) = config_file.server {
            result.server = server;
        }

        if let Some(data) = config_file.data {
            result.data = Some(result.workspace.join(data));
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                let (model, embedding_model) = match provider_config {
                    ProviderConfig::OpenAI {
                        model,
                        embedding_model,
                        ..
                    } => (model, embedding_model),
                    ProviderConfig::Ollama {
                        model,
                        embedding_model,
                        ..
                    } => (model, embedding_model),
                };
                result.model = model.clone();
                if let Some(embedding_model) = embedding_model {
                    result.embedding_model = embedding_model.clone();
                }
            }

            result.llm = Some(llm);
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        data: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(data) = data {
            self.data = Some(data);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Path to the .faqroute directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .faqroute directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Get the configuration for a provider.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider))
    }

    /// Endpoint override for the active provider.
    pub fn provider_endpoint(&self) -> Option<&str> {
        self.get_provider_config(&self.provider)
            .and_then(ProviderConfig::endpoint)
    }

    /// Resolve the API key: explicit `FAQROUTE_API_KEY` first, then the provider's env var.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::OpenAI { api_key_env, .. }) => std::env::var(api_key_env).ok(),
            Some(ProviderConfig::Ollama { .. }) => None,
            None if provider == "openai" => std::env::var("OPENAI_API_KEY").ok(),
            None => None,
        }
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["openai", "ollama"];

        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        if self.provider == "openai" && self.resolve_api_key("openai").is_none() {
            return Err(AppError::Config(
                "OpenAI provider requires an API key (FAQROUTE_API_KEY or OPENAI_API_KEY)"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
