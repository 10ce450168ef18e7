//! PlanForge configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::stage::StageKind;

pub const BASE_URL_ENV: &str = "LLM_BASE_URL";
pub const MODEL_ENV: &str = "LLM_MODEL";

/// Main PlanForge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model endpoint
    pub llm: LlmConfig,

    /// Relay server
    pub server: ServerConfig,

    /// Pipeline client
    pub client: ClientConfig,

    /// Per-stage sampling overrides
    pub stages: StagesConfig,

    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain, then apply env overrides
    ///
    /// Explicit path, `./.planforge.yml`, `~/.config/planforge/planforge.yml`,
    /// defaults. An explicit path that fails to load is an error; the
    /// implicit ones only warn.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "Config::load: called");
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config from {}: {}", candidate.display(), e),
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Implicit config locations, most specific first
    pub fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".planforge.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("planforge").join("planforge.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Read only the log level, before logging is set up
    ///
    /// Never fails; a broken config file is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::candidates(),
        };
        paths
            .into_iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(&p).ok())
            .and_then(|c| c.log_level)
    }

    /// `LLM_BASE_URL` and `LLM_MODEL` win over file values
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!(%url, "apply_env_overrides: base url from env");
            self.llm.base_url = url;
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!(%model, "apply_env_overrides: model from env");
            self.llm.model = model;
        }
    }
}

/// OpenAI-compatible model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL, without the `/v1/...` suffix
    #[serde(rename = "base-url")]
    pub base_url: String,

    pub model: String,

    /// Environment variable holding a bearer key, if the endpoint wants one
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,

    /// Connect and read timeout; unset means wait forever
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    pub temperature: f32,

    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234".to_string(),
            model: "qwen2.5-coder-7b-instruct".to_string(),
            api_key_env: None,
            timeout_ms: None,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(rename = "relay-url")]
    pub relay_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:3001".to_string(),
        }
    }
}

/// Sampling settings for one stage; unset fields fall back to `llm`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    pub temperature: Option<f32>,

    #[serde(rename = "max-tokens")]
    pub max_tokens: Option<u32>,
}

impl StageSettings {
    fn new(temperature: f32, max_tokens: Option<u32>) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub clarify: StageSettings,
    pub architecture: StageSettings,
    pub database: StageSettings,
    pub api: StageSettings,
    pub blueprint: StageSettings,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            clarify: StageSettings::new(0.7, None),
            architecture: StageSettings::new(0.4, Some(8192)),
            database: StageSettings::new(0.4, Some(4096)),
            api: StageSettings::new(0.4, Some(4096)),
            blueprint: StageSettings::new(0.3, Some(8192)),
        }
    }
}

impl StagesConfig {
    pub fn for_stage(&self, stage: StageKind) -> StageSettings {
        match stage {
            StageKind::Clarify => self.clarify,
            StageKind::Architecture => self.architecture,
            StageKind::Database => self.database,
            StageKind::Api => self.api,
            StageKind::Blueprint => self.blueprint,
        }
    }
}
