//! Configuration loading and validation for turnwise.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides (`TURNWISE_API_KEY`, `TURNWISE_BASE_URL`, `TURNWISE_MODEL`).
//! Validates all settings before anything touches the network.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend (completion service) settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Settings for the streaming completion backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API key (usually supplied via TURNWISE_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Settings for the agent loop itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum loop iterations before a run is declared runaway
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Token inserted between discontinuous streamed messages
    #[serde(default = "default_separator")]
    pub message_separator: String,

    /// Extra instructions appended to every system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_instructions: Option<String>,

    /// History compaction, off unless configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionConfig>,
}

/// When and how aggressively to collapse old history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Compact once this many messages accumulate past the last summary
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// How many of the oldest live messages to collapse at a time
    #[serde(default = "default_reduce_by")]
    pub reduce_by: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_iterations() -> u32 {
    7
}
fn default_separator() -> String {
    "\n\n".into()
}
fn default_threshold() -> usize {
    24
}
fn default_reduce_by() -> usize {
    12
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            message_separator: default_separator(),
            extra_instructions: None,
            compaction: None,
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            reduce_by: default_reduce_by(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("backend", &self.backend)
            .field("agent", &self.agent)
            .finish()
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the given path, applying env overrides.
    ///
    /// A missing file yields the defaults; a present but malformed file is
    /// an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("TURNWISE_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("TURNWISE_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Ok(model) = std::env::var("TURNWISE_MODEL") {
            self.backend.model = model;
        }
    }

    /// Validate settings. Called by `load_from`; also usable on manually
    /// built configs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.base_url must not be empty".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.backend.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "backend.temperature must be within 0.0..=2.0, got {}",
                self.backend.temperature
            )));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if let Some(compaction) = &self.agent.compaction {
            if compaction.reduce_by == 0 {
                return Err(ConfigError::ValidationError(
                    "agent.compaction.reduce_by must be at least 1".into(),
                ));
            }
            if compaction.reduce_by > compaction.threshold {
                return Err(ConfigError::ValidationError(format!(
                    "agent.compaction.reduce_by ({}) must not exceed threshold ({})",
                    compaction.reduce_by, compaction.threshold
                )));
            }
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_iterations, 7);
        assert_eq!(config.agent.message_separator, "\n\n");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.backend.model, config.backend.model);
        assert_eq!(parsed.agent.max_iterations, config.agent.max_iterations);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/turnwise.toml")).unwrap();
        assert_eq!(config.backend.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[backend]
base_url = "http://localhost:11434/v1"
model = "llama3"

[agent]
max_iterations = 3

[agent.compaction]
threshold = 10
reduce_by = 5
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:11434/v1");
        assert_eq!(config.backend.model, "llama3");
        assert_eq!(config.agent.max_iterations, 3);
        let compaction = config.agent.compaction.unwrap();
        assert_eq!(compaction.threshold, 10);
        assert_eq!(compaction.reduce_by, 5);
    }

    #[test]
    fn zero_iterations_rejected() {
        let config = AppConfig {
            agent: AgentConfig {
                max_iterations: 0,
                ..AgentConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_reduce_by_rejected() {
        let config = AppConfig {
            agent: AgentConfig {
                compaction: Some(CompactionConfig {
                    threshold: 4,
                    reduce_by: 9,
                }),
                ..AgentConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            backend: BackendConfig {
                temperature: 5.0,
                ..BackendConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            backend: BackendConfig {
                api_key: Some("sk-secret".into()),
                ..BackendConfig::default()
            },
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
