//! ABOUTME: Layered worker configuration: an optional `truss.toml` file with
//! ABOUTME: environment variable overrides, threaded explicitly into the worker

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Search order for the on-disk configuration file, checked relative to
/// the current working directory. The first file found wins; none of
/// these existing is not an error, the built-in defaults apply.
const CONFIG_SEARCH_PATHS: &[&str] = &["truss.toml", ".truss.toml", "config/truss.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Worker-wide configuration: the storage/pub-sub backends and the
/// Temporal-style engine connection details named in the core
/// specification's external-interfaces section. No implicit global: a
/// `TrussConfig` is built once at worker startup and threaded explicitly
/// through every constructor that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrussConfig {
    /// `DATABASE_URL`. Defaults to an embedded single-file sqlite database
    /// for development.
    pub database_url: String,
    /// `REDIS_URL` (or equivalent pub/sub transport).
    pub redis_url: Option<String>,
    /// `TEMPORAL_URL`, default `localhost:7233`.
    pub temporal_url: String,
    /// `TEMPORAL_TASK_QUEUE`, default `truss-agent-queue`.
    pub temporal_task_queue: String,
    /// `TEMPORAL_TLS_ENABLED`.
    pub temporal_tls_enabled: bool,
    /// Base URL of the OpenAI-compatible completions endpoint.
    pub llm_base_url: String,
}

impl Default for TrussConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://truss.db".to_string(),
            redis_url: None,
            temporal_url: "localhost:7233".to_string(),
            temporal_task_queue: "truss-agent-queue".to_string(),
            temporal_tls_enabled: false,
            llm_base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl TrussConfig {
    /// Loads configuration by searching [`CONFIG_SEARCH_PATHS`] for the
    /// first file that exists, falling back to built-in defaults if none
    /// is found, then applying environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::find_config_file()
            .map(|path| Self::from_file(&path))
            .transpose()?
            .unwrap_or_default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<std::path::PathBuf> {
        CONFIG_SEARCH_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .map(Path::to_path_buf)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overrides file-loaded (or default) values with environment
    /// variables, matching the core specification's external-interfaces
    /// table exactly.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("DATABASE_URL") {
            tracing::debug!("overriding database_url from DATABASE_URL");
            self.database_url = value;
        }
        if let Ok(value) = std::env::var("REDIS_URL") {
            tracing::debug!("overriding redis_url from REDIS_URL");
            self.redis_url = Some(value);
        }
        if let Ok(value) = std::env::var("TEMPORAL_URL") {
            tracing::debug!("overriding temporal_url from TEMPORAL_URL");
            self.temporal_url = value;
        }
        if let Ok(value) = std::env::var("TEMPORAL_TASK_QUEUE") {
            tracing::debug!("overriding temporal_task_queue from TEMPORAL_TASK_QUEUE");
            self.temporal_task_queue = value;
        }
        if let Ok(value) = std::env::var("TEMPORAL_TLS_ENABLED") {
            self.temporal_tls_enabled = matches!(value.to_lowercase().as_str(), "true" | "1");
        }
        if let Ok(value) = std::env::var("LLM_BASE_URL") {
            self.llm_base_url = value;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::Invalid {
                message: "database_url must not be empty".to_string(),
            });
        }
        if self.temporal_task_queue.is_empty() {
            return Err(ConfigError::Invalid {
                message: "temporal_task_queue must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_match_the_documented_contract() {
        for var in [
            "DATABASE_URL",
            "REDIS_URL",
            "TEMPORAL_URL",
            "TEMPORAL_TASK_QUEUE",
            "TEMPORAL_TLS_ENABLED",
            "LLM_BASE_URL",
        ] {
            std::env::remove_var(var);
        }
        let config = TrussConfig::default();
        assert_eq!(config.temporal_url, "localhost:7233");
        assert_eq!(config.temporal_task_queue, "truss-agent-queue");
        assert!(!config.temporal_tls_enabled);
    }

    #[test]
    #[serial]
    fn env_vars_override_defaults() {
        std::env::set_var("TEMPORAL_TASK_QUEUE", "custom-queue");
        std::env::set_var("TEMPORAL_TLS_ENABLED", "true");
        let mut config = TrussConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.temporal_task_queue, "custom-queue");
        assert!(config.temporal_tls_enabled);
        std::env::remove_var("TEMPORAL_TASK_QUEUE");
        std::env::remove_var("TEMPORAL_TLS_ENABLED");
    }

    #[test]
    fn parses_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truss.toml");
        std::fs::write(&path, "database_url = \"sqlite:///custom.db\"\n").unwrap();
        let config = TrussConfig::from_file(&path).unwrap();
        assert_eq!(config.database_url, "sqlite:///custom.db");
    }
}
