//! Overseer configuration
//!
//! Loaded from YAML, one section per concern

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverseerConfig {
    /// State layout configuration
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl OverseerConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to YAML file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let yaml =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(&mut self, other: OverseerConfig) {
        self.cluster.merge(other.cluster);
        self.log.merge(other.log);
    }
}

/// Where collection state lives in the coordination store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Parent node of all collections
    #[serde(default = "default_collections_root")]
    pub collections_root: String,
    /// Name of a collection's state document
    #[serde(default = "default_state_file_name")]
    pub state_file_name: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            collections_root: default_collections_root(),
            state_file_name: default_state_file_name(),
        }
    }
}

impl ClusterConfig {
    /// Path of a collection's state document, e.g. `/collections/films/state.json`
    pub fn state_path(&self, collection: &str) -> String {
        format!(
            "{}/{}/{}",
            self.collections_root.trim_end_matches('/'),
            collection,
            self.state_file_name
        )
    }

    fn merge(&mut self, other: Self) {
        if !other.collections_root.is_empty() {
            self.collections_root = other.collections_root;
        }
        if !other.state_file_name.is_empty() {
            self.state_file_name = other.state_file_name;
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    fn merge(&mut self, other: Self) {
        if !other.level.is_empty() {
            self.level = other.level;
        }
    }
}

// Default value functions

fn default_collections_root() -> String {
    "/collections".to_string()
}

fn default_state_file_name() -> String {
    "state.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
}
