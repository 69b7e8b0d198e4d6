//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for an agora node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Directory holding the proposal and exam snapshots.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bounded mailbox size for every service.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Identity the node's counter publisher registers under.
    #[serde(default = "default_publisher_id")]
    pub publisher_id: String,

    /// Amount added by a bare counter increment.
    #[serde(default = "default_increment_step")]
    pub increment_step: u64,

    /// Load snapshots at startup and write them back at shutdown.
    #[serde(default = "default_true")]
    pub persist_snapshots: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./agora_data")
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mailbox_capacity() -> usize {
    agora_pubsub::DEFAULT_MAILBOX_CAPACITY
}

fn default_publisher_id() -> String {
    "publisher".to_string()
}

fn default_increment_step() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Check values that serde alone cannot.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.log_format().map_err(NodeError::Config)?;
        if self.mailbox_capacity == 0 {
            return Err(NodeError::Config("mailbox_capacity must be at least 1".into()));
        }
        agora_types::CallerId::new(self.publisher_id.as_str())
            .map_err(|e| NodeError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat, String> {
        self.log_format.parse()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            mailbox_capacity: default_mailbox_capacity(),
            publisher_id: default_publisher_id(),
            increment_step: default_increment_step(),
            persist_snapshots: default_true(),
        }
    }
}
