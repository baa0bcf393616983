//! Node configuration
//!
//! Loaded from TOML; every field has a default so a partial file (or none)
//! is valid:
//!
//! ```toml
//! groups = ["GLOBAL"]
//! log_dir = "/tmp/wavelog"
//! ordered_log_file = "ordered.log"
//! settle_ms = 250
//! collect_delay_ms = 5000
//! collect_interval_ms = 5000
//! record_time_space = true
//! dump_time_space = false
//! verbose = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use wavelog_core::PeerId;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        /// Config file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The TOML did not match [`NodeConfig`]
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Stable numeric code for this error
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::Io { .. } => 500,
            ConfigError::Parse(_) => 501,
            ConfigError::Invalid(_) => 502,
        }
    }
}

/// Settings of one [`LogNode`](crate::LogNode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Groups joined on START
    pub groups: Vec<String>,
    /// Directory of the per-node logs, the ordered log and trace dumps
    pub log_dir: PathBuf,
    /// File name of the leader's ordered log inside `log_dir`
    pub ordered_log_file: String,
    /// Pause between joining the groups and starting the election
    pub settle_ms: u64,
    /// Pause between winning the election and the first collection wave
    pub collect_delay_ms: u64,
    /// Pause between collection waves; zero collects once
    pub collect_interval_ms: u64,
    /// Record the clock's time-space trace
    pub record_time_space: bool,
    /// Write the trace to `<log_dir>/<peer>.dot` on termination
    pub dump_time_space: bool,
    /// Log protocol steps at `info`
    pub verbose: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            groups: vec!["GLOBAL".to_string()],
            log_dir: std::env::temp_dir().join("wavelog"),
            ordered_log_file: "ordered.log".to_string(),
            settle_ms: 250,
            collect_delay_ms: 5000,
            collect_interval_ms: 5000,
            record_time_space: true,
            dump_time_space: false,
            verbose: false,
        }
    }
}

impl NodeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations a node cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groups.is_empty() {
            return Err(ConfigError::invalid("at least one group is required"));
        }
        if let Some(group) = self.groups.iter().find(|g| g.trim().is_empty()) {
            return Err(ConfigError::invalid(format!("empty group name {group:?}")));
        }
        if self.ordered_log_file.trim().is_empty() {
            return Err(ConfigError::invalid("ordered_log_file must not be empty"));
        }
        if Path::new(&self.ordered_log_file).components().count() != 1 {
            return Err(ConfigError::invalid(format!(
                "ordered_log_file must be a plain file name, got {:?}",
                self.ordered_log_file
            )));
        }
        Ok(())
    }

    /// Election start delay after START
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Delay of the first collection wave
    pub fn collect_delay(&self) -> Duration {
        Duration::from_millis(self.collect_delay_ms)
    }

    /// Delay between collection waves, if repeating
    pub fn collect_interval(&self) -> Option<Duration> {
        (self.collect_interval_ms > 0).then(|| Duration::from_millis(self.collect_interval_ms))
    }

    /// `<log_dir>/<ordered_log_file>`
    pub fn ordered_log_path(&self) -> PathBuf {
        self.log_dir.join(&self.ordered_log_file)
    }

    /// `<log_dir>/vc_<peer>.log`
    pub fn node_log_path(&self, peer: &PeerId) -> PathBuf {
        self.log_dir.join(format!("vc_{peer}.log"))
    }

    /// `<log_dir>/<peer>.dot`
    pub fn time_space_path(&self, peer: &PeerId) -> PathBuf {
        self.log_dir.join(format!("{peer}.dot"))
    }
}
