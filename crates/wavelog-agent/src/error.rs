//! Error types of the log collection node

use crate::config::ConfigError;
use thiserror::Error;
use wavelog_core::{ClockError, ProtocolError, TransportError};
use wavelog_journal::LogError;

/// Result type for node operations
pub type NodeResult<T> = std::result::Result<T, NodeError>;

/// Errors raised by [`LogNode`](crate::LogNode) and its handle
#[derive(Debug, Error)]
pub enum NodeError {
    /// A command line did not parse
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Node or ordered log file failure
    #[error(transparent)]
    Log(#[from] LogError),

    /// Election or echo failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Clock frame failure outside a protocol
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// A direct send failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Time-space dump could not be written
    #[error("cannot write time-space dump {path}: {source}")]
    Dump {
        /// Dump file
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The node loop is gone
    #[error("node {0} stopped")]
    Stopped(String),

    /// The node task panicked or was cancelled
    #[error("node task failed: {0}")]
    Task(String),
}

impl NodeError {
    /// Create an unknown command error
    pub fn unknown_command(line: impl Into<String>) -> Self {
        Self::UnknownCommand(line.into())
    }

    /// Stable numeric code for this error
    pub fn code(&self) -> u32 {
        match self {
            NodeError::UnknownCommand(_) => 600,
            NodeError::Dump { .. } => 601,
            NodeError::Stopped(_) => 602,
            NodeError::Task(_) => 603,
            NodeError::Config(e) => e.code(),
            NodeError::Log(e) => e.code(),
            NodeError::Protocol(e) => e.code(),
            NodeError::Clock(e) => e.code(),
            NodeError::Transport(e) => e.code(),
        }
    }
}
