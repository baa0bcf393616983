//! Journal errors

use std::path::{Path, PathBuf};
use thiserror::Error;
use wavelog_core::ClockError;

/// Errors raised while reading, writing or ordering log records.
#[derive(Debug, Error)]
pub enum LogError {
    /// A log file could not be read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A record does not carry the field the comparator needs
    #[error("malformed log record '{record}': {reason}")]
    Malformed {
        /// The offending line
        record: String,
        /// What was missing
        reason: String,
    },

    /// The embedded vector clock failed to parse
    #[error(transparent)]
    Clock(#[from] ClockError),
}

impl LogError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a malformed record error
    pub fn malformed(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            record: record.into(),
            reason: reason.into(),
        }
    }

    /// Stable numeric code for this error
    pub fn code(&self) -> u32 {
        match self {
            LogError::Io { .. } => 400,
            LogError::Malformed { .. } => 401,
            LogError::Clock(e) => e.code(),
        }
    }
}

/// Result alias for journal operations
pub type LogResult<T> = std::result::Result<T, LogError>;
