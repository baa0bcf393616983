//! Log record format
//!
//! ```text
//! <unix_millis> /<serialized vector clock>/ <text>
//! ```
//!
//! The clock sits between the first pair of `/`; the timestamp is the first
//! whitespace-delimited token.

use crate::error::{LogError, LogResult};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use wavelog_core::VectorClock;

/// One line of a peer log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogRecord {
    line: String,
}

impl LogRecord {
    /// Wrap a raw line
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }

    /// Build a stamped record from its parts
    pub fn stamped(timestamp_ms: u64, clock: &VectorClock, text: &str) -> Self {
        Self {
            line: format!("{timestamp_ms} /{clock}/ {text}"),
        }
    }

    /// Build a stamped record with the current wall-clock time
    pub fn now(clock: &VectorClock, text: &str) -> Self {
        Self::stamped(unix_millis(), clock, text)
    }

    /// Raw line
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Consume into the raw line
    pub fn into_line(self) -> String {
        self.line
    }

    /// Text between the first pair of `/`
    pub fn clock_str(&self) -> LogResult<&str> {
        let (_, rest) = self
            .line
            .split_once('/')
            .ok_or_else(|| LogError::malformed(&self.line, "no '/' before the vector clock"))?;
        let (clock, _) = rest
            .split_once('/')
            .ok_or_else(|| LogError::malformed(&self.line, "no '/' after the vector clock"))?;
        Ok(clock)
    }

    /// Embedded vector clock
    pub fn clock(&self) -> LogResult<VectorClock> {
        Ok(VectorClock::from_string(self.clock_str()?)?)
    }

    /// Leading numeric timestamp
    pub fn timestamp(&self) -> LogResult<u64> {
        self.line
            .split_whitespace()
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| LogError::malformed(&self.line, "no leading numeric timestamp"))
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

impl From<String> for LogRecord {
    fn from(line: String) -> Self {
        Self::new(line)
    }
}

impl From<&str> for LogRecord {
    fn from(line: &str) -> Self {
        Self::new(line)
    }
}

/// Milliseconds since the Unix epoch; zero if the system clock is before it.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
