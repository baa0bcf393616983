//! Tri-state progress of a wave protocol step.

use crate::errors::ProtocolResult;
use std::fmt;

/// Outcome of feeding one message (or a start call) into a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progress {
    /// The protocol needs more messages
    InProgress,
    /// The protocol reached its decision during this call
    Finished,
}

impl Progress {
    /// Numeric code: `1` in progress, `0` finished
    pub fn code(self) -> i32 {
        match self {
            Progress::InProgress => 1,
            Progress::Finished => 0,
        }
    }

    /// True for [`Progress::Finished`]
    pub fn is_finished(self) -> bool {
        self == Progress::Finished
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::InProgress => f.write_str("in progress"),
            Progress::Finished => f.write_str("finished"),
        }
    }
}

/// Collapse a protocol result into `1` / `0` / `-1`.
pub fn progress_code(result: &ProtocolResult<Progress>) -> i32 {
    match result {
        Ok(progress) => progress.code(),
        Err(err) => err.progress_code(),
    }
}
