//! Error types shared by the clock, the transport seam and the wave protocols.
//!
//! Protocol violations (wrong wave, malformed frames) are non-fatal to a node:
//! the offending message is dropped and the caller sees an error value.
//! Parsing errors on persisted or serialized clocks are reported as
//! [`ClockError`] and treated as fatal by the operation that hit them.

use crate::identifiers::PeerId;
use thiserror::Error;

/// Errors raised while parsing or applying a serialized vector clock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    /// The clock string does not follow `VC:<n>;own:<pid>;<pid>,<v>;...`
    #[error("malformed vector clock '{input}': {reason}")]
    Malformed {
        /// The offending input
        input: String,
        /// What was wrong with it
        reason: String,
    },

    /// A receive was attempted on a message without a leading clock frame
    #[error("message carries no vector clock frame")]
    MissingFrame,
}

impl ClockError {
    /// Create a malformed clock error
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Stable numeric code for this error
    pub fn code(&self) -> u32 {
        match self {
            ClockError::Malformed { .. } => 100,
            ClockError::MissingFrame => 101,
        }
    }
}

/// Errors raised by a [`PeerTransport`](crate::transport::PeerTransport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The destination peer is not known to the transport
    #[error("peer unreachable: {0}")]
    PeerUnreachable(PeerId),

    /// The transport (or the destination's inbox) has been shut down
    #[error("transport disconnected: {0}")]
    Disconnected(String),
}

impl TransportError {
    /// Stable numeric code for this error
    pub fn code(&self) -> u32 {
        match self {
            TransportError::PeerUnreachable(_) => 200,
            TransportError::Disconnected(_) => 201,
        }
    }
}

/// Errors returned by the election and echo-wave protocols.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The message belongs to a different wave than the one this node joined
    #[error("wrong wave: expected {expected}, got {received}")]
    WrongWave {
        /// Wave this node participates in
        expected: String,
        /// Wave id carried by the rejected message
        received: String,
    },

    /// The message frames do not match the expected layout
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The election already finished; late messages are discarded
    #[error("election already finished")]
    ElectionClosed,

    /// The echo wave already finished on this node
    #[error("wave {0} already finished")]
    WaveClosed(String),

    /// Clock frame could not be applied
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// A send to a neighbor failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    /// Create a malformed message error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Stable numeric code for this error
    pub fn code(&self) -> u32 {
        match self {
            ProtocolError::WrongWave { .. } => 300,
            ProtocolError::Malformed(_) => 301,
            ProtocolError::ElectionClosed => 302,
            ProtocolError::WaveClosed(_) => 303,
            ProtocolError::Clock(e) => e.code(),
            ProtocolError::Transport(e) => e.code(),
        }
    }

    /// Tri-state progress code for errors: always `-1`.
    pub fn progress_code(&self) -> i32 {
        -1
    }
}

/// Result alias for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
