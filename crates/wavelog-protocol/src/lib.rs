//! # wavelog-protocol
//!
//! Wave algorithms over the group-membership neighbor graph:
//!
//! - [`EchoWave`]: single-use inform/collect wave with pluggable payload
//!   handlers
//! - [`Election`]: flooding election with echo-back where the lexicographically
//!   smallest initiator id wins
//!
//! Both are plain state machines. They never block and never own the
//! transport or the clock; every call receives a [`Courier`] that does the
//! sending and clock stamping, and returns a [`Progress`].
//!
//! [`Courier`]: wavelog_core::Courier
//! [`Progress`]: wavelog_core::Progress

#![forbid(unsafe_code)]

/// Log a protocol step at `info` when verbose, `debug` otherwise.
macro_rules! step {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            ::tracing::info!($($arg)+);
        } else {
            ::tracing::debug!($($arg)+);
        }
    };
}

pub(crate) use step;

pub mod echo;
pub mod election;

pub use echo::{BoxedPayloadHandler, EchoWave, Father, WaveKind, WavePayloadHandler};
pub use election::{Election, ElectionStatus};
