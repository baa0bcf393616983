//! # wavelog-core
//!
//! Foundation types shared by every wavelog crate:
//!
//! - [`PeerId`] / [`GroupName`]: string identifiers, ordered lexicographically
//! - [`WireMessage`]: the frame list every peer message is made of
//! - [`VectorClock`]: dynamic vector clock with causal comparison and an
//!   optional time-space trace
//! - [`PeerTransport`] / [`Courier`]: the transport seam the protocols send
//!   through, with optional clock stamping
//! - [`Progress`] and the error enums
//!
//! Nothing in this crate performs I/O beyond writing trace dumps to a caller
//! supplied writer.

#![forbid(unsafe_code)]

pub mod clock;
pub mod errors;
pub mod identifiers;
pub mod progress;
pub mod trace;
pub mod transport;
pub mod wire;

pub use clock::{CausalOrdering, VectorClock};
pub use errors::{ClockError, ProtocolError, ProtocolResult, TransportError};
pub use identifiers::{GroupName, PeerId};
pub use progress::{progress_code, Progress};
pub use trace::TimeSpaceTrace;
pub use transport::{
    neighbor_count, neighbors, Courier, PeerEvent, PeerTransport, TransportResult,
};
pub use wire::{WireMessage, BAKERY_TAG, CLOCK_FRAME_PREFIX, ECHO_TAG, ELECTION_TAG};
