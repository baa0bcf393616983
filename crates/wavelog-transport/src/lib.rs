//! # wavelog-transport
//!
//! [`MemoryNetwork`]: an in-process implementation of the
//! [`PeerTransport`](wavelog_core::PeerTransport) seam with named groups,
//! membership announcements and per-peer tokio event channels. Nodes of the
//! bakery demo and the reactor tests talk over it.

#![forbid(unsafe_code)]

pub mod memory;

pub use memory::{MemoryNetwork, MemoryTransport, PeerEvents};
