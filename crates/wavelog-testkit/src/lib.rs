//! # wavelog-testkit
//!
//! Deterministic test infrastructure for the wave protocols:
//!
//! - [`SimNetwork`] / [`SimTransport`]: an in-process [`PeerTransport`]
//!   whose delivery order is chosen by a seeded RNG while keeping per-sender
//!   FIFO order
//! - [`Topology`]: group-membership builders for mesh, line, ring, star and
//!   random connected graphs
//!
//! [`PeerTransport`]: wavelog_core::PeerTransport

#![forbid(unsafe_code)]

pub mod network;
pub mod topology;

pub use network::{Envelope, SimNetwork, SimTransport};
pub use topology::{peer_ids, Topology};
