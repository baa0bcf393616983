//! # wavelog-agent
//!
//! The log collection node. A [`LogNode`] joins its groups, takes part in
//! the leader election and, once elected, periodically runs collection waves
//! that gather every node's clock-stamped log into one causally ordered file.
//! It also relays the bakery demo's messages.
//!
//! - [`NodeConfig`]: TOML configuration
//! - [`NodeCommand`]: textual control commands (`START`, `SEND RANDOM ...`)
//! - [`NodeHandle`]: command sender and [`NodeEvent`] stream of a running node
//! - [`LogCollector`]: collect-phase payload handler of a collection wave

#![forbid(unsafe_code)]

pub mod collector;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod node;

pub use collector::{LogCollector, RoundFailure};
pub use command::NodeCommand;
pub use config::{ConfigError, NodeConfig};
pub use error::{NodeError, NodeResult};
pub use event::NodeEvent;
pub use node::{LogNode, NodeHandle};
