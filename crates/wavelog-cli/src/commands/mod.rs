//! Subcommand implementations

pub mod bakery;
pub mod order;
