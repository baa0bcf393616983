//! # wavelog-journal
//!
//! Clock-stamped logs and their merge into one causally consistent file.
//!
//! - [`LogRecord`]: `<unix_millis> /<vector clock>/ <text>` lines
//! - [`compare_by_clock`] / [`compare_by_timestamp`]: total orders over
//!   records, consistent with happened-before for the clock order
//! - [`order_log`]: sort a whole file into another
//! - [`NodeLog`]: a node's own append-only log with an unshipped-tail cursor
//! - [`OrderedLog`]: the leader's incrementally merged log

#![forbid(unsafe_code)]

pub mod error;
pub mod node_log;
pub mod ordered;
pub mod ordering;
pub mod record;

pub use error::{LogError, LogResult};
pub use node_log::NodeLog;
pub use ordered::OrderedLog;
pub use ordering::{
    compare_by_clock, compare_by_timestamp, order_log, order_records, write_records, ClockKey,
    LogOrdering, RecordKey,
};
pub use record::{unix_millis, LogRecord};
