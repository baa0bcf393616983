//! Notifications a node reports to its owner.

use std::path::PathBuf;
use wavelog_core::PeerId;

/// Observable outcome of the node loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// The election terminated on this node
    ElectionDecided {
        /// Elected node
        leader: PeerId,
        /// Whether this node is the leader
        won: bool,
    },
    /// A collection wave decided on the leader and the ordered log was written
    LogsOrdered {
        /// Ordered log file
        path: PathBuf,
        /// Records it now holds
        records: usize,
    },
    /// A collection wave decided on the leader but a log error spoiled it
    CollectionFailed {
        /// Stable code of the first error
        code: u32,
        /// Its message
        reason: String,
    },
    /// A bakery message arrived
    Bakery {
        /// Payload
        content: String,
        /// Node the message is about
        owner: String,
    },
    /// The loop ended
    Stopped,
}
