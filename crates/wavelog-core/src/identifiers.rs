//! Peer and group identifiers
//!
//! Identifiers are plain strings on the wire. Their ordering is the byte-wise
//! lexicographic ordering of that string, which is what the election uses to
//! pick a winner.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Identifier of a peer in the group.
///
/// Ordering is lexicographic over the identifier string; the smallest id
/// wins an election.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a fresh random peer id (UUID v4, upper-case simple form).
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string().to_uppercase())
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.simple().to_string().to_uppercase())
    }

    /// Borrow the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form used in human-readable log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(5)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for PeerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of a membership group. Neighbors are enumerated group by group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupName(String);

impl GroupName {
    /// Create a group name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the group name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for GroupName {
    fn from(value: String) -> Self {
        Self(value)
    }
}
