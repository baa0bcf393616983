//! Wire message frames
//!
//! Every message exchanged between peers is a sequence of string frames.
//! Protocol messages start with a type tag (`ZLE`, `ZECHO`, ...) optionally
//! preceded by a serialized vector clock frame:
//!
//! ```text
//! [VC:<n>;own:<pid>;...]  "ZLE"   "ELECTION"|"LEADER"  <id>
//! [VC:<n>;own:<pid>;...]  "ZECHO" <wave-id> "INFORM"|"COLLECT" <payload frames...>
//! ```

use std::collections::VecDeque;
use std::fmt;

/// Type tag of election messages
pub const ELECTION_TAG: &str = "ZLE";
/// Type tag of echo-wave messages
pub const ECHO_TAG: &str = "ZECHO";
/// Type tag of the bakery demo messages
pub const BAKERY_TAG: &str = "BAKERY";
/// Prefix every serialized vector clock frame starts with
pub const CLOCK_FRAME_PREFIX: &str = "VC:";

/// Ordered list of string frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireMessage {
    frames: VecDeque<String>,
}

impl WireMessage {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message from frames
    pub fn from_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            frames: frames.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a frame at the end
    pub fn push_back(&mut self, frame: impl Into<String>) {
        self.frames.push_back(frame.into());
    }

    /// Prepend a frame
    pub fn push_front(&mut self, frame: impl Into<String>) {
        self.frames.push_front(frame.into());
    }

    /// Builder-style append
    pub fn with(mut self, frame: impl Into<String>) -> Self {
        self.push_back(frame);
        self
    }

    /// Append all frames of a payload
    pub fn extend<I, S>(&mut self, frames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.frames.extend(frames.into_iter().map(Into::into));
    }

    /// Remove and return the first frame
    pub fn pop_front(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    /// First frame, if any
    pub fn front(&self) -> Option<&str> {
        self.frames.front().map(String::as_str)
    }

    /// True when the first frame is a serialized vector clock
    pub fn has_clock_frame(&self) -> bool {
        self.front()
            .is_some_and(|frame| frame.starts_with(CLOCK_FRAME_PREFIX))
    }

    /// Type tag of the message, skipping a leading clock frame
    pub fn tag(&self) -> Option<&str> {
        let index = usize::from(self.has_clock_frame());
        self.frames.get(index).map(String::as_str)
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when the message has no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterate over the frames
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(String::as_str)
    }

    /// Consume the message, returning the remaining frames
    pub fn into_frames(self) -> Vec<String> {
        self.frames.into()
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, frame) in self.frames.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{frame:?}")?;
        }
        f.write_str("]")
    }
}
