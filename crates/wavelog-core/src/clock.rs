//! Dynamic vector clock
//!
//! A [`VectorClock`] maps process ids to logical counters. The owner's entry is
//! ticked once per local event (every send and every receive); merging only
//! ever raises entries. Entries for peers the clock has never heard of are
//! implicitly zero, so membership can change at runtime.
//!
//! ## Wire format
//!
//! ```text
//! VC:<n>;own:<owner>;<pid1>,<val1>;...;<pidN>,<valN>;
//! ```
//!
//! `<n>` counts every entry including the owner's. Entries are written in
//! ascending pid order so the same clock always serializes identically.
//!
//! ## Causality
//!
//! [`VectorClock::compare`] implements the full relation over the union of
//! both entry sets: `a` is before `b` iff every entry of `a` is `<=` the
//! matching entry of `b` and the clocks differ. The owner id takes no part in
//! the comparison.

use crate::errors::ClockError;
use crate::identifiers::PeerId;
use crate::trace::TimeSpaceTrace;
use crate::wire::{WireMessage, CLOCK_FRAME_PREFIX};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Causal relation between two clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CausalOrdering {
    /// `self` happened before `other`
    Before,
    /// `self` happened after `other`
    After,
    /// Neither precedes the other
    Concurrent,
    /// All entries are pairwise equal
    Equal,
}

/// Vector clock owned by one process.
#[derive(Debug, Clone)]
pub struct VectorClock {
    owner: PeerId,
    entries: BTreeMap<PeerId, u64>,
    trace: Option<TimeSpaceTrace>,
}

impl VectorClock {
    /// Create a clock for `owner` with the single entry `{owner: 0}`.
    pub fn new(owner: impl Into<PeerId>) -> Self {
        let owner = owner.into();
        let mut entries = BTreeMap::new();
        entries.insert(owner.clone(), 0);
        Self {
            owner,
            entries,
            trace: None,
        }
    }

    /// Create a clock from explicit entries. The owner entry is not implied.
    pub fn from_entries<I, P>(owner: impl Into<PeerId>, entries: I) -> Self
    where
        I: IntoIterator<Item = (P, u64)>,
        P: Into<PeerId>,
    {
        Self {
            owner: owner.into(),
            entries: entries.into_iter().map(|(p, v)| (p.into(), v)).collect(),
            trace: None,
        }
    }

    /// Start recording the time-space trace of this clock.
    pub fn enable_trace(&mut self) {
        if self.trace.is_none() {
            self.trace = Some(TimeSpaceTrace::default());
        }
    }

    /// Recorded time-space trace, if enabled
    pub fn trace(&self) -> Option<&TimeSpaceTrace> {
        self.trace.as_ref()
    }

    /// Owning process id
    pub fn owner(&self) -> &PeerId {
        &self.owner
    }

    /// Counter for `pid`; absent entries read as zero.
    pub fn get(&self, pid: &str) -> u64 {
        self.entries.get(pid).copied().unwrap_or(0)
    }

    /// Number of explicit entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the clock has no explicit entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending pid order
    pub fn entries(&self) -> impl Iterator<Item = (&PeerId, u64)> {
        self.entries.iter().map(|(pid, value)| (pid, *value))
    }

    /// Sum of all counters. Strictly increases along happened-before.
    ///
    /// Accumulated in `u128` so no number of `u64` entries can overflow it.
    pub fn total(&self) -> u128 {
        self.entries.values().map(|&value| u128::from(value)).sum()
    }

    /// Record a local event: tick the owner's entry by one.
    pub fn event(&mut self) {
        let counter = self.entries.entry(self.owner.clone()).or_insert(0);
        *counter += 1;

        if self.trace.is_some() {
            let state = self.to_string();
            if let Some(trace) = self.trace.as_mut() {
                trace.record_state(state);
            }
        }
    }

    /// Tick, then prepend the serialized clock to an outgoing message.
    pub fn prepare_for_send(&mut self, mut message: WireMessage) -> WireMessage {
        self.event();
        message.push_front(self.to_string());
        message
    }

    /// Pop the leading clock frame of `message`, tick, and merge the sender's
    /// entries into this clock.
    pub fn receive(&mut self, message: &mut WireMessage) -> Result<(), ClockError> {
        if !message.has_clock_frame() {
            return Err(ClockError::MissingFrame);
        }
        let frame = message.pop_front().ok_or(ClockError::MissingFrame)?;
        let sender = VectorClock::from_string(&frame)?;

        self.event();
        if self.trace.is_some() {
            let own_state = self.to_string();
            if let Some(trace) = self.trace.as_mut() {
                trace.record_edge(sender.to_string(), own_state);
            }
        }
        self.merge(&sender);
        tracing::trace!(owner = %self.owner, from = %sender.owner, clock = %self, "clock merged");
        Ok(())
    }

    /// Element-wise maximum with `other`. Unknown pids are inserted.
    pub fn merge(&mut self, other: &VectorClock) {
        for (pid, value) in &other.entries {
            let local = self.entries.entry(pid.clone()).or_insert(0);
            if *value > *local {
                *local = *value;
            }
        }
    }

    /// Causal comparison of `self` against `other`.
    pub fn compare(&self, other: &VectorClock) -> CausalOrdering {
        let mut less = false;
        let mut greater = false;

        for pid in self.entries.keys().chain(other.entries.keys()) {
            let mine = self.get(pid.as_str());
            let theirs = other.get(pid.as_str());
            if mine < theirs {
                less = true;
            } else if mine > theirs {
                greater = true;
            }
            if less && greater {
                return CausalOrdering::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => CausalOrdering::Equal,
            (true, false) => CausalOrdering::Before,
            (false, true) => CausalOrdering::After,
            (true, true) => CausalOrdering::Concurrent,
        }
    }

    /// True when `self` happened before `other`
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrdering::Before
    }

    /// Parse the wire representation.
    pub fn from_string(input: &str) -> Result<Self, ClockError> {
        let body = input
            .strip_prefix(CLOCK_FRAME_PREFIX)
            .ok_or_else(|| ClockError::malformed(input, "missing 'VC:' prefix"))?;

        let parts: Vec<&str> = body.split(';').collect();
        // "<n>", "own:<pid>", entries..., "" (trailing separator)
        if parts.len() < 3 || parts.last() != Some(&"") {
            return Err(ClockError::malformed(input, "missing ';' terminator"));
        }

        let declared: usize = parts[0]
            .parse()
            .map_err(|_| ClockError::malformed(input, "entry count is not a number"))?;

        let owner = parts[1]
            .strip_prefix("own:")
            .filter(|owner| !owner.is_empty())
            .ok_or_else(|| ClockError::malformed(input, "missing 'own:' section"))?;

        let mut entries = BTreeMap::new();
        for part in &parts[2..parts.len() - 1] {
            let (pid, value) = part
                .split_once(',')
                .ok_or_else(|| ClockError::malformed(input, format!("entry '{part}' has no ','")))?;
            if pid.is_empty() {
                return Err(ClockError::malformed(input, "empty pid"));
            }
            let value: u64 = value.parse().map_err(|_| {
                ClockError::malformed(input, format!("value of '{pid}' is not a number"))
            })?;
            if entries.insert(PeerId::new(pid), value).is_some() {
                return Err(ClockError::malformed(input, format!("duplicate pid '{pid}'")));
            }
        }

        if entries.len() != declared {
            return Err(ClockError::malformed(
                input,
                format!("declared {declared} entries, found {}", entries.len()),
            ));
        }

        Ok(Self {
            owner: PeerId::new(owner),
            entries,
            trace: None,
        })
    }

    /// Write the recorded time-space trace as a Graphviz subgraph.
    ///
    /// Writes an empty subgraph when tracing was never enabled.
    pub fn dump_time_space<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match &self.trace {
            Some(trace) => trace.write_subgraph(&self.owner, writer),
            None => TimeSpaceTrace::default().write_subgraph(&self.owner, writer),
        }
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.entries == other.entries
    }
}

impl Eq for VectorClock {}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VC:{};own:{};", self.entries.len(), self.owner)?;
        for (pid, value) in &self.entries {
            write!(f, "{pid},{value};")?;
        }
        Ok(())
    }
}

impl FromStr for VectorClock {
    type Err = ClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}
