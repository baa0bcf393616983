//! Collect-phase payload handler that gathers log records toward the leader.
//!
//! A peer answers its father with the records buffered from its subtree plus
//! its own unshipped log tail. The leader merges every arriving batch into
//! its [`OrderedLog`] and rewrites the ordered file after each batch, so the
//! file is current even when a wave never decides.
//!
//! A record that does not parse, an unreadable own log or a failed write
//! fails the round: the first such error lands in the [`RoundFailure`].

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};
use wavelog_core::PeerId;
use wavelog_journal::{LogError, NodeLog, OrderedLog};
use wavelog_protocol::WavePayloadHandler;

/// First log error of one collection round.
///
/// The collector is boxed into its wave, so the node keeps a clone of this
/// slot and takes the error when the wave finishes.
#[derive(Debug, Clone, Default)]
pub struct RoundFailure(Arc<Mutex<Option<LogError>>>);

impl RoundFailure {
    fn record(&self, me: &PeerId, error: LogError) {
        warn!(peer = %me, code = error.code(), %error, "collection round failed");
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    /// True once an error was recorded and not yet taken
    pub fn is_failed(&self) -> bool {
        self.0.lock().is_some()
    }

    /// Take the recorded error, leaving the slot empty
    pub fn take(&self) -> Option<LogError> {
        self.0.lock().take()
    }
}

enum Role {
    Peer { buffered: Vec<String> },
    Leader { ordered: Arc<Mutex<OrderedLog>> },
}

/// Log collector of one node for one collection wave
pub struct LogCollector {
    me: PeerId,
    own: Arc<Mutex<NodeLog>>,
    role: Role,
    failure: RoundFailure,
}

impl LogCollector {
    /// Collector of a non-initiating node
    pub fn peer(me: PeerId, own: Arc<Mutex<NodeLog>>) -> Self {
        Self {
            me,
            own,
            role: Role::Peer {
                buffered: Vec::new(),
            },
            failure: RoundFailure::default(),
        }
    }

    /// Collector of the wave initiator, merging into `ordered`
    pub fn leader(me: PeerId, own: Arc<Mutex<NodeLog>>, ordered: Arc<Mutex<OrderedLog>>) -> Self {
        Self {
            me,
            own,
            role: Role::Leader { ordered },
            failure: RoundFailure::default(),
        }
    }

    /// True for the initiator's collector
    pub fn is_leader(&self) -> bool {
        matches!(self.role, Role::Leader { .. })
    }

    /// Slot receiving the first error of this round
    pub fn failure(&self) -> RoundFailure {
        self.failure.clone()
    }

    /// Move this node's unshipped records into the ordered log. Peers have
    /// nothing to merge into and return zero.
    pub fn ingest_own_tail(&mut self) -> usize {
        let Role::Leader { ordered } = &self.role else {
            return 0;
        };
        let tail = own_tail(&self.me, &self.own, &self.failure);
        merge(&self.me, ordered, tail, &self.failure)
    }
}

fn own_tail(me: &PeerId, own: &Mutex<NodeLog>, failure: &RoundFailure) -> Vec<String> {
    match own.lock().take_unshipped() {
        Ok(tail) => tail,
        Err(error) => {
            failure.record(me, error);
            Vec::new()
        }
    }
}

/// Insert every well-formed record; the first bad one fails the round.
fn merge(
    me: &PeerId,
    ordered: &Mutex<OrderedLog>,
    records: Vec<String>,
    failure: &RoundFailure,
) -> usize {
    let mut ordered = ordered.lock();
    let mut merged = 0;
    for record in records {
        match ordered.insert(record) {
            Ok(()) => merged += 1,
            Err(error) => failure.record(me, error),
        }
    }
    merged
}

fn flush(me: &PeerId, ordered: &Mutex<OrderedLog>, failure: &RoundFailure) {
    if let Err(error) = ordered.lock().flush() {
        failure.record(me, error);
    }
}

impl WavePayloadHandler for LogCollector {
    fn create(&mut self) -> Vec<String> {
        let tail = own_tail(&self.me, &self.own, &self.failure);
        match &mut self.role {
            Role::Peer { buffered } => {
                let mut batch = std::mem::take(buffered);
                batch.extend(tail);
                debug!(peer = %self.me, records = batch.len(), "records shipped to father");
                batch
            }
            // The initiator never sends COLLECT.
            Role::Leader { .. } => Vec::new(),
        }
    }

    fn process(&mut self, payload: Vec<String>) {
        match &mut self.role {
            Role::Peer { buffered } => buffered.extend(payload),
            Role::Leader { ordered } => {
                let merged = merge(&self.me, ordered, payload, &self.failure);
                flush(&self.me, ordered, &self.failure);
                debug!(peer = %self.me, merged, "child records merged");
            }
        }
    }

    fn complete(&mut self) {
        if let Role::Leader { ordered } = &self.role {
            flush(&self.me, ordered, &self.failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wavelog_core::VectorClock;
    use wavelog_journal::LogOrdering;

    #[test]
    fn test_peer_ships_children_then_own_tail_once() {
        let dir = tempfile::tempdir().unwrap();
        let own = Arc::new(Mutex::new(NodeLog::create(dir.path().join("b.log")).unwrap()));
        let mut clock = VectorClock::new("B");
        own.lock().stamp(&mut clock, "b-one").unwrap();

        let mut collector = LogCollector::peer(PeerId::new("B"), Arc::clone(&own));
        collector.process(vec!["1 /VC:1;own:C;C,1;/ c-one".into()]);
        let batch = collector.create();
        assert_eq!(batch.len(), 2);
        assert!(batch[0].ends_with("c-one"));
        assert!(batch[1].ends_with("b-one"));

        assert!(collector.create().is_empty());
        assert_eq!(collector.ingest_own_tail(), 0);
    }

    #[test]
    fn test_leader_merges_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let own = Arc::new(Mutex::new(NodeLog::create(dir.path().join("a.log")).unwrap()));
        let path = dir.path().join("ordered.log");
        let ordered = Arc::new(Mutex::new(OrderedLog::new(&path, LogOrdering::Clock)));
        let mut clock = VectorClock::new("A");
        own.lock().stamp(&mut clock, "a-one").unwrap();

        let mut collector =
            LogCollector::leader(PeerId::new("A"), Arc::clone(&own), Arc::clone(&ordered));
        assert!(collector.is_leader());
        assert_eq!(collector.ingest_own_tail(), 1);

        collector.process(vec!["5 /VC:2;own:B;A,1;B,1;/ b-one".into()]);
        collector.complete();
        assert!(!collector.failure().is_failed());

        assert_eq!(ordered.lock().len(), 2);
        let written = std::fs::read_to_string(&path).unwrap();
        let texts: Vec<_> = written.lines().map(|l| l.rsplit(' ').next().unwrap()).collect();
        assert_eq!(texts, vec!["a-one", "b-one"]);
    }

    #[test]
    fn test_malformed_record_fails_the_round() {
        let dir = tempfile::tempdir().unwrap();
        let own = Arc::new(Mutex::new(NodeLog::create(dir.path().join("a.log")).unwrap()));
        let path = dir.path().join("ordered.log");
        let ordered = Arc::new(Mutex::new(OrderedLog::new(&path, LogOrdering::Clock)));

        let mut collector = LogCollector::leader(PeerId::new("A"), own, Arc::clone(&ordered));
        let failure = collector.failure();
        collector.process(vec![
            "garbage".into(),
            "5 /VC:2;own:B;A,1;B,1;/ b-one".into(),
            "also garbage".into(),
        ]);
        collector.complete();

        assert_eq!(ordered.lock().len(), 1);
        assert!(failure.is_failed());
        let error = failure.take().unwrap();
        assert_matches!(&error, LogError::Malformed { record, .. } if record == "garbage");
        assert_eq!(error.code(), 401);
        assert!(failure.take().is_none());
    }

    #[test]
    fn test_unreadable_own_log_fails_the_round() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("b.log");
        let own = Arc::new(Mutex::new(NodeLog::create(&log_path).unwrap()));
        std::fs::remove_file(&log_path).unwrap();

        let mut collector = LogCollector::peer(PeerId::new("B"), own);
        collector.process(vec!["1 /VC:1;own:C;C,1;/ c-one".into()]);
        assert_eq!(collector.create().len(), 1);
        assert_matches!(collector.failure().take(), Some(LogError::Io { .. }));
    }
}
