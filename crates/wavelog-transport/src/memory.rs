//! In-memory peer network
//!
//! Every registered peer owns an unbounded tokio channel of [`PeerEvent`]s.
//! Sends push onto the destination's channel without blocking, so messages
//! from one sender arrive in send order. Group membership is shared state;
//! joins, leaves and departures are announced to every other peer.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wavelog_core::{
    GroupName, PeerEvent, PeerId, PeerTransport, TransportError, TransportResult, WireMessage,
};

struct PeerSlot {
    inbox: mpsc::UnboundedSender<PeerEvent>,
    groups: BTreeSet<GroupName>,
}

#[derive(Default)]
struct NetworkState {
    peers: BTreeMap<PeerId, PeerSlot>,
}

impl NetworkState {
    fn announce(&self, from: &PeerId, event: &PeerEvent) {
        for (peer, slot) in &self.peers {
            if peer != from {
                // Closed inboxes belong to stopped nodes.
                let _ = slot.inbox.send(event.clone());
            }
        }
    }
}

/// Shared in-process network; clones refer to the same peers.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<RwLock<NetworkState>>,
}

impl MemoryNetwork {
    /// Empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `peer` and return its transport and event stream.
    ///
    /// The new peer is told about every existing peer and group, and every
    /// existing peer is told about the new one. Registering an id twice
    /// replaces the earlier registration.
    pub fn register(&self, peer: impl Into<PeerId>) -> (MemoryTransport, PeerEvents) {
        let peer = peer.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.state.write();
        for (other, slot) in &state.peers {
            if *other == peer {
                continue;
            }
            let _ = tx.send(PeerEvent::Enter {
                peer: other.clone(),
            });
            for group in &slot.groups {
                let _ = tx.send(PeerEvent::Join {
                    peer: other.clone(),
                    group: group.clone(),
                });
            }
        }

        let replaced = state.peers.insert(
            peer.clone(),
            PeerSlot {
                inbox: tx,
                groups: BTreeSet::new(),
            },
        );
        if replaced.is_some() {
            warn!(peer = %peer, "peer registered twice, earlier registration replaced");
        } else {
            state.announce(&peer, &PeerEvent::Enter { peer: peer.clone() });
        }
        debug!(peer = %peer, peers = state.peers.len(), "peer registered");

        (
            MemoryTransport {
                me: peer,
                state: Arc::clone(&self.state),
            },
            PeerEvents { rx },
        )
    }

    /// Every registered peer
    pub fn peers(&self) -> Vec<PeerId> {
        self.state.read().peers.keys().cloned().collect()
    }
}

/// Event stream of one registered peer
#[derive(Debug)]
pub struct PeerEvents {
    rx: mpsc::UnboundedReceiver<PeerEvent>,
}

impl PeerEvents {
    /// Next event; `None` once the peer is unregistered
    pub async fn recv(&mut self) -> Option<PeerEvent> {
        self.rx.recv().await
    }

    /// Next event if one is queued
    pub fn try_recv(&mut self) -> Option<PeerEvent> {
        self.rx.try_recv().ok()
    }
}

/// One peer's handle on a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransport {
    me: PeerId,
    state: Arc<RwLock<NetworkState>>,
}

impl MemoryTransport {
    /// Join `group`, announcing it to the other peers
    pub fn join(&self, group: impl Into<GroupName>) {
        let group = group.into();
        let mut state = self.state.write();
        let joined = state
            .peers
            .get_mut(&self.me)
            .is_some_and(|slot| slot.groups.insert(group.clone()));
        if joined {
            state.announce(
                &self.me,
                &PeerEvent::Join {
                    peer: self.me.clone(),
                    group: group.clone(),
                },
            );
            debug!(peer = %self.me, group = %group, "joined group");
        }
    }

    /// Leave `group`, announcing it to the other peers
    pub fn leave(&self, group: &GroupName) {
        let mut state = self.state.write();
        let left = state
            .peers
            .get_mut(&self.me)
            .is_some_and(|slot| slot.groups.remove(group));
        if left {
            state.announce(
                &self.me,
                &PeerEvent::Leave {
                    peer: self.me.clone(),
                    group: group.clone(),
                },
            );
            debug!(peer = %self.me, group = %group, "left group");
        }
    }

    /// Leave every group
    pub fn leave_all(&self) {
        for group in self.own_groups() {
            self.leave(&group);
        }
    }

    /// Detach from the network. Other peers see an `Exit`; this peer's event
    /// stream ends.
    pub fn unregister(&self) {
        self.leave_all();
        let mut state = self.state.write();
        if state.peers.remove(&self.me).is_some() {
            state.announce(&self.me, &PeerEvent::Exit { peer: self.me.clone() });
            debug!(peer = %self.me, "peer unregistered");
        }
    }
}

impl PeerTransport for MemoryTransport {
    fn local_peer(&self) -> &PeerId {
        &self.me
    }

    fn own_groups(&self) -> Vec<GroupName> {
        self.state
            .read()
            .peers
            .get(&self.me)
            .map(|slot| slot.groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn peers_by_group(&self, group: &GroupName) -> Vec<PeerId> {
        self.state
            .read()
            .peers
            .iter()
            .filter(|(peer, slot)| **peer != self.me && slot.groups.contains(group))
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    fn peers(&self) -> Vec<PeerId> {
        self.state
            .read()
            .peers
            .keys()
            .filter(|peer| **peer != self.me)
            .cloned()
            .collect()
    }

    fn send(&self, peer: &PeerId, message: WireMessage) -> TransportResult<()> {
        let state = self.state.read();
        let slot = state
            .peers
            .get(peer)
            .ok_or_else(|| TransportError::PeerUnreachable(peer.clone()))?;
        slot.inbox
            .send(PeerEvent::Whisper {
                peer: self.me.clone(),
                message,
            })
            .map_err(|_| TransportError::Disconnected(format!("inbox of {peer} closed")))
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavelog_core::neighbors;

    #[tokio::test]
    async fn test_whisper_roundtrip() {
        let network = MemoryNetwork::new();
        let (a, _a_events) = network.register("A");
        let (_b, mut b_events) = network.register("B");

        a.send(&PeerId::new("B"), WireMessage::from_frames(["hello"]))
            .unwrap();
        loop {
            match b_events.recv().await.unwrap() {
                PeerEvent::Whisper { peer, message } => {
                    assert_eq!(peer.as_str(), "A");
                    assert_eq!(message.front(), Some("hello"));
                    break;
                }
                PeerEvent::Enter { .. } => continue,
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let network = MemoryNetwork::new();
        let (a, _events) = network.register("A");
        let err = a.send(&PeerId::new("Z"), WireMessage::new()).unwrap_err();
        assert_eq!(err, TransportError::PeerUnreachable(PeerId::new("Z")));
    }

    #[tokio::test]
    async fn test_groups_and_announcements() {
        let network = MemoryNetwork::new();
        let (a, mut a_events) = network.register("A");
        let (b, _b_events) = network.register("B");
        let (c, _c_events) = network.register("C");

        a.join("GLOBAL");
        b.join("GLOBAL");
        b.join("LOCAL");
        c.join("LOCAL");

        assert_eq!(neighbors(&a), vec![PeerId::new("B")]);
        assert_eq!(neighbors(&b), vec![PeerId::new("A"), PeerId::new("C")]);
        assert_eq!(neighbors(&c), vec![PeerId::new("B")]);

        b.leave_all();
        assert!(neighbors(&a).is_empty());
        assert!(b.own_groups().is_empty());

        let mut seen = Vec::new();
        while let Some(event) = a_events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&PeerEvent::Enter { peer: PeerId::new("B") }));
        assert!(seen.contains(&PeerEvent::Join {
            peer: PeerId::new("B"),
            group: GroupName::new("GLOBAL")
        }));
        assert!(seen.contains(&PeerEvent::Leave {
            peer: PeerId::new("B"),
            group: GroupName::new("LOCAL")
        }));
    }

    #[tokio::test]
    async fn test_late_peer_learns_existing_groups() {
        let network = MemoryNetwork::new();
        let (a, _a_events) = network.register("A");
        a.join("GLOBAL");
        let (_b, mut b_events) = network.register("B");

        assert_eq!(b_events.try_recv(), Some(PeerEvent::Enter { peer: PeerId::new("A") }));
        assert_eq!(
            b_events.try_recv(),
            Some(PeerEvent::Join {
                peer: PeerId::new("A"),
                group: GroupName::new("GLOBAL")
            })
        );
    }

    #[tokio::test]
    async fn test_unregister_ends_stream() {
        let network = MemoryNetwork::new();
        let (a, mut a_events) = network.register("A");
        let (b, _b_events) = network.register("B");
        b.unregister();
        assert_eq!(network.peers(), vec![PeerId::new("A")]);
        assert!(a.send(&PeerId::new("B"), WireMessage::new()).is_err());

        let mut exit_seen = false;
        while let Some(event) = a_events.try_recv() {
            exit_seen |= event == PeerEvent::Exit { peer: PeerId::new("B") };
        }
        assert!(exit_seen);

        a.unregister();
        assert_eq!(a_events.recv().await, None);
    }
}
