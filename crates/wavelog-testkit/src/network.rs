//! Simulated peer network
//!
//! [`SimNetwork`] keeps one FIFO queue per (sender, receiver) pair. Each call
//! to [`SimNetwork::deliver_next`] picks a non-empty queue with a seeded
//! ChaCha RNG and pops its head, so runs are reproducible from the seed while
//! still interleaving senders arbitrarily.

use crate::topology::Topology;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use wavelog_core::{
    GroupName, PeerId, PeerTransport, TransportError, TransportResult, WireMessage,
};

/// A message in flight or delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender
    pub from: PeerId,
    /// Receiver
    pub to: PeerId,
    /// Frames as sent
    pub message: WireMessage,
}

struct SimState {
    memberships: BTreeMap<PeerId, BTreeSet<GroupName>>,
    channels: BTreeMap<(PeerId, PeerId), VecDeque<WireMessage>>,
    history: Vec<Envelope>,
    rng: ChaCha8Rng,
}

/// Shared simulated network; clones see the same state.
#[derive(Clone)]
pub struct SimNetwork {
    state: Arc<Mutex<SimState>>,
}

impl SimNetwork {
    /// Empty network scheduled by `seed`
    pub fn new(seed: u64) -> Self {
        Self::with_topology(Topology::new(), seed)
    }

    /// Network whose membership is `topology`
    pub fn with_topology(topology: Topology, seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                memberships: topology.into_memberships(),
                channels: BTreeMap::new(),
                history: Vec::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Transport handle for `peer`, registering it if needed
    pub fn transport(&self, peer: impl Into<PeerId>) -> SimTransport {
        let peer = peer.into();
        self.state.lock().memberships.entry(peer.clone()).or_default();
        SimTransport {
            me: peer,
            state: Arc::clone(&self.state),
        }
    }

    /// Put `peer` into `group`
    pub fn join(&self, peer: &PeerId, group: impl Into<GroupName>) {
        self.state
            .lock()
            .memberships
            .entry(peer.clone())
            .or_default()
            .insert(group.into());
    }

    /// Remove `peer` from `group`
    pub fn leave(&self, peer: &PeerId, group: &GroupName) {
        if let Some(groups) = self.state.lock().memberships.get_mut(peer) {
            groups.remove(group);
        }
    }

    /// Pop one message from a randomly chosen non-empty channel.
    pub fn deliver_next(&self) -> Option<Envelope> {
        let mut state = self.state.lock();
        let busy: Vec<(PeerId, PeerId)> = state
            .channels
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        if busy.is_empty() {
            return None;
        }

        let pick = state.rng.gen_range(0..busy.len());
        let key = busy[pick].clone();
        let message = state.channels.get_mut(&key)?.pop_front()?;
        if state.channels.get(&key).is_some_and(VecDeque::is_empty) {
            state.channels.remove(&key);
        }

        let (from, to) = key;
        tracing::trace!(from = %from, to = %to, message = %message, "sim deliver");
        Some(Envelope { from, to, message })
    }

    /// Deliver until every channel is empty, passing each message to
    /// `handle`. Returns the number of deliveries.
    pub fn drain<F: FnMut(Envelope)>(&self, mut handle: F) -> usize {
        let mut delivered = 0;
        while let Some(envelope) = self.deliver_next() {
            handle(envelope);
            delivered += 1;
        }
        delivered
    }

    /// Messages still queued
    pub fn pending(&self) -> usize {
        self.state.lock().channels.values().map(VecDeque::len).sum()
    }

    /// Every message ever sent, in send order
    pub fn history(&self) -> Vec<Envelope> {
        self.state.lock().history.clone()
    }
}

/// One peer's view of a [`SimNetwork`]
#[derive(Clone)]
pub struct SimTransport {
    me: PeerId,
    state: Arc<Mutex<SimState>>,
}

impl PeerTransport for SimTransport {
    fn local_peer(&self) -> &PeerId {
        &self.me
    }

    fn own_groups(&self) -> Vec<GroupName> {
        self.state
            .lock()
            .memberships
            .get(&self.me)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn peers_by_group(&self, group: &GroupName) -> Vec<PeerId> {
        self.state
            .lock()
            .memberships
            .iter()
            .filter(|(peer, groups)| **peer != self.me && groups.contains(group))
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    fn peers(&self) -> Vec<PeerId> {
        self.state
            .lock()
            .memberships
            .keys()
            .filter(|peer| **peer != self.me)
            .cloned()
            .collect()
    }

    fn send(&self, peer: &PeerId, message: WireMessage) -> TransportResult<()> {
        let mut state = self.state.lock();
        if !state.memberships.contains_key(peer) {
            return Err(TransportError::PeerUnreachable(peer.clone()));
        }
        state.history.push(Envelope {
            from: self.me.clone(),
            to: peer.clone(),
            message: message.clone(),
        });
        state
            .channels
            .entry((self.me.clone(), peer.clone()))
            .or_default()
            .push_back(message);
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "sim"
    }
}
