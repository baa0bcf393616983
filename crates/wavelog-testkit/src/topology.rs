//! Topology builders
//!
//! Group membership defines the neighbor graph: two peers are neighbors for
//! every group they share. A full mesh is one group; sparse graphs use one
//! group per edge, named `<a>~<b>`.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use wavelog_core::{GroupName, PeerId};

/// Peer to group assignment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    memberships: BTreeMap<PeerId, BTreeSet<GroupName>>,
}

impl Topology {
    /// Empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer without any group
    pub fn add_peer(&mut self, peer: impl Into<PeerId>) -> &mut Self {
        self.memberships.entry(peer.into()).or_default();
        self
    }

    /// Put `peer` into `group`
    pub fn join(&mut self, peer: impl Into<PeerId>, group: impl Into<GroupName>) -> &mut Self {
        self.memberships
            .entry(peer.into())
            .or_default()
            .insert(group.into());
        self
    }

    /// Connect two peers through a dedicated edge group
    pub fn connect(&mut self, a: &PeerId, b: &PeerId) -> &mut Self {
        let group = GroupName::new(format!("{a}~{b}"));
        self.join(a.clone(), group.clone());
        self.join(b.clone(), group);
        self
    }

    /// Every peer in one group
    pub fn single_group<I, P>(peers: I, group: &str) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PeerId>,
    {
        let mut topology = Self::new();
        for peer in peers {
            topology.join(peer, group);
        }
        topology
    }

    /// `p0 - p1 - ... - pn`
    pub fn line(peers: &[PeerId]) -> Self {
        let mut topology = Self::new();
        for peer in peers {
            topology.add_peer(peer.clone());
        }
        for pair in peers.windows(2) {
            topology.connect(&pair[0], &pair[1]);
        }
        topology
    }

    /// Line closed back onto its first peer. Needs at least three peers to
    /// differ from a line.
    pub fn ring(peers: &[PeerId]) -> Self {
        let mut topology = Self::line(peers);
        if peers.len() > 2 {
            topology.connect(&peers[peers.len() - 1], &peers[0]);
        }
        topology
    }

    /// `center` connected to every leaf
    pub fn star(center: &PeerId, leaves: &[PeerId]) -> Self {
        let mut topology = Self::new();
        topology.add_peer(center.clone());
        for leaf in leaves {
            topology.connect(center, leaf);
        }
        topology
    }

    /// Random spanning tree plus up to `extra_edges` additional edges.
    pub fn random_connected<R: Rng>(peers: &[PeerId], extra_edges: usize, rng: &mut R) -> Self {
        let mut topology = Self::new();
        let mut order = peers.to_vec();
        order.shuffle(rng);

        let mut edges = BTreeSet::new();
        for idx in 1..order.len() {
            let parent = &order[rng.gen_range(0..idx)];
            edges.insert(edge(parent, &order[idx]));
        }
        if order.len() > 2 {
            for _ in 0..extra_edges {
                let a = rng.gen_range(0..order.len());
                let b = rng.gen_range(0..order.len());
                if a != b {
                    edges.insert(edge(&order[a], &order[b]));
                }
            }
        }

        for peer in peers {
            topology.add_peer(peer.clone());
        }
        for (a, b) in &edges {
            topology.connect(a, b);
        }
        topology
    }

    /// Peers in ascending id order
    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.memberships.keys()
    }

    /// Groups of `peer`
    pub fn groups_of(&self, peer: &PeerId) -> impl Iterator<Item = &GroupName> {
        self.memberships.get(peer).into_iter().flatten()
    }

    pub(crate) fn into_memberships(self) -> BTreeMap<PeerId, BTreeSet<GroupName>> {
        self.memberships
    }
}

fn edge(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Ids `prefix0 .. prefix{n-1}`, zero-padded so lexicographic order matches
/// numeric order.
pub fn peer_ids(prefix: &str, n: usize) -> Vec<PeerId> {
    let width = n.saturating_sub(1).to_string().len();
    (0..n)
        .map(|i| PeerId::new(format!("{prefix}{i:0width$}")))
        .collect()
}
