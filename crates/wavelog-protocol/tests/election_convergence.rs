//! Election Convergence Tests
//!
//! Runs the election on simulated networks and checks that:
//!
//! 1. **Agreement**: every node finishes with the same leader
//! 2. **Uniqueness**: exactly one node reports `won == Some(true)`
//! 3. **Minimality**: the leader is the smallest initiator id

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use wavelog_core::{Courier, PeerId, Progress, VectorClock};
use wavelog_protocol::Election;
use wavelog_testkit::{peer_ids, SimNetwork, SimTransport, Topology};

struct Cluster {
    net: SimNetwork,
    transports: BTreeMap<PeerId, SimTransport>,
    elections: BTreeMap<PeerId, Election>,
    finished: BTreeMap<PeerId, usize>,
}

impl Cluster {
    fn new(topology: Topology, seed: u64) -> Self {
        let peers: Vec<PeerId> = topology.peers().cloned().collect();
        let net = SimNetwork::with_topology(topology, seed);
        let transports = peers
            .iter()
            .map(|p| (p.clone(), net.transport(p.clone())))
            .collect();
        let elections = peers
            .iter()
            .map(|p| (p.clone(), Election::new(p.clone())))
            .collect();
        Self {
            net,
            transports,
            elections,
            finished: BTreeMap::new(),
        }
    }

    fn start(&mut self, peer: &PeerId) {
        let transport = &self.transports[peer];
        let election = self.elections.get_mut(peer).unwrap();
        let was_finished = election.finished();
        let progress = election.start(&mut Courier::new(transport)).unwrap();
        if progress == Progress::Finished && !was_finished {
            *self.finished.entry(peer.clone()).or_default() += 1;
        }
    }

    fn step(&mut self) -> bool {
        let Some(env) = self.net.deliver_next() else {
            return false;
        };
        let transport = &self.transports[&env.to];
        let election = self.elections.get_mut(&env.to).unwrap();
        let progress = election
            .handle(&mut Courier::new(transport), &env.from, env.message)
            .unwrap();
        if progress == Progress::Finished {
            *self.finished.entry(env.to.clone()).or_default() += 1;
        }
        true
    }

    fn run(&mut self) {
        while self.step() {}
    }

    fn assert_single_leader(&self, expected: &PeerId) {
        let mut winners = 0;
        for (peer, election) in &self.elections {
            assert!(election.finished(), "{peer} did not finish");
            assert_eq!(election.leader(), Some(expected), "{peer} disagrees");
            assert_eq!(self.finished.get(peer), Some(&1), "{peer} finished twice");
            if election.won() == Some(true) {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

#[test]
fn three_nodes_started_together_elect_smallest() {
    let mut cluster = Cluster::new(Topology::single_group(["A", "B", "C"], "GLOBAL"), 11);
    for id in ["C", "A", "B"] {
        cluster.start(&PeerId::new(id));
    }
    cluster.run();

    cluster.assert_single_leader(&PeerId::new("A"));
    assert_eq!(cluster.elections[&PeerId::new("A")].won(), Some(true));
    assert_eq!(cluster.elections[&PeerId::new("B")].won(), Some(false));
    assert_eq!(cluster.elections[&PeerId::new("C")].won(), Some(false));
}

#[test]
fn single_initiator_on_a_line_wins() {
    let ids = peer_ids("N", 6);
    let mut cluster = Cluster::new(Topology::line(&ids), 5);
    cluster.start(&ids[4]);
    cluster.run();
    cluster.assert_single_leader(&ids[4]);
}

#[test]
fn overlapping_groups_count_duplicate_neighbors() {
    let mut topology = Topology::new();
    for (peer, group) in [("A", "G1"), ("B", "G1"), ("B", "G2"), ("C", "G2"), ("A", "G2")] {
        topology.join(peer, group);
    }
    let mut cluster = Cluster::new(topology, 9);
    for id in ["A", "B", "C"] {
        cluster.start(&PeerId::new(id));
    }
    cluster.run();
    cluster.assert_single_leader(&PeerId::new("A"));
}

#[test]
fn clocked_election_advances_every_clock() {
    let ids = peer_ids("P", 4);
    let topology = Topology::ring(&ids);
    let net = SimNetwork::with_topology(topology, 3);
    let transports: BTreeMap<_, _> = ids.iter().map(|p| (p.clone(), net.transport(p.clone()))).collect();
    let mut clocks: BTreeMap<_, _> = ids.iter().map(|p| (p.clone(), VectorClock::new(p.clone()))).collect();
    let mut elections: BTreeMap<_, _> = ids.iter().map(|p| (p.clone(), Election::new(p.clone()))).collect();

    for id in &ids {
        let mut courier = Courier::with_clock(&transports[id], clocks.get_mut(id).unwrap());
        elections.get_mut(id).unwrap().start(&mut courier).unwrap();
    }
    net.drain(|env| {
        assert!(env.message.has_clock_frame());
        let mut courier = Courier::with_clock(&transports[&env.to], clocks.get_mut(&env.to).unwrap());
        elections
            .get_mut(&env.to)
            .unwrap()
            .handle(&mut courier, &env.from, env.message)
            .unwrap();
    });

    for id in &ids {
        assert_eq!(elections[id].leader(), Some(&ids[0]));
        let clock = &clocks[id];
        for other in &ids {
            assert!(clock.get(other.as_str()) > 0, "{id} never heard of {other}");
        }
    }
}

fn topology_strategy() -> impl Strategy<Value = (Vec<PeerId>, u64, usize)> {
    (2usize..9, any::<u64>(), 0usize..6).prop_map(|(n, seed, extra)| (peer_ids("Q", n), seed, extra))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn converges_on_random_topologies(
        (ids, seed, extra) in topology_strategy(),
        initiator_mask in prop::collection::vec(any::<bool>(), 9),
        start_delays in prop::collection::vec(0usize..30, 9),
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let topology = Topology::random_connected(&ids, extra, &mut rng);
        let mut cluster = Cluster::new(topology, seed);

        let mut initiators: Vec<(usize, PeerId)> = ids
            .iter()
            .enumerate()
            .filter(|(i, _)| initiator_mask[*i])
            .map(|(i, id)| (start_delays[i], id.clone()))
            .collect();
        if initiators.is_empty() {
            initiators.push((0, ids[ids.len() - 1].clone()));
        }
        initiators.sort();

        let mut tick = 0;
        let mut pending = initiators.clone();
        loop {
            while pending.first().is_some_and(|(delay, _)| *delay <= tick) {
                let (_, id) = pending.remove(0);
                cluster.start(&id);
            }
            if !cluster.step() {
                if pending.is_empty() {
                    break;
                }
                tick = pending[0].0;
                continue;
            }
            tick += 1;
        }

        let leader = cluster.elections.values().next().and_then(|e| e.leader()).cloned().unwrap();
        cluster.assert_single_leader(&leader);

        // The winner initiated, and no smaller initiator whose wave started
        // before anyone answered can have lost.
        prop_assert!(initiators.iter().any(|(_, id)| *id == leader));
        let smallest = initiators.iter().map(|(_, id)| id).min().unwrap();
        if initiators.iter().all(|(delay, _)| *delay == 0) {
            prop_assert_eq!(&leader, smallest);
        }
    }
}
