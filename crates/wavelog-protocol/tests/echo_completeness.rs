//! Echo Wave Completeness Tests
//!
//! For a connected topology and one initiator:
//!
//! - every node joins the wave exactly once and finishes exactly once
//! - every non-initiator sends exactly one COLLECT, to its father
//! - the initiator receives exactly `neighbor_count` wave messages
//! - COLLECT payloads from every node reach the initiator's handler

use parking_lot::Mutex;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use wavelog_core::{neighbor_count, Courier, PeerId, Progress, ECHO_TAG};
use wavelog_protocol::{EchoWave, Father, WavePayloadHandler};
use wavelog_testkit::{peer_ids, SimNetwork, SimTransport, Topology};

/// Collect handler gathering node names up the tree.
struct NameGatherer {
    me: PeerId,
    gathered: Vec<String>,
    result: Arc<Mutex<Option<BTreeSet<String>>>>,
}

impl WavePayloadHandler for NameGatherer {
    fn create(&mut self) -> Vec<String> {
        let mut names = std::mem::take(&mut self.gathered);
        names.push(self.me.to_string());
        names
    }

    fn process(&mut self, payload: Vec<String>) {
        self.gathered.extend(payload);
    }

    fn complete(&mut self) {
        let mut names: BTreeSet<String> = self.gathered.drain(..).collect();
        names.insert(self.me.to_string());
        *self.result.lock() = Some(names);
    }
}

struct WaveRun {
    waves: BTreeMap<PeerId, EchoWave>,
    finished: BTreeMap<PeerId, usize>,
    net: SimNetwork,
    transports: BTreeMap<PeerId, SimTransport>,
    result: Arc<Mutex<Option<BTreeSet<String>>>>,
}

fn run_wave(topology: Topology, initiator: &PeerId, seed: u64) -> WaveRun {
    let peers: Vec<PeerId> = topology.peers().cloned().collect();
    let net = SimNetwork::with_topology(topology, seed);
    let result = Arc::new(Mutex::new(None));
    let transports: BTreeMap<_, _> = peers
        .iter()
        .map(|p| (p.clone(), net.transport(p.clone())))
        .collect();
    let mut waves: BTreeMap<_, _> = peers
        .iter()
        .map(|p| {
            let gatherer = NameGatherer {
                me: p.clone(),
                gathered: Vec::new(),
                result: Arc::clone(&result),
            };
            (p.clone(), EchoWave::new(p.clone()).with_collect_handler(Box::new(gatherer)))
        })
        .collect();
    let mut finished = BTreeMap::new();

    let init = waves
        .get_mut(initiator)
        .unwrap()
        .init(&mut Courier::new(&transports[initiator]))
        .unwrap();
    if init == Progress::Finished {
        finished.insert(initiator.clone(), 1);
    }

    net.drain(|env| {
        let progress = waves
            .get_mut(&env.to)
            .unwrap()
            .handle(&mut Courier::new(&transports[&env.to]), &env.from, env.message)
            .unwrap();
        if progress == Progress::Finished {
            *finished.entry(env.to.clone()).or_default() += 1;
        }
    });

    WaveRun {
        waves,
        finished,
        net,
        transports,
        result,
    }
}

fn assert_complete(run: &WaveRun, initiator: &PeerId) {
    let history = run.net.history();
    for (peer, wave) in &run.waves {
        assert!(wave.is_finished(), "{peer} never finished");
        assert_eq!(run.finished.get(peer), Some(&1));
        assert_eq!(wave.wave_id(), Some(initiator.as_str()));
        assert_eq!(wave.received(), neighbor_count(&run.transports[peer]));

        let collects: Vec<_> = history
            .iter()
            .filter(|env| env.from == *peer && env.message.iter().nth(2) == Some("COLLECT"))
            .collect();
        if peer == initiator {
            assert!(wave.is_initiator());
            assert!(collects.is_empty());
        } else {
            assert_eq!(collects.len(), 1, "{peer} sent {} COLLECTs", collects.len());
            assert_eq!(wave.father(), Some(&Father::Peer(collects[0].to.clone())));
        }
    }
    assert!(history.iter().all(|env| env.message.front() == Some(ECHO_TAG)));

    let names = run.result.lock().clone().expect("initiator decided");
    let expected: BTreeSet<String> = run.waves.keys().map(ToString::to_string).collect();
    assert_eq!(names, expected);
}

#[test]
fn wave_on_a_line() {
    let ids = peer_ids("L", 5);
    let run = run_wave(Topology::line(&ids), &ids[0], 1);
    assert_complete(&run, &ids[0]);
    assert_eq!(run.waves[&ids[0]].received(), 1);
}

#[test]
fn wave_on_a_line_from_the_middle() {
    let ids = peer_ids("L", 5);
    let run = run_wave(Topology::line(&ids), &ids[2], 2);
    assert_complete(&run, &ids[2]);
    assert_eq!(run.waves[&ids[2]].received(), 2);
}

#[test]
fn wave_on_a_ring() {
    let ids = peer_ids("R", 6);
    let run = run_wave(Topology::ring(&ids), &ids[3], 3);
    assert_complete(&run, &ids[3]);
}

#[test]
fn wave_on_a_mesh_with_two_groups() {
    let mut topology = Topology::new();
    topology.join("node1", "GLOBAL");
    topology.join("node2", "GLOBAL");
    topology.join("node2", "LOCAL");
    topology.join("node3", "LOCAL");
    let run = run_wave(topology, &PeerId::new("node1"), 4);
    assert_complete(&run, &PeerId::new("node1"));
    assert_eq!(
        run.waves[&PeerId::new("node3")].father(),
        Some(&Father::Peer(PeerId::new("node2")))
    );
}

#[test]
fn wave_between_peers_sharing_two_groups() {
    let (a, b, c) = (PeerId::new("A"), PeerId::new("B"), PeerId::new("C"));
    let mut topology = Topology::new();
    topology.join(a.clone(), "G1").join(b.clone(), "G1");
    topology.join(a.clone(), "G2").join(b.clone(), "G2").join(c.clone(), "G2");
    let run = run_wave(topology, &a, 5);

    let history = run.net.history();
    for (peer, wave) in &run.waves {
        assert!(wave.is_finished(), "{peer} never finished");
        assert_eq!(run.finished.get(peer), Some(&1));
        assert_eq!(wave.received(), neighbor_count(&run.transports[peer]));
        if let Some(Father::Peer(father)) = wave.father() {
            let links = Courier::new(&run.transports[peer]).links_to(father);
            let collects = history
                .iter()
                .filter(|env| env.from == *peer && env.message.iter().nth(2) == Some("COLLECT"))
                .filter(|env| env.to == *father)
                .count();
            assert_eq!(collects, links, "{peer} answered {father} {collects} times");
        }
    }
    assert_eq!(run.waves[&a].received(), 3);

    let names = run.result.lock().clone().expect("initiator decided");
    assert_eq!(names, BTreeSet::from(["A".to_string(), "B".to_string(), "C".to_string()]));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn wave_completes_on_random_topologies(
        n in 1usize..10,
        extra in 0usize..8,
        seed in any::<u64>(),
        pick in any::<prop::sample::Index>(),
    ) {
        let ids = peer_ids("W", n);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let topology = Topology::random_connected(&ids, extra, &mut rng);
        let initiator = ids[pick.index(n)].clone();
        let run = run_wave(topology, &initiator, seed);
        assert_complete(&run, &initiator);
    }
}
