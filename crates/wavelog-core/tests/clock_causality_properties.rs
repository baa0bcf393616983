//! Vector Clock Causality Property Tests
//!
//! Drives a handful of processes through random send/receive schedules and
//! checks that the clocks capture happened-before:
//!
//! 1. **Send before receive**: the clock attached to a message is before the
//!    receiver's clock right after the receive
//! 2. **Local order**: successive snapshots of one process are ordered
//! 3. **Isolation**: processes that never communicated are concurrent once
//!    both ticked

use proptest::prelude::*;
use wavelog_core::{CausalOrdering, VectorClock, WireMessage};

#[derive(Debug, Clone)]
enum Step {
    Local(usize),
    Message { from: usize, to: usize },
}

fn step_strategy(processes: usize) -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..processes).prop_map(Step::Local),
        (0..processes, 0..processes)
            .prop_filter("distinct endpoints", |(a, b)| a != b)
            .prop_map(|(from, to)| Step::Message { from, to }),
    ]
}

fn processes(n: usize) -> Vec<VectorClock> {
    (0..n).map(|i| VectorClock::new(format!("P{i}"))).collect()
}

proptest! {
    #[test]
    fn send_happens_before_receive(steps in prop::collection::vec(step_strategy(4), 1..60)) {
        let mut clocks = processes(4);
        for step in steps {
            match step {
                Step::Local(p) => clocks[p].event(),
                Step::Message { from, to } => {
                    let mut msg = clocks[from].prepare_for_send(WireMessage::from_frames(["m"]));
                    let stamp = VectorClock::from_string(msg.front().unwrap()).unwrap();
                    clocks[to].receive(&mut msg).unwrap();
                    prop_assert_eq!(stamp.compare(&clocks[to]), CausalOrdering::Before);
                    prop_assert_eq!(msg.into_frames(), vec!["m".to_string()]);
                }
            }
        }
    }

    #[test]
    fn local_snapshots_are_ordered(steps in prop::collection::vec(step_strategy(3), 1..60)) {
        let mut clocks = processes(3);
        let mut history: Vec<Vec<VectorClock>> = vec![Vec::new(); 3];
        for step in steps {
            let touched = match step {
                Step::Local(p) => {
                    clocks[p].event();
                    p
                }
                Step::Message { from, to } => {
                    let mut msg = clocks[from].prepare_for_send(WireMessage::new());
                    history[from].push(clocks[from].clone());
                    clocks[to].receive(&mut msg).unwrap();
                    to
                }
            };
            history[touched].push(clocks[touched].clone());
        }
        for snapshots in &history {
            for pair in snapshots.windows(2) {
                prop_assert_eq!(pair[0].compare(&pair[1]), CausalOrdering::Before);
            }
        }
    }
}

#[test]
fn isolated_processes_are_concurrent() {
    let mut a = VectorClock::new("A");
    let mut b = VectorClock::new("B");
    a.event();
    b.event();
    assert_eq!(a.compare(&b), CausalOrdering::Concurrent);

    let mut msg = a.prepare_for_send(WireMessage::new());
    b.receive(&mut msg).unwrap();
    assert_eq!(a.compare(&b), CausalOrdering::Before);
    assert_eq!(b.compare(&a), CausalOrdering::After);
}

#[test]
fn time_space_dump_lists_every_event() {
    let mut a = VectorClock::new("A");
    a.enable_trace();
    a.event();
    a.event();
    let mut msg = WireMessage::from_frames(["VC:1;own:B;B,1;"]);
    a.receive(&mut msg).unwrap();

    let mut out = Vec::new();
    a.dump_time_space(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.starts_with("subgraph c_A {"));
    assert!(text.contains("\"VC:1;own:A;A,1;\" -> \"VC:1;own:A;A,2;\" -> \"VC:1;own:A;A,3;\";"));
    assert!(text.contains("\"VC:1;own:B;B,1;\" -> \"VC:1;own:A;A,3;\";"));
}
