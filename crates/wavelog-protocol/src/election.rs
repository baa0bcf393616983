//! Leader election by wave extinction
//!
//! Every initiator floods an ELECTION wave tagged with its own id. A node
//! follows the smallest wave id it has seen (`caw`, the current active wave),
//! dropping larger waves and restarting its counters when a smaller one
//! arrives. Once a node has received the wave from every neighbor it echoes
//! the wave back to its father; the root of the only wave that completes
//! floods LEADER. Each node forwards LEADER once, and the election finishes
//! when LEADER arrived from every neighbor.
//!
//! ```text
//! ["ZLE", "ELECTION", <wave-id>]
//! ["ZLE", "LEADER", <leader-id>]
//! ```
//!
//! A peer leaving mid-election stalls it; there is no timeout.

use crate::step;
use std::fmt;
use wavelog_core::{
    Courier, PeerId, Progress, ProtocolError, ProtocolResult, WireMessage, ELECTION_TAG,
};

const ELECTION: &str = "ELECTION";
const LEADER: &str = "LEADER";

enum Vote {
    Election(PeerId),
    Leader(PeerId),
}

fn parse_vote(message: &WireMessage) -> ProtocolResult<Vote> {
    let mut frames = message.iter().skip(usize::from(message.has_clock_frame()));
    if frames.next() != Some(ELECTION_TAG) {
        return Err(ProtocolError::malformed(format!(
            "expected {ELECTION_TAG} tag in {message}"
        )));
    }
    let kind = frames.next();
    let id = frames
        .next()
        .filter(|id| !id.is_empty())
        .map(PeerId::new)
        .ok_or_else(|| ProtocolError::malformed(format!("election message without id: {message}")))?;
    match kind {
        Some(ELECTION) => Ok(Vote::Election(id)),
        Some(LEADER) => Ok(Vote::Leader(id)),
        other => Err(ProtocolError::malformed(format!(
            "unknown election message type {other:?}"
        ))),
    }
}

fn election_message(kind: &str, id: &PeerId) -> WireMessage {
    WireMessage::from_frames([ELECTION_TAG, kind, id.as_str()])
}

/// Election state of one node.
#[derive(Debug, Clone)]
pub struct Election {
    me: PeerId,
    caw: Option<PeerId>,
    father: Option<PeerId>,
    erec: usize,
    lrec: usize,
    leader: Option<PeerId>,
    leader_announced: bool,
    answered: bool,
    won: Option<bool>,
    verbose: bool,
}

/// Point-in-time view of an [`Election`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionStatus {
    /// Local node
    pub peer: PeerId,
    /// Current active wave
    pub caw: Option<PeerId>,
    /// Father in the current wave
    pub father: Option<PeerId>,
    /// ELECTION messages counted in the current wave
    pub election_count: usize,
    /// LEADER messages received
    pub leader_count: usize,
    /// Last leader announced to this node
    pub leader: Option<PeerId>,
    /// Outcome, once finished
    pub won: Option<bool>,
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_null(id: &Option<PeerId>) -> &str {
            id.as_ref().map_or("null", PeerId::as_str)
        }
        writeln!(f, "zelection : {{")?;
        writeln!(f, "    caw: {},", or_null(&self.caw))?;
        writeln!(f, "    father: {},", or_null(&self.father))?;
        writeln!(f, "    erec: {},", self.election_count)?;
        writeln!(f, "    lrec: {},", self.leader_count)?;
        writeln!(f, "    leader: {},", or_null(&self.leader))?;
        let state = match self.won {
            Some(true) => "true",
            Some(false) => "false",
            None => "undecided",
        };
        writeln!(f, "    state: {state}")?;
        write!(f, "}}")
    }
}

impl Election {
    /// Election state for node `me`
    pub fn new(me: impl Into<PeerId>) -> Self {
        Self {
            me: me.into(),
            caw: None,
            father: None,
            erec: 0,
            lrec: 0,
            leader: None,
            leader_announced: false,
            answered: false,
            won: None,
            verbose: false,
        }
    }

    /// Log protocol steps at `info` instead of `debug`
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Decided leader, once finished
    pub fn leader(&self) -> Option<&PeerId> {
        if self.finished() {
            self.leader.as_ref()
        } else {
            None
        }
    }

    /// `Some(true)` if this node won, `Some(false)` if it lost, `None` while
    /// undecided
    pub fn won(&self) -> Option<bool> {
        self.won
    }

    /// True once the election finished on this node
    pub fn finished(&self) -> bool {
        self.won.is_some()
    }

    /// Current active wave
    pub fn caw(&self) -> Option<&PeerId> {
        self.caw.as_ref()
    }

    /// Father in the current wave
    pub fn father(&self) -> Option<&PeerId> {
        self.father.as_ref()
    }

    /// ELECTION messages counted in the current wave
    pub fn election_count(&self) -> usize {
        self.erec
    }

    /// LEADER messages received
    pub fn leader_count(&self) -> usize {
        self.lrec
    }

    /// Snapshot of the state
    pub fn status(&self) -> ElectionStatus {
        ElectionStatus {
            peer: self.me.clone(),
            caw: self.caw.clone(),
            father: self.father.clone(),
            election_count: self.erec,
            leader_count: self.lrec,
            leader: self.leader.clone(),
            won: self.won,
        }
    }

    /// Initiate a wave with this node's id.
    ///
    /// Does nothing once finished, while this node already follows a wave
    /// whose id is not larger than its own, or after it answered the wave it
    /// follows. A root may decide as soon as every node answered, so a node
    /// must not open a new wave past that point.
    pub fn start(&mut self, courier: &mut Courier<'_>) -> ProtocolResult<Progress> {
        if self.finished() {
            return Ok(Progress::Finished);
        }
        if self.answered || self.caw.as_ref().is_some_and(|caw| *caw <= self.me) {
            return Ok(Progress::InProgress);
        }

        self.reset_wave(self.me.clone(), None);

        if courier.neighbor_count() == 0 {
            self.leader = Some(self.me.clone());
            return Ok(self.finish());
        }

        let sent = courier.send_to_neighbors(&election_message(ELECTION, &self.me), None)?;
        step!(self.verbose, peer = %self.me, sent, "election started");
        Ok(Progress::InProgress)
    }

    /// Feed one ELECTION or LEADER message from `sender`.
    pub fn handle(
        &mut self,
        courier: &mut Courier<'_>,
        sender: &PeerId,
        mut message: WireMessage,
    ) -> ProtocolResult<Progress> {
        if self.finished() {
            return Err(ProtocolError::ElectionClosed);
        }
        let vote = parse_vote(&message)?;
        courier.accept(&mut message)?;

        match vote {
            Vote::Election(wave) => self.on_election(courier, sender, wave)?,
            Vote::Leader(leader) => self.on_leader(courier, leader)?,
        }

        if self.lrec > 0 && self.lrec == courier.neighbor_count() {
            return Ok(self.finish());
        }
        Ok(Progress::InProgress)
    }

    fn on_election(
        &mut self,
        courier: &mut Courier<'_>,
        sender: &PeerId,
        wave: PeerId,
    ) -> ProtocolResult<()> {
        let adopt = self.caw.as_ref().map_or(true, |caw| wave < *caw);
        if adopt {
            self.reset_wave(wave.clone(), Some(sender.clone()));
            let sent =
                courier.send_to_neighbors(&election_message(ELECTION, &wave), Some(sender))?;
            step!(
                self.verbose,
                peer = %self.me,
                wave = %wave,
                father = %sender,
                sent,
                "election wave adopted"
            );
        }

        if self.caw.as_ref() != Some(&wave) {
            step!(self.verbose, peer = %self.me, wave = %wave, "election wave suppressed");
            return Ok(());
        }

        self.erec += 1;
        if self.erec != courier.neighbor_count() {
            return Ok(());
        }
        self.answered = true;

        if wave == self.me {
            courier.send_to_neighbors(&election_message(LEADER, &wave), None)?;
            self.leader_announced = true;
            step!(self.verbose, peer = %self.me, "leader decision");
        } else if let Some(father) = self.father.clone() {
            // The father counts one echo per group it shares with this node.
            let links = courier.links_to(&father).max(1);
            for _ in 0..links {
                courier.send(&father, election_message(ELECTION, &wave))?;
            }
            step!(
                self.verbose,
                peer = %self.me,
                wave = %wave,
                father = %father,
                links,
                "election echo to father"
            );
        }
        Ok(())
    }

    fn on_leader(&mut self, courier: &mut Courier<'_>, leader: PeerId) -> ProtocolResult<()> {
        if !self.leader_announced {
            courier.send_to_neighbors(&election_message(LEADER, &leader), None)?;
            self.leader_announced = true;
            step!(self.verbose, peer = %self.me, leader = %leader, "leader propagated");
        }
        self.lrec += 1;
        self.leader = Some(leader);
        Ok(())
    }

    fn reset_wave(&mut self, wave: PeerId, father: Option<PeerId>) {
        self.caw = Some(wave);
        self.father = father;
        self.erec = 0;
        self.lrec = 0;
        self.leader = None;
        self.leader_announced = false;
        self.answered = false;
    }

    fn finish(&mut self) -> Progress {
        let won = self.leader.as_ref() == Some(&self.me);
        self.won = Some(won);
        self.caw = None;
        step!(self.verbose, peer = %self.me, won, "election finished");
        Progress::Finished
    }
}
