//! Log collection node
//!
//! A [`LogNode`] is a single-task reactor. One `tokio::select!` multiplexes
//! owner commands, peer events from the transport and two timers: the
//! election start after START and the leader's collection rounds. Every
//! incoming peer message is routed by its type tag to the election, the
//! current collection wave or the bakery relay; all of them share the
//! node's vector clock.
//!
//! The owner talks to the loop through a [`NodeHandle`]: commands go in over
//! one channel and [`NodeEvent`]s come back over another.

use crate::collector::{LogCollector, RoundFailure};
use crate::command::NodeCommand;
use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::event::NodeEvent;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wavelog_core::{
    Courier, PeerEvent, PeerId, PeerTransport, Progress, ProtocolError, VectorClock, WireMessage,
    BAKERY_TAG, ECHO_TAG, ELECTION_TAG,
};
use wavelog_journal::{LogOrdering, NodeLog, OrderedLog};
use wavelog_protocol::{EchoWave, Election};
use wavelog_transport::{MemoryNetwork, MemoryTransport, PeerEvents};

/// Outcome of one `select!` turn, handled once the borrows of the arms end.
enum Step {
    Command(NodeCommand),
    Peer(PeerEvent),
    StartElection,
    Collect,
    Detached,
}

/// Reactor state of one node
pub struct LogNode {
    me: PeerId,
    config: NodeConfig,
    transport: MemoryTransport,
    peer_events: PeerEvents,
    commands: mpsc::UnboundedReceiver<NodeCommand>,
    events: mpsc::UnboundedSender<NodeEvent>,
    clock: VectorClock,
    log: Arc<Mutex<NodeLog>>,
    ordered: Option<Arc<Mutex<OrderedLog>>>,
    election: Election,
    echo: Option<EchoWave>,
    round_failure: RoundFailure,
    election_at: Option<Instant>,
    collect_at: Option<Instant>,
    rng: StdRng,
    verbose: bool,
}

impl LogNode {
    /// Register `peer` on `network` and prepare its loop.
    ///
    /// The node's own log is created (truncated) at
    /// [`NodeConfig::node_log_path`]. Nothing runs until [`LogNode::run`] is
    /// polled; [`LogNode::spawn`] does both.
    pub fn new(
        config: NodeConfig,
        network: &MemoryNetwork,
        peer: PeerId,
    ) -> NodeResult<(Self, NodeHandle)> {
        config.validate()?;
        let log = NodeLog::create(config.node_log_path(&peer))?;

        let mut clock = VectorClock::new(peer.clone());
        if config.record_time_space {
            clock.enable_trace();
        }
        let mut election = Election::new(peer.clone());
        election.set_verbose(config.verbose);

        let (transport, peer_events) = network.register(peer.clone());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let node = Self {
            me: peer.clone(),
            verbose: config.verbose,
            config,
            transport,
            peer_events,
            commands: command_rx,
            events: event_tx,
            clock,
            log: Arc::new(Mutex::new(log)),
            ordered: None,
            election,
            echo: None,
            round_failure: RoundFailure::default(),
            election_at: None,
            collect_at: None,
            rng: StdRng::from_entropy(),
        };
        let handle = NodeHandle {
            peer,
            commands: command_tx,
            events: event_rx,
            task: None,
        };
        Ok((node, handle))
    }

    /// Create the node and run it on the current tokio runtime.
    pub fn spawn(
        config: NodeConfig,
        network: &MemoryNetwork,
        peer: impl Into<PeerId>,
    ) -> NodeResult<NodeHandle> {
        let (node, mut handle) = Self::new(config, network, peer.into())?;
        handle.task = Some(tokio::spawn(node.run()));
        Ok(handle)
    }

    /// Run until `$TERM`, a dropped handle or removal from the network.
    pub async fn run(mut self) -> NodeResult<()> {
        info!(peer = %self.me, log = %self.log.lock().path().display(), "node running");
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => {
                    Step::Command(command.unwrap_or(NodeCommand::Terminate))
                }
                event = self.peer_events.recv() => match event {
                    Some(event) => Step::Peer(event),
                    None => Step::Detached,
                },
                () = sleep_until(self.election_at) => Step::StartElection,
                () = sleep_until(self.collect_at) => Step::Collect,
            };

            let result = match step {
                Step::Command(NodeCommand::Terminate) => break,
                Step::Detached => {
                    warn!(peer = %self.me, "removed from the network");
                    break;
                }
                Step::Command(command) => self.on_command(command),
                Step::Peer(event) => self.on_peer_event(event),
                Step::StartElection => self.start_election(),
                Step::Collect => self.start_collection(),
            };
            if let Err(error) = result {
                warn!(peer = %self.me, code = error.code(), %error, "node step failed");
            }
        }
        self.shutdown()
    }

    fn on_command(&mut self, command: NodeCommand) -> NodeResult<()> {
        debug!(peer = %self.me, %command, "command");
        match command {
            NodeCommand::Start => {
                for group in &self.config.groups {
                    self.transport.join(group.as_str());
                }
                self.election_at = Some(Instant::now() + self.config.settle());
                self.note("START")
            }
            NodeCommand::Stop => {
                self.transport.leave_all();
                self.election_at = None;
                self.collect_at = None;
                self.note("STOP")
            }
            NodeCommand::Verbose => {
                self.verbose = true;
                self.election.set_verbose(true);
                if let Some(echo) = self.echo.as_mut() {
                    echo.set_verbose(true);
                }
                Ok(())
            }
            NodeCommand::DumpTimeSpace => {
                self.config.dump_time_space = true;
                Ok(())
            }
            NodeCommand::SendRandom { content, owner } => self.send_random(&content, owner),
            // Handled by the loop.
            NodeCommand::Terminate => Ok(()),
        }
    }

    fn on_peer_event(&mut self, event: PeerEvent) -> NodeResult<()> {
        let (peer, message) = match event {
            PeerEvent::Whisper { peer, message } => (peer, message),
            other => {
                debug!(peer = %self.me, event = ?other, "membership change");
                return Ok(());
            }
        };
        let tag = message.tag().map(str::to_owned);
        match tag.as_deref() {
            Some(ELECTION_TAG) => self.on_election_message(&peer, message),
            Some(ECHO_TAG) => self.on_echo_message(&peer, message),
            Some(BAKERY_TAG) => self.on_bakery_message(message),
            tag => {
                warn!(peer = %self.me, from = %peer, ?tag, "message with unknown tag dropped");
                self.absorb_clock(message)
            }
        }
    }

    fn start_election(&mut self) -> NodeResult<()> {
        self.election_at = None;
        if self.election.finished() {
            return Ok(());
        }
        let progress = self
            .election
            .start(&mut Courier::with_clock(&self.transport, &mut self.clock))?;
        if progress.is_finished() {
            self.on_election_finished()?;
        }
        Ok(())
    }

    fn on_election_message(&mut self, from: &PeerId, message: WireMessage) -> NodeResult<()> {
        if self.election.finished() {
            debug!(peer = %self.me, from = %from, "late election message");
            return self.absorb_clock(message);
        }
        // A started node is a candidate even if a peer's wave arrives first.
        if self.election_at.is_some() {
            self.start_election()?;
        }
        let progress = self.election.handle(
            &mut Courier::with_clock(&self.transport, &mut self.clock),
            from,
            message,
        )?;
        if progress.is_finished() {
            self.on_election_finished()?;
        }
        Ok(())
    }

    fn on_election_finished(&mut self) -> NodeResult<()> {
        let (Some(leader), Some(won)) = (self.election.leader().cloned(), self.election.won())
        else {
            return Ok(());
        };
        info!(peer = %self.me, leader = %leader, won, "election decided");
        self.note(&format!("LEADER {leader}"))?;
        if won {
            self.collect_at = Some(Instant::now() + self.config.collect_delay());
        }
        self.emit(NodeEvent::ElectionDecided { leader, won });
        Ok(())
    }

    fn start_collection(&mut self) -> NodeResult<()> {
        self.collect_at = self
            .config
            .collect_interval()
            .map(|interval| Instant::now() + interval);

        // Rounds share the leader's id as wave id, so they must not overlap.
        if self.echo.as_ref().is_some_and(|echo| !echo.is_finished()) {
            warn!(peer = %self.me, "previous collection still running, round skipped");
            return Ok(());
        }

        let ordered = Arc::clone(self.ordered.get_or_insert_with(|| {
            Arc::new(Mutex::new(OrderedLog::new(
                self.config.ordered_log_path(),
                LogOrdering::Clock,
            )))
        }));
        let mut collector = LogCollector::leader(self.me.clone(), Arc::clone(&self.log), ordered);
        self.round_failure = collector.failure();
        let own = collector.ingest_own_tail();

        let mut echo = EchoWave::new(self.me.clone()).with_collect_handler(Box::new(collector));
        echo.set_verbose(self.verbose);
        let progress = echo.init(&mut Courier::with_clock(&self.transport, &mut self.clock))?;
        info!(peer = %self.me, own, "collection wave started");

        self.echo = Some(echo);
        if progress.is_finished() {
            self.finish_collection()?;
        }
        Ok(())
    }

    fn on_echo_message(&mut self, from: &PeerId, message: WireMessage) -> NodeResult<()> {
        if self.echo.is_none() {
            if self.election.won() == Some(true) {
                warn!(peer = %self.me, from = %from, "echo message outside a collection round");
                return self.absorb_clock(message);
            }
            let collector = LogCollector::peer(self.me.clone(), Arc::clone(&self.log));
            self.round_failure = collector.failure();
            let mut echo = EchoWave::new(self.me.clone()).with_collect_handler(Box::new(collector));
            echo.set_verbose(self.verbose);
            self.echo = Some(echo);
        }
        let Some(echo) = self.echo.as_mut() else {
            return Ok(());
        };

        let result = echo.handle(
            &mut Courier::with_clock(&self.transport, &mut self.clock),
            from,
            message,
        );
        match result {
            Ok(Progress::Finished) => self.finish_collection(),
            Ok(Progress::InProgress) => Ok(()),
            Err(error @ ProtocolError::WrongWave { .. }) => {
                warn!(peer = %self.me, from = %from, %error, "echo message rejected");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    fn finish_collection(&mut self) -> NodeResult<()> {
        let Some(echo) = self.echo.take() else {
            return Ok(());
        };
        if let Some(error) = self.round_failure.take() {
            if echo.is_initiator() {
                self.emit(NodeEvent::CollectionFailed {
                    code: error.code(),
                    reason: error.to_string(),
                });
            }
            return Err(error.into());
        }
        if !echo.is_initiator() {
            debug!(peer = %self.me, "collection wave answered");
            return Ok(());
        }
        if let Some(ordered) = &self.ordered {
            let ordered = ordered.lock();
            info!(
                peer = %self.me,
                records = ordered.len(),
                path = %ordered.path().display(),
                "logs ordered"
            );
            self.emit(NodeEvent::LogsOrdered {
                path: ordered.path().to_path_buf(),
                records: ordered.len(),
            });
        }
        Ok(())
    }

    fn send_random(&mut self, content: &str, owner: Option<String>) -> NodeResult<()> {
        let peers = self.transport.peers();
        let Some(target) = peers.choose(&mut self.rng).cloned() else {
            return self.record("No friends!");
        };
        let owner = owner.map_or_else(|| self.me.clone(), PeerId::from);
        self.record(&format!("S: {content} - {}", owner.short()))?;

        let message = WireMessage::from_frames([BAKERY_TAG, content, owner.as_str()]);
        Courier::with_clock(&self.transport, &mut self.clock).send(&target, message)?;
        debug!(peer = %self.me, to = %target, content, "bakery message sent");
        Ok(())
    }

    fn on_bakery_message(&mut self, mut message: WireMessage) -> NodeResult<()> {
        self.clock.receive(&mut message)?;
        let frames = message.into_frames();
        let [_, content, owner] = frames.as_slice() else {
            return Err(ProtocolError::malformed(format!(
                "bakery message with {} frames",
                frames.len()
            ))
            .into());
        };
        self.record(&format!("R: {content} - {}", PeerId::new(owner.as_str()).short()))?;
        self.emit(NodeEvent::Bakery {
            content: content.clone(),
            owner: owner.clone(),
        });
        Ok(())
    }

    /// Merge a message's clock without acting on its body.
    fn absorb_clock(&mut self, mut message: WireMessage) -> NodeResult<()> {
        if message.has_clock_frame() {
            self.clock.receive(&mut message)?;
        }
        Ok(())
    }

    /// Stamp `text` into this node's log.
    fn record(&mut self, text: &str) -> NodeResult<()> {
        let record = self.log.lock().stamp(&mut self.clock, text)?;
        info!(peer = %self.me, "{record}");
        Ok(())
    }

    /// Stamp `text` only in verbose mode.
    fn note(&mut self, text: &str) -> NodeResult<()> {
        if self.verbose {
            self.record(text)?;
        }
        Ok(())
    }

    fn emit(&self, event: NodeEvent) {
        // The owner may have dropped its receiver.
        let _ = self.events.send(event);
    }

    fn shutdown(&mut self) -> NodeResult<()> {
        self.transport.unregister();
        let dumped = if self.config.dump_time_space {
            self.dump_time_space()
        } else {
            Ok(())
        };
        info!(peer = %self.me, status = %self.election.status(), "node stopped");
        self.emit(NodeEvent::Stopped);
        dumped
    }

    fn dump_time_space(&self) -> NodeResult<()> {
        let path = self.config.time_space_path(&self.me);
        let dump_error = |source| NodeError::Dump {
            path: path.display().to_string(),
            source,
        };
        let mut writer = BufWriter::new(File::create(&path).map_err(dump_error)?);
        self.clock
            .dump_time_space(&mut writer)
            .and_then(|()| writer.flush())
            .map_err(dump_error)?;
        info!(peer = %self.me, path = %path.display(), "time-space trace written");
        Ok(())
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Owner side of a running [`LogNode`]
#[derive(Debug)]
pub struct NodeHandle {
    peer: PeerId,
    commands: mpsc::UnboundedSender<NodeCommand>,
    events: mpsc::UnboundedReceiver<NodeEvent>,
    task: Option<JoinHandle<NodeResult<()>>>,
}

impl NodeHandle {
    /// Id of the node
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Queue a command
    pub fn send(&self, command: NodeCommand) -> NodeResult<()> {
        self.commands
            .send(command)
            .map_err(|_| NodeError::Stopped(self.peer.to_string()))
    }

    /// Parse and queue a textual command such as `"SEND RANDOM BAKED 4F2A"`
    pub fn command(&self, line: &str) -> NodeResult<()> {
        self.send(line.parse()?)
    }

    /// Next event; `None` after the loop ended and every event was read
    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.events.recv().await
    }

    /// Next queued event, if any
    pub fn try_event(&mut self) -> Option<NodeEvent> {
        self.events.try_recv().ok()
    }

    /// Skip events until one matches `wanted`, giving up after `timeout`.
    pub async fn wait_for<F>(&mut self, timeout: Duration, mut wanted: F) -> Option<NodeEvent>
    where
        F: FnMut(&NodeEvent) -> bool,
    {
        tokio::time::timeout(timeout, async {
            while let Some(event) = self.events.recv().await {
                if wanted(&event) {
                    return Some(event);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// Send `$TERM` and wait for the loop to end.
    pub async fn terminate(mut self) -> NodeResult<()> {
        // An already stopped loop is fine here.
        let _ = self.commands.send(NodeCommand::Terminate);
        match self.task.take() {
            Some(task) => task.await.map_err(|e| NodeError::Task(e.to_string()))?,
            None => Ok(()),
        }
    }
}
