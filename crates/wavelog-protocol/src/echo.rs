//! Echo wave
//!
//! One [`EchoWave`] runs one wave on one node. The initiator sends INFORM to
//! every neighbor. A node receiving its first wave message adopts the sender
//! as father and forwards INFORM to every other neighbor. Once a node has
//! heard from every neighbor it sends COLLECT to its father; the initiator
//! instead decides. The INFORM flood builds a spanning tree and the COLLECT
//! convergecast walks it back.
//!
//! ```text
//! ["ZECHO", <wave-id>, "INFORM"|"COLLECT", <payload frames...>]
//! ```
//!
//! Payloads come from [`WavePayloadHandler`]s: the inform handler feeds the
//! outgoing flood and consumes incoming INFORM payloads, the collect handler
//! does the same for COLLECT. A handler's `create` runs once per forward
//! round and the result goes to every neighbor of that round.

use crate::step;
use std::fmt;
use wavelog_core::{
    Courier, PeerId, Progress, ProtocolError, ProtocolResult, WireMessage, ECHO_TAG,
};

/// Payload hooks of one wave phase.
pub trait WavePayloadHandler: Send {
    /// Frames appended to the next outgoing message of this phase
    fn create(&mut self) -> Vec<String>;

    /// Frames received with a message of this phase
    fn process(&mut self, payload: Vec<String>);

    /// Called on the initiator when the wave decides. Collect handlers only.
    fn complete(&mut self) {}
}

/// Owned, type-erased payload handler
pub type BoxedPayloadHandler = Box<dyn WavePayloadHandler>;

/// Phase marker carried in every echo message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaveKind {
    /// Outgoing flood
    Inform,
    /// Convergecast back to the initiator
    Collect,
}

impl WaveKind {
    /// Frame value on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            WaveKind::Inform => "INFORM",
            WaveKind::Collect => "COLLECT",
        }
    }

    fn parse(frame: &str) -> Option<Self> {
        match frame {
            "INFORM" => Some(WaveKind::Inform),
            "COLLECT" => Some(WaveKind::Collect),
            _ => None,
        }
    }
}

impl fmt::Display for WaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spanning-tree parent of a node in the current wave
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Father {
    /// This node started the wave
    Initiator,
    /// The neighbor the first wave message came from
    Peer(PeerId),
}

impl fmt::Display for Father {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Father::Initiator => f.write_str("initiator"),
            Father::Peer(peer) => write!(f, "{peer}"),
        }
    }
}

struct EchoFrames {
    wave: String,
    kind: WaveKind,
    payload: Vec<String>,
}

fn parse_echo(message: &WireMessage) -> ProtocolResult<EchoFrames> {
    let mut frames = message.iter().skip(usize::from(message.has_clock_frame()));
    match frames.next() {
        Some(ECHO_TAG) => {}
        other => {
            return Err(ProtocolError::malformed(format!(
                "expected {ECHO_TAG} tag, got {other:?}"
            )))
        }
    }
    let wave = frames
        .next()
        .ok_or_else(|| ProtocolError::malformed("echo message without wave id"))?
        .to_string();
    let kind = frames
        .next()
        .and_then(WaveKind::parse)
        .ok_or_else(|| ProtocolError::malformed("echo message without INFORM/COLLECT"))?;
    let payload = frames.map(str::to_string).collect();
    Ok(EchoFrames {
        wave,
        kind,
        payload,
    })
}

/// Single-use echo wave state of one node.
pub struct EchoWave {
    me: PeerId,
    wave_id: Option<String>,
    father: Option<Father>,
    received: usize,
    finished: bool,
    inform: Option<BoxedPayloadHandler>,
    collect: Option<BoxedPayloadHandler>,
    verbose: bool,
}

impl EchoWave {
    /// Fresh wave state for node `me`
    pub fn new(me: impl Into<PeerId>) -> Self {
        Self {
            me: me.into(),
            wave_id: None,
            father: None,
            received: 0,
            finished: false,
            inform: None,
            collect: None,
            verbose: false,
        }
    }

    /// Attach the handler of the INFORM phase
    pub fn with_inform_handler(mut self, handler: BoxedPayloadHandler) -> Self {
        self.inform = Some(handler);
        self
    }

    /// Attach the handler of the COLLECT phase
    pub fn with_collect_handler(mut self, handler: BoxedPayloadHandler) -> Self {
        self.collect = Some(handler);
        self
    }

    /// Log protocol steps at `info` instead of `debug`
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Wave this node participates in
    pub fn wave_id(&self) -> Option<&str> {
        self.wave_id.as_deref()
    }

    /// Spanning-tree parent, once known
    pub fn father(&self) -> Option<&Father> {
        self.father.as_ref()
    }

    /// Wave messages received so far
    pub fn received(&self) -> usize {
        self.received
    }

    /// True on the node that called [`EchoWave::init`]
    pub fn is_initiator(&self) -> bool {
        matches!(self.father, Some(Father::Initiator))
    }

    /// True once this node decided or sent its COLLECT
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Give back the payload handlers as `(inform, collect)`
    pub fn into_handlers(self) -> (Option<BoxedPayloadHandler>, Option<BoxedPayloadHandler>) {
        (self.inform, self.collect)
    }

    /// Start a wave with this node's id as wave id.
    pub fn init(&mut self, courier: &mut Courier<'_>) -> ProtocolResult<Progress> {
        if self.father.is_some() || self.finished {
            return Err(ProtocolError::WaveClosed(self.wave_label()));
        }

        self.father = Some(Father::Initiator);
        self.wave_id = Some(self.me.to_string());

        if courier.neighbor_count() == 0 {
            return self.decide(courier);
        }

        let message = self.wave_message(WaveKind::Inform);
        let sent = courier.send_to_neighbors(&message, None)?;
        step!(self.verbose, peer = %self.me, sent, "echo wave initiated");
        Ok(Progress::InProgress)
    }

    /// Feed one echo message from `sender` into the wave.
    ///
    /// Messages of another wave are rejected with
    /// [`ProtocolError::WrongWave`] before any state changes.
    pub fn handle(
        &mut self,
        courier: &mut Courier<'_>,
        sender: &PeerId,
        mut message: WireMessage,
    ) -> ProtocolResult<Progress> {
        if self.finished {
            return Err(ProtocolError::WaveClosed(self.wave_label()));
        }

        let frames = parse_echo(&message)?;
        if self.father.is_some() {
            if let Some(current) = &self.wave_id {
                if *current != frames.wave {
                    return Err(ProtocolError::WrongWave {
                        expected: current.clone(),
                        received: frames.wave,
                    });
                }
            }
        }

        courier.accept(&mut message)?;
        self.received += 1;

        if !frames.payload.is_empty() {
            let handler = match frames.kind {
                WaveKind::Inform => self.inform.as_mut(),
                WaveKind::Collect => self.collect.as_mut(),
            };
            if let Some(handler) = handler {
                handler.process(frames.payload);
            }
        }

        if self.father.is_none() {
            self.father = Some(Father::Peer(sender.clone()));
            self.wave_id = Some(frames.wave);

            let message = self.wave_message(WaveKind::Inform);
            let sent = courier.send_to_neighbors(&message, Some(sender))?;
            step!(
                self.verbose,
                peer = %self.me,
                father = %sender,
                sent,
                "echo wave joined"
            );
        }

        if self.received >= courier.neighbor_count() {
            return self.decide(courier);
        }
        Ok(Progress::InProgress)
    }

    fn decide(&mut self, courier: &mut Courier<'_>) -> ProtocolResult<Progress> {
        self.finished = true;
        match self.father.clone() {
            Some(Father::Peer(father)) => {
                // One COLLECT per shared group; only the first carries the payload.
                let links = courier.links_to(&father).max(1);
                let message = self.wave_message(WaveKind::Collect);
                courier.send(&father, message)?;
                for _ in 1..links {
                    courier.send(&father, self.bare_message(WaveKind::Collect))?;
                }
                step!(self.verbose, peer = %self.me, father = %father, links, "echo collect sent");
            }
            Some(Father::Initiator) | None => {
                if let Some(handler) = self.collect.as_mut() {
                    handler.complete();
                }
                step!(
                    self.verbose,
                    peer = %self.me,
                    received = self.received,
                    "echo wave decided"
                );
            }
        }
        Ok(Progress::Finished)
    }

    fn wave_message(&mut self, kind: WaveKind) -> WireMessage {
        let wave = self.wave_id.clone().unwrap_or_default();
        let mut message = WireMessage::from_frames([ECHO_TAG, wave.as_str(), kind.as_str()]);
        let handler = match kind {
            WaveKind::Inform => self.inform.as_mut(),
            WaveKind::Collect => self.collect.as_mut(),
        };
        if let Some(handler) = handler {
            message.extend(handler.create());
        }
        message
    }

    fn bare_message(&self, kind: WaveKind) -> WireMessage {
        let wave = self.wave_id.as_deref().unwrap_or_default();
        WireMessage::from_frames([ECHO_TAG, wave, kind.as_str()])
    }

    fn wave_label(&self) -> String {
        self.wave_id.clone().unwrap_or_else(|| self.me.to_string())
    }
}

impl fmt::Debug for EchoWave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EchoWave")
            .field("me", &self.me)
            .field("wave_id", &self.wave_id)
            .field("father", &self.father)
            .field("received", &self.received)
            .field("finished", &self.finished)
            .field("has_inform_handler", &self.inform.is_some())
            .field("has_collect_handler", &self.collect.is_some())
            .finish()
    }
}
