//! Peer transport seam
//!
//! The wave protocols never talk to a network directly. They see a
//! [`PeerTransport`], which answers "which groups am I in", "who is in group
//! G" and "send this message to peer P". Sends only enqueue; delivery happens
//! later through the [`PeerEvent`] stream of the receiving node, one event at
//! a time, FIFO per sender.
//!
//! [`Courier`] bundles a transport with an optional [`VectorClock`] so that
//! every protocol send is stamped and every protocol receive is merged
//! without the protocol owning the clock.

use crate::clock::VectorClock;
use crate::errors::{ClockError, TransportError};
use crate::identifiers::{GroupName, PeerId};
use crate::wire::WireMessage;

/// Result alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Membership-aware point-to-point transport
pub trait PeerTransport: Send + Sync {
    /// Identifier of the local node
    fn local_peer(&self) -> &PeerId;

    /// Groups the local node currently belongs to
    fn own_groups(&self) -> Vec<GroupName>;

    /// Other members of `group`, excluding the local node
    fn peers_by_group(&self, group: &GroupName) -> Vec<PeerId>;

    /// Every peer currently known to the local node
    fn peers(&self) -> Vec<PeerId>;

    /// Enqueue `message` for delivery to `peer`
    fn send(&self, peer: &PeerId, message: WireMessage) -> TransportResult<()>;

    /// Short name of the implementation, for logs
    fn transport_type(&self) -> &'static str;
}

/// Events a transport delivers to the local node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A peer became visible
    Enter {
        /// The peer
        peer: PeerId,
    },
    /// A peer went away
    Exit {
        /// The peer
        peer: PeerId,
    },
    /// A peer joined a group
    Join {
        /// The peer
        peer: PeerId,
        /// Group joined
        group: GroupName,
    },
    /// A peer left a group
    Leave {
        /// The peer
        peer: PeerId,
        /// Group left
        group: GroupName,
    },
    /// Point-to-point message
    Whisper {
        /// Sender
        peer: PeerId,
        /// Message frames
        message: WireMessage,
    },
}

impl PeerEvent {
    /// Peer the event originates from
    pub fn peer(&self) -> &PeerId {
        match self {
            PeerEvent::Enter { peer }
            | PeerEvent::Exit { peer }
            | PeerEvent::Join { peer, .. }
            | PeerEvent::Leave { peer, .. }
            | PeerEvent::Whisper { peer, .. } => peer,
        }
    }
}

/// Neighbors of the local node: the members of every own group, concatenated
/// group by group. A peer sharing two groups with us appears twice.
pub fn neighbors(transport: &dyn PeerTransport) -> Vec<PeerId> {
    transport
        .own_groups()
        .iter()
        .flat_map(|group| transport.peers_by_group(group))
        .collect()
}

/// Number of entries [`neighbors`] returns
pub fn neighbor_count(transport: &dyn PeerTransport) -> usize {
    transport
        .own_groups()
        .iter()
        .map(|group| transport.peers_by_group(group).len())
        .sum()
}

/// Sender handed to a protocol step.
///
/// Stamps outgoing messages and merges incoming clock frames when a clock is
/// attached.
pub struct Courier<'a> {
    transport: &'a dyn PeerTransport,
    clock: Option<&'a mut VectorClock>,
}

impl<'a> Courier<'a> {
    /// Courier without a clock; messages go out unstamped.
    pub fn new(transport: &'a dyn PeerTransport) -> Self {
        Self {
            transport,
            clock: None,
        }
    }

    /// Courier stamping every send with `clock`.
    pub fn with_clock(transport: &'a dyn PeerTransport, clock: &'a mut VectorClock) -> Self {
        Self {
            transport,
            clock: Some(clock),
        }
    }

    /// Identifier of the local node
    pub fn local_peer(&self) -> &PeerId {
        self.transport.local_peer()
    }

    /// See [`neighbors`]
    pub fn neighbors(&self) -> Vec<PeerId> {
        neighbors(self.transport)
    }

    /// See [`neighbor_count`]
    pub fn neighbor_count(&self) -> usize {
        neighbor_count(self.transport)
    }

    /// Send one message, stamping it if a clock is attached.
    pub fn send(&mut self, peer: &PeerId, message: WireMessage) -> TransportResult<()> {
        let message = match self.clock.as_deref_mut() {
            Some(clock) => clock.prepare_for_send(message),
            None => message,
        };
        self.transport.send(peer, message)
    }

    /// Number of groups shared with `peer`, the times it appears in
    /// [`Courier::neighbors`].
    pub fn links_to(&self, peer: &PeerId) -> usize {
        self.neighbors().iter().filter(|p| *p == peer).count()
    }

    /// Send a copy of `message` to every neighbor except `skip`.
    ///
    /// Each copy is stamped separately. Returns the number of sends.
    pub fn send_to_neighbors(
        &mut self,
        message: &WireMessage,
        skip: Option<&PeerId>,
    ) -> TransportResult<usize> {
        let mut sent = 0;
        for peer in self.neighbors() {
            if skip == Some(&peer) {
                continue;
            }
            self.send(&peer, message.clone())?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Strip the leading clock frame of an incoming message.
    ///
    /// With a clock attached the frame is merged and a missing frame is an
    /// error. Without one, a frame is dropped unread.
    pub fn accept(&mut self, message: &mut WireMessage) -> Result<(), ClockError> {
        match self.clock.as_deref_mut() {
            Some(clock) => clock.receive(message),
            None => {
                if message.has_clock_frame() {
                    message.pop_front();
                }
                Ok(())
            }
        }
    }

    /// True when sends are stamped
    pub fn has_clock(&self) -> bool {
        self.clock.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    struct FixedTransport {
        me: PeerId,
        groups: BTreeMap<GroupName, Vec<PeerId>>,
        outbox: Mutex<Vec<(PeerId, WireMessage)>>,
    }

    impl FixedTransport {
        fn new(me: &str, groups: &[(&str, &[&str])]) -> Self {
            Self {
                me: PeerId::new(me),
                groups: groups
                    .iter()
                    .map(|(g, peers)| {
                        (GroupName::new(*g), peers.iter().map(|p| PeerId::new(*p)).collect())
                    })
                    .collect(),
                outbox: Mutex::new(Vec::new()),
            }
        }
    }

    impl PeerTransport for FixedTransport {
        fn local_peer(&self) -> &PeerId {
            &self.me
        }

        fn own_groups(&self) -> Vec<GroupName> {
            self.groups.keys().cloned().collect()
        }

        fn peers_by_group(&self, group: &GroupName) -> Vec<PeerId> {
            self.groups.get(group).cloned().unwrap_or_default()
        }

        fn peers(&self) -> Vec<PeerId> {
            let mut all: Vec<_> = self.groups.values().flatten().cloned().collect();
            all.sort();
            all.dedup();
            all
        }

        fn send(&self, peer: &PeerId, message: WireMessage) -> TransportResult<()> {
            self.outbox.lock().push((peer.clone(), message));
            Ok(())
        }

        fn transport_type(&self) -> &'static str {
            "fixed"
        }
    }

    #[test]
    fn test_neighbors_keep_duplicates_across_groups() {
        let transport = FixedTransport::new("A", &[("G1", &["B", "C"]), ("G2", &["B"])]);
        let found = neighbors(&transport);
        assert_eq!(found.len(), 3);
        assert_eq!(neighbor_count(&transport), 3);
        assert_eq!(found.iter().filter(|p| p.as_str() == "B").count(), 2);
    }

    #[test]
    fn test_courier_skips_father() {
        let transport = FixedTransport::new("A", &[("G", &["B", "C", "D"])]);
        let mut courier = Courier::new(&transport);
        let sent = courier
            .send_to_neighbors(&WireMessage::from_frames(["X"]), Some(&PeerId::new("C")))
            .unwrap();
        assert_eq!(sent, 2);

        let outbox = transport.outbox.lock();
        let targets: Vec<_> = outbox.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(targets, vec!["B", "D"]);
    }

    #[test]
    fn test_courier_stamps_each_send() {
        let transport = FixedTransport::new("A", &[("G", &["B", "C"])]);
        let mut clock = VectorClock::new("A");
        {
            let mut courier = Courier::with_clock(&transport, &mut clock);
            courier
                .send_to_neighbors(&WireMessage::from_frames(["X"]), None)
                .unwrap();
        }
        assert_eq!(clock.get("A"), 2);

        let outbox = transport.outbox.lock();
        assert_eq!(outbox[0].1.front(), Some("VC:1;own:A;A,1;"));
        assert_eq!(outbox[1].1.front(), Some("VC:1;own:A;A,2;"));
    }

    #[test]
    fn test_accept_without_clock_drops_frame() {
        let transport = FixedTransport::new("A", &[]);
        let mut courier = Courier::new(&transport);
        let mut msg = WireMessage::from_frames(["VC:1;own:B;B,1;", "ZLE"]);
        courier.accept(&mut msg).unwrap();
        assert_eq!(msg.front(), Some("ZLE"));
    }

    #[test]
    fn test_accept_with_clock_requires_frame() {
        let transport = FixedTransport::new("A", &[]);
        let mut clock = VectorClock::new("A");
        let mut courier = Courier::with_clock(&transport, &mut clock);
        let mut msg = WireMessage::from_frames(["ZLE"]);
        assert_eq!(courier.accept(&mut msg), Err(ClockError::MissingFrame));
    }
}
