// Connection bookkeeping and packet framing over a `Transport`.
//
// The session knows which peers it is talking to and in which role, turns
// raw payloads into validated packets, and synthesizes disconnect packets
// from transport events and the periodic liveness sweep, so the layer
// above handles a silent drop and an explicit goodbye identically.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use wildcard_engine::config::HEARTBEAT_SWEEP_MS;
use wildcard_protocol::packet::{Packet, PacketError};
use wildcard_protocol::types::PeerId;

use crate::transport::{Transport, TransportError, TransportEvent};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] PacketError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

pub struct Session<T: Transport> {
    transport: T,
    role: Role,
    self_peer: PeerId,
    /// The host's peer id. For the host this is its own id; it doubles as
    /// the room invite.
    owner_peer: PeerId,
    connections: BTreeSet<PeerId>,
    last_sweep_ms: u64,
}

impl<T: Transport> Session<T> {
    /// Open a hosting session. The local peer id becomes the room id.
    pub fn host(mut transport: T) -> Result<Self, SessionError> {
        let self_peer = transport.open()?;
        info!(peer = %self_peer, "hosting session opened");
        Ok(Self {
            transport,
            role: Role::Host,
            owner_peer: self_peer.clone(),
            self_peer,
            connections: BTreeSet::new(),
            last_sweep_ms: 0,
        })
    }

    /// Open a client session and dial the host.
    pub fn join(mut transport: T, owner: PeerId) -> Result<Self, SessionError> {
        let self_peer = transport.open()?;
        transport.connect(&owner)?;
        info!(peer = %self_peer, host = %owner, "joined session");
        let mut connections = BTreeSet::new();
        connections.insert(owner.clone());
        Ok(Self {
            transport,
            role: Role::Client,
            owner_peer: owner,
            self_peer,
            connections,
            last_sweep_ms: 0,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn self_peer(&self) -> &PeerId {
        &self.self_peer
    }

    pub fn owner_peer(&self) -> &PeerId {
        &self.owner_peer
    }

    pub fn connections(&self) -> impl Iterator<Item = &PeerId> {
        self.connections.iter()
    }

    /// Redirect this client at a new host. Used during migration, before
    /// dialing the elected successor.
    pub fn set_owner(&mut self, owner: PeerId) {
        self.owner_peer = owner;
    }

    /// Dial the current owner. Counterpart of `set_owner` for migration.
    pub fn reconnect_owner(&mut self) -> Result<(), SessionError> {
        let owner = self.owner_peer.clone();
        self.transport.connect(&owner)?;
        self.connections.insert(owner);
        Ok(())
    }

    /// Become the host of this session, keeping the open endpoint. The
    /// connection table starts empty; old peers dial back in themselves.
    pub fn promote_to_host(&mut self) {
        info!(peer = %self.self_peer, "promoted to host");
        self.role = Role::Host;
        self.owner_peer = self.self_peer.clone();
        self.connections.clear();
    }

    pub fn send_packet(&mut self, to: &PeerId, packet: &Packet) -> Result<(), SessionError> {
        let raw = packet.encode()?;
        self.transport.send(to, &raw)?;
        Ok(())
    }

    /// Send to every connection except `skip`. Delivery failures are
    /// logged and skipped; the sweep will reap the dead link.
    pub fn broadcast_except(&mut self, packet: &Packet, skip: Option<&PeerId>) {
        let raw = match packet.encode() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(kind = packet.kind(), %err, "failed to encode broadcast");
                return;
            }
        };
        let targets: Vec<PeerId> = self
            .connections
            .iter()
            .filter(|p| skip != Some(*p))
            .cloned()
            .collect();
        for peer in targets {
            if let Err(err) = self.transport.send(&peer, &raw) {
                debug!(%peer, %err, "broadcast delivery failed");
            }
        }
    }

    /// Drain transport events into validated packets. Connection churn is
    /// folded into synthesized disconnect packets attributed to the local
    /// peer, and the liveness sweep runs at most every
    /// `HEARTBEAT_SWEEP_MS`.
    pub fn poll(&mut self, now_ms: u64) -> Vec<(PeerId, Packet)> {
        let mut packets = Vec::new();
        for event in self.transport.poll() {
            match event {
                TransportEvent::PeerConnected(peer) => {
                    debug!(%peer, "peer connected");
                    if self.is_host() {
                        self.connections.insert(peer);
                    }
                }
                TransportEvent::PeerDisconnected(peer, reason) => {
                    self.connections.remove(&peer);
                    packets.push(self.synthesize_disconnect(peer, reason));
                }
                TransportEvent::Data(peer, raw) => {
                    if !self.is_host() && peer != self.owner_peer {
                        debug!(%peer, "dropping traffic from non-owner peer");
                        continue;
                    }
                    match Packet::decode(&raw) {
                        Ok(packet) => packets.push((peer, packet)),
                        Err(err) => debug!(%peer, %err, "dropping malformed packet"),
                    }
                }
            }
        }
        if now_ms.saturating_sub(self.last_sweep_ms) >= HEARTBEAT_SWEEP_MS {
            self.last_sweep_ms = now_ms;
            let dead: Vec<PeerId> = self
                .connections
                .iter()
                .filter(|p| !self.transport.is_alive(p))
                .cloned()
                .collect();
            for peer in dead {
                self.connections.remove(&peer);
                packets.push(self.synthesize_disconnect(peer, "heartbeat lost".into()));
            }
        }
        packets
    }

    fn synthesize_disconnect(&self, peer: PeerId, reason: String) -> (PeerId, Packet) {
        let packet = if self.is_host() || peer != self.owner_peer {
            Packet::PeerDisconnect {
                peer_id: peer,
                reason,
            }
        } else {
            Packet::HostDisconnect {
                peer_id: peer,
                reason,
            }
        };
        (self.self_peer.clone(), packet)
    }

    pub fn close(&mut self) {
        self.transport.close();
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, VecDeque};

    #[derive(Default)]
    struct FakeTransport {
        peer: Option<PeerId>,
        queued: VecDeque<TransportEvent>,
        sent: Vec<(PeerId, String)>,
        alive: BTreeMap<PeerId, bool>,
    }

    impl FakeTransport {
        fn with_peer(name: &str) -> Self {
            Self {
                peer: Some(PeerId(name.into())),
                ..Self::default()
            }
        }

        fn queue(&mut self, event: TransportEvent) {
            self.queued.push_back(event);
        }
    }

    impl Transport for FakeTransport {
        fn open(&mut self) -> Result<PeerId, TransportError> {
            self.peer.clone().ok_or(TransportError::NotOpen)
        }
        fn local_peer(&self) -> Option<&PeerId> {
            self.peer.as_ref()
        }
        fn connect(&mut self, remote: &PeerId) -> Result<(), TransportError> {
            self.alive.insert(remote.clone(), true);
            Ok(())
        }
        fn send(&mut self, to: &PeerId, raw: &str) -> Result<(), TransportError> {
            self.sent.push((to.clone(), raw.to_string()));
            Ok(())
        }
        fn is_alive(&self, peer: &PeerId) -> bool {
            self.alive.get(peer).copied().unwrap_or(false)
        }
        fn poll(&mut self) -> Vec<TransportEvent> {
            self.queued.drain(..).collect()
        }
        fn close(&mut self) {}
    }

    #[test]
    fn host_tracks_connections_from_events() {
        let mut session = Session::host(FakeTransport::with_peer("host")).unwrap();
        session
            .transport
            .queue(TransportEvent::PeerConnected(PeerId("a".into())));
        session.poll(0);
        assert_eq!(session.connections().count(), 1);
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        let mut session = Session::host(FakeTransport::with_peer("host")).unwrap();
        session
            .transport
            .queue(TransportEvent::Data(PeerId("a".into()), "{not json".into()));
        assert!(session.poll(0).is_empty());
    }

    #[test]
    fn client_drops_traffic_from_non_owner() {
        let mut session =
            Session::join(FakeTransport::with_peer("me"), PeerId("host".into())).unwrap();
        let raw = Packet::DrawCard.encode().unwrap();
        session
            .transport
            .queue(TransportEvent::Data(PeerId("stranger".into()), raw.clone()));
        session
            .transport
            .queue(TransportEvent::Data(PeerId("host".into()), raw));
        let packets = session.poll(0);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].0, PeerId("host".into()));
    }

    #[test]
    fn lost_owner_synthesizes_host_disconnect() {
        let mut session =
            Session::join(FakeTransport::with_peer("me"), PeerId("host".into())).unwrap();
        session.transport.alive.insert(PeerId("host".into()), false);
        let packets = session.poll(HEARTBEAT_SWEEP_MS);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].0, PeerId("me".into()), "attributed locally");
        assert!(matches!(
            packets[0].1,
            Packet::HostDisconnect { ref peer_id, .. } if peer_id.0 == "host"
        ));
    }

    #[test]
    fn sweep_is_rate_limited() {
        let mut session =
            Session::join(FakeTransport::with_peer("me"), PeerId("host".into())).unwrap();
        session.transport.alive.insert(PeerId("host".into()), false);
        session.poll(HEARTBEAT_SWEEP_MS); // reaps
        session.reconnect_owner().unwrap();
        session.transport.alive.insert(PeerId("host".into()), false);
        assert!(
            session.poll(HEARTBEAT_SWEEP_MS + 1).is_empty(),
            "second sweep must wait out the interval"
        );
    }

    #[test]
    fn broadcast_skips_the_excluded_peer() {
        let mut session = Session::host(FakeTransport::with_peer("host")).unwrap();
        session.connections.insert(PeerId("a".into()));
        session.connections.insert(PeerId("b".into()));
        session.broadcast_except(&Packet::DrawCard, Some(&PeerId("a".into())));
        let targets: Vec<&PeerId> = session.transport.sent.iter().map(|(p, _)| p).collect();
        assert_eq!(targets, vec![&PeerId("b".into())]);
    }

    #[test]
    fn promotion_resets_role_and_owner() {
        let mut session =
            Session::join(FakeTransport::with_peer("me"), PeerId("host".into())).unwrap();
        session.promote_to_host();
        assert!(session.is_host());
        assert_eq!(session.owner_peer(), &PeerId("me".into()));
        assert_eq!(session.connections().count(), 0);
    }
}
