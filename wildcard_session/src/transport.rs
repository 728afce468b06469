// Transport abstraction over the peer mesh.
//
// The game never talks to sockets directly; it sees peers by id and
// strings of JSON. An implementation queues inbound traffic until `poll`
// drains it, reports liveness for the heartbeat sweep, and surfaces
// connection churn as events.

use thiserror::Error;

use wildcard_protocol::types::PeerId;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("peer {0} is unreachable")]
    Unreachable(PeerId),
    #[error("transport failure: {0}")]
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId, String),
    /// Raw inbound payload from a peer.
    Data(PeerId, String),
}

pub trait Transport {
    /// Open the local endpoint and return its peer id.
    fn open(&mut self) -> Result<PeerId, TransportError>;

    /// The local peer id, once open.
    fn local_peer(&self) -> Option<&PeerId>;

    /// Dial a remote peer.
    fn connect(&mut self, remote: &PeerId) -> Result<(), TransportError>;

    fn send(&mut self, to: &PeerId, raw: &str) -> Result<(), TransportError>;

    /// Whether the link to `peer` is currently up.
    fn is_alive(&self, peer: &PeerId) -> bool;

    /// Drain queued events since the last poll.
    fn poll(&mut self) -> Vec<TransportEvent>;

    fn close(&mut self);
}
