// wildcard_protocol — wire protocol and shared data model for the peer mesh.
//
// This crate defines everything both sides of a connection must agree on:
// identifier newtypes, the card vocabulary, the lobby settings and player
// records, the snapshot shape, and the closed set of packets exchanged
// between the host and its clients. It has no dependency on the rules
// engine or the session layer — both depend on it.
//
// Module overview:
// - `types.rs`:  ID newtypes (`PeerId`, `PlayerId`, `PrivateId`, `SecretId`,
//                `CardId`) plus `Color`, `CardFace`, and `Card`.
// - `model.rs`:  `GameSettings`, `Player`, obfuscated hand maps, `GameState`,
//                and `Snapshot` — the full-state record broadcast after every
//                host-side mutation.
// - `packet.rs`: the `Packet` enum (one variant per message kind, internally
//                tagged for the wire), the post-decode `validate()` hook, and
//                the join-response codes.
//
// Design decisions:
// - **JSON wire format.** Payloads are small (the largest is a snapshot for
//   a handful of players) and the transport delivers discrete messages, so
//   there is no framing layer — one packet per payload.
// - **Closed tagged union.** Rather than a runtime registry of decoders,
//   packets are a single serde-tagged enum; adding a kind means adding a
//   variant, and the dispatcher's match stays exhaustive.

pub mod model;
pub mod packet;
pub mod types;

pub use model::{
    GameSettings, GameState, HandMap, ObfuscatedCard, PlacedCard, Player, PlayerStatus, Snapshot,
};
pub use packet::{JoinRequest, Packet, PacketError, codes};
pub use types::{Card, CardFace, CardId, Color, PeerId, PlayerId, PrivateId, SecretId};
