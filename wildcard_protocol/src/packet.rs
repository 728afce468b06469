// Wire protocol: a closed, tagged set of packets exchanged over the mesh.
//
// Every message is one JSON object with a `packet_type` discriminant. The
// host relays its own outbound packets to every peer and answers client
// intents with per-recipient snapshots; only the join handshake is
// addressed point to point.
//
// `validate` covers stateless structural checks (field shape, bounds).
// State-dependent checks (is it your turn, does the card exist) live with
// the handlers, which have the game state in hand.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{GameSettings, Snapshot};
use crate::types::{CardId, Color, PeerId, PlayerId, PrivateId};

pub const USERNAME_MIN: usize = 2;
pub const USERNAME_MAX: usize = 24;
/// Avatars travel inline as data URLs; cap their size on the way in.
pub const AVATAR_MAX_BYTES: usize = 200 * 1024;

/// Join response codes, styled after HTTP.
pub mod codes {
    pub const OK: u16 = 200;
    pub const GAME_STARTED: u16 = 1002;
    pub const GAME_FULL: u16 = 1003;
    pub const BAD_USERNAME: u16 = 1004;
    pub const BAD_INVITE: u16 = 1005;
    pub const BAD_AVATAR: u16 = 1006;
}

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl PacketError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

/// Payload of a `JOIN_REQUEST`. The invite is the host's peer id, which is
/// a uuid; `private_id` is present only when reclaiming a previous seat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub invite: String,
    pub username: String,
    pub avatar: Option<String>,
    pub settings: GameSettings,
    pub private_id: Option<PrivateId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "packet_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Packet {
    /// A peer finished connecting. Synthesized locally, never sent.
    PeerConnect { peer_id: PeerId },
    /// A non-host peer dropped.
    PeerDisconnect { peer_id: PeerId, reason: String },
    /// The host dropped; triggers migration on clients.
    HostDisconnect { peer_id: PeerId, reason: String },
    JoinRequest(JoinRequest),
    JoinResponse { code: u16, message: String },
    GameStateSnapshot(Snapshot),
    PlaceCard { card_id: CardId },
    /// Keep a freshly drawn card instead of playing it immediately.
    SaveCard { card_id: CardId },
    DrawCard,
    ChangeColor { color: Color },
    UnoPress,
    KickPlayer { player_id: PlayerId, reason: String },
}

impl Packet {
    /// Discriminant tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::PeerConnect { .. } => "PEER_CONNECT",
            Packet::PeerDisconnect { .. } => "PEER_DISCONNECT",
            Packet::HostDisconnect { .. } => "HOST_DISCONNECT",
            Packet::JoinRequest(_) => "JOIN_REQUEST",
            Packet::JoinResponse { .. } => "JOIN_RESPONSE",
            Packet::GameStateSnapshot(_) => "GAME_STATE_SNAPSHOT",
            Packet::PlaceCard { .. } => "PLACE_CARD",
            Packet::SaveCard { .. } => "SAVE_CARD",
            Packet::DrawCard => "DRAW_CARD",
            Packet::ChangeColor { .. } => "CHANGE_COLOR",
            Packet::UnoPress => "UNO_PRESS",
            Packet::KickPlayer { .. } => "KICK_PLAYER",
        }
    }

    pub fn encode(&self) -> Result<String, PacketError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, PacketError> {
        let packet: Packet = serde_json::from_str(raw)?;
        packet.validate()?;
        Ok(packet)
    }

    /// Structural validation, independent of game state. A packet that
    /// decoded but fails here is treated the same as one that never parsed.
    pub fn validate(&self) -> Result<(), PacketError> {
        match self {
            Packet::PeerConnect { peer_id }
            | Packet::PeerDisconnect { peer_id, .. }
            | Packet::HostDisconnect { peer_id, .. } => {
                if peer_id.0.is_empty() {
                    return Err(PacketError::invalid("peer_id", "empty"));
                }
            }
            // Join field problems are answered with a coded refusal by the
            // host rather than dropped, so the request passes decode as-is.
            Packet::JoinRequest(_) => {}
            Packet::JoinResponse { message, .. } => {
                if message.len() > 512 {
                    return Err(PacketError::invalid("message", "too long"));
                }
            }
            Packet::GameStateSnapshot(_) | Packet::DrawCard | Packet::UnoPress => {}
            Packet::PlaceCard { card_id } | Packet::SaveCard { card_id } => {
                if card_id.0.is_empty() {
                    return Err(PacketError::invalid("card_id", "empty"));
                }
            }
            Packet::ChangeColor { color } => {
                if !color.is_pickable() {
                    return Err(PacketError::invalid("color", "not pickable"));
                }
            }
            Packet::KickPlayer { player_id, .. } => {
                if player_id.0.is_empty() {
                    return Err(PacketError::invalid("player_id", "empty"));
                }
            }
        }
        Ok(())
    }
}

impl JoinRequest {
    /// Field check mapped to a join response code. Unlike the rest of the
    /// protocol, a bad join request is answered, not dropped: the joiner
    /// has no state to resynchronize from and would otherwise hang.
    pub fn refusal(&self) -> Option<(u16, &'static str)> {
        if !self.invite.is_empty() && !is_uuid_format(&self.invite) {
            return Some((codes::BAD_INVITE, "invite is not a uuid"));
        }
        let name_len = self.username.chars().count();
        if !(USERNAME_MIN..=USERNAME_MAX).contains(&name_len) {
            return Some((codes::BAD_USERNAME, "username length out of range"));
        }
        if let Some(avatar) = &self.avatar {
            if !avatar.starts_with("data:image/") {
                return Some((codes::BAD_AVATAR, "avatar is not a data url"));
            }
            if avatar.len() > AVATAR_MAX_BYTES {
                return Some((codes::BAD_AVATAR, "avatar too large"));
            }
        }
        None
    }
}

/// Shape check for 8-4-4-4-12 lowercase-hex uuids.
pub fn is_uuid_format(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if *b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() || b.is_ascii_uppercase() {
                    return false;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Card, CardFace};

    const INVITE: &str = "1f0e2d3c-4b5a-4978-8695-a4b3c2d1e0f9";

    fn join_request() -> JoinRequest {
        JoinRequest {
            invite: INVITE.into(),
            username: "ruthie".into(),
            avatar: None,
            settings: GameSettings::default(),
            private_id: None,
        }
    }

    #[test]
    fn tag_matches_kind_for_every_variant() {
        let packets = [
            Packet::DrawCard,
            Packet::UnoPress,
            Packet::PlaceCard {
                card_id: CardId("c".into()),
            },
            Packet::ChangeColor { color: Color::Red },
            Packet::JoinRequest(join_request()),
        ];
        for packet in packets {
            let raw = packet.encode().unwrap();
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(value["packet_type"], packet.kind());
        }
    }

    #[test]
    fn place_card_roundtrip() {
        let packet = Packet::PlaceCard {
            card_id: CardId("deadbeef".into()),
        };
        let raw = packet.encode().unwrap();
        assert_eq!(Packet::decode(&raw).unwrap(), packet);
    }

    #[test]
    fn snapshot_roundtrip_preserves_current_card() {
        use crate::model::{GameState, PlacedCard, Snapshot};
        let mut state = GameState::new(PeerId(INVITE.into()), GameSettings::default());
        state.current_card = Some(PlacedCard {
            card: Card::new(Color::Red, CardFace::PlusTwo),
            placement_id: "placement-1".into(),
        });
        let packet = Packet::GameStateSnapshot(Snapshot {
            state,
            hands: Default::default(),
        });
        let raw = packet.encode().unwrap();
        assert_eq!(Packet::decode(&raw).unwrap(), packet);
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert!(Packet::decode(r#"{"packet_type":"TOTALLY_FAKE"}"#).is_err());
    }

    #[test]
    fn decode_rejects_unpickable_color() {
        let raw = r#"{"packet_type":"CHANGE_COLOR","color":"ANY"}"#;
        assert!(Packet::decode(raw).is_err());
    }

    fn refusal_code(req: &JoinRequest) -> Option<u16> {
        req.refusal().map(|(code, _)| code)
    }

    #[test]
    fn join_request_refuses_bad_usernames_with_a_code() {
        let mut req = join_request();
        req.username = "x".into();
        assert_eq!(refusal_code(&req), Some(codes::BAD_USERNAME));
        req.username = "y".repeat(25);
        assert_eq!(refusal_code(&req), Some(codes::BAD_USERNAME));
        req.username = "ok".into();
        assert_eq!(refusal_code(&req), None);
    }

    #[test]
    fn join_request_refuses_bad_invite_shapes_with_a_code() {
        let mut req = join_request();
        req.invite = "not-a-uuid".into();
        assert_eq!(refusal_code(&req), Some(codes::BAD_INVITE));
        req.invite = String::new();
        assert_eq!(refusal_code(&req), None, "empty invite allowed at create time");
    }

    #[test]
    fn join_request_refuses_bad_avatars_with_a_code() {
        let mut req = join_request();
        req.avatar = Some("http://example.com/x.png".into());
        assert_eq!(refusal_code(&req), Some(codes::BAD_AVATAR));
        req.avatar = Some("data:image/png;base64,AAAA".into());
        assert_eq!(refusal_code(&req), None);
        req.avatar = Some(format!("data:image/png;base64,{}", "A".repeat(AVATAR_MAX_BYTES)));
        assert_eq!(refusal_code(&req), Some(codes::BAD_AVATAR));
    }

    #[test]
    fn decode_passes_a_field_invalid_join_request_through() {
        let raw = Packet::JoinRequest(JoinRequest {
            username: "x".into(),
            ..join_request()
        })
        .encode()
        .unwrap();
        assert!(Packet::decode(&raw).is_ok(), "the host answers, decode must not drop");
    }

    #[test]
    fn uuid_format_check() {
        assert!(is_uuid_format(INVITE));
        assert!(!is_uuid_format("1F0E2D3C-4B5A-4978-8695-A4B3C2D1E0F9"));
        assert!(!is_uuid_format("1f0e2d3c4b5a49788695a4b3c2d1e0f9"));
        assert!(!is_uuid_format(""));
    }
}
