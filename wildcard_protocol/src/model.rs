// Shared data model: lobby settings, player records, hands, and the
// full-state snapshot broadcast after every host-side mutation.
//
// These types are both the wire shape and the canonical shape — the host
// mutates a `GameState` directly, and clients replace their read-only mirror
// wholesale with the one carried in each `Snapshot`. Hands are stored
// obfuscated at rest, so the canonical map and the wire map are the same
// type; the only per-recipient work is blanking private ids (`trim_for`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Card, CardId, PeerId, PlayerId, PrivateId, SecretId};

/// Turn order directions.
pub const DIRECTION_FORWARD: i8 = 1;
pub const DIRECTION_REVERSE: i8 = -1;

/// Lobby-time settings. Immutable once the game starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    pub max_players: u32,
    pub max_cards: u32,
    pub start_cards: u32,
    /// Per-turn time budget in seconds. Zero disables the turn clock.
    pub turn_seconds: u32,
    pub draw_to_match: bool,
    pub can_stack_cards: bool,
    pub can_jump_in: bool,
    pub can_uno: bool,
    pub can_rejoin: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_players: 4,
            max_cards: 100,
            start_cards: 7,
            turn_seconds: 60,
            draw_to_match: true,
            can_stack_cards: true,
            can_jump_in: true,
            can_uno: true,
            can_rejoin: true,
        }
    }
}

impl GameSettings {
    /// Clamp every numeric field into its legal range. Applied by the host
    /// when a game is created, so out-of-range values from a hand-edited
    /// join request cannot wedge the rules engine.
    pub fn clamped(mut self) -> Self {
        self.max_players = self.max_players.clamp(2, 100);
        self.max_cards = self.max_cards.clamp(2, 999);
        self.start_cards = self.start_cards.clamp(1, 100);
        self.turn_seconds = self.turn_seconds.min(999);
        self
    }
}

/// Connection status of a player, as tracked by the host.
///
/// `Disconnected` players keep their state and may reclaim their identity by
/// presenting their private id within the rejoin window. `Left` players are
/// removed permanently and cannot rejoin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerStatus {
    Connected,
    Disconnected,
    Left,
}

/// One seat at the table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: PlayerId,
    /// Blanked for every recipient except the owner when a snapshot is sent.
    pub private_id: Option<PrivateId>,
    pub secret_id: Option<SecretId>,
    pub peer_id: PeerId,
    pub username: String,
    pub avatar: Option<String>,
    pub card_count: u32,
    pub status: PlayerStatus,
    /// Wall-clock ms of the most recent disconnect, for the rejoin window.
    pub disconnected_at: Option<u64>,
}

impl Player {
    /// Whether the player still holds a seat. With `strict`, a temporarily
    /// disconnected player does not count.
    pub fn is_online(&self, strict: bool) -> bool {
        match self.status {
            PlayerStatus::Left => false,
            PlayerStatus::Disconnected => !strict,
            PlayerStatus::Connected => true,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.status == PlayerStatus::Disconnected
    }

    pub fn mark_disconnected(&mut self, now_ms: u64) {
        self.status = PlayerStatus::Disconnected;
        self.disconnected_at = Some(now_ms);
    }

    pub fn mark_reconnected(&mut self) {
        self.status = PlayerStatus::Connected;
        self.disconnected_at = None;
    }
}

/// One obfuscated hand entry: color and face tokens, each XOR-encrypted
/// under the owning player's private id and hex-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscatedCard {
    pub color: String,
    pub face: String,
}

/// A hand: obfuscated card id → obfuscated card fields.
pub type HandMap = BTreeMap<String, ObfuscatedCard>;

/// The card on top of the discard pile. `placement_id` is regenerated every
/// time a card is placed so clients can key animations on it; it has no
/// rules meaning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacedCard {
    pub card: Card,
    pub placement_id: String,
}

/// Canonical game state. Owned and mutated only by the host; clients hold a
/// read-only mirror replaced wholesale on each snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Peer id of the current host (the room id). Updated by migration.
    pub owner_peer_id: PeerId,
    pub settings: GameSettings,
    /// Seats in join order — this order *is* the turn order.
    pub players: Vec<Player>,
    pub started: bool,
    pub migrating: bool,
    /// Pending forced-draw count from chained PlusTwo/PlusFour plays.
    pub stack: u32,
    pub direction: i8,
    pub current_card: Option<PlacedCard>,
    pub current_player_id: Option<PlayerId>,
    pub winner_id: Option<PlayerId>,
    /// Player with a pending "forgot to call UNO" callout.
    pub uno_id: Option<PlayerId>,
    /// Player skipped by the most recent Block; may not jump in this turn.
    pub blocked_id: Option<PlayerId>,
    pub who_jumped_id: Option<PlayerId>,
    pub who_got_jumped_id: Option<PlayerId>,
    pub choosing_color: bool,
    pub choosing_card_id: Option<CardId>,
    /// Whether the post-play turn-delay window is open.
    pub turn_delay: bool,
    /// Countdown mirror of the turn clock, for rejoining clients.
    pub turn_seconds_left: u32,
}

impl GameState {
    pub fn new(owner_peer_id: PeerId, settings: GameSettings) -> Self {
        Self {
            owner_peer_id,
            settings,
            players: Vec::new(),
            started: false,
            migrating: false,
            stack: 0,
            direction: DIRECTION_FORWARD,
            current_card: None,
            current_player_id: None,
            winner_id: None,
            uno_id: None,
            blocked_id: None,
            who_jumped_id: None,
            who_got_jumped_id: None,
            choosing_color: false,
            choosing_card_id: None,
            turn_delay: false,
            turn_seconds_left: 0,
        }
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.player_id == id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.player_id == id)
    }

    pub fn player_by_peer(&self, peer: &PeerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.peer_id == peer)
    }

    pub fn player_by_peer_mut(&mut self, peer: &PeerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.peer_id == peer)
    }

    pub fn player_by_private(&self, private: &PrivateId) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.private_id.as_ref() == Some(private))
    }

    /// Number of seated (non-left) players; with `strict`, connected only.
    pub fn online_count(&self, strict: bool) -> usize {
        self.players.iter().filter(|p| p.is_online(strict)).count()
    }

    pub fn has_winner(&self) -> bool {
        self.winner_id.is_some()
    }

    pub fn is_current(&self, id: &PlayerId) -> bool {
        self.current_player_id.as_ref() == Some(id)
    }
}

/// Full-state snapshot: the game state plus every player's obfuscated hand.
///
/// Broadcast to every connection (including a loop-back to the host itself)
/// after each mutation. Before sending, the host calls `trim_for` per
/// recipient so nobody else's private id travels on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: GameState,
    pub hands: BTreeMap<PlayerId, HandMap>,
}

impl Snapshot {
    /// Blank every private id except the recipient's own, and optionally
    /// strip avatars (migration-progress broadcasts do, to stay small).
    pub fn trim_for(mut self, recipient: &PeerId, keep_avatars: bool) -> Self {
        for player in &mut self.state.players {
            if &player.peer_id != recipient {
                player.private_id = None;
            }
            if !keep_avatars {
                player.avatar = None;
            }
        }
        self
    }
}
