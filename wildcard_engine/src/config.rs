// Engine tunables and the card generation tables.

use wildcard_protocol::types::{Card, CardFace, Color};

/// Pause after a card is placed before the next turn begins, so stacking
/// and jump-ins have a window to land in.
pub const TURN_DELAY_MS: u64 = 2_000;

/// Pause between a win and the automatic next game.
pub const NEXT_GAME_DELAY_MS: u64 = 10_000;

/// Cards dealt to a player caught without calling UNO.
pub const UNO_PENALTY_CARDS: u32 = 2;

/// How long a disconnected player's seat is held for rejoin.
pub const REJOIN_WINDOW_MS: u64 = 120_000;

/// How long a migrated host waits for old peers to reconnect before the
/// game resumes without them.
pub const MIGRATION_GRACE_MS: u64 = 15_000;

/// Reconnect attempts a client makes toward a migrated host before giving up.
pub const MIGRATION_ATTEMPTS: u32 = 3;

/// Interval of the turn-clock countdown mirror.
pub const COUNTDOWN_TICK_MS: u64 = 1_000;

/// Liveness sweep interval for the session layer.
pub const HEARTBEAT_SWEEP_MS: u64 = 500;

/// The 40 standard cards: every pickable color crossed with digits 0 to 9.
pub fn standard_cards() -> Vec<Card> {
    let mut cards = Vec::with_capacity(40);
    for color in Color::PICKABLE {
        for n in 0..=9 {
            cards.push(Card::new(color, CardFace::Number(n)));
        }
    }
    cards
}

/// The 14 special cards: colored Reverse/Block/PlusTwo plus the wilds.
pub fn special_cards() -> Vec<Card> {
    let mut cards = Vec::with_capacity(14);
    for color in Color::PICKABLE {
        cards.push(Card::new(color, CardFace::Reverse));
        cards.push(Card::new(color, CardFace::Block));
        cards.push(Card::new(color, CardFace::PlusTwo));
    }
    cards.push(Card::new(Color::Any, CardFace::ColorChange));
    cards.push(Card::new(Color::Any, CardFace::PlusFour));
    cards
}
