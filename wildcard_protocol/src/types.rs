// Identifier newtypes and the card vocabulary.
//
// Identifiers are strings on the wire: peer ids come from the transport,
// player ids are a one-way hash of the private id, card ids are UUIDs minted
// by the host. Newtypes keep them from being mixed up — a `PeerId` names a
// connection (and changes across reconnects), a `PlayerId` names an identity
// (and survives them).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport-level connection id. Assigned by the transport adapter; a peer
/// gets a fresh one each time it reconnects or migrates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

/// Public player identity: a one-way, lossy hash of the private id. Safe to
/// broadcast; cannot be reversed into the private id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub String);

/// Secret identity proof. Known only to the owning peer and, once joined, to
/// the host. Doubles as the key obfuscating that player's hand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrivateId(pub String);

/// `encrypt(public_id, private_id)`, stored by the host at join time so a
/// future host that never saw the private id can still verify a rejoining
/// peer's claim: `decrypt(secret_id, presented_private) == public_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretId(pub String);

/// Plaintext card id (UUID v4). Hands store these obfuscated; packets carry
/// them in the clear, because a card id is only meaningful to whoever can
/// already decrypt the hand it lives in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Card color. `Any` appears only on `ColorChange` and `PlusFour` faces and
/// is replaced by the player's pick once the card is placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Color {
    Blue,
    Green,
    Red,
    Yellow,
    Any,
}

impl Color {
    /// The four colors a player may pick for a wild card.
    pub const PICKABLE: [Color; 4] = [Color::Blue, Color::Green, Color::Red, Color::Yellow];

    /// Whether this color is a legal pick for a wild card.
    pub fn is_pickable(self) -> bool {
        self != Color::Any
    }

    /// Stable token used for hand obfuscation (cipher input).
    pub fn token(self) -> &'static str {
        match self {
            Color::Blue => "BLUE",
            Color::Green => "GREEN",
            Color::Red => "RED",
            Color::Yellow => "YELLOW",
            Color::Any => "ANY",
        }
    }

    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "BLUE" => Some(Color::Blue),
            "GREEN" => Some(Color::Green),
            "RED" => Some(Color::Red),
            "YELLOW" => Some(Color::Yellow),
            "ANY" => Some(Color::Any),
            _ => None,
        }
    }
}

/// Card face: the ten number cards plus the five specials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardFace {
    Number(u8),
    Reverse,
    Block,
    PlusTwo,
    PlusFour,
    ColorChange,
}

impl CardFace {
    /// Stable token used for hand obfuscation (cipher input).
    pub fn token(self) -> String {
        match self {
            CardFace::Number(n) => n.to_string(),
            CardFace::Reverse => "REVERSE".into(),
            CardFace::Block => "BLOCK".into(),
            CardFace::PlusTwo => "PLUS_TWO".into(),
            CardFace::PlusFour => "PLUS_FOUR".into(),
            CardFace::ColorChange => "COLOR_CHANGE".into(),
        }
    }

    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "REVERSE" => Some(CardFace::Reverse),
            "BLOCK" => Some(CardFace::Block),
            "PLUS_TWO" => Some(CardFace::PlusTwo),
            "PLUS_FOUR" => Some(CardFace::PlusFour),
            "COLOR_CHANGE" => Some(CardFace::ColorChange),
            digit => digit
                .parse::<u8>()
                .ok()
                .filter(|n| *n <= 9)
                .map(CardFace::Number),
        }
    }

    /// Whether placing this face requires the actor to pick a color.
    pub fn needs_color_pick(self) -> bool {
        matches!(self, CardFace::PlusFour | CardFace::ColorChange)
    }
}

/// A card: color + face. `Color::Any` only ever pairs with `ColorChange`
/// or `PlusFour`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub color: Color,
    pub face: CardFace,
}

impl Card {
    pub const fn new(color: Color, face: CardFace) -> Self {
        Self { color, face }
    }
}
