// Obfuscated hand construction and lookup.
//
// A hand is a map of obfuscated card id → obfuscated fields, all under the
// owner's private id. The map is stored in that form on the host too, so
// the snapshot carries hands byte-for-byte as the host holds them and the
// host decrypts on demand like any client would. The obfuscated id is the
// handle clients present in PLACE_CARD and SAVE_CARD.

use wildcard_prng::GameRng;
use wildcard_protocol::model::{HandMap, ObfuscatedCard};
use wildcard_protocol::types::{Card, CardFace, Color, PrivateId};

use crate::config;
use crate::obfuscate::{uuid_v4, xor_decrypt, xor_encrypt};

/// Draw one card from the generation tables. With specials allowed, a coin
/// flip picks which table to draw from.
pub fn generate_card(rng: &mut GameRng, allow_specials: bool) -> Card {
    let pool = if allow_specials && rng.coin() {
        config::special_cards()
    } else {
        config::standard_cards()
    };
    pool[rng.pick_index(pool.len())]
}

/// Obfuscate a card under `private` and insert it into the hand. Returns
/// the obfuscated id the card is now known by.
pub fn deal_into(hand: &mut HandMap, card: Card, private: &PrivateId, rng: &mut GameRng) -> String {
    let id = xor_encrypt(&uuid_v4(rng), &private.0);
    let obf = ObfuscatedCard {
        color: xor_encrypt(card.color.token(), &private.0),
        face: xor_encrypt(&card.face.token(), &private.0),
    };
    hand.insert(id.clone(), obf);
    id
}

/// Decrypt one hand entry. `None` on a key mismatch or a token that does
/// not name a real card, both of which read as "not found".
pub fn decrypt_card(obf: &ObfuscatedCard, private: &PrivateId) -> Option<Card> {
    let color = Color::from_token(&xor_decrypt(&obf.color, &private.0)?)?;
    let face = CardFace::from_token(&xor_decrypt(&obf.face, &private.0)?)?;
    Some(Card::new(color, face))
}

/// Look up one card in a hand by its obfuscated id.
pub fn find_card(hand: &HandMap, card_id: &str, private: &PrivateId) -> Option<Card> {
    decrypt_card(hand.get(card_id)?, private)
}

/// Decrypt a whole hand, skipping entries that do not decode.
pub fn decrypt_hand(hand: &HandMap, private: &PrivateId) -> Vec<(String, Card)> {
    hand.iter()
        .filter_map(|(id, obf)| decrypt_card(obf, private).map(|c| (id.clone(), c)))
        .collect()
}
