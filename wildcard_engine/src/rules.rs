// Pure play-legality and turn-order rules. No state, no randomness: these
// functions answer "may this card go on that card" and "who acts next",
// and the engine applies the answers.

use wildcard_protocol::model::Player;
use wildcard_protocol::types::{Card, CardFace, Color, PlayerId};

/// What placing a card does to the flow of the game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayDecision {
    /// Multiplier applied to the turn direction. -1 for Reverse.
    pub direction: i8,
    /// Forced draws added to the pending stack.
    pub stack_add: u32,
    /// Seats to advance past the actor. 2 means the next player is blocked.
    pub skip: u32,
    /// Whether the actor must pick a color before play continues.
    pub pick_color: bool,
}

impl PlayDecision {
    fn for_face(face: CardFace) -> Self {
        let base = PlayDecision {
            direction: 1,
            stack_add: 0,
            skip: 1,
            pick_color: false,
        };
        match face {
            CardFace::Number(_) => base,
            CardFace::Reverse => PlayDecision {
                direction: -1,
                ..base
            },
            CardFace::Block => PlayDecision { skip: 2, ..base },
            CardFace::PlusTwo => PlayDecision {
                stack_add: 2,
                ..base
            },
            CardFace::PlusFour => PlayDecision {
                stack_add: 4,
                pick_color: true,
                ..base
            },
            CardFace::ColorChange => PlayDecision {
                pick_color: true,
                ..base
            },
        }
    }
}

/// Whether `candidate` may be placed on `current` given the pending draw
/// stack, and what doing so changes. `None` means an illegal play.
///
/// With a stack pending, only draw cards may be chained. Otherwise the
/// usual matching applies: wilds go on anything, and everything else needs
/// a color or face match.
pub fn can_play_card(current: Option<&Card>, stack: u32, candidate: &Card) -> Option<PlayDecision> {
    let Some(current) = current else {
        return Some(PlayDecision::for_face(candidate.face));
    };
    if stack > 0 {
        // Only draw cards chain, and a PlusTwo may not answer a PlusFour.
        return match candidate.face {
            CardFace::PlusFour => Some(PlayDecision::for_face(candidate.face)),
            CardFace::PlusTwo if current.face != CardFace::PlusFour => {
                Some(PlayDecision::for_face(candidate.face))
            }
            _ => None,
        };
    }
    let matches = candidate.color == Color::Any
        || candidate.color == current.color
        || candidate.face == current.face;
    matches.then(|| PlayDecision::for_face(candidate.face))
}

/// Exact match used by stacking and jump-ins: same color and same face.
pub fn is_exact_match(a: &Card, b: &Card) -> bool {
    a.color == b.color && a.face == b.face
}

/// The player `by` seats after `current` in `direction`, walking the join
/// order and wrapping. Left players never count; with `only_online`,
/// disconnected players are skipped too. `None` when nobody qualifies.
pub fn next_player_id(
    players: &[Player],
    current: &PlayerId,
    by: u32,
    direction: i8,
    only_online: bool,
) -> Option<PlayerId> {
    if players.is_empty() || by == 0 {
        return None;
    }
    let start = players.iter().position(|p| &p.player_id == current)?;
    let len = players.len();
    let step: usize = if direction >= 0 { 1 } else { len - 1 };
    let mut idx = start;
    let mut remaining = by;
    // Bounded walk so a table of all-left seats terminates.
    for _ in 0..len.saturating_mul(by as usize) {
        idx = (idx + step) % len;
        let seat = &players[idx];
        if seat.is_online(only_online) {
            remaining -= 1;
            if remaining == 0 {
                return Some(seat.player_id.clone());
            }
        }
        if idx == start && remaining == by {
            return None;
        }
    }
    None
}

/// Situation a hand is being filtered against.
#[derive(Clone, Copy, Debug)]
pub struct PlayContext<'a> {
    pub current_card: Option<&'a Card>,
    pub stack: u32,
    pub is_current_player: bool,
    pub in_turn_delay: bool,
    pub is_blocked: bool,
    pub can_stack_cards: bool,
    pub can_jump_in: bool,
}

/// Which of `cards` are playable right now.
///
/// During the turn-delay window the only legal plays are exact-match
/// chains: the player who just placed may stack an identical card, and
/// anyone else (except a blocked player) may jump in with one. Outside the
/// window the normal matching rules apply to the current player only.
pub fn playable_cards<'a, I>(cards: I, ctx: &PlayContext<'_>) -> Vec<&'a Card>
where
    I: IntoIterator<Item = &'a Card>,
{
    cards
        .into_iter()
        .filter(|card| {
            if ctx.in_turn_delay {
                let allowed = if ctx.is_current_player {
                    ctx.can_stack_cards
                } else {
                    ctx.can_jump_in && !ctx.is_blocked
                };
                allowed
                    && ctx
                        .current_card
                        .is_some_and(|current| is_exact_match(current, card))
            } else {
                ctx.is_current_player && can_play_card(ctx.current_card, ctx.stack, card).is_some()
            }
        })
        .collect()
}
