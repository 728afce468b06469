// The stateful rules engine. One instance lives on the host; it owns the
// canonical `GameState`, every obfuscated hand, the PRNG, and the
// scheduler. Callers resolve peers to player ids first, then feed intents
// here; every mutating method either rejects with an `EngineError` (the
// caller logs and drops) or leaves the state ready to snapshot.
//
// Timer keys armed here are drained by the session tick pump, which calls
// back into `finish_turn_delay`, `countdown_tick`, `start_game`, and the
// forced-action path for an expired turn clock.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use wildcard_prng::GameRng;
use wildcard_protocol::model::{
    GameSettings, GameState, HandMap, PlacedCard, Player, PlayerStatus, Snapshot,
};
use wildcard_protocol::types::{Card, Color, PeerId, PlayerId, PrivateId};

use crate::config;
use crate::hand;
use crate::obfuscate;
use crate::rules;
use crate::sched::{Scheduler, TimerKey};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("game has not started")]
    NotStarted,
    #[error("game has already started")]
    GameStarted,
    #[error("game is full")]
    GameFull,
    #[error("game is over")]
    GameOver,
    #[error("unknown player")]
    UnknownPlayer,
    #[error("not this player's turn")]
    NotYourTurn,
    #[error("card not found")]
    CardNotFound,
    #[error("play is not legal")]
    IllegalPlay,
    #[error("a color pick is pending")]
    ChoosingColor,
    #[error("no color pick is pending")]
    NotChoosingColor,
    #[error("no drawn card is pending")]
    NotChoosingCard,
    #[error("turn delay is active")]
    TurnDelayActive,
}

/// What a successful placement did, for the caller's logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceOutcome {
    pub won: bool,
    pub pick_color: bool,
    pub jumped_in: bool,
}

pub struct RulesEngine {
    pub state: GameState,
    pub hands: BTreeMap<PlayerId, HandMap>,
    pub sched: Scheduler,
    rng: GameRng,
    /// Next player cached when the delay starts, so the handover is stable
    /// even if seats change during the window.
    pending_turn_target: Option<PlayerId>,
    /// Set while the tick pump replays a forced action for an expired
    /// turn clock; changes the draw-to-match behavior.
    pub ran_out_of_time: bool,
}

impl RulesEngine {
    pub fn new(owner_peer_id: PeerId, settings: GameSettings, rng: GameRng) -> Self {
        Self {
            state: GameState::new(owner_peer_id, settings.clamped()),
            hands: BTreeMap::new(),
            sched: Scheduler::new(),
            rng,
            pending_turn_target: None,
            ran_out_of_time: false,
        }
    }

    /// Replace the canonical state wholesale. Used when a client promotes
    /// its mirror into a host-side engine during migration.
    pub fn adopt(state: GameState, hands: BTreeMap<PlayerId, HandMap>, rng: GameRng) -> Self {
        Self {
            state,
            hands,
            sched: Scheduler::new(),
            rng,
            pending_turn_target: None,
            ran_out_of_time: false,
        }
    }

    pub fn rng_mut(&mut self) -> &mut GameRng {
        &mut self.rng
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            hands: self.hands.clone(),
        }
    }

    // ---- seats ----------------------------------------------------------

    /// Seat a brand-new player. The private id is minted here, at join
    /// time, and reaches its owner only inside their own trimmed snapshot.
    pub fn add_player(
        &mut self,
        peer_id: PeerId,
        username: String,
        avatar: Option<String>,
    ) -> Result<PlayerId, EngineError> {
        if self.state.started {
            return Err(EngineError::GameStarted);
        }
        if self.state.online_count(false) >= self.state.settings.max_players as usize {
            return Err(EngineError::GameFull);
        }
        let private = PrivateId(obfuscate::uuid_v4(&mut self.rng));
        let player_id = obfuscate::derive_player_id(&private);
        let secret = obfuscate::derive_secret_id(&player_id, &private);
        info!(player = %player_id, %username, "player joined");
        self.state.players.push(Player {
            player_id: player_id.clone(),
            private_id: Some(private),
            secret_id: Some(secret),
            peer_id,
            username,
            avatar,
            card_count: 0,
            status: PlayerStatus::Connected,
            disconnected_at: None,
        });
        self.hands.insert(player_id.clone(), HandMap::new());
        Ok(player_id)
    }

    /// Reclaim a disconnected seat with a presented private id. Matches
    /// either the stored private id or, on a migrated host that never saw
    /// the original, the stored secret id.
    pub fn try_rejoin(
        &mut self,
        peer_id: PeerId,
        presented: &PrivateId,
        now_ms: u64,
    ) -> Option<PlayerId> {
        if !self.state.settings.can_rejoin {
            return None;
        }
        let window = config::REJOIN_WINDOW_MS;
        let seat = self.state.players.iter_mut().find(|p| {
            let owns = p.private_id.as_ref() == Some(presented)
                || p.secret_id
                    .as_ref()
                    .is_some_and(|s| obfuscate::verify_secret(s, &p.player_id, presented));
            owns && p.status != PlayerStatus::Left
        })?;
        if seat.status == PlayerStatus::Disconnected
            && seat
                .disconnected_at
                .is_some_and(|t| now_ms.saturating_sub(t) > window)
        {
            return None;
        }
        seat.peer_id = peer_id;
        seat.private_id = Some(presented.clone());
        seat.mark_reconnected();
        let player_id = seat.player_id.clone();
        self.sched.cancel(&TimerKey::Rejoin(player_id.clone()));
        info!(player = %player_id, "player rejoined");
        Some(player_id)
    }

    /// Whether a join request carrying this private id may reclaim a seat.
    pub fn can_player_rejoin(&self, presented: &PrivateId, now_ms: u64) -> bool {
        if !self.state.settings.can_rejoin {
            return false;
        }
        self.state.players.iter().any(|p| {
            let owns = p.private_id.as_ref() == Some(presented)
                || p.secret_id
                    .as_ref()
                    .is_some_and(|s| obfuscate::verify_secret(s, &p.player_id, presented));
            owns
                && p.status != PlayerStatus::Left
                && !(p.status == PlayerStatus::Disconnected
                    && p.disconnected_at
                        .is_some_and(|t| now_ms.saturating_sub(t) > config::REJOIN_WINDOW_MS))
        })
    }

    /// Mark a seat disconnected, or remove it outright when the game has
    /// not started or rejoin is off. If it was that player's turn, play
    /// moves on immediately.
    pub fn player_dropped(&mut self, player_id: &PlayerId, now_ms: u64) {
        if self.state.player(player_id).is_none() {
            return;
        }
        if !self.state.started || !self.state.settings.can_rejoin {
            self.remove_player(player_id, now_ms);
            return;
        }
        if let Some(seat) = self.state.player_mut(player_id) {
            seat.mark_disconnected(now_ms);
        }
        info!(player = %player_id, "player disconnected, holding seat");
        self.sched.arm(
            TimerKey::Rejoin(player_id.clone()),
            now_ms,
            config::REJOIN_WINDOW_MS,
        );
        self.skip_if_current(player_id, now_ms);
    }

    /// Remove a seat permanently. Turn, color pick, and pending card are
    /// resolved first so play never points at a missing player.
    pub fn remove_player(&mut self, player_id: &PlayerId, now_ms: u64) {
        if self.state.player(player_id).is_none() {
            return;
        }
        self.skip_if_current(player_id, now_ms);
        if let Some(seat) = self.state.player_mut(player_id) {
            seat.status = PlayerStatus::Left;
        }
        if self.pending_turn_target.as_ref() == Some(player_id) {
            self.pending_turn_target = rules::next_player_id(
                &self.state.players,
                player_id,
                1,
                self.state.direction,
                true,
            );
        }
        self.state.players.retain(|p| &p.player_id != player_id);
        self.hands.remove(player_id);
        self.sched.cancel(&TimerKey::Rejoin(player_id.clone()));
        if self.state.uno_id.as_ref() == Some(player_id) {
            self.state.uno_id = None;
        }
        info!(player = %player_id, "player removed");
    }

    fn skip_if_current(&mut self, player_id: &PlayerId, now_ms: u64) {
        if self.state.has_winner() || !self.state.is_current(player_id) || self.state.turn_delay {
            return;
        }
        if self.state.choosing_color {
            let color = self.random_color();
            let _ = self.apply_color(color);
        }
        self.state.choosing_card_id = None;
        self.state.current_player_id = rules::next_player_id(
            &self.state.players,
            player_id,
            1,
            self.state.direction,
            true,
        );
        self.start_turn_clock(now_ms);
    }

    // ---- lifecycle ------------------------------------------------------

    /// Deal and begin. Also serves as the automatic restart after a win;
    /// everything per-round is reset, seats and settings carry over.
    pub fn start_game(&mut self, now_ms: u64) -> Result<(), EngineError> {
        if self.state.online_count(true) < 2 {
            return Err(EngineError::UnknownPlayer);
        }
        self.sched.cancel(&TimerKey::NextGame);
        let s = &mut self.state;
        s.started = true;
        s.stack = 0;
        s.direction = 1;
        s.winner_id = None;
        s.uno_id = None;
        s.blocked_id = None;
        s.who_jumped_id = None;
        s.who_got_jumped_id = None;
        s.choosing_color = false;
        s.choosing_card_id = None;
        s.turn_delay = false;
        self.pending_turn_target = None;
        self.ran_out_of_time = false;

        let start_cards = self.state.settings.start_cards;
        let seats: Vec<(PlayerId, PrivateId)> = self
            .state
            .players
            .iter()
            .filter(|p| p.is_online(false))
            .filter_map(|p| Some((p.player_id.clone(), p.private_id.clone()?)))
            .collect();
        for (player_id, private) in &seats {
            let hand = self.hands.entry(player_id.clone()).or_default();
            hand.clear();
            for _ in 0..start_cards {
                let card = hand::generate_card(&mut self.rng, true);
                hand::deal_into(hand, card, private, &mut self.rng);
            }
            self.sync_count(player_id);
        }

        // Open on a plain number so the first turn has no side effects.
        let starters = config::standard_cards();
        let starter = starters[self.rng.pick_index(starters.len())];
        self.state.current_card = Some(self.place(starter));

        let online: Vec<PlayerId> = self
            .state
            .players
            .iter()
            .filter(|p| p.is_online(true))
            .map(|p| p.player_id.clone())
            .collect();
        self.state.current_player_id = Some(online[self.rng.pick_index(online.len())].clone());
        info!(players = online.len(), "game started");
        self.start_turn_clock(now_ms);
        Ok(())
    }

    fn place(&mut self, card: Card) -> PlacedCard {
        PlacedCard {
            card,
            placement_id: obfuscate::uuid_v4(&mut self.rng),
        }
    }

    fn set_winner(&mut self, player_id: PlayerId, now_ms: u64) {
        info!(player = %player_id, "round won");
        self.state.winner_id = Some(player_id);
        self.state.turn_delay = false;
        self.pending_turn_target = None;
        self.sched.cancel(&TimerKey::TurnClock);
        self.sched.cancel(&TimerKey::TurnDelay);
        self.sched.cancel(&TimerKey::Countdown);
        self.sched
            .arm(TimerKey::NextGame, now_ms, config::NEXT_GAME_DELAY_MS);
    }

    pub fn random_color(&mut self) -> Color {
        Color::PICKABLE[self.rng.pick_index(Color::PICKABLE.len())]
    }

    // ---- turn flow ------------------------------------------------------

    /// Arm the per-turn clock for the current player. A zero `turn_seconds`
    /// means an unlimited turn; a disconnected current player gets a clock
    /// that fires on the next tick so the forced action runs immediately.
    pub fn start_turn_clock(&mut self, now_ms: u64) {
        self.state.blocked_id = None;
        self.state.turn_delay = false;
        self.pending_turn_target = None;
        // An uncalled UNO is forgiven once the turn comes back around.
        if self.state.uno_id.is_some() && self.state.uno_id == self.state.current_player_id {
            self.state.uno_id = None;
        }
        self.sched.cancel(&TimerKey::TurnDelay);
        if self.state.has_winner() {
            self.sched.cancel(&TimerKey::TurnClock);
            self.sched.cancel(&TimerKey::Countdown);
            return;
        }
        let offline = self
            .state
            .current_player_id
            .as_ref()
            .and_then(|id| self.state.player(id))
            .is_some_and(|p| p.is_disconnected());
        let seconds = self.state.settings.turn_seconds;
        if offline {
            self.sched.arm(TimerKey::TurnClock, now_ms, 0);
            self.sched.cancel(&TimerKey::Countdown);
            return;
        }
        if seconds == 0 {
            self.sched.cancel(&TimerKey::TurnClock);
            self.sched.cancel(&TimerKey::Countdown);
            self.state.turn_seconds_left = 0;
            return;
        }
        // Extra half second so a countdown showing 0 is never skipped early.
        self.sched
            .arm(TimerKey::TurnClock, now_ms, u64::from(seconds) * 1000 + 500);
        self.sched
            .arm_repeating(TimerKey::Countdown, now_ms, config::COUNTDOWN_TICK_MS);
        self.state.turn_seconds_left = seconds;
    }

    /// Open the post-play window during which stacking and jump-ins may
    /// land. The handover target is computed now and cached.
    pub fn start_turn_delay(&mut self, actor: &PlayerId, by: u32, now_ms: u64) {
        self.pending_turn_target =
            rules::next_player_id(&self.state.players, actor, by, self.state.direction, true);
        self.state.turn_delay = true;
        self.sched.cancel(&TimerKey::TurnClock);
        self.sched.cancel(&TimerKey::Countdown);
        self.sched
            .arm(TimerKey::TurnDelay, now_ms, config::TURN_DELAY_MS);
    }

    /// Close the delay window: hand the turn to the cached target and arm
    /// their clock.
    pub fn finish_turn_delay(&mut self, now_ms: u64) {
        self.state.turn_delay = false;
        if let Some(target) = self.pending_turn_target.take() {
            self.state.current_player_id = Some(target);
        }
        self.start_turn_clock(now_ms);
    }

    pub fn countdown_tick(&mut self) {
        self.state.turn_seconds_left = self.state.turn_seconds_left.saturating_sub(1);
    }

    // ---- intents --------------------------------------------------------

    pub fn place_card(
        &mut self,
        actor: &PlayerId,
        card_id: &str,
        now_ms: u64,
    ) -> Result<PlaceOutcome, EngineError> {
        if !self.state.started {
            return Err(EngineError::NotStarted);
        }
        if self.state.has_winner() {
            return Err(EngineError::GameOver);
        }
        if self.state.choosing_color {
            return Err(EngineError::ChoosingColor);
        }
        let private = self
            .state
            .player(actor)
            .and_then(|p| p.private_id.clone())
            .ok_or(EngineError::UnknownPlayer)?;
        let is_current = self.state.is_current(actor);
        if !self.state.turn_delay && !is_current {
            return Err(EngineError::NotYourTurn);
        }
        let hand = self.hands.get(actor).ok_or(EngineError::UnknownPlayer)?;
        let card = hand::find_card(hand, card_id, &private).ok_or(EngineError::CardNotFound)?;
        let jumped_in = !is_current;

        if self.state.turn_delay {
            let allowed = if jumped_in {
                self.state.settings.can_jump_in && self.state.blocked_id.as_ref() != Some(actor)
            } else {
                self.state.settings.can_stack_cards
            };
            let exact = self
                .state
                .current_card
                .as_ref()
                .is_some_and(|placed| rules::is_exact_match(&placed.card, &card));
            if !allowed || !exact {
                return Err(EngineError::IllegalPlay);
            }
        }

        let current = self.state.current_card.as_ref().map(|p| &p.card);
        let decision = rules::can_play_card(current, self.state.stack, &card)
            .ok_or(EngineError::IllegalPlay)?;

        debug!(player = %actor, ?card, jumped_in, "card placed");
        if jumped_in {
            self.state.who_jumped_id = Some(actor.clone());
            self.state.who_got_jumped_id = self
                .pending_turn_target
                .clone()
                .or_else(|| self.state.current_player_id.clone());
        } else {
            self.state.who_jumped_id = None;
            self.state.who_got_jumped_id = None;
        }

        self.state.direction *= decision.direction;
        self.state.stack += decision.stack_add;
        self.state.current_card = Some(self.place(card));
        self.state.current_player_id = Some(actor.clone());
        self.state.choosing_card_id = None;
        self.state.choosing_color = decision.pick_color;
        if let Some(h) = self.hands.get_mut(actor) {
            h.remove(card_id);
        }
        self.sync_count(actor);

        self.state.blocked_id = (decision.skip >= 2)
            .then(|| {
                rules::next_player_id(&self.state.players, actor, 1, self.state.direction, true)
            })
            .flatten();

        let remaining = self.hands.get(actor).map_or(0, BTreeMap::len);
        if remaining == 1 && self.state.settings.can_uno {
            self.state.uno_id = Some(actor.clone());
        }
        if remaining == 0 {
            self.set_winner(actor.clone(), now_ms);
            return Ok(PlaceOutcome {
                won: true,
                pick_color: false,
                jumped_in,
            });
        }

        if !decision.pick_color {
            if jumped_in {
                // A jump-in steals the turn outright; the jumper then
                // plays a normal turn of their own.
                self.start_turn_clock(now_ms);
            } else {
                self.start_turn_delay(actor, decision.skip, now_ms);
            }
        }
        Ok(PlaceOutcome {
            won: false,
            pick_color: decision.pick_color,
            jumped_in,
        })
    }

    pub fn change_color(
        &mut self,
        actor: &PlayerId,
        color: Color,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        if !self.state.started {
            return Err(EngineError::NotStarted);
        }
        if !self.state.choosing_color {
            return Err(EngineError::NotChoosingColor);
        }
        if self.state.turn_delay {
            return Err(EngineError::TurnDelayActive);
        }
        if !self.state.is_current(actor) {
            return Err(EngineError::NotYourTurn);
        }
        self.apply_color(color)?;
        if self.state.who_jumped_id.as_ref() == Some(actor) {
            self.start_turn_clock(now_ms);
        } else {
            self.start_turn_delay(actor, 1, now_ms);
        }
        Ok(())
    }

    fn apply_color(&mut self, color: Color) -> Result<(), EngineError> {
        if !color.is_pickable() {
            return Err(EngineError::IllegalPlay);
        }
        let placed = self
            .state
            .current_card
            .as_mut()
            .ok_or(EngineError::NotChoosingColor)?;
        if !placed.card.face.needs_color_pick() {
            return Err(EngineError::IllegalPlay);
        }
        placed.card.color = color;
        self.state.choosing_color = false;
        Ok(())
    }

    /// Keep a drawn card instead of playing it; the turn passes on.
    pub fn save_card(
        &mut self,
        actor: &PlayerId,
        card_id: &str,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        if !self.state.started {
            return Err(EngineError::NotStarted);
        }
        if !self.state.is_current(actor) {
            return Err(EngineError::NotYourTurn);
        }
        if self.state.choosing_card_id.is_none() {
            return Err(EngineError::NotChoosingCard);
        }
        let private = self
            .state
            .player(actor)
            .and_then(|p| p.private_id.clone())
            .ok_or(EngineError::UnknownPlayer)?;
        let hand = self.hands.get(actor).ok_or(EngineError::UnknownPlayer)?;
        if hand::find_card(hand, card_id, &private).is_none() {
            return Err(EngineError::CardNotFound);
        }
        // The card is already in the hand; this only declines to play it.
        self.state.current_player_id =
            rules::next_player_id(&self.state.players, actor, 1, self.state.direction, true);
        self.state.choosing_card_id = None;
        self.start_turn_clock(now_ms);
        Ok(())
    }

    pub fn draw_card(&mut self, actor: &PlayerId, now_ms: u64) -> Result<(), EngineError> {
        if !self.state.started {
            return Err(EngineError::NotStarted);
        }
        if self.state.has_winner() {
            return Err(EngineError::GameOver);
        }
        if self.state.choosing_color {
            return Err(EngineError::ChoosingColor);
        }
        if self.state.turn_delay {
            return Err(EngineError::TurnDelayActive);
        }
        if self.state.choosing_card_id.is_some() {
            return Err(EngineError::NotChoosingCard);
        }
        if !self.state.is_current(actor) {
            return Err(EngineError::NotYourTurn);
        }
        let private = self
            .state
            .player(actor)
            .and_then(|p| p.private_id.clone())
            .ok_or(EngineError::UnknownPlayer)?;

        let current = self.state.current_card.as_ref().map(|p| p.card);
        let stack = self.state.stack;
        let could_play_before = self
            .hands
            .get(actor)
            .map(|h| hand::decrypt_hand(h, &private))
            .unwrap_or_default()
            .iter()
            .any(|(_, c)| rules::can_play_card(current.as_ref(), stack, c).is_some());

        // A pending stack is drawn whole; otherwise one card, or more when
        // drawing to match. A forced draw on timeout never draws to match.
        let mut amount = if stack > 0 { stack } else { 1 };
        let draw_to_match = self.state.settings.draw_to_match;
        let max_cards = self.state.settings.max_cards as usize;
        let mut can_play_after = false;
        let mut choosable: Option<String> = None;
        debug!(player = %actor, amount, "drawing cards");

        while amount != 0 && self.hands.get(actor).map_or(0, BTreeMap::len) < max_cards {
            let card = hand::generate_card(&mut self.rng, true);
            let hand = self.hands.get_mut(actor).ok_or(EngineError::UnknownPlayer)?;
            let id = hand::deal_into(hand, card, &private, &mut self.rng);
            if !can_play_after && rules::can_play_card(current.as_ref(), stack, &card).is_some() {
                can_play_after = true;
                choosable = Some(id);
            }
            let should_repeat = draw_to_match
                && stack == 0
                && !could_play_before
                && !can_play_after
                && !self.ran_out_of_time;
            if !should_repeat {
                amount -= 1;
            }
        }
        self.sync_count(actor);

        let count = self.hands.get(actor).map_or(0, BTreeMap::len);
        let mut turn_over = stack > 0 || could_play_before || self.ran_out_of_time;
        turn_over = turn_over
            || (draw_to_match && count >= max_cards && !can_play_after && !could_play_before);
        turn_over = turn_over || (!draw_to_match && !can_play_after && !could_play_before);

        if turn_over {
            self.state.current_player_id =
                rules::next_player_id(&self.state.players, actor, 1, self.state.direction, true);
            self.state.choosing_card_id = None;
            self.state.stack = 0;
            self.start_turn_clock(now_ms);
        } else {
            // Still this player's turn: they choose to play or keep the
            // drawn card. The clock is not reset, drawing is part of the
            // turn.
            self.state.choosing_card_id = choosable.map(wildcard_protocol::types::CardId);
            self.state.stack = 0;
        }
        Ok(())
    }

    /// A player hit the UNO button. The flag is set when someone drops to
    /// one card and lives until their turn comes back around; the flagged
    /// player pressing first makes the call safe, anyone else pressing
    /// deals them a penalty once the turn has moved past them. Returns
    /// whether a penalty was dealt.
    pub fn press_uno(&mut self, presser: &PlayerId, _now_ms: u64) -> Result<bool, EngineError> {
        if !self.state.started {
            return Err(EngineError::NotStarted);
        }
        if !self.state.settings.can_uno {
            return Err(EngineError::IllegalPlay);
        }
        let accused = self.state.uno_id.clone().ok_or(EngineError::IllegalPlay)?;
        if presser == &accused {
            self.state.uno_id = None;
            debug!(player = %presser, "uno called safely");
            return Ok(false);
        }
        // Too early: the callout only lands once the turn has moved past
        // the accused, and it stays pending until then.
        if self.state.is_current(&accused) {
            return Ok(false);
        }
        self.state.uno_id = None;
        if self.hands.get(&accused).map_or(0, BTreeMap::len) != 1 {
            return Ok(false);
        }
        let private = self
            .state
            .player(&accused)
            .and_then(|p| p.private_id.clone())
            .ok_or(EngineError::UnknownPlayer)?;
        if let Some(hand) = self.hands.get_mut(&accused) {
            for _ in 0..config::UNO_PENALTY_CARDS {
                let card = hand::generate_card(&mut self.rng, true);
                hand::deal_into(hand, card, &private, &mut self.rng);
            }
        }
        self.sync_count(&accused);
        info!(accused = %accused, caller = %presser, "uno penalty dealt");
        Ok(true)
    }

    fn sync_count(&mut self, player_id: &PlayerId) {
        let count = self.hands.get(player_id).map_or(0, BTreeMap::len) as u32;
        if let Some(seat) = self.state.player_mut(player_id) {
            seat.card_count = count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wildcard_protocol::types::CardFace;

    fn engine_with(players: u32, settings: GameSettings) -> (RulesEngine, Vec<PlayerId>) {
        let mut engine = RulesEngine::new(
            PeerId("host-peer".into()),
            settings,
            GameRng::new(0xfeed),
        );
        let ids = (0..players)
            .map(|n| {
                engine
                    .add_player(PeerId(format!("peer-{n}")), format!("player{n}"), None)
                    .unwrap()
            })
            .collect();
        (engine, ids)
    }

    fn started(players: u32, settings: GameSettings) -> (RulesEngine, Vec<PlayerId>) {
        let (mut engine, ids) = engine_with(players, settings);
        engine.start_game(0).unwrap();
        (engine, ids)
    }

    /// Force a known hand and table so play tests are deterministic.
    fn rig(
        engine: &mut RulesEngine,
        player: &PlayerId,
        cards: &[Card],
        table: Card,
    ) -> Vec<String> {
        let private = engine.state.player(player).unwrap().private_id.clone().unwrap();
        let hand = engine.hands.get_mut(player).unwrap();
        hand.clear();
        let ids = cards
            .iter()
            .map(|c| {
                let mut tmp = GameRng::new(engine.rng.next_u64());
                hand::deal_into(hand, *c, &private, &mut tmp)
            })
            .collect();
        engine.sync_count(player);
        engine.state.current_card = Some(PlacedCard {
            card: table,
            placement_id: "rigged".into(),
        });
        ids
    }

    fn make_current(engine: &mut RulesEngine, player: &PlayerId) {
        engine.state.current_player_id = Some(player.clone());
        engine.state.turn_delay = false;
        engine.state.choosing_color = false;
        engine.state.choosing_card_id = None;
    }

    #[test]
    fn join_mints_distinct_identities() {
        let (engine, ids) = engine_with(3, GameSettings::default());
        assert_eq!(ids.len(), 3);
        for seat in &engine.state.players {
            let private = seat.private_id.as_ref().unwrap();
            assert_eq!(obfuscate::derive_player_id(private), seat.player_id);
            assert!(obfuscate::verify_secret(
                seat.secret_id.as_ref().unwrap(),
                &seat.player_id,
                private
            ));
        }
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn join_rejected_when_full_or_started() {
        let settings = GameSettings {
            max_players: 2,
            ..GameSettings::default()
        };
        let (mut engine, _) = engine_with(2, settings);
        assert_eq!(
            engine.add_player(PeerId("late".into()), "late".into(), None),
            Err(EngineError::GameFull)
        );
        engine.start_game(0).unwrap();
        assert_eq!(
            engine.add_player(PeerId("later".into()), "later".into(), None),
            Err(EngineError::GameStarted)
        );
    }

    #[test]
    fn start_deals_and_opens_on_a_number() {
        let (engine, ids) = started(3, GameSettings::default());
        for id in &ids {
            assert_eq!(engine.hands[id].len(), 7);
            assert_eq!(engine.state.player(id).unwrap().card_count, 7);
        }
        let placed = engine.state.current_card.as_ref().unwrap();
        assert!(matches!(placed.card.face, CardFace::Number(_)));
        assert!(engine.state.current_player_id.is_some());
        assert!(engine.sched.is_armed(&TimerKey::TurnClock));
    }

    #[test]
    fn placing_a_matching_card_opens_the_delay_window() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        let hand_ids = rig(
            &mut engine,
            &actor,
            &[
                Card::new(Color::Red, CardFace::Number(5)),
                Card::new(Color::Blue, CardFace::Number(1)),
            ],
            Card::new(Color::Red, CardFace::Number(9)),
        );
        let outcome = engine.place_card(&actor, &hand_ids[0], 100).unwrap();
        assert!(!outcome.won);
        assert!(engine.state.turn_delay);
        assert!(engine.sched.is_armed(&TimerKey::TurnDelay));
        assert_eq!(engine.state.current_player_id, Some(actor.clone()));
        engine.finish_turn_delay(100 + config::TURN_DELAY_MS);
        assert_eq!(engine.state.current_player_id, Some(ids[1].clone()));
        assert!(!engine.state.turn_delay);
    }

    #[test]
    fn out_of_turn_play_is_rejected_outside_the_window() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let (current, other) = (ids[0].clone(), ids[1].clone());
        make_current(&mut engine, &current);
        let hand_ids = rig(
            &mut engine,
            &other,
            &[Card::new(Color::Red, CardFace::Number(9))],
            Card::new(Color::Red, CardFace::Number(9)),
        );
        assert_eq!(
            engine.place_card(&other, &hand_ids[0], 0),
            Err(EngineError::NotYourTurn)
        );
    }

    #[test]
    fn wild_demands_a_color_before_play_continues() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        let hand_ids = rig(
            &mut engine,
            &actor,
            &[
                Card::new(Color::Any, CardFace::PlusFour),
                Card::new(Color::Blue, CardFace::Number(1)),
            ],
            Card::new(Color::Green, CardFace::Number(3)),
        );
        let outcome = engine.place_card(&actor, &hand_ids[0], 0).unwrap();
        assert!(outcome.pick_color);
        assert!(engine.state.choosing_color);
        assert_eq!(engine.state.stack, 4);
        // Another placement is refused until the color is picked.
        assert_eq!(
            engine.place_card(&actor, &hand_ids[1], 0),
            Err(EngineError::ChoosingColor)
        );
        engine.change_color(&actor, Color::Red, 0).unwrap();
        assert!(!engine.state.choosing_color);
        assert_eq!(engine.state.current_card.as_ref().unwrap().card.color, Color::Red);
        assert!(engine.state.turn_delay);
    }

    #[test]
    fn stacking_chains_identical_draw_cards() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        let hand_ids = rig(
            &mut engine,
            &actor,
            &[
                Card::new(Color::Red, CardFace::PlusTwo),
                Card::new(Color::Red, CardFace::PlusTwo),
                Card::new(Color::Red, CardFace::Number(1)),
            ],
            Card::new(Color::Red, CardFace::Number(4)),
        );
        engine.place_card(&actor, &hand_ids[0], 0).unwrap();
        assert_eq!(engine.state.stack, 2);
        assert!(engine.state.turn_delay);
        // Identical card stacks inside the window.
        engine.place_card(&actor, &hand_ids[1], 10).unwrap();
        assert_eq!(engine.state.stack, 4);
        // A non-identical card does not.
        assert_eq!(
            engine.place_card(&actor, &hand_ids[2], 20),
            Err(EngineError::IllegalPlay)
        );
    }

    #[test]
    fn jump_in_steals_the_turn_and_plays_on() {
        let (mut engine, ids) = started(3, GameSettings::default());
        let (current, jumper) = (ids[0].clone(), ids[2].clone());
        make_current(&mut engine, &current);
        let current_ids = rig(
            &mut engine,
            &current,
            &[
                Card::new(Color::Red, CardFace::Number(7)),
                Card::new(Color::Blue, CardFace::Number(2)),
            ],
            Card::new(Color::Red, CardFace::Number(3)),
        );
        let jumper_private = engine.state.player(&jumper).unwrap().private_id.clone().unwrap();
        engine.place_card(&current, &current_ids[0], 0).unwrap();
        assert!(engine.state.turn_delay);

        let jumper_hand = engine.hands.get_mut(&jumper).unwrap();
        jumper_hand.clear();
        let mut tmp = GameRng::new(5);
        let jump_id = hand::deal_into(
            jumper_hand,
            Card::new(Color::Red, CardFace::Number(7)),
            &jumper_private,
            &mut tmp,
        );
        let extra = hand::generate_card(&mut tmp, false);
        hand::deal_into(engine.hands.get_mut(&jumper).unwrap(), extra, &jumper_private, &mut tmp);
        engine.sync_count(&jumper);

        let outcome = engine.place_card(&jumper, &jump_id, 100).unwrap();
        assert!(outcome.jumped_in);
        assert_eq!(engine.state.current_player_id, Some(jumper.clone()));
        assert_eq!(engine.state.who_jumped_id, Some(jumper.clone()));
        assert!(!engine.state.turn_delay, "jumper gets a fresh turn");
        assert!(engine.sched.is_armed(&TimerKey::TurnClock));
    }

    #[test]
    fn block_skips_and_marks_the_blocked_player() {
        let (mut engine, ids) = started(3, GameSettings::default());
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        let hand_ids = rig(
            &mut engine,
            &actor,
            &[
                Card::new(Color::Red, CardFace::Block),
                Card::new(Color::Blue, CardFace::Number(2)),
            ],
            Card::new(Color::Red, CardFace::Number(3)),
        );
        engine.place_card(&actor, &hand_ids[0], 0).unwrap();
        assert_eq!(engine.state.blocked_id, Some(ids[1].clone()));
        engine.finish_turn_delay(config::TURN_DELAY_MS);
        assert_eq!(engine.state.current_player_id, Some(ids[2].clone()));
    }

    #[test]
    fn reverse_flips_direction() {
        let (mut engine, ids) = started(3, GameSettings::default());
        let actor = ids[1].clone();
        make_current(&mut engine, &actor);
        let hand_ids = rig(
            &mut engine,
            &actor,
            &[
                Card::new(Color::Red, CardFace::Reverse),
                Card::new(Color::Blue, CardFace::Number(2)),
            ],
            Card::new(Color::Red, CardFace::Number(3)),
        );
        engine.place_card(&actor, &hand_ids[0], 0).unwrap();
        assert_eq!(engine.state.direction, -1);
        engine.finish_turn_delay(config::TURN_DELAY_MS);
        assert_eq!(engine.state.current_player_id, Some(ids[0].clone()));
    }

    #[test]
    fn emptying_the_hand_wins_and_arms_the_restart() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        let hand_ids = rig(
            &mut engine,
            &actor,
            &[Card::new(Color::Red, CardFace::Number(5))],
            Card::new(Color::Red, CardFace::Number(9)),
        );
        let outcome = engine.place_card(&actor, &hand_ids[0], 0).unwrap();
        assert!(outcome.won);
        assert_eq!(engine.state.winner_id, Some(actor.clone()));
        assert!(engine.sched.is_armed(&TimerKey::NextGame));
        assert!(!engine.sched.is_armed(&TimerKey::TurnClock));
        // Further play is refused until the next round starts.
        assert_eq!(engine.draw_card(&ids[1], 0), Err(EngineError::GameOver));
    }

    #[test]
    fn down_to_one_card_flags_uno_and_callout_penalizes() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        let hand_ids = rig(
            &mut engine,
            &actor,
            &[
                Card::new(Color::Red, CardFace::Number(5)),
                Card::new(Color::Blue, CardFace::Number(2)),
            ],
            Card::new(Color::Red, CardFace::Number(9)),
        );
        engine.place_card(&actor, &hand_ids[0], 0).unwrap();
        assert_eq!(engine.state.uno_id, Some(actor.clone()));
        // While the actor still holds the turn the callout cannot land,
        // and the flag keeps pending.
        assert!(!engine.press_uno(&ids[1], 500).unwrap());
        assert_eq!(engine.state.uno_id, Some(actor.clone()));
        // Once the turn has moved past them the uncalled UNO is caught.
        engine.finish_turn_delay(config::TURN_DELAY_MS);
        let penalized = engine.press_uno(&ids[1], config::TURN_DELAY_MS + 1).unwrap();
        assert!(penalized);
        assert_eq!(engine.hands[&actor].len(), 1 + config::UNO_PENALTY_CARDS as usize);
    }

    #[test]
    fn an_uncalled_uno_expires_when_the_turn_returns() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        engine.state.uno_id = Some(actor.clone());
        make_current(&mut engine, &actor);
        engine.start_turn_clock(0);
        assert_eq!(engine.state.uno_id, None);
        assert_eq!(engine.press_uno(&ids[1], 0), Err(EngineError::IllegalPlay));
    }

    #[test]
    fn pressing_your_own_uno_is_safe() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        engine.state.uno_id = Some(actor.clone());
        let before = engine.hands[&actor].len();
        assert!(!engine.press_uno(&actor, 0).unwrap());
        assert_eq!(engine.hands[&actor].len(), before);
        assert_eq!(engine.state.uno_id, None);
    }

    #[test]
    fn drawing_a_stack_takes_it_all_and_passes_the_turn() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        rig(
            &mut engine,
            &actor,
            &[Card::new(Color::Blue, CardFace::Number(2))],
            Card::new(Color::Red, CardFace::PlusTwo),
        );
        engine.state.stack = 4;
        engine.draw_card(&actor, 0).unwrap();
        assert_eq!(engine.hands[&actor].len(), 1 + 4);
        assert_eq!(engine.state.stack, 0);
        assert_eq!(engine.state.current_player_id, Some(ids[1].clone()));
    }

    #[test]
    fn draw_to_match_keeps_drawing_until_playable() {
        let settings = GameSettings {
            draw_to_match: true,
            ..GameSettings::default()
        };
        let (mut engine, ids) = started(2, settings);
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        // Hand with nothing playable on the table card.
        rig(
            &mut engine,
            &actor,
            &[Card::new(Color::Blue, CardFace::Number(2))],
            Card::new(Color::Red, CardFace::Number(9)),
        );
        // No wild in hand and no match: the draw loop must run until a
        // playable card lands, then offer it.
        engine.draw_card(&actor, 0).unwrap();
        assert!(engine.state.choosing_card_id.is_some());
        assert_eq!(engine.state.current_player_id, Some(actor.clone()));
        let private = engine.state.player(&actor).unwrap().private_id.clone().unwrap();
        let chosen = engine.state.choosing_card_id.clone().unwrap();
        let card = hand::find_card(&engine.hands[&actor], &chosen.0, &private).unwrap();
        let table = engine.state.current_card.as_ref().unwrap().card;
        assert!(rules::can_play_card(Some(&table), 0, &card).is_some());
    }

    #[test]
    fn saving_the_offered_card_passes_the_turn() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        rig(
            &mut engine,
            &actor,
            &[Card::new(Color::Blue, CardFace::Number(2))],
            Card::new(Color::Red, CardFace::Number(9)),
        );
        engine.draw_card(&actor, 0).unwrap();
        let chosen = engine.state.choosing_card_id.clone().unwrap();
        engine.save_card(&actor, &chosen.0, 10).unwrap();
        assert_eq!(engine.state.choosing_card_id, None);
        assert_eq!(engine.state.current_player_id, Some(ids[1].clone()));
    }

    #[test]
    fn timeout_draw_never_draws_to_match() {
        let settings = GameSettings {
            draw_to_match: true,
            ..GameSettings::default()
        };
        let (mut engine, ids) = started(2, settings);
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        rig(
            &mut engine,
            &actor,
            &[Card::new(Color::Blue, CardFace::Number(2))],
            Card::new(Color::Red, CardFace::Number(9)),
        );
        engine.ran_out_of_time = true;
        engine.draw_card(&actor, 0).unwrap();
        engine.ran_out_of_time = false;
        assert_eq!(engine.hands[&actor].len(), 2, "exactly one forced card");
        assert_eq!(engine.state.current_player_id, Some(ids[1].clone()));
    }

    #[test]
    fn without_draw_to_match_one_card_ends_the_turn() {
        let settings = GameSettings {
            draw_to_match: false,
            ..GameSettings::default()
        };
        let (mut engine, ids) = started(2, settings);
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        rig(
            &mut engine,
            &actor,
            &[Card::new(Color::Blue, CardFace::Number(2))],
            Card::new(Color::Red, CardFace::Number(9)),
        );
        engine.draw_card(&actor, 0).unwrap();
        let count = engine.hands[&actor].len();
        assert_eq!(count, 2);
        // Turn passed unless the drawn card happened to be playable.
        if engine.state.choosing_card_id.is_none() {
            assert_eq!(engine.state.current_player_id, Some(ids[1].clone()));
        } else {
            assert_eq!(engine.state.current_player_id, Some(actor.clone()));
        }
    }

    #[test]
    fn zero_turn_seconds_means_no_clock() {
        let settings = GameSettings {
            turn_seconds: 0,
            ..GameSettings::default()
        };
        let (engine, _) = started(2, settings);
        assert!(!engine.sched.is_armed(&TimerKey::TurnClock));
        assert!(!engine.sched.is_armed(&TimerKey::Countdown));
    }

    #[test]
    fn dropped_player_keeps_seat_and_play_moves_on() {
        let (mut engine, ids) = started(3, GameSettings::default());
        let leaver = ids[0].clone();
        make_current(&mut engine, &leaver);
        engine.player_dropped(&leaver, 1000);
        let seat = engine.state.player(&leaver).unwrap();
        assert_eq!(seat.status, PlayerStatus::Disconnected);
        assert!(engine.sched.is_armed(&TimerKey::Rejoin(leaver.clone())));
        assert_ne!(engine.state.current_player_id, Some(leaver.clone()));
    }

    #[test]
    fn rejoin_within_window_reclaims_the_seat() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let leaver = ids[0].clone();
        let private = engine.state.player(&leaver).unwrap().private_id.clone().unwrap();
        engine.player_dropped(&leaver, 1000);
        let got = engine.try_rejoin(PeerId("new-peer".into()), &private, 2000);
        assert_eq!(got, Some(leaver.clone()));
        let seat = engine.state.player(&leaver).unwrap();
        assert_eq!(seat.status, PlayerStatus::Connected);
        assert_eq!(seat.peer_id, PeerId("new-peer".into()));
        assert!(!engine.sched.is_armed(&TimerKey::Rejoin(leaver)));
    }

    #[test]
    fn rejoin_after_window_is_refused() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let leaver = ids[0].clone();
        let private = engine.state.player(&leaver).unwrap().private_id.clone().unwrap();
        engine.player_dropped(&leaver, 1000);
        let late = 1000 + config::REJOIN_WINDOW_MS + 1;
        assert_eq!(engine.try_rejoin(PeerId("p".into()), &private, late), None);
        assert!(!engine.can_player_rejoin(&private, late));
    }

    #[test]
    fn rejoin_with_wrong_private_id_is_refused() {
        let (mut engine, ids) = started(2, GameSettings::default());
        engine.player_dropped(&ids[0], 1000);
        let fake = PrivateId("00000000-0000-4000-8000-000000000000".into());
        assert_eq!(engine.try_rejoin(PeerId("p".into()), &fake, 1500), None);
    }

    #[test]
    fn lobby_drop_removes_the_seat_entirely() {
        let (mut engine, ids) = engine_with(3, GameSettings::default());
        engine.player_dropped(&ids[1], 0);
        assert!(engine.state.player(&ids[1]).is_none());
        assert!(!engine.hands.contains_key(&ids[1]));
        assert_eq!(engine.state.players.len(), 2);
    }

    #[test]
    fn restart_resets_the_round_but_keeps_seats() {
        let (mut engine, ids) = started(2, GameSettings::default());
        let actor = ids[0].clone();
        make_current(&mut engine, &actor);
        let hand_ids = rig(
            &mut engine,
            &actor,
            &[Card::new(Color::Red, CardFace::Number(5))],
            Card::new(Color::Red, CardFace::Number(9)),
        );
        engine.place_card(&actor, &hand_ids[0], 0).unwrap();
        assert!(engine.state.has_winner());
        engine.start_game(config::NEXT_GAME_DELAY_MS).unwrap();
        assert!(engine.state.winner_id.is_none());
        assert_eq!(engine.state.players.len(), 2);
        for id in &ids {
            assert_eq!(engine.hands[id].len(), 7);
        }
    }
}
