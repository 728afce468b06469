// `GameContext`: one player's whole stack, tying a transport, a session,
// an optional rules engine (host role), and a UI notifier together behind
// a single tick pump.
//
// The host context owns a `RulesEngine` and answers every packet; a
// client context holds the latest snapshot as a read-only mirror and
// forwards its own intents to the host. Both are driven by `tick(now)`:
// pump the transport, dispatch packets, and on the host drain the timer
// wheel. A fatal return from `tick` (kicked, join refused, host
// unreachable after migration) means the context is dead and the caller
// goes back to the menu.

use thiserror::Error;
use tracing::debug;

use wildcard_engine::config::MIGRATION_ATTEMPTS;
use wildcard_engine::engine::{EngineError, RulesEngine};
use wildcard_engine::sched::TimerKey;
use wildcard_engine::finish_migration;
use wildcard_prng::GameRng;
use wildcard_protocol::model::{GameSettings, GameState, PlayerStatus, Snapshot};
use wildcard_protocol::packet::{JoinRequest, Packet};
use wildcard_protocol::types::{CardId, Color, PeerId, PlayerId, PrivateId};

use crate::session::{Session, SessionError};
use crate::transport::Transport;
use crate::ui::UiNotifier;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("join refused ({code}): {message}")]
    JoinRefused { code: u16, message: String },
    #[error("kicked from the game: {0}")]
    Kicked(String),
    #[error("host unreachable")]
    HostLost,
}

/// Local identity and presentation, kept across games. The private id is
/// written back here from the first snapshot so a later rejoin can prove
/// who we are.
#[derive(Clone, Debug, Default)]
pub struct Profile {
    pub username: String,
    pub avatar: Option<String>,
    pub private_id: Option<PrivateId>,
}

/// Reconnect-in-progress bookkeeping after a host migration.
pub(crate) struct MigrationDial {
    pub(crate) attempts_left: u32,
    pub(crate) next_attempt_ms: u64,
}

pub struct GameContext<T: Transport, U: UiNotifier> {
    pub(crate) session: Session<T>,
    pub(crate) ui: U,
    pub(crate) profile: Profile,
    pub(crate) engine: Option<RulesEngine>,
    pub(crate) mirror: Option<Snapshot>,
    pub(crate) own_player_id: Option<PlayerId>,
    pub(crate) scene_shown: bool,
    pub(crate) dialing: Option<MigrationDial>,
}

impl<T: Transport, U: UiNotifier> GameContext<T, U> {
    /// Host a new game. The local peer id becomes the invite.
    pub fn create(
        transport: T,
        ui: U,
        profile: Profile,
        settings: GameSettings,
    ) -> Result<Self, ContextError> {
        let session = Session::host(transport)?;
        let owner = session.self_peer().clone();
        let mut engine = RulesEngine::new(owner.clone(), settings, GameRng::from_entropy());
        let own = engine
            .add_player(owner, profile.username.clone(), profile.avatar.clone())
            .ok();
        let mut ctx = Self {
            session,
            ui,
            profile,
            engine: Some(engine),
            mirror: None,
            own_player_id: own,
            scene_shown: false,
            dialing: None,
        };
        if let Some(seat_private) = ctx
            .engine
            .as_ref()
            .and_then(|e| e.state.players.first())
            .and_then(|p| p.private_id.clone())
        {
            ctx.profile.private_id = Some(seat_private);
        }
        ctx.broadcast_state(true);
        Ok(ctx)
    }

    /// Join an existing game by invite (the host's peer id).
    pub fn join(
        transport: T,
        ui: U,
        profile: Profile,
        invite: PeerId,
    ) -> Result<Self, ContextError> {
        let mut session = Session::join(transport, invite.clone())?;
        let request = Packet::JoinRequest(JoinRequest {
            invite: invite.0.clone(),
            username: profile.username.clone(),
            avatar: profile.avatar.clone(),
            settings: GameSettings::default(),
            private_id: profile.private_id.clone(),
        });
        session.send_packet(&invite, &request)?;
        Ok(Self {
            session,
            ui,
            profile,
            engine: None,
            mirror: None,
            own_player_id: None,
            scene_shown: false,
            dialing: None,
        })
    }

    pub fn is_host(&self) -> bool {
        self.session.is_host()
    }

    /// The invite code other players join with.
    pub fn invite(&self) -> &PeerId {
        self.session.owner_peer()
    }

    pub fn own_player_id(&self) -> Option<&PlayerId> {
        self.own_player_id.as_ref()
    }

    /// The current view of the game: canonical on the host, mirrored on a
    /// client.
    pub fn state(&self) -> Option<&GameState> {
        self.engine
            .as_ref()
            .map(|e| &e.state)
            .or_else(|| self.mirror.as_ref().map(|s| &s.state))
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// A player's obfuscated hand, from the canonical store or the mirror.
    pub fn hand_of(&self, player_id: &PlayerId) -> Option<&wildcard_protocol::model::HandMap> {
        if let Some(engine) = self.engine.as_ref() {
            engine.hands.get(player_id)
        } else {
            self.mirror.as_ref().and_then(|s| s.hands.get(player_id))
        }
    }

    /// Direct engine access for host-side tooling. `None` on a client.
    pub fn engine_mut(&mut self) -> Option<&mut RulesEngine> {
        self.engine.as_mut()
    }

    // ---- tick pump ------------------------------------------------------

    /// Advance the world to `now_ms`. Call this from the main loop.
    pub fn tick(&mut self, now_ms: u64) -> Result<(), ContextError> {
        for (sender, packet) in self.session.poll(now_ms) {
            self.handle_packet(sender, packet, now_ms)?;
        }
        self.retry_migration_dial(now_ms)?;
        if self.engine.is_some() {
            let due = self
                .engine
                .as_mut()
                .map(|e| e.sched.fire_due(now_ms))
                .unwrap_or_default();
            for key in due {
                self.on_timer(key, now_ms)?;
            }
        }
        Ok(())
    }

    fn on_timer(&mut self, key: TimerKey, now_ms: u64) -> Result<(), ContextError> {
        match key {
            TimerKey::TurnClock => self.force_turn_action(now_ms)?,
            TimerKey::TurnDelay => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.finish_turn_delay(now_ms);
                }
                self.broadcast_state(true);
            }
            TimerKey::Countdown => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.countdown_tick();
                }
            }
            TimerKey::NextGame => {
                if let Some(engine) = self.engine.as_mut() {
                    if engine.start_game(now_ms).is_err() {
                        engine.state.started = false;
                    }
                }
                self.broadcast_state(true);
            }
            TimerKey::Rejoin(player_id) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.remove_player(&player_id, now_ms);
                }
                self.broadcast_state(true);
            }
            TimerKey::MigrationGrace => {
                if let Some(engine) = self.engine.as_mut() {
                    finish_migration(engine, now_ms);
                }
                self.broadcast_state(true);
            }
        }
        Ok(())
    }

    /// The turn clock ran out: play the pending decision for the current
    /// player, as if they had sent the packet themselves.
    fn force_turn_action(&mut self, now_ms: u64) -> Result<(), ContextError> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        let Some(peer) = engine
            .state
            .current_player_id
            .clone()
            .and_then(|id| engine.state.player(&id))
            .map(|p| p.peer_id.clone())
        else {
            return Ok(());
        };
        engine.ran_out_of_time = true;
        let packet = if engine.state.choosing_color {
            let color = engine.random_color();
            Packet::ChangeColor { color }
        } else if let Some(card_id) = engine.state.choosing_card_id.clone() {
            Packet::SaveCard { card_id }
        } else {
            Packet::DrawCard
        };
        debug!(kind = packet.kind(), "turn clock expired, forcing action");
        let result = self.handle_packet(peer, packet, now_ms);
        if let Some(engine) = self.engine.as_mut() {
            engine.ran_out_of_time = false;
        }
        result
    }

    fn retry_migration_dial(&mut self, now_ms: u64) -> Result<(), ContextError> {
        let Some(dial) = self.dialing.as_mut() else {
            return Ok(());
        };
        if now_ms < dial.next_attempt_ms {
            return Ok(());
        }
        if self.session.reconnect_owner().is_ok() {
            self.dialing = None;
            let owner = self.session.owner_peer().clone();
            let request = Packet::JoinRequest(JoinRequest {
                invite: owner.0.clone(),
                username: self.profile.username.clone(),
                avatar: self.profile.avatar.clone(),
                settings: GameSettings::default(),
                private_id: self.profile.private_id.clone(),
            });
            self.session.send_packet(&owner, &request)?;
            return Ok(());
        }
        dial.attempts_left -= 1;
        if dial.attempts_left == 0 {
            self.dialing = None;
            self.ui.notify("could not reach the new host");
            return Err(ContextError::HostLost);
        }
        dial.next_attempt_ms = now_ms + 1000;
        Ok(())
    }

    pub(crate) fn start_dialing(&mut self, now_ms: u64) {
        self.dialing = Some(MigrationDial {
            attempts_left: MIGRATION_ATTEMPTS,
            next_attempt_ms: now_ms,
        });
    }

    // ---- player intents -------------------------------------------------

    pub fn place_card(&mut self, card_id: CardId, now_ms: u64) -> Result<(), ContextError> {
        self.intend(Packet::PlaceCard { card_id }, now_ms)
    }

    pub fn draw_card(&mut self, now_ms: u64) -> Result<(), ContextError> {
        self.intend(Packet::DrawCard, now_ms)
    }

    pub fn save_card(&mut self, card_id: CardId, now_ms: u64) -> Result<(), ContextError> {
        self.intend(Packet::SaveCard { card_id }, now_ms)
    }

    pub fn change_color(&mut self, color: Color, now_ms: u64) -> Result<(), ContextError> {
        self.intend(Packet::ChangeColor { color }, now_ms)
    }

    pub fn press_uno(&mut self, now_ms: u64) -> Result<(), ContextError> {
        self.intend(Packet::UnoPress, now_ms)
    }

    pub fn kick_player(
        &mut self,
        player_id: PlayerId,
        reason: String,
        now_ms: u64,
    ) -> Result<(), ContextError> {
        self.intend(Packet::KickPlayer { player_id, reason }, now_ms)
    }

    /// Host only: deal and begin.
    pub fn start_game(&mut self, now_ms: u64) -> Result<(), ContextError> {
        if let Some(engine) = self.engine.as_mut() {
            match engine.start_game(now_ms) {
                Ok(()) => self.broadcast_state(true),
                Err(err) => debug!(%err, "start refused"),
            }
        }
        Ok(())
    }

    /// Host only: push the current state to every player. Useful after
    /// touching the engine directly.
    pub fn publish_state(&mut self) {
        self.broadcast_state(true);
    }

    /// Route an intent: the host handles its own packets through the same
    /// dispatch as everyone else's, a client sends them to the host.
    fn intend(&mut self, packet: Packet, now_ms: u64) -> Result<(), ContextError> {
        if self.is_host() {
            let me = self.session.self_peer().clone();
            self.handle_packet(me, packet, now_ms)
        } else {
            let owner = self.session.owner_peer().clone();
            self.session.send_packet(&owner, &packet)?;
            Ok(())
        }
    }

    // ---- snapshots ------------------------------------------------------

    /// Send the per-recipient trimmed snapshot to every seated player and
    /// refresh the host's own view.
    pub(crate) fn broadcast_state(&mut self, keep_avatars: bool) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        let snapshot = engine.snapshot();
        let self_peer = self.session.self_peer().clone();
        let recipients: Vec<PeerId> = snapshot
            .state
            .players
            .iter()
            .filter(|p| p.status == PlayerStatus::Connected && p.peer_id != self_peer)
            .map(|p| p.peer_id.clone())
            .collect();
        for peer in recipients {
            let packet =
                Packet::GameStateSnapshot(snapshot.clone().trim_for(&peer, keep_avatars));
            if let Err(err) = self.session.send_packet(&peer, &packet) {
                debug!(%peer, %err, "snapshot delivery failed");
            }
        }
        self.render();
    }

    pub(crate) fn render(&mut self) {
        let own = self.own_player_id.clone();
        if let Some(state) = self.state() {
            let state = state.clone();
            self.ui.render(&state, own.as_ref());
            if state.started && !self.scene_shown {
                self.scene_shown = true;
                self.ui.show_game_scene();
            }
        }
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}

pub(crate) fn engine_error_join_code(err: &EngineError) -> (u16, &'static str) {
    use wildcard_protocol::packet::codes;
    match err {
        EngineError::GameStarted => (codes::GAME_STARTED, "game already started"),
        EngineError::GameFull => (codes::GAME_FULL, "game is full"),
        _ => (codes::BAD_INVITE, "join refused"),
    }
}
