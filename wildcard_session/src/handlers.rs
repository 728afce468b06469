// Packet dispatch for both roles.
//
// The host relays only packets it originates itself (kicks, forced
// actions, synthesized disconnects); a client-originated packet mutates
// canonical state on the host and reaches the other clients as the next
// snapshot, so a forged control packet from a non-host peer never travels
// further than the host's role guards. Join traffic and snapshots are
// never relayed because they are addressed to one peer (and a rejoin
// request carries a private id). Invalid intents are dropped with a debug
// log, never answered: a client whose mirror lagged simply learns the
// truth from the next snapshot. The one exception is the join request,
// which gets a coded refusal back.

use tracing::{debug, warn};

use wildcard_engine::engine::RulesEngine;
use wildcard_engine::{begin_host_takeover, elect_next_owner};
use wildcard_prng::GameRng;
use wildcard_protocol::packet::{JoinRequest, Packet, codes};
use wildcard_protocol::types::{PeerId, PlayerId};

use crate::context::{ContextError, GameContext, engine_error_join_code};
use crate::transport::Transport;
use crate::ui::UiNotifier;

impl<T: Transport, U: UiNotifier> GameContext<T, U> {
    pub(crate) fn handle_packet(
        &mut self,
        sender: PeerId,
        packet: Packet,
        now_ms: u64,
    ) -> Result<(), ContextError> {
        if self.is_host() {
            if sender == *self.session.self_peer()
                && !matches!(
                    packet,
                    Packet::JoinRequest(_)
                        | Packet::JoinResponse { .. }
                        | Packet::GameStateSnapshot(_)
                )
            {
                self.session.broadcast_except(&packet, Some(&sender));
            }
            self.dispatch_host(sender, packet, now_ms)
        } else {
            self.dispatch_client(sender, packet, now_ms)
        }
    }

    // ---- host -----------------------------------------------------------

    fn dispatch_host(
        &mut self,
        sender: PeerId,
        packet: Packet,
        now_ms: u64,
    ) -> Result<(), ContextError> {
        match packet {
            Packet::JoinRequest(request) => self.host_join(sender, request, now_ms),
            Packet::PeerConnect { peer_id } => {
                debug!(peer = %peer_id, "peer connected, awaiting join request");
                Ok(())
            }
            Packet::PeerDisconnect { peer_id, .. } => {
                // Only the transport layer (attributed to ourselves) or
                // the peer saying goodbye may announce a disconnect.
                if sender != *self.session.self_peer() && sender != peer_id {
                    debug!(%sender, "ignoring disconnect announced by a third party");
                    return Ok(());
                }
                let player = self
                    .engine
                    .as_ref()
                    .and_then(|e| e.state.player_by_peer(&peer_id))
                    .map(|p| p.player_id.clone());
                if let (Some(engine), Some(player_id)) = (self.engine.as_mut(), player) {
                    engine.player_dropped(&player_id, now_ms);
                    self.broadcast_state(true);
                }
                Ok(())
            }
            Packet::HostDisconnect { .. } => {
                warn!("host received a host-disconnect, ignoring");
                Ok(())
            }
            Packet::JoinResponse { .. } | Packet::GameStateSnapshot(_) => {
                debug!(kind = packet.kind(), "ignoring client-bound packet on host");
                Ok(())
            }
            Packet::PlaceCard { card_id } => {
                let Some(player_id) = self.player_for(&sender) else {
                    return Ok(());
                };
                if let Some(engine) = self.engine.as_mut() {
                    match engine.place_card(&player_id, &card_id.0, now_ms) {
                        Ok(_) => self.broadcast_state(true),
                        Err(err) => debug!(player = %player_id, %err, "place rejected"),
                    }
                }
                Ok(())
            }
            Packet::SaveCard { card_id } => {
                let Some(player_id) = self.player_for(&sender) else {
                    return Ok(());
                };
                if let Some(engine) = self.engine.as_mut() {
                    match engine.save_card(&player_id, &card_id.0, now_ms) {
                        Ok(()) => self.broadcast_state(true),
                        Err(err) => debug!(player = %player_id, %err, "save rejected"),
                    }
                }
                Ok(())
            }
            Packet::DrawCard => {
                let Some(player_id) = self.player_for(&sender) else {
                    return Ok(());
                };
                if let Some(engine) = self.engine.as_mut() {
                    match engine.draw_card(&player_id, now_ms) {
                        Ok(()) => self.broadcast_state(true),
                        Err(err) => debug!(player = %player_id, %err, "draw rejected"),
                    }
                }
                Ok(())
            }
            Packet::ChangeColor { color } => {
                let Some(player_id) = self.player_for(&sender) else {
                    return Ok(());
                };
                if let Some(engine) = self.engine.as_mut() {
                    match engine.change_color(&player_id, color, now_ms) {
                        Ok(()) => self.broadcast_state(true),
                        Err(err) => debug!(player = %player_id, %err, "color change rejected"),
                    }
                }
                Ok(())
            }
            Packet::UnoPress => {
                let Some(player_id) = self.player_for(&sender) else {
                    return Ok(());
                };
                if let Some(engine) = self.engine.as_mut() {
                    match engine.press_uno(&player_id, now_ms) {
                        Ok(_) => self.broadcast_state(true),
                        Err(err) => debug!(player = %player_id, %err, "uno press rejected"),
                    }
                }
                Ok(())
            }
            Packet::KickPlayer { player_id, reason } => {
                // Kicks originate from the host's own UI loop-back only.
                if sender != *self.session.self_peer() {
                    debug!(%sender, "ignoring kick from non-host");
                    return Ok(());
                }
                if Some(&player_id) == self.own_player_id.as_ref() {
                    debug!("host cannot kick itself");
                    return Ok(());
                }
                debug!(player = %player_id, %reason, "kicking player");
                if let Some(engine) = self.engine.as_mut() {
                    engine.remove_player(&player_id, now_ms);
                    self.broadcast_state(true);
                }
                Ok(())
            }
        }
    }

    fn host_join(
        &mut self,
        sender: PeerId,
        request: JoinRequest,
        now_ms: u64,
    ) -> Result<(), ContextError> {
        if let Some((code, message)) = request.refusal() {
            self.respond_join(&sender, code, message);
            return Ok(());
        }
        let self_peer = self.session.self_peer().clone();
        if request.invite != self_peer.0 {
            self.respond_join(&sender, codes::BAD_INVITE, "wrong invite");
            return Ok(());
        }
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        if let Some(private) = request.private_id.as_ref() {
            if engine.can_player_rejoin(private, now_ms) {
                if engine.try_rejoin(sender.clone(), private, now_ms).is_some() {
                    self.broadcast_state(true);
                }
                return Ok(());
            }
        }
        match engine.add_player(sender.clone(), request.username, request.avatar) {
            Ok(_) => self.broadcast_state(true),
            Err(err) => {
                let (code, message) = engine_error_join_code(&err);
                self.respond_join(&sender, code, message);
            }
        }
        Ok(())
    }

    /// Join errors are answered; success is only ever visible as the first
    /// snapshot.
    fn respond_join(&mut self, to: &PeerId, code: u16, message: &str) {
        debug!(peer = %to, code, message, "join refused");
        let response = Packet::JoinResponse {
            code,
            message: message.to_string(),
        };
        if let Err(err) = self.session.send_packet(to, &response) {
            debug!(peer = %to, %err, "join response delivery failed");
        }
    }

    fn player_for(&self, peer: &PeerId) -> Option<PlayerId> {
        let found = self
            .engine
            .as_ref()
            .and_then(|e| e.state.player_by_peer(peer))
            .map(|p| p.player_id.clone());
        if found.is_none() {
            debug!(%peer, "packet from a peer without a seat, dropping");
        }
        found
    }

    // ---- client ---------------------------------------------------------

    fn dispatch_client(
        &mut self,
        sender: PeerId,
        packet: Packet,
        now_ms: u64,
    ) -> Result<(), ContextError> {
        match packet {
            Packet::GameStateSnapshot(snapshot) => {
                let self_peer = self.session.self_peer().clone();
                if let Some(seat) = snapshot.state.player_by_peer(&self_peer) {
                    self.own_player_id = Some(seat.player_id.clone());
                    if let Some(private) = seat.private_id.clone() {
                        self.profile.private_id = Some(private);
                    }
                }
                self.mirror = Some(snapshot);
                self.render();
                Ok(())
            }
            Packet::JoinResponse { code, message } => {
                self.ui.notify(&message);
                Err(ContextError::JoinRefused { code, message })
            }
            Packet::KickPlayer { player_id, reason } => {
                if Some(&player_id) == self.own_player_id.as_ref() {
                    self.ui.notify(&reason);
                    return Err(ContextError::Kicked(reason));
                }
                Ok(())
            }
            Packet::HostDisconnect { peer_id, .. } => {
                if sender != *self.session.self_peer() && sender != peer_id {
                    debug!(%sender, "ignoring host-disconnect from a third party");
                    return Ok(());
                }
                self.migrate(now_ms)
            }
            Packet::PeerDisconnect { .. } | Packet::PeerConnect { .. } => Ok(()),
            other => {
                debug!(kind = other.kind(), "ignoring host-bound packet on client");
                Ok(())
            }
        }
    }

    // ---- migration ------------------------------------------------------

    /// The host is gone. Every client elects the same successor from its
    /// mirror; the winner promotes itself, everyone else redials.
    fn migrate(&mut self, now_ms: u64) -> Result<(), ContextError> {
        let Some(mirror) = self.mirror.clone() else {
            return Err(ContextError::HostLost);
        };
        let Some(elected) = elect_next_owner(&mirror.state) else {
            return Err(ContextError::HostLost);
        };
        let self_peer = self.session.self_peer().clone();
        if elected == self_peer {
            let mut engine = RulesEngine::adopt(mirror.state, mirror.hands, GameRng::from_entropy());
            begin_host_takeover(&mut engine, &self_peer, now_ms);
            self.engine = Some(engine);
            self.mirror = None;
            self.session.promote_to_host();
            self.broadcast_state(false);
        } else {
            debug!(new_host = %elected, "host lost, dialing successor");
            self.session.set_owner(elected);
            self.start_dialing(now_ms);
        }
        Ok(())
    }
}
