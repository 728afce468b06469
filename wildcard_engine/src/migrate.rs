// Host migration bookkeeping.
//
// When the host drops, every client elects the same successor from its
// mirror: walk the seats in turn order starting after the old host's seat
// and take the first one still connected. The elected peer promotes
// its mirror into a live engine, marks everyone disconnected, and waits
// out a grace period for the old peers to rejoin before play resumes
// without the stragglers.

use tracing::info;

use wildcard_protocol::model::{GameState, PlayerStatus};
use wildcard_protocol::types::{PeerId, PlayerId};

use crate::config;
use crate::engine::RulesEngine;
use crate::sched::TimerKey;

/// Deterministic successor election. Every client computes this from the
/// same mirror, so they all agree without talking to each other. The walk
/// honors the current turn direction and passes over any seat already
/// known to be disconnected; a dead peer must never win.
pub fn elect_next_owner(state: &GameState) -> Option<PeerId> {
    let len = state.players.len();
    if len == 0 {
        return None;
    }
    let start = state
        .players
        .iter()
        .position(|p| p.peer_id == state.owner_peer_id)
        .unwrap_or(len - 1);
    let step: usize = if state.direction >= 0 { 1 } else { len - 1 };
    for offset in 1..=len {
        let seat = &state.players[(start + offset * step) % len];
        if seat.is_online(true) && seat.peer_id != state.owner_peer_id {
            return Some(seat.peer_id.clone());
        }
    }
    None
}

/// Promote this peer to host. All other seats are marked disconnected
/// until their owners reconnect and prove their identity; a grace timer
/// bounds how long the game waits for them.
pub fn begin_host_takeover(engine: &mut RulesEngine, self_peer: &PeerId, now_ms: u64) {
    info!(new_owner = %self_peer, "taking over as host");
    engine.sched.cancel_all();
    engine.state.migrating = true;
    engine.state.owner_peer_id = self_peer.clone();
    for seat in &mut engine.state.players {
        if &seat.peer_id == self_peer {
            seat.mark_reconnected();
        } else if seat.status == PlayerStatus::Connected {
            seat.mark_disconnected(now_ms);
        }
    }
    engine
        .sched
        .arm(TimerKey::MigrationGrace, now_ms, config::MIGRATION_GRACE_MS);
}

/// Close the grace window: drop everyone who never came back and resume
/// play. With fewer than two seats left the game falls back to the lobby.
pub fn finish_migration(engine: &mut RulesEngine, now_ms: u64) {
    engine.state.migrating = false;
    let stragglers: Vec<PlayerId> = engine
        .state
        .players
        .iter()
        .filter(|p| p.is_disconnected())
        .map(|p| p.player_id.clone())
        .collect();
    for player_id in &stragglers {
        engine.remove_player(player_id, now_ms);
    }
    info!(removed = stragglers.len(), "migration finished");
    if engine.state.started && engine.state.online_count(true) < 2 {
        engine.state.started = false;
        engine.sched.cancel_all();
        return;
    }
    if engine.state.started {
        engine.start_turn_clock(now_ms);
    }
}
