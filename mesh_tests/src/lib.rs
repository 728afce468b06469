// In-process peer mesh and test harness for whole-session scenarios.
//
// `MeshHub` is a single-threaded message switch: every endpoint gets a
// uuid peer id and a queue, `send` appends to the target's queue, and
// `kill` silently drops a peer so the heartbeat sweep (not an explicit
// goodbye) is what the session under test observes. `TestPeer` wraps a
// `GameContext` over such an endpoint with the accessors scenarios need.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use wildcard_engine::hand;
use wildcard_engine::obfuscate::uuid_v4;
use wildcard_prng::GameRng;
use wildcard_protocol::model::GameSettings;
use wildcard_protocol::types::{Card, PeerId, PlayerId};
use wildcard_session::context::{ContextError, GameContext, Profile};
use wildcard_session::transport::{Transport, TransportError, TransportEvent};
use wildcard_session::ui::NullUi;

#[derive(Default)]
struct HubInner {
    queues: BTreeMap<PeerId, VecDeque<TransportEvent>>,
    alive: BTreeMap<PeerId, bool>,
    rng: Option<GameRng>,
}

/// Shared switch all endpoints of one test hang off.
#[derive(Clone)]
pub struct MeshHub {
    inner: Rc<RefCell<HubInner>>,
}

impl MeshHub {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(HubInner {
                rng: Some(GameRng::new(seed)),
                ..HubInner::default()
            })),
        }
    }

    pub fn endpoint(&self) -> LoopbackTransport {
        LoopbackTransport {
            hub: Rc::clone(&self.inner),
            peer: None,
        }
    }

    /// Drop a peer without any goodbye. Its queue stays but nothing is
    /// delivered to or from it; sessions find out via the liveness sweep.
    pub fn kill(&self, peer: &PeerId) {
        self.inner.borrow_mut().alive.insert(peer.clone(), false);
    }
}

pub struct LoopbackTransport {
    hub: Rc<RefCell<HubInner>>,
    peer: Option<PeerId>,
}

impl Transport for LoopbackTransport {
    fn open(&mut self) -> Result<PeerId, TransportError> {
        let mut hub = self.hub.borrow_mut();
        let mut rng = hub.rng.take().unwrap_or_else(|| GameRng::new(0));
        let peer = PeerId(uuid_v4(&mut rng));
        hub.rng = Some(rng);
        hub.queues.insert(peer.clone(), VecDeque::new());
        hub.alive.insert(peer.clone(), true);
        self.peer = Some(peer.clone());
        Ok(peer)
    }

    fn local_peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    fn connect(&mut self, remote: &PeerId) -> Result<(), TransportError> {
        let me = self.peer.clone().ok_or(TransportError::NotOpen)?;
        let mut hub = self.hub.borrow_mut();
        if !hub.alive.get(remote).copied().unwrap_or(false) {
            return Err(TransportError::Unreachable(remote.clone()));
        }
        if let Some(queue) = hub.queues.get_mut(remote) {
            queue.push_back(TransportEvent::PeerConnected(me));
        }
        Ok(())
    }

    fn send(&mut self, to: &PeerId, raw: &str) -> Result<(), TransportError> {
        let me = self.peer.clone().ok_or(TransportError::NotOpen)?;
        let mut hub = self.hub.borrow_mut();
        let sender_alive = hub.alive.get(&me).copied().unwrap_or(false);
        let target_alive = hub.alive.get(to).copied().unwrap_or(false);
        if !sender_alive || !target_alive {
            return Err(TransportError::Unreachable(to.clone()));
        }
        if let Some(queue) = hub.queues.get_mut(to) {
            queue.push_back(TransportEvent::Data(me, raw.to_string()));
        }
        Ok(())
    }

    fn is_alive(&self, peer: &PeerId) -> bool {
        self.hub.borrow().alive.get(peer).copied().unwrap_or(false)
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let Some(me) = self.peer.as_ref() else {
            return Vec::new();
        };
        let mut hub = self.hub.borrow_mut();
        if !hub.alive.get(me).copied().unwrap_or(false) {
            return Vec::new();
        }
        hub.queues
            .get_mut(me)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    fn close(&mut self) {
        if let Some(me) = self.peer.as_ref() {
            self.hub.borrow_mut().alive.insert(me.clone(), false);
        }
    }
}

/// One participant: a `GameContext` over a loopback endpoint.
pub struct TestPeer {
    pub ctx: GameContext<LoopbackTransport, NullUi>,
}

impl TestPeer {
    pub fn host(hub: &MeshHub, username: &str, settings: GameSettings) -> Self {
        let profile = Profile {
            username: username.into(),
            avatar: None,
            private_id: None,
        };
        let ctx = GameContext::create(hub.endpoint(), NullUi, profile, settings)
            .expect("hosting must succeed");
        Self { ctx }
    }

    pub fn join(hub: &MeshHub, username: &str, invite: PeerId) -> Self {
        let profile = Profile {
            username: username.into(),
            avatar: None,
            private_id: None,
        };
        let ctx = GameContext::join(hub.endpoint(), NullUi, profile, invite)
            .expect("dialing the host must succeed");
        Self { ctx }
    }

    /// Join presenting a previously issued private id, reclaiming a seat.
    pub fn rejoin(
        hub: &MeshHub,
        username: &str,
        invite: PeerId,
        private_id: wildcard_protocol::types::PrivateId,
    ) -> Self {
        let profile = Profile {
            username: username.into(),
            avatar: None,
            private_id: Some(private_id),
        };
        let ctx = GameContext::join(hub.endpoint(), NullUi, profile, invite)
            .expect("dialing the host must succeed");
        Self { ctx }
    }

    pub fn tick(&mut self, now_ms: u64) -> Result<(), ContextError> {
        self.ctx.tick(now_ms)
    }

    pub fn player_id(&self) -> PlayerId {
        self.ctx.own_player_id().expect("player id known").clone()
    }

    /// This peer's hand as it can decrypt it with its own private id.
    pub fn own_cards(&self) -> Vec<(String, Card)> {
        let Some(own) = self.ctx.own_player_id() else {
            return Vec::new();
        };
        let Some(private) = self.ctx.profile().private_id.as_ref() else {
            return Vec::new();
        };
        self.ctx
            .hand_of(own)
            .map(|h| hand::decrypt_hand(h, private))
            .unwrap_or_default()
    }

    /// The first card in hand satisfying `pred`, by obfuscated id.
    pub fn find_card(&self, pred: impl Fn(&Card) -> bool) -> Option<(String, Card)> {
        self.own_cards().into_iter().find(|(_, c)| pred(c))
    }
}

/// Give a player an exact hand and put a known card on the table, so a
/// scenario is not at the mercy of the deal. Host side only. Returns the
/// obfuscated ids of the rigged cards, in order.
pub fn rig_hand(
    host: &mut TestPeer,
    player: &PlayerId,
    cards: &[Card],
    table: Card,
) -> Vec<String> {
    let engine = host.ctx.engine_mut().expect("rigging needs the host");
    let private = engine
        .state
        .player(player)
        .and_then(|p| p.private_id.clone())
        .expect("host knows every private id");
    let mut dealer = GameRng::new(engine.rng_mut().next_u64());
    let hand = engine.hands.get_mut(player).expect("player has a hand");
    hand.clear();
    let ids = cards
        .iter()
        .map(|c| hand::deal_into(hand, *c, &private, &mut dealer))
        .collect();
    if let Some(seat) = engine.state.player_mut(player) {
        seat.card_count = cards.len() as u32;
    }
    engine.state.current_card = Some(wildcard_protocol::model::PlacedCard {
        card: table,
        placement_id: "rigged-table".into(),
    });
    ids
}

/// Make `player` the current player with a clean turn, host side.
pub fn set_current(host: &mut TestPeer, player: &PlayerId) {
    let engine = host.ctx.engine_mut().expect("host only");
    engine.state.current_player_id = Some(player.clone());
    engine.state.turn_delay = false;
    engine.state.choosing_color = false;
    engine.state.choosing_card_id = None;
    engine.state.stack = 0;
}

/// Tick every peer once at `now_ms`, twice over, so request/response pairs
/// settle within one call. Panics on a fatal context error; scenarios that
/// expect one drive the peer directly.
pub fn pump(peers: &mut [&mut TestPeer], now_ms: u64) {
    for _ in 0..2 {
        for peer in peers.iter_mut() {
            peer.tick(now_ms).expect("tick must not be fatal");
        }
    }
}
