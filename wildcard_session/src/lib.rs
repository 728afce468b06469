// Session layer: the glue between the transport mesh and the rules
// engine.
//
// Topology is a star: every client holds exactly one connection, to the
// host, and the host holds one per client. The host owns a `RulesEngine`
// and is the only peer that mutates game state; clients hold a read-only
// mirror replaced wholesale by each snapshot. Everything is driven from a
// cooperative `tick(now)` pump, with no threads and no async runtime.
//
// Module map:
//   transport — the `Transport` trait the mesh implements
//   ui        — render/notify hooks for whatever front end is attached
//   session   — connection table, packet framing, liveness sweep
//   context   — `GameContext`: lifecycle, tick pump, player intents
//   handlers  — packet dispatch for both roles, and host migration

pub mod context;
pub mod handlers;
pub mod session;
pub mod transport;
pub mod ui;

pub use context::{ContextError, GameContext, Profile};
pub use session::{Role, Session, SessionError};
pub use transport::{Transport, TransportError, TransportEvent};
pub use ui::{NullUi, UiNotifier};
