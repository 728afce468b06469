// Host-side rules engine.
//
// The engine is the single owner of the canonical `GameState`. It knows
// nothing about transports: callers feed it validated intents and a
// monotonic `now` in milliseconds, and it mutates state, draws randomness
// from its own PRNG, and schedules future work through a cooperative
// scheduler queried on the same tick pump.
//
// Module map:
//   config    — tunables and the card generation tables
//   obfuscate — XOR card cipher, identity hash, deterministic uuids
//   sched     — keyed deadline scheduler (no threads, no async)
//   rules     — pure play-legality and turn-order functions
//   hand      — obfuscated hand construction and lookup
//   engine    — the stateful `RulesEngine` itself
//   migrate   — host migration bookkeeping

pub mod config;
pub mod engine;
pub mod hand;
pub mod migrate;
pub mod obfuscate;
pub mod rules;
pub mod sched;

pub use engine::{EngineError, PlaceOutcome, RulesEngine};
pub use migrate::{begin_host_takeover, elect_next_owner, finish_migration};
pub use rules::{PlayContext, PlayDecision, can_play_card, next_player_id, playable_cards};
pub use sched::{Scheduler, TimerKey};
