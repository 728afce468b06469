// Keyed deadline scheduler.
//
// All deferred work in the engine (turn clock, turn delay, countdown,
// rejoin windows, migration grace, next-game restart) runs through one
// scheduler polled from the tick pump. No threads and no async: callers
// pass a monotonic `now` in milliseconds and drain whatever came due.
// Arming a key that is already armed replaces the old entry, which is the
// re-arm semantics every timer here wants.

use std::collections::BTreeMap;

use wildcard_protocol::types::PlayerId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerKey {
    /// Per-turn time budget; firing forces an action for the current player.
    TurnClock,
    /// Post-play stacking/jump-in window.
    TurnDelay,
    /// 1s repeating mirror of the turn clock for clients.
    Countdown,
    /// Automatic restart after a win.
    NextGame,
    /// Post-migration wait for old peers to reconnect.
    MigrationGrace,
    /// Seat hold for one disconnected player.
    Rejoin(PlayerId),
}

#[derive(Clone, Debug)]
struct Entry {
    deadline_ms: u64,
    /// Repeat interval; `None` means one-shot.
    interval_ms: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    entries: BTreeMap<TimerKey, Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, key: TimerKey, now_ms: u64, delay_ms: u64) {
        self.entries.insert(
            key,
            Entry {
                deadline_ms: now_ms + delay_ms,
                interval_ms: None,
            },
        );
    }

    pub fn arm_repeating(&mut self, key: TimerKey, now_ms: u64, interval_ms: u64) {
        self.entries.insert(
            key,
            Entry {
                deadline_ms: now_ms + interval_ms,
                interval_ms: Some(interval_ms),
            },
        );
    }

    pub fn cancel(&mut self, key: &TimerKey) {
        self.entries.remove(key);
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove and return every key whose deadline has passed. Repeating
    /// entries are re-armed relative to their old deadline so the cadence
    /// does not drift with pump jitter.
    pub fn fire_due(&mut self, now_ms: u64) -> Vec<TimerKey> {
        let due: Vec<TimerKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline_ms <= now_ms)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &due {
            match self.entries.get_mut(key) {
                Some(entry) if entry.interval_ms.is_some() => {
                    let interval = entry.interval_ms.unwrap_or(1).max(1);
                    entry.deadline_ms += interval;
                    if entry.deadline_ms <= now_ms {
                        entry.deadline_ms = now_ms + interval;
                    }
                }
                _ => {
                    self.entries.remove(key);
                }
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once() {
        let mut sched = Scheduler::new();
        sched.arm(TimerKey::TurnClock, 0, 100);
        assert!(sched.fire_due(99).is_empty());
        assert_eq!(sched.fire_due(100), vec![TimerKey::TurnClock]);
        assert!(sched.fire_due(1000).is_empty());
    }

    #[test]
    fn rearming_replaces_the_deadline() {
        let mut sched = Scheduler::new();
        sched.arm(TimerKey::TurnClock, 0, 100);
        sched.arm(TimerKey::TurnClock, 50, 100);
        assert!(sched.fire_due(120).is_empty());
        assert_eq!(sched.fire_due(150), vec![TimerKey::TurnClock]);
    }

    #[test]
    fn repeating_timer_keeps_cadence() {
        let mut sched = Scheduler::new();
        sched.arm_repeating(TimerKey::Countdown, 0, 10);
        assert_eq!(sched.fire_due(10), vec![TimerKey::Countdown]);
        assert_eq!(sched.fire_due(20), vec![TimerKey::Countdown]);
        assert!(sched.is_armed(&TimerKey::Countdown));
        sched.cancel(&TimerKey::Countdown);
        assert!(sched.fire_due(100).is_empty());
    }

    #[test]
    fn repeating_timer_recovers_from_a_stall() {
        let mut sched = Scheduler::new();
        sched.arm_repeating(TimerKey::Countdown, 0, 10);
        // A long stall should not produce a burst of back-to-back fires.
        assert_eq!(sched.fire_due(95), vec![TimerKey::Countdown]);
        assert!(sched.fire_due(96).is_empty());
        assert_eq!(sched.fire_due(105), vec![TimerKey::Countdown]);
    }

    #[test]
    fn rejoin_keys_are_independent_per_player() {
        let mut sched = Scheduler::new();
        let a = TimerKey::Rejoin(PlayerId("a".into()));
        let b = TimerKey::Rejoin(PlayerId("b".into()));
        sched.arm(a.clone(), 0, 10);
        sched.arm(b.clone(), 0, 20);
        assert_eq!(sched.fire_due(10), vec![a]);
        assert!(sched.is_armed(&b));
    }

    #[test]
    fn cancel_all_clears_everything() {
        let mut sched = Scheduler::new();
        sched.arm(TimerKey::TurnClock, 0, 10);
        sched.arm_repeating(TimerKey::Countdown, 0, 10);
        sched.cancel_all();
        assert!(sched.fire_due(100).is_empty());
    }
}
