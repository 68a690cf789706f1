//! # Action Scheduler
//!
//! One-shot and repeating callbacks for the encounter orchestrator. Entries
//! are delivered strictly in (due time, enqueue order), so a later-scheduled
//! action never runs before an earlier one that was due at the same instant.
//! Cancellation by handle is idempotent.

use std::time::Duration;

use bevy::prelude::*;

use crate::common::{components::faction::Faction, message::MsgId};

/// Everything the orchestrator defers to a timer. `ctrl` is the dungeon
/// controller entity the action targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Poll { ctrl: Entity },
    BeginSequence { ctrl: Entity },
    SequenceTick { ctrl: Entity },
    Transport { ctrl: Entity },
    Teardown { ctrl: Entity },
    Briefing { ctrl: Entity, msg: MsgId },
    RespawnReset { ctrl: Entity, faction: Faction },
    SpawnerAudit { ctrl: Entity },
    DissolveSigil { ent: Entity },
}

/// A scheduled action coming due, emitted by [`run_scheduler`].
#[derive(Clone, Copy, Debug, Event)]
pub struct Fire {
    pub action: Action,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimerHandle(u64);

#[derive(Clone, Copy, Debug)]
struct Entry {
    handle: u64,
    seq: u64,
    due: Duration,
    period: Option<Duration>,
    action: Action,
}

#[derive(Default, Resource)]
pub struct Scheduler {
    entries: Vec<Entry>,
    next_handle: u64,
    next_seq: u64,
}

impl Scheduler {
    /// Schedule `action` once after `delay`.
    pub fn once(&mut self, now: Duration, delay: Duration, action: Action) -> TimerHandle {
        self.push(now + delay, None, action)
    }

    /// Schedule `action` every `period`, first firing after `initial`.
    pub fn repeating(
        &mut self,
        now: Duration,
        initial: Duration,
        period: Duration,
        action: Action,
    ) -> TimerHandle {
        self.push(now + initial, Some(period), action)
    }

    /// Post `action` to the end of the current scheduling step. Used instead
    /// of mutating encounter state from inside the callback that observed it.
    pub fn defer(&mut self, now: Duration, action: Action) -> TimerHandle {
        self.once(now, Duration::ZERO, action)
    }

    /// Idempotent: cancelling an already-fired or already-cancelled handle is
    /// a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.entries.retain(|e| e.handle != handle.0);
    }

    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle.0)
    }

    /// Snapshot of every pending action, for diagnostics.
    pub fn scheduled(&self) -> Vec<Action> {
        self.entries.iter().map(|e| e.action).collect()
    }

    /// All entries due at `now`, in (due, enqueue order). Repeating entries
    /// are re-enqueued with the same handle and a fresh sequence number.
    pub fn drain_due(&mut self, now: Duration) -> Vec<Action> {
        let mut due: Vec<Entry> = Vec::new();
        self.entries.retain(|e| {
            if e.due <= now {
                due.push(*e);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|e| (e.due, e.seq));

        for e in &due {
            if let Some(period) = e.period {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.push(Entry {
                    handle: e.handle,
                    seq,
                    due: now + period,
                    period: e.period,
                    action: e.action,
                });
            }
        }

        due.into_iter().map(|e| e.action).collect()
    }

    fn push(&mut self, due: Duration, period: Option<Duration>, action: Action) -> TimerHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { handle, seq, due, period, action });
        TimerHandle(handle)
    }
}

/// System that drains due actions into the `Fire` stream each frame.
pub fn run_scheduler(
    time: Res<Time>,
    mut scheduler: ResMut<Scheduler>,
    mut writer: EventWriter<Fire>,
) {
    for action in scheduler.drain_due(time.elapsed()) {
        trace!("firing {:?}", action);
        writer.write(Fire { action });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctrl() -> Entity {
        Entity::from_raw(1)
    }

    #[test]
    fn test_oneshot_fires_once_at_due_time() {
        let mut sched = Scheduler::default();
        let now = Duration::ZERO;
        sched.once(now, Duration::from_secs(60), Action::Poll { ctrl: ctrl() });

        assert!(sched.drain_due(Duration::from_secs(59)).is_empty());

        let fired = sched.drain_due(Duration::from_secs(60));
        assert_eq!(fired, vec![Action::Poll { ctrl: ctrl() }]);
        assert!(sched.drain_due(Duration::from_secs(600)).is_empty());
    }

    #[test]
    fn test_same_instant_preserves_enqueue_order() {
        let mut sched = Scheduler::default();
        let now = Duration::ZERO;
        sched.once(now, Duration::from_secs(1), Action::Teardown { ctrl: ctrl() });
        sched.once(now, Duration::from_secs(1), Action::Poll { ctrl: ctrl() });

        let fired = sched.drain_due(Duration::from_secs(5));
        assert_eq!(
            fired,
            vec![Action::Teardown { ctrl: ctrl() }, Action::Poll { ctrl: ctrl() }]
        );
    }

    #[test]
    fn test_earlier_due_fires_before_later_scheduled() {
        let mut sched = Scheduler::default();
        let now = Duration::ZERO;
        sched.once(now, Duration::from_secs(10), Action::Poll { ctrl: ctrl() });
        sched.defer(now, Action::Teardown { ctrl: ctrl() });

        // The deferred action is due immediately, the poll later.
        let fired = sched.drain_due(Duration::from_secs(10));
        assert_eq!(
            fired,
            vec![Action::Teardown { ctrl: ctrl() }, Action::Poll { ctrl: ctrl() }]
        );
    }

    #[test]
    fn test_repeating_requeues_with_same_handle() {
        let mut sched = Scheduler::default();
        let now = Duration::ZERO;
        let handle = sched.repeating(
            now,
            Duration::from_secs(60),
            Duration::from_secs(60),
            Action::SequenceTick { ctrl: ctrl() },
        );

        assert_eq!(sched.drain_due(Duration::from_secs(60)).len(), 1);
        assert!(sched.is_scheduled(handle));
        assert_eq!(sched.drain_due(Duration::from_secs(120)).len(), 1);

        sched.cancel(handle);
        assert!(!sched.is_scheduled(handle));
        assert!(sched.drain_due(Duration::from_secs(600)).is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut sched = Scheduler::default();
        let now = Duration::ZERO;
        let handle = sched.once(now, Duration::from_secs(5), Action::Poll { ctrl: ctrl() });

        sched.cancel(handle);
        sched.cancel(handle);
        assert!(sched.drain_due(Duration::from_secs(60)).is_empty());

        // Cancel after fire is also a no-op.
        let handle = sched.once(now, Duration::ZERO, Action::Poll { ctrl: ctrl() });
        assert_eq!(sched.drain_due(Duration::ZERO).len(), 1);
        sched.cancel(handle);
    }
}
