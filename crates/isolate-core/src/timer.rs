//! Virtual-time timer queue (spec.md §3 "Timer queue", §4.8, §8 property 8
//! "Virtual timer ordering"). Real-time mode is just `tokio::time::sleep`
//! driven directly from `isolate-engine`; this module only implements the
//! deterministic, `tick(ms)`-driven variant used by tests.

use std::collections::BTreeMap;

use isolate_protocol::CallbackId;

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Periodic,
}

#[derive(Debug, Clone)]
struct TimerEntry {
    id: TimerId,
    kind: TimerKind,
    delay: u64,
    scheduled_at: u64,
    callback_id: CallbackId,
    /// Insertion sequence, used to break ties at equal `scheduled_at`
    /// (spec.md §8 property 8: "ties break by insertion order").
    sequence: u64,
}

/// Ordered by `(scheduled_at, sequence)` so popping the minimum is O(log n).
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: BTreeMap<(u64, u64), TimerEntry>,
    by_id: std::collections::HashMap<TimerId, (u64, u64)>,
    now: u64,
    next_id: TimerId,
    next_sequence: u64,
}

/// One timer that came due during a `tick`.
#[derive(Debug, Clone, Copy)]
pub struct FiredTimer {
    pub id: TimerId,
    pub callback_id: CallbackId,
}

impl TimerQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule(&mut self, kind: TimerKind, delay: u64, callback_id: CallbackId) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.insert_entry(id, kind, delay, self.now + delay, callback_id);
        id
    }

    fn insert_entry(
        &mut self,
        id: TimerId,
        kind: TimerKind,
        delay: u64,
        scheduled_at: u64,
        callback_id: CallbackId,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let key = (scheduled_at, sequence);
        self.entries.insert(
            key,
            TimerEntry {
                id,
                kind,
                delay,
                scheduled_at,
                callback_id,
                sequence,
            },
        );
        self.by_id.insert(id, key);
    }

    /// Removes a timer by id. A no-op for unknown ids (spec.md §4.8
    /// "`clearTimeout(id)` ... is a no-op for unknown ids").
    pub fn clear(&mut self, id: TimerId) {
        if let Some(key) = self.by_id.remove(&id) {
            self.entries.remove(&key);
        }
    }

    /// Pops and fires the single earliest entry due at or before `deadline`,
    /// rescheduling periodic entries at `previous_scheduled_time + delay` to
    /// keep long-run cadence stable (spec.md §4.8). Returns `None` (without
    /// advancing `now`) once nothing more is due -- the caller drives the
    /// loop so that a callback fired from one `pop_due` can itself call
    /// `schedule`, and that new entry is still picked up by a subsequent
    /// `pop_due` against the same `deadline` if it falls inside the window
    /// ("nested scheduling ... picked up if its deadline falls inside the
    /// remaining tick window", spec.md §4.8).
    pub fn pop_due(&mut self, deadline: u64) -> Option<FiredTimer> {
        let (&key, _) = self.entries.iter().next()?;
        if key.0 > deadline {
            return None;
        }
        let entry = self.entries.remove(&key).expect("key just found");
        self.by_id.remove(&entry.id);
        self.now = entry.scheduled_at;
        if entry.kind == TimerKind::Periodic {
            self.insert_entry(
                entry.id,
                entry.kind,
                entry.delay,
                entry.scheduled_at + entry.delay,
                entry.callback_id,
            );
        }
        Some(FiredTimer {
            id: entry.id,
            callback_id: entry.callback_id,
        })
    }

    /// Advances virtual time to at least `deadline`, for use once the caller
    /// has drained every due entry with `pop_due`.
    pub fn advance_to(&mut self, deadline: u64) {
        self.now = self.now.max(deadline);
    }

    /// Convenience for callers with purely synchronous timer callbacks
    /// (tests, and the simplest guest callback shape): advances virtual
    /// time by `delta_ms`, firing every due entry in order and returning the
    /// whole batch.
    pub fn tick(&mut self, delta_ms: u64) -> Vec<FiredTimer> {
        let deadline = self.now + delta_ms;
        let mut fired = Vec::new();
        while let Some(entry) = self.pop_due(deadline) {
            fired.push(entry);
        }
        self.advance_to(deadline);
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_scheduled_order_regardless_of_registration_order() {
        let mut queue = TimerQueue::new();
        let late = queue.schedule(TimerKind::OneShot, 300, 1);
        let early = queue.schedule(TimerKind::OneShot, 100, 2);

        let fired = queue.tick(300);
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].id, early);
        assert_eq!(fired[1].id, late);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut queue = TimerQueue::new();
        let first = queue.schedule(TimerKind::OneShot, 100, 1);
        let second = queue.schedule(TimerKind::OneShot, 100, 2);

        let fired = queue.tick(100);
        assert_eq!(fired[0].id, first);
        assert_eq!(fired[1].id, second);
    }

    #[test]
    fn clear_between_register_and_tick_removes_the_entry() {
        let mut queue = TimerQueue::new();
        let id = queue.schedule(TimerKind::OneShot, 100, 1);
        queue.clear(id);
        assert!(queue.tick(100).is_empty());
    }

    #[test]
    fn clear_is_a_no_op_for_unknown_ids() {
        let mut queue = TimerQueue::new();
        queue.clear(9999);
    }

    #[test]
    fn periodic_timer_reschedules_from_previous_scheduled_time_not_now() {
        let mut queue = TimerQueue::new();
        queue.schedule(TimerKind::Periodic, 100, 1);

        // One large tick should fire three times at 100, 200, 300, not drift.
        let fired = queue.tick(300);
        assert_eq!(fired.len(), 3);
    }

    #[test]
    fn nested_scheduling_inside_the_tick_window_is_picked_up() {
        let mut queue = TimerQueue::new();
        queue.schedule(TimerKind::OneShot, 50, 1);
        let deadline = queue.now() + 200;

        let first = queue.pop_due(deadline).expect("first timer due");
        assert_eq!(first.callback_id, 1);

        // The fired callback itself schedules a new timer; its deadline
        // falls inside the remaining window, so it must still fire before
        // the caller considers the tick complete.
        queue.schedule(TimerKind::OneShot, 30, 2);
        let second = queue.pop_due(deadline).expect("nested timer due");
        assert_eq!(second.callback_id, 2);

        assert!(queue.pop_due(deadline).is_none());
        queue.advance_to(deadline);
        assert_eq!(queue.now(), deadline);
    }
}
