//! Deadline timers for the LACP state machines.
//!
//! Every timer is identified by a [`TimerKey`]. Arming a key replaces any
//! earlier deadline for it and cancelling forgets it; both bump the key's
//! generation so heap entries left behind by earlier arms are discarded when
//! they surface. Time is milliseconds since daemon start, supplied by the
//! caller.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde::Serialize;

use crate::types::{IfIndex, LagIndex};

/// What a timer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TimerKey {
    /// Next periodic LACPDU transmission.
    Periodic(IfIndex),
    /// Receive machine current-while timer.
    CurrentWhile(IfIndex),
    /// Mux machine wait-while timer.
    WaitWhile(IfIndex),
    ActorChurn(IfIndex),
    PartnerChurn(IfIndex),
    /// Fallback activation of a LAG.
    Fallback(LagIndex),
}

impl TimerKey {
    /// Interface the timer belongs to, if any.
    pub fn interface(&self) -> Option<IfIndex> {
        match *self {
            TimerKey::Periodic(ifx)
            | TimerKey::CurrentWhile(ifx)
            | TimerKey::WaitWhile(ifx)
            | TimerKey::ActorChurn(ifx)
            | TimerKey::PartnerChurn(ifx) => Some(ifx),
            TimerKey::Fallback(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    deadline: u64,
    key: TimerKey,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    deadline: u64,
    generation: u64,
}

/// Min-heap of deadlines with per-key generations.
#[derive(Debug, Default)]
pub struct TimerService {
    heap: BinaryHeap<Reverse<Scheduled>>,
    armed: HashMap<TimerKey, Armed>,
    next_generation: u64,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `key` to fire at `deadline`, replacing any pending deadline.
    pub fn arm(&mut self, key: TimerKey, deadline: u64) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.armed.insert(
            key,
            Armed {
                deadline,
                generation,
            },
        );
        self.heap.push(Reverse(Scheduled {
            deadline,
            key,
            generation,
        }));
    }

    /// Arms `key` only if it is not already pending.
    pub fn arm_if_idle(&mut self, key: TimerKey, deadline: u64) {
        if !self.is_armed(key) {
            self.arm(key, deadline);
        }
    }

    pub fn cancel(&mut self, key: TimerKey) {
        self.armed.remove(&key);
    }

    /// Cancels every timer of one interface.
    pub fn cancel_interface(&mut self, ifx: IfIndex) {
        self.armed.retain(|key, _| key.interface() != Some(ifx));
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }

    pub fn deadline(&self, key: TimerKey) -> Option<u64> {
        self.armed.get(&key).map(|a| a.deadline)
    }

    pub fn pending_count(&self) -> usize {
        self.armed.len()
    }

    /// Removes and returns every key whose deadline is at or before `now`,
    /// in deadline order. Stale heap entries are dropped on the way.
    pub fn expired(&mut self, now: u64) -> Vec<TimerKey> {
        let mut fired = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek().copied() {
            if top.deadline > now {
                break;
            }
            self.heap.pop();

            let current = self
                .armed
                .get(&top.key)
                .is_some_and(|a| a.generation == top.generation);
            if current {
                self.armed.remove(&top.key);
                fired.push(top.key);
            }
        }

        // Keep the heap from accumulating stale entries.
        if self.heap.len() > 4 * self.armed.len() + 64 {
            self.compact();
        }
        fired
    }

    fn compact(&mut self) {
        let armed = &self.armed;
        let live: Vec<_> = self
            .heap
            .drain()
            .filter(|Reverse(s)| armed.get(&s.key).is_some_and(|a| a.generation == s.generation))
            .collect();
        self.heap = live.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const IF0: IfIndex = IfIndex(0);
    const IF1: IfIndex = IfIndex(1);

    #[test]
    fn test_fires_in_deadline_order() {
        let mut timers = TimerService::new();
        timers.arm(TimerKey::CurrentWhile(IF0), 3_000);
        timers.arm(TimerKey::Periodic(IF1), 1_000);
        timers.arm(TimerKey::Fallback(LagIndex(0)), 2_000);

        assert!(timers.expired(999).is_empty());
        assert_eq!(timers.expired(2_000), vec![
            TimerKey::Periodic(IF1),
            TimerKey::Fallback(LagIndex(0))
        ]);
        assert_eq!(timers.expired(10_000), vec![TimerKey::CurrentWhile(IF0)]);
        assert_eq!(timers.pending_count(), 0);
    }

    #[test]
    fn test_rearm_discards_stale_deadline() {
        let mut timers = TimerService::new();
        timers.arm(TimerKey::Periodic(IF0), 1_000);
        timers.arm(TimerKey::Periodic(IF0), 30_000);

        assert!(timers.expired(1_000).is_empty());
        assert_eq!(timers.deadline(TimerKey::Periodic(IF0)), Some(30_000));
        assert_eq!(timers.expired(30_000), vec![TimerKey::Periodic(IF0)]);
    }

    #[test]
    fn test_cancel_and_rearm_earlier() {
        let mut timers = TimerService::new();
        timers.arm(TimerKey::WaitWhile(IF0), 2_000);
        timers.cancel(TimerKey::WaitWhile(IF0));
        assert!(!timers.is_armed(TimerKey::WaitWhile(IF0)));
        assert!(timers.expired(5_000).is_empty());

        timers.arm(TimerKey::CurrentWhile(IF0), 90_000);
        timers.arm(TimerKey::CurrentWhile(IF0), 3_000);
        assert_eq!(timers.expired(3_000), vec![TimerKey::CurrentWhile(IF0)]);
        assert!(timers.expired(90_000).is_empty());
    }

    #[test]
    fn test_arm_if_idle() {
        let mut timers = TimerService::new();
        timers.arm_if_idle(TimerKey::ActorChurn(IF0), 60_000);
        timers.arm_if_idle(TimerKey::ActorChurn(IF0), 70_000);
        assert_eq!(timers.deadline(TimerKey::ActorChurn(IF0)), Some(60_000));
    }

    #[test]
    fn test_cancel_interface() {
        let mut timers = TimerService::new();
        timers.arm(TimerKey::Periodic(IF0), 1_000);
        timers.arm(TimerKey::CurrentWhile(IF0), 3_000);
        timers.arm(TimerKey::Periodic(IF1), 1_000);
        timers.arm(TimerKey::Fallback(LagIndex(0)), 1_000);

        timers.cancel_interface(IF0);
        assert_eq!(timers.expired(5_000), vec![
            TimerKey::Periodic(IF1),
            TimerKey::Fallback(LagIndex(0))
        ]);
    }

    #[test]
    fn test_compaction_keeps_live_timers() {
        let mut timers = TimerService::new();
        for deadline in 0..500 {
            timers.arm(TimerKey::Periodic(IF0), 100_000 + deadline);
        }
        timers.arm(TimerKey::Periodic(IF1), 10);
        assert_eq!(timers.expired(10), vec![TimerKey::Periodic(IF1)]);
        assert_eq!(timers.expired(200_000), vec![TimerKey::Periodic(IF0)]);
    }
}
