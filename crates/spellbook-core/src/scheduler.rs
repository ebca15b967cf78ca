// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Clock-trigger scheduler.
//!
//! Keeps one timer slot per spell and a min-heap of pending fire times.
//! Re-arming a spell bumps its generation; heap entries from older
//! generations are discarded when they surface, so a replaced configuration
//! can never fire.  Times are whole Unix seconds.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::trigger::ClockConfig;
use crate::types::SpellId;

/// Where a spell's clock trigger stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerState {
    /// The clock section is disabled.
    Disabled,
    /// Waiting for `next_fire_sec`.
    Armed { next_fire_sec: u64 },
    /// Will never fire again: a oneshot that fired, or a closed window.
    Expired,
}

/// A timer that came due, handed back to the caller for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTimer {
    pub spell_id: SpellId,
    pub generation: u64,
    /// The second the tick fired at.
    pub fire_at_sec: u64,
}

#[derive(Debug, Clone)]
struct TimerSlot {
    clock: ClockConfig,
    generation: u64,
    state: TimerState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeapEntry {
    fire_at_sec: u64,
    generation: u64,
    spell_id: SpellId,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at_sec
            .cmp(&other.fire_at_sec)
            .then_with(|| self.generation.cmp(&other.generation))
            .then_with(|| self.spell_id.cmp(&other.spell_id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    slots: HashMap<SpellId, TimerSlot>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    next_generation: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)arm `spell_id` with `clock`, replacing any previous timer.
    ///
    /// A zero `start_sec` on an enabled clock, or a start in the past, fires
    /// at `now_sec`.
    ///
    /// ```rust
    /// use spellbook_core::scheduler::{Scheduler, TimerState};
    /// use spellbook_core::trigger::ClockConfig;
    /// use spellbook_core::types::SpellId;
    ///
    /// let mut scheduler = Scheduler::new();
    /// let clock = ClockConfig { start_sec: 0, end_sec: 0, period_sec: 10 };
    /// let state = scheduler.arm(&SpellId::from("s"), &clock, 1_000);
    /// assert_eq!(state, TimerState::Armed { next_fire_sec: 1_000 });
    /// assert_eq!(scheduler.pop_due(1_000).len(), 1);
    /// assert_eq!(scheduler.next_deadline_sec(), Some(1_010));
    /// ```
    pub fn arm(&mut self, spell_id: &SpellId, clock: &ClockConfig, now_sec: u64) -> TimerState {
        self.next_generation += 1;
        let generation = self.next_generation;
        let state = initial_state(clock, now_sec);

        if let TimerState::Armed { next_fire_sec } = state {
            self.heap.push(Reverse(HeapEntry {
                fire_at_sec: next_fire_sec,
                generation,
                spell_id: spell_id.clone(),
            }));
        }
        self.slots.insert(
            spell_id.clone(),
            TimerSlot {
                clock: *clock,
                generation,
                state,
            },
        );
        debug!(spell_id = %spell_id, generation, ?state, "timer armed");
        state
    }

    /// Forget the spell's timer.  Returns whether one existed.
    pub fn disarm(&mut self, spell_id: &SpellId) -> bool {
        self.slots.remove(spell_id).is_some()
    }

    pub fn state(&self, spell_id: &SpellId) -> Option<TimerState> {
        self.slots.get(spell_id).map(|slot| slot.state)
    }

    /// Whether `generation` is still the live timer of `spell_id`.
    pub fn is_current(&self, spell_id: &SpellId, generation: u64) -> bool {
        self.slots
            .get(spell_id)
            .is_some_and(|slot| slot.generation == generation)
    }

    /// Earliest pending fire time, dropping stale heap entries on the way.
    pub fn next_deadline_sec(&mut self) -> Option<u64> {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.is_live(top) {
                return Some(top.fire_at_sec);
            }
            self.heap.pop();
        }
        None
    }

    /// Pop every timer due at `now_sec` and advance its slot.
    ///
    /// The end boundary is checked against `now_sec`: a tick that surfaces
    /// at or after a non-zero `end_sec` expires the timer without firing.
    /// Periodic timers re-arm at `now_sec + period_sec`.
    pub fn pop_due(&mut self, now_sec: u64) -> Vec<DueTimer> {
        let mut due = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek() {
            if top.fire_at_sec > now_sec {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            if !self.is_live(&entry) {
                continue;
            }
            let Some(slot) = self.slots.get_mut(&entry.spell_id) else {
                continue;
            };

            if slot.clock.end_sec != 0 && now_sec >= slot.clock.end_sec {
                slot.state = TimerState::Expired;
                debug!(spell_id = %entry.spell_id, end_sec = slot.clock.end_sec, "timer window closed");
                continue;
            }

            if slot.clock.period_sec == 0 {
                slot.state = TimerState::Expired;
            } else {
                let next_fire_sec = now_sec.saturating_add(slot.clock.period_sec);
                slot.state = TimerState::Armed { next_fire_sec };
                self.heap.push(Reverse(HeapEntry {
                    fire_at_sec: next_fire_sec,
                    generation: entry.generation,
                    spell_id: entry.spell_id.clone(),
                }));
            }

            due.push(DueTimer {
                spell_id: entry.spell_id,
                generation: entry.generation,
                fire_at_sec: now_sec,
            });
        }
        due
    }

    fn is_live(&self, entry: &HeapEntry) -> bool {
        self.slots.get(&entry.spell_id).is_some_and(|slot| {
            slot.generation == entry.generation
                && slot.state == TimerState::Armed { next_fire_sec: entry.fire_at_sec }
        })
    }
}

fn initial_state(clock: &ClockConfig, now_sec: u64) -> TimerState {
    if clock.is_disabled() {
        return TimerState::Disabled;
    }
    let first = clock.start_sec.max(now_sec);
    if clock.end_sec != 0 && first >= clock.end_sec {
        return TimerState::Expired;
    }
    TimerState::Armed { next_fire_sec: first }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn clock(start_sec: u64, end_sec: u64, period_sec: u64) -> ClockConfig {
        ClockConfig {
            start_sec,
            end_sec,
            period_sec,
        }
    }

    #[test]
    fn disabled_clock_never_arms() {
        let mut scheduler = Scheduler::new();
        let id = SpellId::from("s");
        assert_eq!(scheduler.arm(&id, &clock(0, 0, 0), NOW), TimerState::Disabled);
        assert_eq!(scheduler.next_deadline_sec(), None);
        assert!(scheduler.pop_due(u64::MAX).is_empty());
    }

    #[test]
    fn oneshot_fires_once_then_expires() {
        let mut scheduler = Scheduler::new();
        let id = SpellId::from("s");
        scheduler.arm(&id, &clock(NOW + 5, 0, 0), NOW);

        assert!(scheduler.pop_due(NOW + 4).is_empty());
        let due = scheduler.pop_due(NOW + 5);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].fire_at_sec, NOW + 5);
        assert_eq!(scheduler.state(&id), Some(TimerState::Expired));
        assert!(scheduler.pop_due(NOW + 100).is_empty());
    }

    #[test]
    fn periodic_rearms_from_actual_fire_time() {
        let mut scheduler = Scheduler::new();
        let id = SpellId::from("s");
        scheduler.arm(&id, &clock(0, 0, 10), NOW);

        scheduler.pop_due(NOW);
        // Late by 3 seconds: the next tick counts from the late fire.
        let due = scheduler.pop_due(NOW + 13);
        assert_eq!(due[0].fire_at_sec, NOW + 13);
        assert_eq!(scheduler.state(&id), Some(TimerState::Armed { next_fire_sec: NOW + 23 }));
    }

    #[test]
    fn tick_at_end_boundary_expires_without_firing() {
        let mut scheduler = Scheduler::new();
        let id = SpellId::from("s");
        scheduler.arm(&id, &clock(NOW, NOW + 10, 5), NOW);

        assert_eq!(scheduler.pop_due(NOW).len(), 1);
        assert_eq!(scheduler.pop_due(NOW + 5).len(), 1);
        assert!(scheduler.pop_due(NOW + 10).is_empty());
        assert_eq!(scheduler.state(&id), Some(TimerState::Expired));
    }

    #[test]
    fn rearm_discards_previous_generation() {
        let mut scheduler = Scheduler::new();
        let id = SpellId::from("s");
        scheduler.arm(&id, &clock(NOW + 1, 0, 0), NOW);
        scheduler.arm(&id, &clock(NOW + 50, 0, 0), NOW);

        assert!(scheduler.pop_due(NOW + 1).is_empty());
        assert_eq!(scheduler.next_deadline_sec(), Some(NOW + 50));
    }

    #[test]
    fn end_alone_does_not_arm() {
        let mut scheduler = Scheduler::new();
        let id = SpellId::from("s");
        assert_eq!(scheduler.arm(&id, &clock(0, NOW + 3_600, 0), NOW), TimerState::Disabled);
        assert!(scheduler.pop_due(NOW + 3_600).is_empty());
        assert_eq!(scheduler.next_deadline_sec(), None);
    }

    #[test]
    fn disarm_drops_pending_timer() {
        let mut scheduler = Scheduler::new();
        let id = SpellId::from("s");
        let state = scheduler.arm(&id, &clock(0, 0, 1), NOW);
        assert!(matches!(state, TimerState::Armed { .. }));

        assert!(scheduler.disarm(&id));
        assert_eq!(scheduler.state(&id), None);
        assert!(scheduler.pop_due(NOW + 10).is_empty());
        assert_eq!(scheduler.next_deadline_sec(), None);
    }

    #[test]
    fn window_already_closed_is_expired_at_arm() {
        let mut scheduler = Scheduler::new();
        let state = scheduler.arm(&SpellId::from("s"), &clock(NOW - 10, NOW, 1), NOW);
        assert_eq!(state, TimerState::Expired);
    }

    #[test]
    fn due_timers_come_out_in_time_order() {
        let mut scheduler = Scheduler::new();
        scheduler.arm(&SpellId::from("late"), &clock(NOW + 2, 0, 0), NOW);
        scheduler.arm(&SpellId::from("early"), &clock(NOW + 1, 0, 0), NOW);
        let order: Vec<String> = scheduler
            .pop_due(NOW + 2)
            .into_iter()
            .map(|due| due.spell_id.to_string())
            .collect();
        assert_eq!(order, vec!["early", "late"]);
    }
}
