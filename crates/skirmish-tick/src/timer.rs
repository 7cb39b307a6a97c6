//! Tick-counted timers with explicit cancellation tokens.
//!
//! A [`TimerQueue`] holds one-shot timers measured in ticks. Scheduling
//! returns a [`TimerToken`]; the token is the only way to cancel, and a
//! cancelled token can never fire. "Self-rescheduling" timers are built by
//! the caller scheduling a fresh timer while handling the one that fired.
//!
//! [`TimerSlot`] is the per-owner side of the contract: an owner holds at
//! most one token, and "no timer running" is `TimerSlot::Idle` rather than
//! a null handle.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::trace;

/// Handle to a scheduled timer. Unique for the lifetime of its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

/// A queue of one-shot timers keyed by due tick.
///
/// Timers scheduled for the same tick fire in scheduling order.
#[derive(Debug)]
pub struct TimerQueue<E> {
    now: u64,
    next_token: u64,
    /// `(due tick, token)` → event. Ordering by token breaks ties.
    pending: BTreeMap<(u64, TimerToken), E>,
    /// token → due tick, for O(log n) cancellation.
    due: HashMap<TimerToken, u64>,
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self {
            now: 0,
            next_token: 1,
            pending: BTreeMap::new(),
            due: HashMap::new(),
        }
    }

    /// Schedules `event` to fire `after_ticks` ticks from now. A delay of
    /// 0 is treated as 1: nothing fires during the tick that scheduled it.
    pub fn schedule(&mut self, after_ticks: u64, event: E) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        let due = self.now + after_ticks.max(1);
        self.pending.insert((due, token), event);
        self.due.insert(token, due);
        trace!(%token, due, "timer scheduled");
        token
    }

    /// Cancels a pending timer, returning its event. `None` if the token
    /// already fired or was already cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> Option<E> {
        let due = self.due.remove(&token)?;
        trace!(%token, "timer cancelled");
        self.pending.remove(&(due, token))
    }

    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.due.contains_key(&token)
    }

    /// Ticks left until `token` fires, if it's still pending.
    pub fn remaining(&self, token: TimerToken) -> Option<u64> {
        self.due.get(&token).map(|due| due.saturating_sub(self.now))
    }

    /// Advances the clock by one tick and returns every timer now due.
    pub fn advance(&mut self) -> Vec<(TimerToken, E)> {
        self.now += 1;
        let mut fired = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            let (due, token) = *entry.key();
            if due > self.now {
                break;
            }
            let event = entry.remove();
            self.due.remove(&token);
            fired.push((token, event));
        }
        fired
    }

    /// Ticks elapsed since the queue was created.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TimerSlot
// ---------------------------------------------------------------------------

/// The single timer an owner may have outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerSlot {
    #[default]
    Idle,
    Armed(TimerToken),
}

impl TimerSlot {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn token(&self) -> Option<TimerToken> {
        match self {
            Self::Idle => None,
            Self::Armed(token) => Some(*token),
        }
    }

    /// Returns `true` if this slot holds exactly `token`.
    pub fn holds(&self, token: TimerToken) -> bool {
        *self == Self::Armed(token)
    }

    /// Stores a freshly scheduled token.
    ///
    /// Arming an already-armed slot would orphan the old timer, which then
    /// fires against state it no longer matches. Callers disarm first.
    pub fn arm(&mut self, token: TimerToken) {
        debug_assert!(
            self.is_idle(),
            "timer slot armed twice (held {:?}, new {token})",
            self.token()
        );
        *self = Self::Armed(token);
    }

    /// Empties the slot, returning the token that was held.
    pub fn disarm(&mut self) -> Option<TimerToken> {
        std::mem::take(self).token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_fires_after_delay() {
        let mut q = TimerQueue::new();
        q.schedule(3, "boom");

        assert!(q.advance().is_empty());
        assert!(q.advance().is_empty());
        let fired = q.advance();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1, "boom");
        assert!(q.is_empty());
    }

    #[test]
    fn test_schedule_zero_delay_fires_next_tick() {
        let mut q = TimerQueue::new();
        let token = q.schedule(0, ());
        assert_eq!(q.remaining(token), Some(1));
        assert_eq!(q.advance().len(), 1);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let mut q = TimerQueue::new();
        let token = q.schedule(1, 7);

        assert_eq!(q.cancel(token), Some(7));
        assert!(!q.is_pending(token));
        assert!(q.advance().is_empty());
    }

    #[test]
    fn test_cancel_after_fire_returns_none() {
        let mut q = TimerQueue::new();
        let token = q.schedule(1, ());
        q.advance();
        assert_eq!(q.cancel(token), None);
    }

    #[test]
    fn test_same_tick_fires_in_schedule_order() {
        let mut q = TimerQueue::new();
        q.schedule(2, "first");
        q.schedule(2, "second");
        q.schedule(1, "earlier");

        assert_eq!(q.advance()[0].1, "earlier");
        let names: Vec<_> = q.advance().into_iter().map(|(_, e)| e).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_rescheduling_from_handler_uses_current_tick() {
        let mut q = TimerQueue::new();
        q.schedule(1, 1u32);
        for (_, n) in q.advance() {
            q.schedule(1, n + 1);
        }
        assert_eq!(q.now(), 1);
        let fired = q.advance();
        assert_eq!(fired[0].1, 2);
    }

    #[test]
    fn test_tokens_are_unique() {
        let mut q = TimerQueue::new();
        let a = q.schedule(1, ());
        let b = q.schedule(1, ());
        assert_ne!(a, b);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_slot_arm_and_disarm() {
        let mut q = TimerQueue::new();
        let token = q.schedule(5, ());
        let mut slot = TimerSlot::default();
        assert!(slot.is_idle());

        slot.arm(token);
        assert!(slot.holds(token));
        assert_eq!(slot.disarm(), Some(token));
        assert!(slot.is_idle());
        assert_eq!(slot.disarm(), None);
    }

    #[test]
    #[should_panic(expected = "armed twice")]
    #[cfg(debug_assertions)]
    fn test_slot_double_arm_panics_in_debug() {
        let mut q = TimerQueue::new();
        let mut slot = TimerSlot::Idle;
        slot.arm(q.schedule(1, ()));
        slot.arm(q.schedule(1, ()));
    }
}
