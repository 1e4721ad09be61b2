//! Virtual-time timer service.
//!
//! Every timer has an identity; arming an identity that is already pending
//! replaces it, so a key pressed twice has one un-press pending, not two.
//! Time only moves when a driver calls [`Timers::expire`], which keeps the
//! simulator deterministic under test and lets the real-time run loop map
//! wall-clock milliseconds onto the same clock.

use std::collections::HashMap;

/// Machine keys with a lamp that lights while pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineKey {
    Feed,
    Rel,
    Save,
    Drop,
}

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Run the head of the event queue.
    Queue,
    /// Pop a pressed key back up.
    KeyUp(MachineKey),
    /// Release the spring-loaded CLEAR switch.
    ClearSwitch,
    /// Power-off grace period elapsed; the machine halts.
    PowerOff,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    deadline: u64,
    /// Arming order, so timers due at the same instant fire first-armed first.
    order: u64,
}

#[derive(Debug, Default)]
pub struct Timers {
    now: u64,
    next_order: u64,
    pending: HashMap<TimerId, Pending>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Fire `id` after `delay` milliseconds, replacing any pending `id`.
    pub fn schedule(&mut self, id: TimerId, delay: u64) {
        let order = self.next_order;
        self.next_order += 1;
        self.pending.insert(
            id,
            Pending {
                deadline: self.now + delay,
                order,
            },
        );
    }

    /// Returns whether `id` was pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Pop the next timer due at or before `until`, advancing the clock to
    /// its deadline. Returns `None` (and moves the clock to `until`) once
    /// nothing else is due.
    pub fn expire(&mut self, until: u64) -> Option<TimerId> {
        let due = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= until)
            .min_by_key(|(_, p)| (p.deadline, p.order))
            .map(|(id, p)| (*id, p.deadline));
        match due {
            Some((id, deadline)) => {
                self.pending.remove(&id);
                self.now = self.now.max(deadline);
                Some(id)
            }
            None => {
                self.now = self.now.max(until);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_then_arming_order() {
        let mut t = Timers::new();
        t.schedule(TimerId::ClearSwitch, 10);
        t.schedule(TimerId::Queue, 0);
        t.schedule(TimerId::PowerOff, 10);
        assert_eq!(t.expire(100), Some(TimerId::Queue));
        assert_eq!(t.now(), 0);
        assert_eq!(t.expire(100), Some(TimerId::ClearSwitch));
        assert_eq!(t.expire(100), Some(TimerId::PowerOff));
        assert_eq!(t.now(), 10);
        assert_eq!(t.expire(100), None);
        assert_eq!(t.now(), 100);
    }

    #[test]
    fn rescheduling_replaces() {
        let mut t = Timers::new();
        let key = TimerId::KeyUp(MachineKey::Rel);
        t.schedule(key, 500);
        t.expire(200);
        t.schedule(key, 500);
        assert_eq!(t.next_deadline(), Some(700));
        assert_eq!(t.expire(600), None);
        assert_eq!(t.expire(700), Some(key));
        assert!(t.is_empty());
    }

    #[test]
    fn cancel_removes() {
        let mut t = Timers::new();
        t.schedule(TimerId::Queue, 5);
        assert!(t.cancel(TimerId::Queue));
        assert!(!t.cancel(TimerId::Queue));
        assert_eq!(t.expire(10), None);
    }
}
