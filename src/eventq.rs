//! The event queue: micro-operations waiting for their turn on the mechanism.
//!
//! Entries drain strictly one at a time. Each entry waits out its own delay
//! before it runs, measured from the moment the previous entry finished.
//! The queue only keeps order; [`Keypunch`](crate::Keypunch) owns the timer
//! that paces it and the handlers that give each [`Op`] its effect.

use std::collections::VecDeque;

/// One step of the mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Do nothing; used for pauses and to poke the input FSMs.
    Dummy,
    /// Punch a character and advance one column.
    Data(u8),
    /// Punch a character without advancing.
    MultiPunch(u8),
    /// Backspace one column.
    KeyLeft,
    /// Space one column without punching.
    KybdRight { click: bool },
    /// One column of the release run-out.
    RelRight,
    /// Move the punch-station card one cell left (towards the hopper).
    PanLeftPrint,
    PanRightBoth,
    PanRightPrint,
    PanRightRead,
    /// Lower a freshly slammed card one row.
    PanUp,
    /// One step of the HOME run back to column 0.
    Home,
    /// Throw a new card into the channel.
    Slam,
    /// The card has reached the punch line.
    Registered { reset_cursor: bool },
    /// Pull a card from the hopper.
    NewCard { keep_sequence: bool },
    PowerOn,
    PressFeed,
    PressRel,
    /// The punch station is empty; optionally discard the card left there.
    Empty { free: bool },
    /// Shift cards towards the stacker.
    Stack,
    /// Auto-play shutdown: clear the machine, then power off.
    ClearSeq,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedEvent {
    pub op: Op,
    /// Dropped by a typeahead flush if it has not run yet.
    pub typeahead: bool,
    /// Milliseconds to wait before running.
    pub delay: u64,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    entries: VecDeque<QueuedEvent>,
    in_effect: u32,
    peak_in_effect: u32,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Returns `true` when the queue was idle, meaning the
    /// caller must arm the timer for this entry; while an entry is running the
    /// drain itself re-arms once the handler returns.
    pub fn push(&mut self, event: QueuedEvent) -> bool {
        let was_idle = self.entries.is_empty() && self.in_effect == 0;
        self.entries.push_back(event);
        was_idle
    }

    /// Take the head for execution.
    pub fn begin(&mut self) -> Option<QueuedEvent> {
        let event = self.entries.pop_front()?;
        self.in_effect += 1;
        self.peak_in_effect = self.peak_in_effect.max(self.in_effect);
        Some(event)
    }

    /// Mark the running entry finished. Returns the delay of the new head,
    /// or `None` when the queue has drained.
    pub fn finish(&mut self) -> Option<u64> {
        self.in_effect = self.in_effect.saturating_sub(1);
        self.entries.front().map(|e| e.delay)
    }

    /// Pending entries, not counting one that is running.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_idle(&self) -> bool {
        self.entries.is_empty() && self.in_effect == 0
    }

    /// Highest number of entries ever running at once; 1 for a healthy drain.
    pub fn peak_in_effect(&self) -> u32 {
        self.peak_in_effect
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedEvent> {
        self.entries.iter()
    }

    /// Drop pending typeahead-eligible entries. Returns how many went.
    pub fn flush_typeahead(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.typeahead);
        before - self.entries.len()
    }

    /// Drop everything pending without running it.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}
