//! Keystrokes held back while the mechanism is moving.

use std::collections::VecDeque;

/// A keystroke that punches or moves within the registered card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Data(u8),
    MultiPunch(u8),
    Left,
    Right,
}

/// Keystrokes that arrived while the mechanism was busy.
///
/// Replayed in arrival order once the event queue drains. Discontinuous
/// moves (HOME, TAB, DROP, release) discard it instead.
#[derive(Debug, Default)]
pub struct TypeaheadBuffer {
    keys: VecDeque<KeyInput>,
    enabled: bool,
}

impl TypeaheadBuffer {
    pub fn new(enabled: bool) -> Self {
        Self {
            keys: VecDeque::new(),
            enabled,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.keys.clear();
        }
    }

    /// Hold `key` for later. Returns `false` (and drops it) when typeahead
    /// is off.
    pub fn push(&mut self, key: KeyInput) -> bool {
        if !self.enabled {
            return false;
        }
        self.keys.push_back(key);
        true
    }

    /// Take everything held, oldest first.
    pub fn take(&mut self) -> Vec<KeyInput> {
        self.keys.drain(..).collect()
    }

    /// Discard everything held. Returns how many keys went.
    pub fn flush(&mut self) -> usize {
        let n = self.keys.len();
        self.keys.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_in_order() {
        let mut buf = TypeaheadBuffer::new(true);
        buf.push(KeyInput::Data(b'X'));
        buf.push(KeyInput::Left);
        buf.push(KeyInput::Data(b'Y'));
        assert_eq!(
            buf.take(),
            vec![KeyInput::Data(b'X'), KeyInput::Left, KeyInput::Data(b'Y')]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn disabled_drops() {
        let mut buf = TypeaheadBuffer::new(false);
        assert!(!buf.push(KeyInput::Right));
        assert!(buf.is_empty());

        let mut buf = TypeaheadBuffer::new(true);
        buf.push(KeyInput::Right);
        buf.set_enabled(false);
        assert_eq!(buf.len(), 0);
    }
}
