//! Where cards sit: punch station, optional read station, stacker.
//!
//! A card is owned by exactly one slot at a time and moves between them by
//! value. The two display surfaces that show the stations swap roles each
//! time a card advances into the read station, the way the same card image
//! keeps travelling left on the real machine.

use crate::card::Card;

/// State of the punch station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PunchState {
    /// No card, nothing in motion.
    #[default]
    Empty,
    /// A feed, release, drop, home or tab is under way.
    Flux,
    /// A card sits at the punch line and accepts keystrokes.
    Registered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceId {
    Left,
    Right,
}

/// Offset of a card image from its registered position, in cells.
///
/// `x` falls by one for every pan right; a card registered at column `c`
/// sits at `x == -c`. `y` is zero on the punch line and negative above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub id: SurfaceId,
    pub x: i32,
    pub y: i32,
}

impl Surface {
    fn new(id: SurfaceId) -> Self {
        Self { id, x: 0, y: 0 }
    }
}

#[derive(Debug)]
pub struct Stations {
    punch: Option<Card>,
    read: Option<Card>,
    stacker: Vec<Card>,
    has_read_station: bool,
    punch_surface: Surface,
    read_surface: Surface,
}

impl Stations {
    pub fn new(has_read_station: bool) -> Self {
        Self {
            punch: None,
            read: None,
            stacker: Vec::new(),
            has_read_station,
            punch_surface: Surface::new(SurfaceId::Left),
            read_surface: Surface::new(SurfaceId::Right),
        }
    }

    pub fn has_read_station(&self) -> bool {
        self.has_read_station
    }

    pub fn punch(&self) -> Option<&Card> {
        self.punch.as_ref()
    }

    pub fn punch_mut(&mut self) -> Option<&mut Card> {
        self.punch.as_mut()
    }

    pub fn read(&self) -> Option<&Card> {
        self.read.as_ref()
    }

    pub fn stacker(&self) -> &[Card] {
        &self.stacker
    }

    /// Put a card in the punch station, handing back any card already there.
    pub fn load_punch(&mut self, card: Card) -> Option<Card> {
        self.punch.replace(card)
    }

    /// Discard the punch-station card.
    pub fn take_punch(&mut self) -> Option<Card> {
        self.punch.take()
    }

    /// Advance cards one station towards the stacker.
    ///
    /// With a read station the punch card moves into it and the card it
    /// displaces is returned; without one the punch card itself is returned.
    /// The caller decides whether the returned card is stacked or discarded.
    pub fn shift(&mut self) -> Option<Card> {
        if self.has_read_station {
            let out = self.read.take();
            self.read = self.punch.take();
            std::mem::swap(&mut self.punch_surface, &mut self.read_surface);
            out
        } else {
            self.punch.take()
        }
    }

    pub fn push_stacker(&mut self, card: Card) {
        self.stacker.push(card);
    }

    /// Remove every stacked card, oldest first.
    pub fn drain_stacker(&mut self) -> Vec<Card> {
        std::mem::take(&mut self.stacker)
    }

    pub fn punch_surface(&self) -> Surface {
        self.punch_surface
    }

    pub fn read_surface(&self) -> Surface {
        self.read_surface
    }

    pub fn punch_surface_mut(&mut self) -> &mut Surface {
        &mut self.punch_surface
    }

    /// `None` when the machine has no read station.
    pub fn read_surface_mut(&mut self) -> Option<&mut Surface> {
        if self.has_read_station {
            Some(&mut self.read_surface)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(seq: u32) -> Card {
        Card::new(seq, 80, "029", "5081")
    }

    #[test]
    fn read_station_delays_stacking_by_one_card() {
        let mut st = Stations::new(true);
        st.load_punch(card(100));
        assert_eq!(st.shift(), None);
        assert_eq!(st.read().map(|c| c.seq), Some(100));
        assert_eq!(st.punch_surface().id, SurfaceId::Right);

        st.load_punch(card(110));
        assert_eq!(st.shift().map(|c| c.seq), Some(100));
        assert_eq!(st.read().map(|c| c.seq), Some(110));
        assert_eq!(st.punch_surface().id, SurfaceId::Left);

        // Clearing the read station shifts an empty punch station in.
        assert_eq!(st.shift().map(|c| c.seq), Some(110));
        assert!(st.read().is_none());
    }

    #[test]
    fn without_read_station_cards_go_straight_out() {
        let mut st = Stations::new(false);
        st.load_punch(card(100));
        assert_eq!(st.shift().map(|c| c.seq), Some(100));
        assert!(st.read_surface_mut().is_none());
        assert_eq!(st.shift(), None);
    }

    #[test]
    fn stacker_drains_in_order() {
        let mut st = Stations::new(false);
        st.push_stacker(card(100));
        st.push_stacker(card(110));
        let seqs: Vec<u32> = st.drain_stacker().iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![100, 110]);
        assert!(st.stacker().is_empty());
    }
}
