//! Display callbacks.
//!
//! The simulator never draws. It tells a [`Render`] implementation which
//! column changed and which lamps, counters and switches moved; redrawing
//! must not touch the model, so repeating a call is harmless.

use tracing::{debug, info, trace};

use crate::card::Card;
use crate::clock::MachineKey;
use crate::config::Switch;
use crate::station::SurfaceId;

pub trait Render {
    /// Column `cn` of `card`, shown on `surface`, has new holes or text.
    fn redraw_column(&mut self, card: &Card, surface: SurfaceId, cn: usize);

    /// The column indicator moved.
    fn column_indicator(&mut self, _col: usize) {}

    /// The stacker counter changed.
    fn card_count(&mut self, _count: usize) {}

    fn power(&mut self, _on: bool) {}

    fn key_lamp(&mut self, _key: MachineKey, _pressed: bool) {}

    fn switch(&mut self, _switch: Switch, _on: bool) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRender;

impl Render for NullRender {
    fn redraw_column(&mut self, _card: &Card, _surface: SurfaceId, _cn: usize) {}
}

/// Emits display changes as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceRender;

impl Render for TraceRender {
    fn redraw_column(&mut self, card: &Card, surface: SurfaceId, cn: usize) {
        let text = card
            .column(cn)
            .map(|c| String::from_utf8_lossy(&c.text).into_owned())
            .unwrap_or_default();
        trace!(seq = card.seq, ?surface, col = cn, %text, "redraw column");
    }

    fn column_indicator(&mut self, col: usize) {
        trace!(col = col + 1, "column indicator");
    }

    fn card_count(&mut self, count: usize) {
        info!("stacker -{:04}-", count);
    }

    fn power(&mut self, on: bool) {
        info!(on, "power");
    }

    fn key_lamp(&mut self, key: MachineKey, pressed: bool) {
        trace!(?key, pressed, "key lamp");
    }

    fn switch(&mut self, switch: Switch, on: bool) {
        debug!(?switch, on, "switch");
    }
}

/// Remembers what it was asked to show, for tests and headless inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingRender {
    /// (card sequence number, surface, column) per redraw, in call order.
    pub redraws: Vec<(u32, SurfaceId, usize)>,
    pub indicator: usize,
    pub card_count: usize,
    pub power: bool,
    pub lamps: Vec<(MachineKey, bool)>,
    pub switches: Vec<(Switch, bool)>,
}

impl Render for RecordingRender {
    fn redraw_column(&mut self, card: &Card, surface: SurfaceId, cn: usize) {
        self.redraws.push((card.seq, surface, cn));
    }

    fn column_indicator(&mut self, col: usize) {
        self.indicator = col;
    }

    fn card_count(&mut self, count: usize) {
        self.card_count = count;
    }

    fn power(&mut self, on: bool) {
        self.power = on;
    }

    fn key_lamp(&mut self, key: MachineKey, pressed: bool) {
        self.lamps.push((key, pressed));
    }

    fn switch(&mut self, switch: Switch, on: bool) {
        self.switches.push((switch, on));
    }
}
