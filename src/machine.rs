//! The keypunch: stations, event queue, timers and input machines in one
//! single-threaded context.
//!
//! Everything happens in response to either a key/switch call from the front
//! end or a timer firing. Timer callbacks never nest: the driver fires one
//! timer at a time through [`Keypunch::advance_to`], and a queue handler that
//! enqueues more work only appends to the tail.

use std::ops::Range;

use tracing::{debug, info, trace};

use crate::card::Card;
use crate::cardimg::{CardImage, CardImageRegistry};
use crate::clock::{MachineKey, TimerId, Timers};
use crate::config::{MachineConfig, Mode, Options, Speed, Switch};
use crate::deck::CardSink;
use crate::encoding::{Charset, PunchEncoding};
use crate::error::Result;
use crate::eventq::{EventQueue, Op, QueuedEvent};
use crate::fsm::{ByteSource, FsmState, InputFsm};
use crate::render::Render;
use crate::station::{PunchState, Stations, SurfaceId};
use crate::typeahead::{KeyInput, TypeaheadBuffer};

pub struct Keypunch<R: Render, S: CardSink> {
    pub(crate) config: MachineConfig,
    pub(crate) options: Options,
    pub(crate) mode: Mode,
    charset: Box<dyn PunchEncoding>,
    card_image: &'static CardImage,
    next_card_image: Option<&'static CardImage>,
    timers: Timers,
    pub(crate) queue: EventQueue,
    typeahead: TypeaheadBuffer,
    stations: Stations,
    pub(crate) punch_state: PunchState,
    pub(crate) col: usize,
    pub(crate) power_on: bool,
    halted: bool,
    clear_on: bool,
    card_count: usize,
    line_number: u32,
    /// The last card released itself at the final column.
    pub(crate) did_auto_rel: bool,
    /// Batch mode has fed its first card.
    pub(crate) fed: bool,
    pub(crate) paste: InputFsm,
    pub(crate) autoplay: InputFsm,
    render: R,
    sink: S,
}

impl<R: Render, S: CardSink> Keypunch<R, S> {
    pub fn new(
        config: MachineConfig,
        options: Options,
        mode: Mode,
        render: R,
        sink: S,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            typeahead: TypeaheadBuffer::new(options.typeahead),
            stations: Stations::new(options.read_station),
            line_number: config.first_sequence,
            config,
            options,
            mode,
            charset: Box::new(Charset::ibm029()),
            card_image: CardImageRegistry::default_image(),
            next_card_image: None,
            timers: Timers::new(),
            queue: EventQueue::new(),
            punch_state: PunchState::Empty,
            col: 0,
            power_on: false,
            halted: false,
            clear_on: false,
            card_count: 0,
            did_auto_rel: false,
            fed: false,
            paste: InputFsm::paste(),
            autoplay: InputFsm::auto_play(None),
            render,
            sink,
        })
    }

    pub fn with_charset(mut self, charset: Box<dyn PunchEncoding>) -> Self {
        self.charset = charset;
        self
    }

    pub fn with_card_image(mut self, image: &'static CardImage) -> Self {
        self.card_image = image;
        self
    }

    /// Source the auto-play machine reads in batch and remote-control modes.
    pub fn with_source(mut self, source: Box<dyn ByteSource>) -> Self {
        self.autoplay = InputFsm::auto_play(Some(source));
        self
    }

    /// Queue the power-up sequence. Interactive and remote-controlled
    /// machines also feed their first card unless asked to start empty.
    pub fn start(&mut self) {
        info!(mode = ?self.mode, charset = self.charset.name(), "starting keypunch");
        let slow = self.config.delay(Speed::VerySlow);
        self.enqueue(Op::PowerOn, false, slow);
        if self.mode != Mode::Batch && !self.options.empty {
            self.enqueue(Op::PressFeed, false, slow);
            self.do_feed(false);
        }
    }

    // --- accessors -------------------------------------------------------

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn punch_state(&self) -> PunchState {
        self.punch_state
    }

    /// Zero-based column under the punch.
    pub fn column(&self) -> usize {
        self.col
    }

    pub fn is_powered(&self) -> bool {
        self.power_on
    }

    /// The machine powered off and its grace period ran out.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_clear_on(&self) -> bool {
        self.clear_on
    }

    pub fn card_count(&self) -> usize {
        self.card_count
    }

    pub fn stations(&self) -> &Stations {
        &self.stations
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn typeahead_len(&self) -> usize {
        self.typeahead.len()
    }

    pub fn paste_state(&self) -> FsmState {
        self.paste.state()
    }

    pub fn autoplay_state(&self) -> FsmState {
        self.autoplay.state()
    }

    pub fn charset(&self) -> &dyn PunchEncoding {
        self.charset.as_ref()
    }

    pub fn card_image(&self) -> &'static CardImage {
        self.card_image
    }

    pub fn render(&self) -> &R {
        &self.render
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_parts(self) -> (R, S) {
        (self.render, self.sink)
    }

    /// Virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.timers.now()
    }

    // --- driving time ----------------------------------------------------

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Fire every timer due at or before `until`, in order, and leave the
    /// clock at `until`.
    pub fn advance_to(&mut self, until: u64) -> Result<()> {
        while let Some(id) = self.timers.expire(until) {
            self.fire(id)?;
            if self.halted {
                break;
            }
        }
        Ok(())
    }

    /// Advance the clock by `ms`.
    pub fn run_for(&mut self, ms: u64) -> Result<()> {
        let until = self.timers.now() + ms;
        self.advance_to(until)
    }

    /// Fire timers until none are pending or the machine halts. Returns with
    /// the auto-play machine parked when it is waiting for input.
    pub fn run_until_idle(&mut self) -> Result<()> {
        while !self.halted {
            match self.timers.next_deadline() {
                Some(deadline) => self.advance_to(deadline)?,
                None => break,
            }
        }
        Ok(())
    }

    /// The auto-play machine is parked on a source with nothing to read.
    pub fn awaiting_input(&self) -> bool {
        self.power_on && self.autoplay.is_awaiting_input()
    }

    /// Block on the auto-play source for at most `timeout`.
    pub fn wait_for_input(&mut self, timeout: Option<std::time::Duration>) -> std::io::Result<bool> {
        self.autoplay.wait_readable(timeout)
    }

    /// The auto-play source has data; resume reading if the mechanism is idle.
    pub fn input_ready(&mut self) -> Result<()> {
        self.autoplay.clear_interest();
        self.run_fsms()
    }

    fn fire(&mut self, id: TimerId) -> Result<()> {
        match id {
            TimerId::Queue => self.drain_step()?,
            TimerId::KeyUp(key) => self.render.key_lamp(key, false),
            TimerId::ClearSwitch => {
                self.clear_on = false;
                self.render.switch(Switch::Clear, false);
            }
            TimerId::PowerOff => {
                info!(cards = self.card_count, "power off");
                self.halted = true;
            }
        }
        Ok(())
    }

    /// Run the head of the queue, then re-arm for the next entry or, when
    /// the queue has drained, run the idle hook.
    fn drain_step(&mut self) -> Result<()> {
        let Some(event) = self.queue.begin() else {
            return Ok(());
        };
        trace!(op = ?event.op, pending = self.queue.depth(), "run");
        self.apply(event.op);
        match self.queue.finish() {
            Some(delay) => self.timers.schedule(TimerId::Queue, delay),
            None => self.on_idle()?,
        }
        Ok(())
    }

    fn on_idle(&mut self) -> Result<()> {
        if !self.power_on {
            return Ok(());
        }
        let held = self.typeahead.take();
        if !held.is_empty() {
            debug!(keys = held.len(), "replaying typeahead");
        }
        for key in held {
            self.enqueue_key(key);
        }
        if self.queue.is_idle() {
            self.run_fsms()?;
        }
        Ok(())
    }

    pub(crate) fn enqueue(&mut self, op: Op, typeahead: bool, delay: u64) {
        let armed = self.queue.push(QueuedEvent {
            op,
            typeahead,
            delay,
        });
        if armed {
            self.timers.schedule(TimerId::Queue, delay);
        }
    }

    fn enqueue_n(&mut self, op: Op, n: usize, speed: Speed) {
        let delay = self.config.delay(speed);
        for _ in 0..n {
            self.enqueue(op, false, delay);
        }
    }

    // --- queue handlers --------------------------------------------------

    fn apply(&mut self, op: Op) {
        let ncols = self.config.columns;
        match op {
            Op::Dummy => {}
            Op::Data(c) => {
                if self.punch_state == PunchState::Registered
                    && self.col < ncols
                    && self.punch(self.col, c)
                {
                    self.redraw_punch_column(self.col);
                    self.kybd_right(false);
                }
            }
            Op::MultiPunch(c) => {
                if self.punch_state == PunchState::Registered
                    && self.col < ncols
                    && self.punch(self.col, c)
                {
                    self.redraw_punch_column(self.col);
                }
            }
            Op::KeyLeft => {
                if self.col > 0 {
                    self.pan_both(1);
                    self.set_col(self.col - 1);
                } else {
                    self.flush_typeahead();
                }
            }
            Op::KybdRight { click } => self.kybd_right(click),
            Op::RelRight => {
                if self.col < ncols {
                    self.pan_both(-1);
                    self.set_col(self.col + 1);
                }
            }
            Op::PanLeftPrint => self.stations.punch_surface_mut().x += 1,
            Op::PanRightBoth => self.pan_both(-1),
            Op::PanRightPrint => self.stations.punch_surface_mut().x -= 1,
            Op::PanRightRead => {
                if let Some(s) = self.stations.read_surface_mut() {
                    s.x -= 1;
                }
            }
            Op::PanUp => self.stations.punch_surface_mut().y += 1,
            Op::Home => {
                self.pan_both(1);
                self.set_col(self.col.saturating_sub(1));
            }
            Op::Slam => {
                let x = self.config.feed_pan_right_steps as i32;
                let y = -(self.config.feed_pan_up_steps as i32);
                let surface = self.stations.punch_surface_mut();
                surface.x = x;
                surface.y = y;
            }
            Op::Registered { reset_cursor } => {
                self.punch_state = PunchState::Registered;
                if reset_cursor {
                    self.set_col(0);
                }
                trace!(col = self.col, "card registered");
            }
            Op::NewCard { keep_sequence } => self.new_card(keep_sequence),
            Op::PowerOn => {
                self.power_on = true;
                self.render.power(true);
                info!("power on");
            }
            Op::PressFeed => self.press_key(MachineKey::Feed),
            Op::PressRel => self.press_key(MachineKey::Rel),
            Op::Empty { free } => {
                if free && let Some(card) = self.stations.take_punch() {
                    debug!(seq = card.seq, "card dropped");
                }
                self.punch_state = PunchState::Empty;
            }
            Op::Stack => {
                if let Some(card) = self.stations.shift() {
                    self.stack_card(card);
                }
            }
            Op::ClearSeq => {
                self.throw_clear();
                let pause = self.config.shutdown_delay;
                let inert = self.config.inert_delay;
                self.enqueue(Op::Off, false, pause);
                self.enqueue(Op::Dummy, false, inert);
            }
            Op::Off => self.power_off(),
        }
    }

    fn punch(&mut self, cn: usize, c: u8) -> bool {
        let Some(card) = self.stations.punch_mut() else {
            return false;
        };
        card.punch(
            cn,
            c,
            self.charset.as_ref(),
            self.options.print,
            self.config.overstrike_limit,
        )
    }

    fn kybd_right(&mut self, click: bool) {
        let ncols = self.config.columns;
        if self.col >= ncols {
            self.flush_typeahead();
            return;
        }
        if click {
            trace!("click");
        }
        self.pan_both(-1);
        self.set_col(self.col + 1);
        if self.options.auto_feed && self.col == ncols {
            debug!("last column, auto release");
            self.do_release(Speed::VeryFast);
            self.do_feed(false);
            self.did_auto_rel = true;
        }
    }

    fn pan_both(&mut self, dx: i32) {
        self.stations.punch_surface_mut().x += dx;
        if let Some(s) = self.stations.read_surface_mut() {
            s.x += dx;
        }
    }

    fn set_col(&mut self, col: usize) {
        self.col = col;
        if col < self.config.columns {
            self.render.column_indicator(col);
        }
    }

    fn redraw_punch_column(&mut self, cn: usize) {
        let surface = self.stations.punch_surface().id;
        if let Some(card) = self.stations.punch() {
            self.render.redraw_column(card, surface, cn);
        }
    }

    fn next_sequence(&mut self) -> u32 {
        let seq = self.line_number;
        self.line_number += self.config.sequence_step;
        seq
    }

    fn new_card(&mut self, keep_sequence: bool) {
        self.punch_state = PunchState::Flux;
        if let Some(next) = self.next_card_image.take() {
            debug!(image = next.name, "switching card stock");
            self.card_image = next;
        }
        let charset = self.charset.name();
        let image = self.card_image.name;
        let keep = keep_sequence && self.mode == Mode::Interactive;

        let current = self.stations.punch().map(|card| card.seq);
        let seq = match current {
            Some(seq) if keep => seq,
            _ => self.next_sequence(),
        };
        match self.stations.punch_mut() {
            Some(card) => {
                card.seq = seq;
                card.reset(charset, image);
            }
            None => {
                self.stations
                    .load_punch(Card::new(seq, self.config.columns, charset, image));
            }
        }
        debug!(seq, "new card");

        if self.options.autonumber
            && let Some(card) = self.stations.punch_mut()
        {
            card.autonumber(
                self.config.autonumber_column,
                self.config.autonumber_width,
                self.charset.as_ref(),
                self.options.print,
                self.config.overstrike_limit,
            );
        }
        for cn in 0..self.config.columns {
            self.redraw_punch_column(cn);
        }
    }

    fn stack_card(&mut self, card: Card) {
        debug!(seq = card.seq, text = %card.text().trim_end(), "card stacked");
        if self.mode == Mode::Interactive {
            self.stations.push_stacker(card);
        } else {
            self.sink.accept(card);
        }
        self.card_count += 1;
        self.render.card_count(self.card_count);
    }

    fn flush_typeahead(&mut self) {
        let held = self.typeahead.flush();
        let queued = self.queue.flush_typeahead();
        if held + queued > 0 {
            debug!(held, queued, "typeahead flushed");
        }
    }

    fn power_off(&mut self) {
        self.power_on = false;
        self.render.power(false);
        let dropped = self.queue.clear();
        self.typeahead.flush();
        self.timers.cancel(TimerId::Queue);
        self.timers
            .schedule(TimerId::PowerOff, self.config.power_off_grace);
        debug!(dropped, "powering down");
    }

    // --- sequences -------------------------------------------------------

    /// Run the card out of the punch station and stack it.
    pub(crate) fn do_release(&mut self, speed: Speed) {
        self.flush_typeahead();
        self.punch_state = PunchState::Flux;
        let left = self.config.columns.saturating_sub(self.col);
        self.enqueue_n(Op::RelRight, left, speed);
        self.enqueue_n(Op::PanRightBoth, self.config.release_clear_steps, speed);
        self.enqueue(Op::Empty { free: false }, false, 0);
        self.enqueue(Op::Stack, false, 0);
    }

    /// Scroll the read-station card out and stack it.
    fn do_clear_read(&mut self) {
        let steps = self.config.columns + self.config.read_clear_extra_steps;
        self.enqueue_n(Op::PanRightRead, steps, Speed::VeryFast);
        self.enqueue(Op::Stack, false, 0);
    }

    /// Pull a card from the hopper and bring it to column 1.
    pub(crate) fn do_feed(&mut self, keep_sequence: bool) {
        if self.punch_state == PunchState::Empty {
            self.punch_state = PunchState::Flux;
        }
        let fast = self.config.delay(Speed::Fast);
        let slow = self.config.delay(Speed::Slow);
        self.enqueue(Op::NewCard { keep_sequence }, false, fast);
        self.enqueue(Op::Slam, false, slow);
        self.enqueue_n(Op::PanUp, self.config.feed_pan_up_steps, Speed::Fast);
        self.enqueue_n(
            Op::PanRightPrint,
            self.config.feed_pan_right_steps,
            Speed::VeryFast,
        );
        self.enqueue(Op::Registered { reset_cursor: true }, false, 0);
    }

    pub(crate) fn press_key(&mut self, key: MachineKey) {
        self.render.key_lamp(key, true);
        self.timers
            .schedule(TimerId::KeyUp(key), self.config.key_up_delay);
    }

    /// Queue a character for punching if the charset knows it.
    pub(crate) fn add_char(&mut self, c: u8) -> bool {
        if !self.power_on || self.punch_state != PunchState::Registered {
            return false;
        }
        if self.charset.is_supported(c) {
            let slow = self.config.delay(Speed::Slow);
            self.enqueue(Op::Data(c), true, slow);
        } else {
            trace!(byte = c, "no punch code, skipped");
        }
        true
    }

    // --- keyboard --------------------------------------------------------

    pub fn key_data(&mut self, c: u8) {
        self.key_input(KeyInput::Data(c));
    }

    pub fn key_multipunch(&mut self, c: u8) {
        self.key_input(KeyInput::MultiPunch(c));
    }

    pub fn key_left(&mut self) {
        self.key_input(KeyInput::Left);
    }

    pub fn key_right(&mut self) {
        self.key_input(KeyInput::Right);
    }

    fn key_input(&mut self, key: KeyInput) {
        if !self.power_on || self.punch_state != PunchState::Registered {
            trace!(?key, "ignored, no card registered");
            return;
        }
        if self.queue.depth() > 0 {
            if !self.typeahead.push(key) {
                trace!(?key, "dropped, typeahead off");
            }
            return;
        }
        self.enqueue_key(key);
    }

    fn enqueue_key(&mut self, key: KeyInput) {
        if !self.power_on || self.punch_state != PunchState::Registered {
            return;
        }
        let slow = self.config.delay(Speed::Slow);
        let op = match key {
            KeyInput::Data(c) => Op::Data(c),
            KeyInput::MultiPunch(c) => Op::MultiPunch(c),
            KeyInput::Left => Op::KeyLeft,
            KeyInput::Right => Op::KybdRight { click: true },
        };
        self.enqueue(op, true, slow);
    }

    pub fn key_home(&mut self) {
        if !self.power_on || self.punch_state != PunchState::Registered {
            return;
        }
        self.flush_typeahead();
        self.punch_state = PunchState::Flux;
        self.enqueue_n(Op::Home, self.col, Speed::Fast);
        self.enqueue(Op::Registered { reset_cursor: true }, false, 0);
    }

    /// Skip to the tab stop. Does nothing past it.
    pub fn key_tab(&mut self) {
        if !self.power_on || self.punch_state != PunchState::Registered {
            return;
        }
        self.flush_typeahead();
        self.punch_state = PunchState::Flux;
        let steps = self.config.tab_stop.saturating_sub(self.col);
        self.enqueue_n(Op::KybdRight { click: true }, steps, Speed::Slow);
        self.enqueue(Op::Registered { reset_cursor: false }, false, 0);
    }

    pub fn key_release(&mut self) {
        self.press_key(MachineKey::Rel);
        if !self.power_on || self.punch_state != PunchState::Registered {
            return;
        }
        self.do_release(Speed::VeryFast);
        if self.options.auto_feed {
            self.do_feed(false);
        }
    }

    pub fn key_feed(&mut self) {
        self.press_key(MachineKey::Feed);
        if self.power_on && self.queue.is_idle() && self.punch_state == PunchState::Empty {
            self.do_feed(false);
        }
    }

    /// Throw the registered card away; with auto-feed on a blank card takes
    /// its place under the same sequence number.
    pub fn key_drop(&mut self) {
        self.press_key(MachineKey::Drop);
        if !self.power_on || self.punch_state != PunchState::Registered {
            return;
        }
        self.flush_typeahead();
        self.punch_state = PunchState::Flux;
        self.enqueue_n(Op::KeyLeft, self.col + 1, Speed::Fast);
        self.enqueue_n(Op::PanLeftPrint, self.config.drop_scroll_steps, Speed::Fast);
        if self.options.auto_feed {
            self.do_feed(true);
        } else {
            self.enqueue(Op::Empty { free: true }, false, 0);
        }
    }

    /// Hand the stacker to the sink. Only interactive machines stack.
    pub fn key_save(&mut self) {
        self.press_key(MachineKey::Save);
        if self.power_on && self.mode == Mode::Interactive {
            self.save_stacker();
        }
    }

    /// Move every stacked card to the sink, oldest first.
    pub fn save_stacker(&mut self) -> usize {
        let cards = self.stations.drain_stacker();
        let n = cards.len();
        for card in cards {
            self.sink.accept(card);
        }
        self.card_count = 0;
        self.render.card_count(0);
        if n > 0 {
            info!(cards = n, "stacker saved");
        }
        n
    }

    /// Throw the spring-loaded CLEAR switch. Ignored while it is still up.
    pub fn clear_switch(&mut self) {
        if !self.power_on || self.clear_on {
            return;
        }
        self.throw_clear();
    }

    fn throw_clear(&mut self) {
        self.clear_on = true;
        self.render.switch(Switch::Clear, true);
        self.timers
            .schedule(TimerId::ClearSwitch, self.config.clear_switch_hold);
        debug!(state = ?self.punch_state, "clearing stations");
        match self.punch_state {
            PunchState::Registered => {
                self.do_release(Speed::VeryFast);
                if self.stations.has_read_station() {
                    self.do_clear_read();
                }
            }
            PunchState::Empty if self.stations.read().is_some() => self.do_clear_read(),
            _ => {}
        }
    }

    pub fn set_switch(&mut self, switch: Switch, on: bool) {
        match switch {
            Switch::AutoFeed => self.options.auto_feed = on,
            Switch::Print => self.options.print = on,
            Switch::Clear => {
                if on {
                    self.clear_switch();
                }
                return;
            }
        }
        self.render.switch(switch, on);
    }

    pub fn toggle(&mut self, switch: Switch) {
        let on = match switch {
            Switch::AutoFeed => !self.options.auto_feed,
            Switch::Print => !self.options.print,
            Switch::Clear => true,
        };
        self.set_switch(switch, on);
    }

    /// Power switch: off runs down immediately, on starts a fresh machine.
    pub fn power_switch(&mut self) {
        if self.power_on {
            self.power_off();
        } else if !self.halted {
            self.timers.cancel(TimerId::PowerOff);
            self.start();
        }
    }

    /// Queue an orderly shutdown: clear the stations, then power off.
    pub fn shutdown(&mut self) {
        if !self.power_on {
            return;
        }
        self.set_switch(Switch::AutoFeed, false);
        let pause = self.config.shutdown_delay;
        self.enqueue(Op::ClearSeq, false, pause);
    }

    /// Type pasted text through the paste machine. Text pasted before the
    /// power comes up waits for it.
    pub fn paste(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        for &b in bytes {
            self.paste.push_paste(b);
        }
        debug!(bytes = bytes.len(), "paste");
        // An empty queue would never reach the idle hook on its own.
        self.enqueue(Op::Dummy, false, 0);
    }

    pub fn set_typeahead(&mut self, enabled: bool) {
        self.options.typeahead = enabled;
        self.typeahead.set_enabled(enabled);
    }

    /// Takes effect from the next column punched.
    pub fn set_charset(&mut self, charset: Box<dyn PunchEncoding>) {
        debug!(charset = charset.name(), "charset selected");
        self.charset = charset;
    }

    /// Takes effect from the next card fed.
    pub fn set_next_card_image(&mut self, image: &'static CardImage) {
        self.next_card_image = Some(image);
    }

    /// Redraw `cols` of whichever card `surface` shows.
    pub fn expose(&mut self, surface: SurfaceId, cols: Range<usize>) {
        let card = if self.stations.punch_surface().id == surface {
            self.stations.punch()
        } else if self.stations.has_read_station() && self.stations.read_surface().id == surface {
            self.stations.read()
        } else {
            None
        };
        let Some(card) = card else {
            return;
        };
        let end = cols.end.min(card.width());
        for cn in cols.start..end {
            self.render.redraw_column(card, surface, cn);
        }
    }
}
