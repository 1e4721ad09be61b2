//! Wall-clock driver.
//!
//! Maps elapsed real milliseconds onto the machine's virtual clock, fires
//! whatever is due, then sleeps until the next deadline, a keystroke, or
//! readable auto-play input, whichever comes first.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Switch;
use crate::deck::CardSink;
use crate::error::Result;
use crate::machine::Keypunch;
use crate::render::Render;

/// A keyboard or panel action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Data(u8),
    MultiPunch(u8),
    Left,
    Right,
    Home,
    Tab,
    Release,
    Feed,
    Drop,
    Save,
    Clear,
    Power,
    Toggle(Switch),
    Paste(Vec<u8>),
    /// The keyboard went away: clear the machine and power off.
    Shutdown,
}

impl KeyEvent {
    /// Terminal byte to keypunch action.
    ///
    /// Printable characters punch; newline releases; tab tabs; backspace and
    /// DEL step left. A handful of control keys reach the panel:
    /// `^L` home, `^F` feed, `^X` drop, `^W` save, `^K` clear,
    /// `^A` auto-feed, `^P` print.
    pub fn from_byte(b: u8) -> Option<Self> {
        let ev = match b {
            b'\n' | b'\r' => KeyEvent::Release,
            b'\t' => KeyEvent::Tab,
            0x08 | 0x7f => KeyEvent::Left,
            0x0c => KeyEvent::Home,
            0x06 => KeyEvent::Feed,
            0x18 => KeyEvent::Drop,
            0x17 => KeyEvent::Save,
            0x0b => KeyEvent::Clear,
            0x01 => KeyEvent::Toggle(Switch::AutoFeed),
            0x10 => KeyEvent::Toggle(Switch::Print),
            b if b == b' ' || b.is_ascii_graphic() || b >= 0xa0 => KeyEvent::Data(b),
            _ => return None,
        };
        Some(ev)
    }

    pub fn apply<R: Render, S: CardSink>(self, kp: &mut Keypunch<R, S>) {
        match self {
            KeyEvent::Data(c) => kp.key_data(c),
            KeyEvent::MultiPunch(c) => kp.key_multipunch(c),
            KeyEvent::Left => kp.key_left(),
            KeyEvent::Right => kp.key_right(),
            KeyEvent::Home => kp.key_home(),
            KeyEvent::Tab => kp.key_tab(),
            KeyEvent::Release => kp.key_release(),
            KeyEvent::Feed => kp.key_feed(),
            KeyEvent::Drop => kp.key_drop(),
            KeyEvent::Save => kp.key_save(),
            KeyEvent::Clear => kp.clear_switch(),
            KeyEvent::Power => kp.power_switch(),
            KeyEvent::Toggle(switch) => kp.toggle(switch),
            KeyEvent::Paste(bytes) => kp.paste(&bytes),
            KeyEvent::Shutdown => kp.shutdown(),
        }
    }
}

/// Read `reader` on a helper thread and forward each mapped byte. The
/// channel closes at end of input.
pub fn spawn_keyboard<Rd>(mut reader: Rd) -> Receiver<KeyEvent>
where
    Rd: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("keyboard".into())
        .spawn(move || {
            let mut buf = [0u8; 256];
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "keyboard read failed");
                        break;
                    }
                };
                for ev in buf[..n].iter().copied().filter_map(KeyEvent::from_byte) {
                    if tx.send(ev).is_err() {
                        return;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not start keyboard thread");
    }
    rx
}

/// Drive `kp` in real time until it halts.
///
/// `keys` feeds an interactive machine; batch and remote-controlled
/// machines pass `None` and are driven by their auto-play source. When the
/// keyboard closes the machine is shut down in order.
pub fn run<R: Render, S: CardSink>(
    kp: &mut Keypunch<R, S>,
    mut keys: Option<Receiver<KeyEvent>>,
) -> Result<()> {
    let epoch = Instant::now();
    let elapsed = || u64::try_from(epoch.elapsed().as_millis()).unwrap_or(u64::MAX);

    while !kp.is_halted() {
        let now = elapsed();
        kp.advance_to(now)?;
        if kp.is_halted() {
            break;
        }
        let wait = kp
            .next_deadline()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(elapsed())));

        if let Some(rx) = keys.as_ref() {
            let timeout = wait.unwrap_or(Duration::from_millis(250));
            match rx.recv_timeout(timeout) {
                Ok(ev) => ev.apply(kp),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("keyboard closed");
                    keys = None;
                    kp.shutdown();
                }
            }
        } else if kp.awaiting_input() {
            let ready = kp.wait_for_input(wait).map_err(|source| {
                crate::error::KeypunchError::Read {
                    source_name: "auto-play".into(),
                    source,
                }
            })?;
            if ready {
                kp.input_ready()?;
            }
        } else if let Some(wait) = wait {
            thread::sleep(wait);
        } else {
            warn!("nothing left to drive, stopping");
            break;
        }
    }
    info!(elapsed_ms = elapsed(), "run loop finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Card;
    use crate::config::{Delays, MachineConfig, Mode, Options};
    use crate::render::NullRender;

    fn instant_config() -> MachineConfig {
        MachineConfig {
            delays: Delays {
                very_slow: 0,
                slow: 0,
                fast: 0,
                very_fast: 0,
            },
            key_up_delay: 0,
            clear_switch_hold: 0,
            power_off_grace: 0,
            shutdown_delay: 0,
            inert_delay: 0,
            ..MachineConfig::default()
        }
    }

    #[test]
    fn control_bytes_map_to_panel_keys() {
        assert_eq!(KeyEvent::from_byte(b'a'), Some(KeyEvent::Data(b'a')));
        assert_eq!(KeyEvent::from_byte(b' '), Some(KeyEvent::Data(b' ')));
        assert_eq!(KeyEvent::from_byte(b'\n'), Some(KeyEvent::Release));
        assert_eq!(KeyEvent::from_byte(0x7f), Some(KeyEvent::Left));
        assert_eq!(KeyEvent::from_byte(0x0c), Some(KeyEvent::Home));
        assert_eq!(KeyEvent::from_byte(0x02), None);
    }

    #[test]
    fn keyboard_session_runs_to_halt() {
        let (tx, rx) = mpsc::channel();
        for ev in [KeyEvent::Data(b'O'), KeyEvent::Data(b'K'), KeyEvent::Release] {
            tx.send(ev).unwrap();
        }
        drop(tx);

        let mut kp: Keypunch<NullRender, Vec<Card>> = Keypunch::new(
            instant_config(),
            Options::default(),
            Mode::Interactive,
            NullRender,
            Vec::new(),
        )
        .unwrap();
        kp.start();
        run(&mut kp, Some(rx)).unwrap();

        assert!(kp.is_halted());
        let stacked: Vec<String> = kp
            .stations()
            .stacker()
            .iter()
            .map(|c| c.text().trim_end().to_string())
            .collect();
        assert_eq!(stacked, vec!["OK".to_string()]);
    }
}
