//! Machine geometry, timing and switch settings.
//!
//! Step counts are tunables rather than values derived from the card
//! geometry: they describe how far the mechanism travels, which only has to
//! agree with the card format the renderer draws.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KeypunchError, Result};

/// The four speeds the mechanism moves at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    VerySlow,
    Slow,
    Fast,
    VeryFast,
}

/// Delay tiers in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    pub very_slow: u64,
    pub slow: u64,
    pub fast: u64,
    pub very_fast: u64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            very_slow: 500,
            slow: 75,
            fast: 25,
            very_fast: 15,
        }
    }
}

impl Delays {
    pub fn get(&self, speed: Speed) -> u64 {
        match speed {
            Speed::VerySlow => self.very_slow,
            Speed::Slow => self.slow,
            Speed::Fast => self.fast,
            Speed::VeryFast => self.very_fast,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub columns: usize,
    pub rows: usize,
    /// Characters that may be printed over one another above a column.
    pub overstrike_limit: usize,
    pub delays: Delays,
    /// Rows the card drops after the slam before it reaches the punch line.
    pub feed_pan_up_steps: usize,
    /// Columns from the slam position to the first print column.
    pub feed_pan_right_steps: usize,
    /// Extra pans after the last column to clear the punch station.
    pub release_clear_steps: usize,
    /// Pans that scroll a dropped card off the print surface.
    pub drop_scroll_steps: usize,
    /// Pans beyond the column count that scroll a card out of the read station.
    pub read_clear_extra_steps: usize,
    /// Column (zero-based) the TAB key skips to.
    pub tab_stop: usize,
    /// First column (zero-based) of the auto-number field.
    pub autonumber_column: usize,
    pub autonumber_width: usize,
    pub first_sequence: u32,
    pub sequence_step: u32,
    pub key_up_delay: u64,
    pub clear_switch_hold: u64,
    pub power_off_grace: u64,
    /// Pause before the auto-play shutdown and again before power-off.
    pub shutdown_delay: u64,
    /// Inert delay queued after power-off so nothing else runs.
    pub inert_delay: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        let delays = Delays::default();
        let rows = 12;
        Self {
            columns: 80,
            rows,
            overstrike_limit: 4,
            feed_pan_up_steps: rows + 2,
            feed_pan_right_steps: 52 - 40,
            release_clear_steps: 22,
            drop_scroll_steps: 87,
            read_clear_extra_steps: 14,
            tab_stop: 6,
            autonumber_column: 72,
            autonumber_width: 8,
            first_sequence: 100,
            sequence_step: 10,
            key_up_delay: delays.very_slow,
            clear_switch_hold: delays.slow * 6,
            power_off_grace: delays.very_slow * 2,
            shutdown_delay: delays.slow * 3,
            inert_delay: 6 * 1000,
            delays,
        }
    }
}

impl MachineConfig {
    /// Load a JSON configuration; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| KeypunchError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MachineConfig =
            serde_json::from_str(&raw).map_err(|source| KeypunchError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns == 0 {
            return Err(KeypunchError::Config("columns must be at least 1".into()));
        }
        if self.rows == 0 || self.rows > 16 {
            return Err(KeypunchError::Config(format!(
                "rows must be within 1..=16 (got {})",
                self.rows
            )));
        }
        if self.overstrike_limit == 0 {
            return Err(KeypunchError::Config(
                "overstrike_limit must be at least 1".into(),
            ));
        }
        if self.autonumber_column + self.autonumber_width > self.columns {
            return Err(KeypunchError::Config(format!(
                "auto-number field {}..{} runs past column {}",
                self.autonumber_column,
                self.autonumber_column + self.autonumber_width,
                self.columns
            )));
        }
        if self.tab_stop >= self.columns {
            return Err(KeypunchError::Config(format!(
                "tab stop {} is past the last column",
                self.tab_stop
            )));
        }
        Ok(())
    }

    pub fn delay(&self, speed: Speed) -> u64 {
        self.delays.get(speed)
    }
}

/// Where card content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Typed input; completed cards stay in the stacker.
    #[default]
    Interactive,
    /// Read a fixed source; cards leave the machine as they are stacked.
    Batch,
    /// Read stdin incrementally, feeding a fresh card after every line.
    RemoteCtl,
}

/// Toggle switches on the keyboard panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    AutoFeed,
    Print,
    /// Spring-loaded: throwing it clears the stations, then it drops back.
    Clear,
}

/// Switch and resource settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub auto_feed: bool,
    pub print: bool,
    pub autonumber: bool,
    pub typeahead: bool,
    pub read_station: bool,
    /// Start with an empty punch station instead of feeding a card.
    pub empty: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            auto_feed: true,
            print: true,
            autonumber: false,
            typeahead: true,
            read_station: true,
            empty: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_029_mechanism() {
        let cfg = MachineConfig::default();
        assert_eq!(cfg.feed_pan_up_steps, 14);
        assert_eq!(cfg.feed_pan_right_steps, 12);
        assert_eq!(cfg.clear_switch_hold, 450);
        assert_eq!(cfg.power_off_grace, 1000);
        assert_eq!(cfg.delay(Speed::VeryFast), 15);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: MachineConfig =
            serde_json::from_str(r#"{"columns": 96, "delays": {"slow": 10}}"#).unwrap();
        assert_eq!(cfg.columns, 96);
        assert_eq!(cfg.delays.slow, 10);
        assert_eq!(cfg.delays.fast, 25);
        assert_eq!(cfg.rows, 12);
    }

    #[test]
    fn autonumber_field_must_fit() {
        let cfg = MachineConfig {
            columns: 40,
            tab_stop: 6,
            ..MachineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(KeypunchError::Config(_))));
    }
}
