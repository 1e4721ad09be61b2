//! Convenience helpers shared across command handlers.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use keypunch::Deck;

/// Read a whole file, or stdin when `-` is given.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buffer = Vec::new();
        std::io::Read::read_to_end(&mut std::io::stdin(), &mut buffer)
            .context("failed to read from stdin")?;
        return Ok(buffer);
    }
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Load a deck file, attaching path context to any error.
pub fn load_deck(path: &Path) -> Result<Deck> {
    Deck::load(path).with_context(|| format!("failed to read deck {}", path.display()))
}
