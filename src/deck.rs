use crate::card::{Card, Column};
use crate::cardimg::CardImageRegistry;
use crate::encoding::{CellMask, Charset, PunchEncoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

const DECK_VERSION: u8 = 1;

/// Receives cards as they leave the machine: evicted from the stacker by
/// SAVE, or straight out of the stations when running unattended.
pub trait CardSink {
    fn accept(&mut self, card: Card);
}

impl CardSink for Vec<Card> {
    fn accept(&mut self, card: Card) {
        self.push(card);
    }
}

/// Single card stored in a deck file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardRecord {
    pub seq: u32,
    /// Interpreted text, one character per column.
    pub text: String,
    /// Hole mask per column (bit layout of [`CellMask`](crate::CellMask)).
    pub holes: Vec<u16>,
    /// Columns carrying more than one printed character.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overstrike: BTreeMap<usize, String>,
    pub charset: String,
    pub card_image: String,
}

impl CardRecord {
    pub fn from_card(card: &Card) -> Self {
        let mut overstrike = BTreeMap::new();
        for (cn, col) in card.columns().iter().enumerate() {
            if col.text.len() > 1 {
                overstrike.insert(cn, col.text.iter().map(|&b| b as char).collect());
            }
        }
        let first = card.column(0);
        Self {
            seq: card.seq,
            text: card.text(),
            holes: card.columns().iter().map(|c| c.holes.0).collect(),
            overstrike,
            charset: first.map(|c| c.charset).unwrap_or("029").to_string(),
            card_image: first.map(|c| c.card_image).unwrap_or("5081").to_string(),
        }
    }

    /// Rebuild a card from the recorded holes and printed characters.
    ///
    /// Holes are taken as stored: a column may carry holes without print
    /// (PRINT off) or more holes than its printed characters explain
    /// (struck past the overstrike limit).
    pub fn to_card(&self) -> Result<Card> {
        let charset = Charset::find(&self.charset)
            .with_context(|| format!("card {} uses an unknown charset", self.seq))?;
        let image = CardImageRegistry::get(&self.card_image)
            .with_context(|| format!("card {} uses an unknown card image", self.seq))?;
        let mut printed = self.text.chars();
        let mut columns = Vec::with_capacity(self.holes.len());
        for (cn, &holes) in self.holes.iter().enumerate() {
            if holes & !CellMask::ALL.0 != 0 {
                return Err(anyhow!(
                    "card {} column {} has holes outside the card rows",
                    self.seq,
                    cn + 1
                ));
            }
            let shown = printed.next().unwrap_or(' ');
            let text = match self.overstrike.get(&cn) {
                Some(s) => s.chars().map(latin1).collect(),
                None if shown == ' ' => Vec::new(),
                None => vec![latin1(shown)],
            };
            columns.push(Column {
                holes: CellMask(holes),
                text,
                charset: charset.name(),
                card_image: image.name,
            });
        }
        Ok(Card::from_columns(self.seq, columns))
    }
}

fn latin1(ch: char) -> u8 {
    u8::try_from(u32::from(ch)).unwrap_or(b'?')
}

/// Per-deck metadata stored as a header record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeckHeader {
    pub version: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub history: Vec<AuditEvent>,
}

impl DeckHeader {
    pub fn new(charset: Option<String>) -> Self {
        Self {
            version: DECK_VERSION,
            created_at: Utc::now(),
            charset,
            history: Vec::new(),
        }
    }
}

/// Describes how the deck has changed over time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
}

impl AuditEvent {
    /// Create an audit entry using the OS user (if available).
    pub fn new<S: Into<String>>(action: S) -> Self {
        let actor = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            timestamp: Utc::now(),
            actor,
            action: action.into(),
        }
    }
}

/// In-memory representation of a deck file.
#[derive(Debug, Clone)]
pub struct Deck {
    pub header: DeckHeader,
    pub cards: Vec<CardRecord>,
    pub path: Option<PathBuf>,
}

impl CardSink for Deck {
    fn accept(&mut self, card: Card) {
        self.cards.push(CardRecord::from_card(&card));
    }
}

impl Deck {
    /// Create an empty deck using the provided header metadata.
    pub fn new(header: DeckHeader) -> Self {
        Self {
            header,
            cards: Vec::new(),
            path: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("failed to open deck file {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let header_line = lines
            .next()
            .ok_or_else(|| anyhow!("deck file {} is empty", path.display()))??;
        let deck_line: DeckLine = serde_json::from_str(&header_line)
            .with_context(|| format!("failed to parse deck header in {}", path.display()))?;
        let header = match deck_line {
            DeckLine::Header(header) => header,
            DeckLine::Card(_) => return Err(anyhow!("expected deck header as first line")),
        };

        let mut cards = Vec::new();
        for (idx, raw) in lines.enumerate() {
            let raw = raw?;
            if raw.trim().is_empty() {
                continue;
            }
            let line: DeckLine = serde_json::from_str(&raw).with_context(|| {
                format!(
                    "failed to parse card record at line {} in {}",
                    idx + 2,
                    path.display()
                )
            })?;
            match line {
                DeckLine::Header(_) => {
                    return Err(anyhow!(
                        "multiple deck headers found in {} at line {}",
                        path.display(),
                        idx + 2
                    ));
                }
                DeckLine::Card(card) => cards.push(card),
            }
        }

        Ok(Self {
            header,
            cards,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to write deck file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &DeckLine::Header(self.header.clone()))
            .context("failed to serialize deck header")?;
        writer.write_all(b"\n")?;
        for card in &self.cards {
            serde_json::to_writer(&mut writer, &DeckLine::Card(card.clone()))
                .context("failed to serialize deck card")?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Compute a SHA-256 hash over the punched content (header excluded, so
    /// re-saving the same cards yields the same digest).
    pub fn hash(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        let mut buffer = Vec::new();
        for card in &self.cards {
            serde_json::to_writer(&mut buffer, card).context("failed to hash deck card")?;
            hasher.update(&buffer);
            buffer.clear();
        }
        let digest = hasher.finalize();
        Ok(format!("{digest:02x}"))
    }

    /// Append an audit log entry.
    pub fn log_action<S: Into<String>>(&mut self, action: S) {
        self.header.history.push(AuditEvent::new(action));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum DeckLine {
    Header(DeckHeader),
    Card(CardRecord),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn punched(seq: u32, text: &[u8]) -> Card {
        let cs = Charset::ibm029();
        let mut card = Card::new(seq, 80, "029", "5081");
        for (cn, &b) in text.iter().enumerate() {
            card.punch(cn, b, &cs, true, 4);
        }
        card
    }

    #[test]
    fn record_rebuilds_the_card() {
        let mut card = punched(100, b"HELLO");
        card.punch(0, b'1', &Charset::ibm029(), true, 4);
        let record = CardRecord::from_card(&card);
        assert_eq!(record.overstrike.get(&0).map(String::as_str), Some("H1"));
        assert_eq!(&record.text[..5], "HELLO");
        assert_eq!(record.to_card().unwrap(), card);
    }

    #[test]
    fn unprinted_holes_survive_the_record() {
        let mut card = Card::new(100, 80, "029", "5081");
        card.punch(0, b'A', &Charset::ibm029(), false, 4);
        let record = CardRecord::from_card(&card);
        assert_eq!(&record.text[..1], " ");
        let rebuilt = record.to_card().unwrap();
        assert_eq!(rebuilt, card);
        assert!(rebuilt.column(0).unwrap().text.is_empty());
    }

    #[test]
    fn holes_struck_past_the_print_limit_survive_the_record() {
        let cs = Charset::ibm029();
        let mut card = Card::new(110, 80, "029", "5081");
        for &b in b"12345" {
            card.punch(0, b, &cs, true, 4);
        }
        let record = CardRecord::from_card(&card);
        assert_eq!(record.overstrike.get(&0).map(String::as_str), Some("1234"));
        let rebuilt = record.to_card().unwrap();
        assert_eq!(rebuilt, card);
        assert!(rebuilt.column(0).unwrap().holes.has_bit(5));
    }

    #[test]
    fn holes_outside_the_card_are_rejected() {
        let mut record = CardRecord::from_card(&punched(100, b"A"));
        record.holes[0] = 1 << 12;
        assert!(record.to_card().is_err());
    }

    #[test]
    fn save_and_load_keep_cards_in_order() {
        let dir = std::env::temp_dir().join(format!("keypunch-deck-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("deck.jsonl");

        let mut deck = Deck::new(DeckHeader::new(Some("029".into())));
        deck.accept(punched(100, b"FIRST"));
        deck.accept(punched(110, b"SECOND"));
        deck.log_action("save");
        deck.save(&path).unwrap();

        let loaded = Deck::load(&path).unwrap();
        assert_eq!(loaded.cards, deck.cards);
        assert_eq!(loaded.header.history.len(), 1);
        assert_eq!(loaded.hash().unwrap(), deck.hash().unwrap());
        assert!(loaded.cards[1].text.starts_with("SECOND"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
