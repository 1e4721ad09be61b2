//! Saved deck inspection (`x029 deck ...`).

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use keypunch::RenderStyle;

use crate::cli::common::RenderStyleArg;
use crate::cli::utils::load_deck;

/// Supported `x029 deck` subcommands.
#[derive(Subcommand, Debug)]
pub enum DeckCommand {
    /// Print the cards of a deck.
    Show(DeckShowArgs),
    /// Print the content digest of a deck.
    Hash(DeckPathArgs),
    /// Print the audit history of a deck.
    Log(DeckPathArgs),
}

/// Arguments for `x029 deck show`.
#[derive(Args, Debug)]
pub struct DeckShowArgs {
    /// Deck file to inspect.
    pub deck: PathBuf,
    /// Draw the punched holes rather than one line per card.
    #[arg(long)]
    pub punches: bool,
    /// Punch view used with --punches.
    #[arg(long, default_value = "ascii-x", value_enum)]
    pub style: RenderStyleArg,
}

#[derive(Args, Debug)]
pub struct DeckPathArgs {
    pub deck: PathBuf,
}

/// Execute a deck command.
pub fn handle(command: DeckCommand) -> Result<()> {
    match command {
        DeckCommand::Show(args) => show(args),
        DeckCommand::Hash(args) => hash(args),
        DeckCommand::Log(args) => log(args),
    }
}

fn show(args: DeckShowArgs) -> Result<()> {
    let deck = load_deck(args.deck.as_path())?;
    if args.punches {
        let style: RenderStyle = args.style.into();
        for record in &deck.cards {
            println!("{}", record.to_card()?.render(style));
        }
        return Ok(());
    }
    for record in &deck.cards {
        println!("{:08} {}", record.seq, record.text.trim_end());
    }
    Ok(())
}

fn hash(args: DeckPathArgs) -> Result<()> {
    let deck = load_deck(args.deck.as_path())?;
    println!("{}  {}", deck.hash()?, args.deck.display());
    Ok(())
}

fn log(args: DeckPathArgs) -> Result<()> {
    let deck = load_deck(args.deck.as_path())?;
    println!("Deck: {}", args.deck.display());
    println!("Created: {}", deck.header.created_at.to_rfc3339());
    println!(
        "Charset: {}",
        deck.header.charset.as_deref().unwrap_or("(unspecified)")
    );
    println!("Cards: {}", deck.cards.len());
    for event in &deck.header.history {
        println!(
            "  {} {:<12} {}",
            event.timestamp.to_rfc3339(),
            event.actor,
            event.action
        );
    }
    Ok(())
}
