//! Command-line interface wiring for the `x029` binary.
//!
//! This module owns the clap definitions and delegates execution to
//! specialized submodules that encapsulate each command family.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod common;
pub mod deck;
pub mod registry;
pub mod run;
pub mod utils;

/// Parsed CLI entrypoint for the `x029` binary.
#[derive(Parser, Debug)]
#[command(name = "x029", version, about = "IBM 029 keypunch simulator")]
pub struct Cli {
    /// Log every mechanism step (overridden by RUST_LOG).
    #[arg(long, global = true)]
    pub debug: bool,

    /// Top-level command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// High-level command families made available to end users.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Power up a keypunch and run it in real time.
    Run(run::RunArgs),
    /// List the punch charsets.
    Charsets,
    /// List the card stock the machine can be loaded with.
    Cards,
    #[command(subcommand)]
    Deck(deck::DeckCommand),
}

/// Execute the requested command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => run::handle(args),
        Command::Charsets => registry::charsets(),
        Command::Cards => registry::cards(),
        Command::Deck(cmd) => deck::handle(cmd),
    }
}
