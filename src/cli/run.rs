//! `x029 run`: power up a keypunch and drive it in real time.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use keypunch::{
    Card, CardImageRegistry, CardSink, ChannelSource, Charset, Deck, DeckHeader, FileSource,
    Keypunch, MachineConfig, Mode, Options, PunchEncoding, RenderStyle, TraceRender, runloop,
};
use tracing::{info, warn};

use crate::cli::common::RenderStyleArg;
use crate::cli::utils::read_input;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Punch every line of FILE unattended (`-` reads stdin as it arrives).
    #[arg(long, value_name = "FILE")]
    pub demo: Option<PathBuf>,
    /// Take lines from stdin, feeding a fresh card after each one.
    #[arg(long)]
    pub remotectl: bool,
    /// Paste FILE into an interactive session once the first card registers.
    /// Stdin belongs to the keyboard, so `-` is refused.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["demo", "remotectl"])]
    pub paste: Option<PathBuf>,
    /// Write every card that leaves the machine to a deck file at power-off.
    #[arg(long, value_name = "DECK")]
    pub save: Option<PathBuf>,
    /// Print each card as it leaves the machine.
    #[arg(long)]
    pub listing: bool,
    /// Punch view used by --listing.
    #[arg(long, default_value = "ascii-x", value_enum)]
    pub style: RenderStyleArg,
    /// JSON machine configuration; missing fields keep their defaults.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Punch charset (029, 026ftn, 026comm, ebcdic).
    #[arg(long, default_value = "029")]
    pub charset: String,
    /// Card stock to load the hopper with.
    #[arg(long, default_value = "5081")]
    pub card: String,
    /// Punch the sequence number into columns 73-80 of every card.
    #[arg(long, overrides_with = "nonumber")]
    pub number: bool,
    #[arg(long, overrides_with = "number", hide = true)]
    pub nonumber: bool,
    /// Drop keystrokes typed while the card is moving.
    #[arg(long, overrides_with = "typeahead")]
    pub no_typeahead: bool,
    #[arg(long, overrides_with = "no_typeahead", hide = true)]
    pub typeahead: bool,
    /// Run without a read station.
    #[arg(long)]
    pub noread: bool,
    /// Power up with an empty punch station.
    #[arg(long)]
    pub empty: bool,
}

/// Cards leaving the machine: optionally listed, optionally kept for a deck.
struct Output {
    listing: Option<RenderStyle>,
    deck: Option<Deck>,
    count: usize,
}

impl CardSink for Output {
    fn accept(&mut self, card: Card) {
        self.count += 1;
        if let Some(style) = self.listing {
            println!("{}", card.render(style));
        }
        if let Some(deck) = self.deck.as_mut() {
            deck.accept(card);
        }
    }
}

pub fn handle(args: RunArgs) -> Result<()> {
    if args.paste.as_ref().is_some_and(|p| p.as_os_str() == "-") {
        bail!("--paste needs a file: stdin is the keyboard in an interactive session");
    }
    let config = match &args.config {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };
    let charset = Charset::find(&args.charset).unwrap_or_else(|err| {
        warn!(%err, "using the 029 charset");
        Charset::default()
    });
    let image = CardImageRegistry::get(&args.card)?;

    let mut remotectl = args.remotectl;
    if args.demo.is_some() && remotectl {
        warn!("--remotectl is ignored with --demo");
        remotectl = false;
    }
    let mode = match (&args.demo, remotectl) {
        (Some(_), _) => Mode::Batch,
        (None, true) => Mode::RemoteCtl,
        (None, false) => Mode::Interactive,
    };

    let options = Options {
        autonumber: args.number && !args.nonumber,
        typeahead: !args.no_typeahead,
        read_station: !args.noread,
        empty: args.empty,
        ..Options::default()
    };

    let output = Output {
        listing: args.listing.then(|| args.style.into()),
        deck: args
            .save
            .as_ref()
            .map(|_| Deck::new(DeckHeader::new(Some(charset.name().to_string())))),
        count: 0,
    };

    let charset_name = charset.name();
    let mut kp = Keypunch::new(config, options, mode, TraceRender, output)?
        .with_charset(Box::new(charset))
        .with_card_image(image);

    kp = match (&args.demo, mode) {
        (Some(path), _) if path.as_os_str() == "-" => {
            kp.with_source(Box::new(ChannelSource::stdin()))
        }
        (Some(path), _) => kp.with_source(Box::new(FileSource::open(path)?)),
        (None, Mode::RemoteCtl) => kp.with_source(Box::new(ChannelSource::stdin())),
        _ => kp,
    };

    kp.start();
    if let Some(path) = &args.paste {
        // Typed once power-up has finished.
        kp.paste(&read_input(path)?);
    }
    let keys = (mode == Mode::Interactive).then(|| runloop::spawn_keyboard(std::io::stdin()));

    runloop::run(&mut kp, keys).context("keypunch stopped")?;
    let saved = kp.save_stacker();
    let (_, mut output) = kp.into_parts();
    info!(cards = output.count, saved, "session finished");

    if let (Some(path), Some(deck)) = (&args.save, output.deck.as_mut()) {
        deck.log_action(format!(
            "punched {} cards on {} ({:?} mode)",
            deck.cards.len(),
            charset_name,
            mode
        ));
        deck.save(path)?;
        println!("Saved {} cards to {}", deck.cards.len(), path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn paste_from_stdin_is_refused() {
        let err = handle(run_args(&["x029", "run", "--paste", "-"])).unwrap_err();
        assert!(err.to_string().contains("--paste needs a file"));
    }

    #[test]
    fn paste_conflicts_with_demo() {
        assert!(Cli::try_parse_from(["x029", "run", "--paste", "a.txt", "--demo", "b.txt"]).is_err());
    }
}
