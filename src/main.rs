mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.debug);
    cli::run(cli)
}

/// `RUST_LOG` wins over `--debug`. Logs go to stderr so listings on stdout
/// stay clean.
fn init_tracing(debug: bool) {
    let fallback = if debug { "keypunch=debug,x029=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
