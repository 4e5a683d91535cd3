mod cmd;
mod config;
mod error;
mod io;
mod katfile;
mod mask;
mod record;
mod transform;
mod unmask;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// katmask: boolean-masked KAT vectors for side-channel protected hardware.
///
/// Splits every data word of cryptotvgen PDI/SDI test vectors into N shares
/// whose XOR reconstructs the word, so masked designs can be checked against
/// the same known answers as unmasked ones.
///
/// Logging goes to stderr; set RUST_LOG (e.g. `RUST_LOG=debug`) to change the level.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: cmd::Command,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    cmd::run(cli.command)
}
