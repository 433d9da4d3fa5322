//! The binary entrypoint for `datim`, the filesystem imprint tool.

use clap::{crate_version, Parser, Subcommand};
use color_eyre::Result;
use tracing::instrument;
use tracing_subscriber::util::SubscriberInitExt;

mod cmd;
mod log;

#[derive(Clone, Debug, Parser)]
#[command(name = "datim", about = "Fingerprint and verify filesystem trees", version = crate_version!())]
struct TopLevelFlags {
    #[command(subcommand)]
    command: Command,

    /// When to colorize output.
    #[arg(long, value_enum, default_value_t = log::WhenColor::Auto)]
    color: log::WhenColor,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Walk a tree and emit a `.datim` imprint.
    Generate(cmd::generate::Options),
    /// Check a tree against a previously recorded `.datim` imprint.
    Check(cmd::check::Options),
}

#[instrument]
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let top = TopLevelFlags::parse();

    log::make_logger(top.color)?.init();

    match top.command {
        Command::Generate(options) => cmd::generate::exec(options).await,
        Command::Check(options) => cmd::check::exec(options).await,
    }
}
