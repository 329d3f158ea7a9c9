//! Binary crate for the `owm` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Human-friendly output formatting

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=owm_core=debug shows requests and cache decisions.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "owm=info,owm_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
