//! sitefetch CLI
//!
//! Fetches a tracker page the way the library does and reports what it got.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod probe;

use probe::{run_probe, ProbeArgs};

#[derive(Parser)]
#[command(name = "sitefetch")]
#[command(author = "RoyalBit Inc.")]
#[command(version)]
#[command(about = "Authenticated tracker page fetching with parser dispatch")]
#[command(long_about = "Fetches a tracker page with a session cookie, recovering from anti-scrape redirects and decoy homepages, optionally through headless Chrome.\n\nCommands:\n  probe    Fetch one site and report the detected schema")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one site and report the detected schema
    Probe(ProbeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe(args) => run_probe(args).await,
    }
}
