//! Watchfire CLI — local interface to the incident-sharing engine.
//!
//! Operates a file-backed engine instance: seed demo organizations, submit
//! incidents from JSON files, and query campaigns with the same privacy and
//! budget rules the service applies.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Watchfire: privacy-preserving cross-organization incident clustering
#[derive(Parser, Debug)]
#[command(name = "watchfire", version, about, long_about = None)]
struct Cli {
    /// Working directory (config and data live under .watchfire/)
    #[arg(short, long, default_value = ".")]
    workdir: PathBuf,

    /// Organization id to act as
    #[arg(short, long, default_value = "org_alice")]
    org: String,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Create demo organizations in the local store
    Seed,
    /// Submit an incident from a JSON file
    Submit {
        /// Path to an incident submission JSON file
        file: PathBuf,
    },
    /// List campaigns (privacy-filtered)
    Campaigns {
        /// Filter by attack vector (e.g. ai_phishing)
        #[arg(long)]
        attack_vector: Option<String>,
        /// Filter by sector (e.g. health)
        #[arg(long)]
        sector: Option<String>,
        /// Filter by region (e.g. EU)
        #[arg(long)]
        region: Option<String>,
    },
    /// Show campaign detail with sample indicators
    Detail {
        /// Campaign id
        id: uuid::Uuid,
    },
    /// Check whether one of your incidents is part of a wider campaign
    Alone {
        /// Incident id
        incident: uuid::Uuid,
    },
    /// Generate a defensive playbook for a campaign
    Playbook {
        /// Campaign id
        id: uuid::Uuid,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let filter = match cli.verbose {
        0 => "warn,watchfire_core=info",
        1 => "info,watchfire_core=debug",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    commands::run(cli.command, &cli.workdir, &cli.org).await
}
