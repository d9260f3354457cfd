//! kvlb CLI
//!
//! Command-line interface for exercising discovery and weighted balancing
//! against an in-memory key-value store.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// kvlb - key-value discovery with weighted client-side load balancing
#[derive(Parser, Debug)]
#[command(name = "kvlb")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seed an in-memory store, dial a service and report the pick distribution
    Simulate {
        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Service name to dial
        #[arg(long)]
        service: String,

        /// Number of picks to perform
        #[arg(long, default_value_t = 20)]
        calls: u32,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a published value is interpreted as a weight
    Weight {
        /// Published value
        value: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            service,
            calls,
            json,
        } => {
            let config = commands::load_config(config.as_deref())?;
            init_logging(cli.verbose, &config.logging.level);

            let report = commands::simulate(&config, &service, calls).await?;
            commands::print_report(&report, json)?;
        }
        Commands::Weight { value } => {
            init_logging(cli.verbose, "warn");
            commands::weight(&value);
        }
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
