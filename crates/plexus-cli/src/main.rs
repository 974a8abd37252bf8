//! Plexus CLI - inspect routing decisions and run requests through the router
//!
//! # Usage
//!
//! ```bash
//! # Which backend would serve this request, and why?
//! plexus route "Summarise this contract" --category analysis --private
//!
//! # Rank models for a task type
//! plexus recommend code complex
//!
//! # Run a request (offline with --mock)
//! plexus generate "Write a haiku about Rust" --category creative --stream --mock
//!
//! # Show the catalog and metrics
//! plexus catalog --all
//! plexus metrics --prometheus
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

use commands::{catalog, generate, info, metrics, recommend, route};

/// Plexus - capability-aware routing across cloud and local LLM backends
#[derive(Parser)]
#[command(
    name = "plexus",
    version,
    about = "Plexus CLI - capability-aware LLM routing",
    long_about = "Plexus picks the best backend for each request from a capability catalog,\n\
                  falls back across alternatives on failure and learns from outcomes."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON configuration file; environment variables are used when omitted
    #[arg(short, long, global = true, env = "PLEXUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explain which backend a request would be routed to
    #[command(name = "route")]
    Route(route::RouteArgs),

    /// Rank catalog entries for a task category and complexity
    #[command(name = "recommend")]
    Recommend(recommend::RecommendArgs),

    /// List the capability catalog
    #[command(name = "catalog")]
    Catalog(catalog::CatalogArgs),

    /// Run a request through the router
    #[command(name = "generate")]
    Generate(generate::GenerateArgs),

    /// Probe backends and print metrics
    #[command(name = "metrics")]
    Metrics(metrics::MetricsArgs),

    /// Show configuration and environment
    #[command(name = "info")]
    Info(info::InfoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Route(args) => route::run(args, config).await,
        Commands::Recommend(args) => recommend::run(args, config).await,
        Commands::Catalog(args) => catalog::run(args, config).await,
        Commands::Generate(args) => generate::run(args, config).await,
        Commands::Metrics(args) => metrics::run(args, config).await,
        Commands::Info(args) => info::run(args, config),
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}
