//! Info command - show version, backend configuration and environment
//!
//! Usage:
//! ```bash
//! plexus info
//! plexus --config plexus.json info
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use plexus_core::BackendKind;
use plexus_router::PlexusConfig;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs;

const ENV_VARS: [(&str, &str); 10] = [
    ("OPENAI_API_KEY", "OpenAI credentials"),
    ("ANTHROPIC_API_KEY", "Anthropic credentials"),
    ("OLLAMA_URL", "Ollama base URL"),
    ("PLEXUS_<BACKEND>_ENABLED", "Enable or disable a backend"),
    ("PLEXUS_<BACKEND>_RATE_LIMIT", "Requests per minute"),
    ("PLEXUS_CACHE_TTL_SECS", "Response cache TTL (0 disables)"),
    ("PLEXUS_EXPLORATION", "Score jitter for exploration"),
    ("PLEXUS_LEARNING", "Background learning"),
    ("PLEXUS_DATABASE_URL", "SQLite store URL"),
    ("PLEXUS_CONFIG", "JSON configuration file"),
];

/// Run the info command
pub fn run(_args: InfoArgs, config: PlexusConfig) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    println!("{}", "Plexus - capability-aware LLM routing".bold().cyan());
    println!("{}", "═".repeat(50).cyan());
    println!();

    println!("{}", "Version Information:".bold());
    println!("  {} {}", "CLI Version:".dimmed(), version.green());
    println!();

    println!("{}", "Backends:".bold());
    for kind in BackendKind::ALL {
        let backend = config.backends.get(kind);
        let status = if !backend.enabled {
            "disabled".dimmed().to_string()
        } else {
            match backend.validate(kind) {
                Ok(()) => "ready".green().to_string(),
                Err(e) => e.to_string().red().to_string(),
            }
        };
        let limit = backend
            .rate_limit_per_minute
            .map(|n| format!("{n}/min"))
            .unwrap_or_else(|| "unlimited".to_string());
        println!(
            "  {} {:<10} {} ({}, {}, {})",
            "•".cyan(),
            kind.to_string().bold(),
            status,
            backend.base_url(kind),
            backend.model(kind),
            limit
        );
    }
    println!();

    println!("{}", "Routing:".bold());
    let cache = if config.cache.enabled {
        format!("{}s TTL, {} entries max", config.cache.ttl_secs, config.cache.max_entries)
    } else {
        "disabled".to_string()
    };
    println!("  {} {}", "Cache:".dimmed(), cache);
    println!("  {} {}", "Exploration:".dimmed(), on_off(config.routing.exploration));
    println!(
        "  {} {} (every {}s)",
        "Learning:".dimmed(),
        on_off(config.learning.enabled),
        config.learning.interval_secs
    );
    println!("  {} {}", "Emergency:".dimmed(), config.routing.emergency_key());
    println!(
        "  {} {}",
        "Store:".dimmed(),
        config.store.url.as_deref().unwrap_or("in-memory")
    );
    println!();

    if let Err(e) = config.validate() {
        println!("{} {}", "✗".red().bold(), e);
        println!();
    }

    println!("{}", "Environment:".bold());
    for (name, description) in ENV_VARS {
        println!("  {:<30} {}", name.green(), description.dimmed());
    }
    println!();

    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
