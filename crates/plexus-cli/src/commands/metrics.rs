//! Metrics command - probe backends and print counters
//!
//! Usage:
//! ```bash
//! plexus metrics
//! plexus metrics --prometheus
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use plexus_router::{MetricsSnapshot, PlexusConfig};

use super::manager;
use crate::print_info;

/// Arguments for the metrics command
#[derive(Args)]
pub struct MetricsArgs {
    /// Print in Prometheus text format
    #[arg(long)]
    prometheus: bool,

    /// Use mock backends instead of real providers
    #[arg(long)]
    mock: bool,
}

/// Run the metrics command
pub async fn run(args: MetricsArgs, config: PlexusConfig) -> Result<()> {
    let manager = manager(config, args.mock).await?;
    let health = manager.health_check().await;
    let snapshot = manager.metrics();

    if args.prometheus {
        print!("{}", snapshot.to_prometheus());
        return Ok(());
    }

    println!("{}", "📈 Plexus Metrics".bold().cyan());
    println!("{}", "═".repeat(50).cyan());
    println!();

    if snapshot.backends.is_empty() {
        print_info("No backends configured.");
    } else {
        println!("{}", backend_table(&snapshot));
    }

    let store = if health.store {
        "healthy".green()
    } else {
        "unreachable".red()
    };
    println!();
    println!("  {:<16} {} ({})", "Store:".bold(), manager.store().name(), store);
    println!("  {:<16} {}", "Catalog:".bold(), snapshot.catalog_entries);

    let cache = &snapshot.cache;
    if cache.enabled {
        println!(
            "  {:<16} {} entries, {:.1}% hit rate",
            "Cache:".bold(),
            cache.entries,
            cache.hit_rate() * 100.0
        );
    } else {
        println!("  {:<16} disabled", "Cache:".bold());
    }

    let r = &snapshot.router;
    println!();
    println!("{}", "Router".bold());
    println!("  Requests:            {}", r.requests);
    println!("  Routed:              {}", r.routed);
    println!("  Emergency routes:    {}", r.emergency_routes);
    println!("  Fallbacks:           {}", r.fallbacks);
    println!("  Capacity rejections: {}", r.capacity_rejections);
    println!("  Backend failures:    {}", r.backend_failures);
    println!("  Learning passes:     {}", r.learning_passes);

    Ok(())
}

fn backend_table(snapshot: &MetricsSnapshot) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Backend").fg(Color::Cyan),
            Cell::new("Health").fg(Color::Cyan),
            Cell::new("Requests").fg(Color::Cyan),
            Cell::new("Errors").fg(Color::Cyan),
            Cell::new("Cost (USD)").fg(Color::Cyan),
            Cell::new("Rate limit").fg(Color::Cyan),
        ]);

    for backend in &snapshot.backends {
        let health = match backend.healthy {
            Some(true) => Cell::new("✓ up").fg(Color::Green),
            Some(false) => Cell::new("✗ down").fg(Color::Red),
            None => Cell::new("?"),
        };
        let limit = backend
            .rate_limit
            .as_ref()
            .map(|s| format!("{}/{} per min", s.requests_used, s.requests_limit))
            .unwrap_or_else(|| "unlimited".to_string());

        table.add_row(vec![
            Cell::new(backend.backend),
            health,
            Cell::new(backend.usage.requests),
            Cell::new(backend.usage.errors),
            Cell::new(format!("{:.6}", backend.usage.total_cost)),
            Cell::new(limit),
        ]);
    }
    table
}
