//! Catalog command - list known model capabilities
//!
//! Usage:
//! ```bash
//! plexus catalog
//! plexus catalog --all --backend ollama
//! plexus catalog --json
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use plexus_core::{BackendKind, ModelCapability};
use plexus_router::{CapabilityCatalog, PlexusConfig};

use super::manager;

/// Arguments for the catalog command
#[derive(Args)]
pub struct CatalogArgs {
    /// Only show models served by this backend
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Show the full built-in catalog, ignoring which backends are configured
    #[arg(long)]
    all: bool,

    /// Print entries as JSON
    #[arg(long)]
    json: bool,
}

/// Run the catalog command
pub async fn run(args: CatalogArgs, config: PlexusConfig) -> Result<()> {
    let mut entries = if args.all {
        CapabilityCatalog::seeded().snapshot()
    } else {
        manager(config, false).await?.catalog().snapshot()
    };
    if let Some(backend) = args.backend {
        entries.retain(|c| c.backend == backend);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{}", "📚 Capability Catalog".bold().cyan());
    println!();

    if entries.is_empty() {
        println!("  No models. Configure a backend or pass {}.", "--all".green());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Model").fg(Color::Cyan),
            Cell::new("Categories").fg(Color::Cyan),
            Cell::new("Max complexity").fg(Color::Cyan),
            Cell::new("Tools").fg(Color::Cyan),
            Cell::new("Max tokens").fg(Color::Cyan),
            Cell::new("$/1K").fg(Color::Cyan),
            Cell::new("Latency").fg(Color::Cyan),
            Cell::new("Success").fg(Color::Cyan),
        ]);

    for capability in &entries {
        table.add_row(row(capability));
    }

    println!("{table}");
    println!("{} models", entries.len());
    Ok(())
}

fn row(capability: &ModelCapability) -> Vec<Cell> {
    let categories: Vec<&str> = capability.task_categories.iter().map(|c| c.as_str()).collect();
    let name = Cell::new(capability.key().to_string());
    let name = if capability.backend.is_local() {
        name.fg(Color::Green)
    } else {
        name.fg(Color::Blue)
    };

    vec![
        name,
        Cell::new(categories.join(", ")),
        Cell::new(capability.max_complexity),
        Cell::new(if capability.function_calling { "yes" } else { "no" }),
        Cell::new(capability.max_tokens),
        Cell::new(format!("{:.5}", capability.cost_per_1k)),
        Cell::new(format!("{:.0} ms", capability.avg_latency_ms)),
        Cell::new(format!("{:.1}%", capability.success_rate * 100.0)),
    ]
}
