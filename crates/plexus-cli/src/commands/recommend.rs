//! Recommend command - rank models for a task type
//!
//! Usage:
//! ```bash
//! plexus recommend code complex
//! plexus recommend analysis --all --limit 3
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use plexus_core::{Complexity, TaskCategory};
use plexus_router::{CapabilityCatalog, PlexusConfig};

use super::manager;

/// Arguments for the recommend command
#[derive(Args)]
pub struct RecommendArgs {
    /// Task category
    #[arg(default_value = "general")]
    category: TaskCategory,

    /// Complexity tier
    #[arg(default_value = "medium")]
    complexity: Complexity,

    /// Rank the full built-in catalog, ignoring which backends are configured
    #[arg(long)]
    all: bool,

    /// Show at most this many models
    #[arg(short, long, default_value_t = 5)]
    limit: usize,
}

/// Run the recommend command
pub async fn run(args: RecommendArgs, config: PlexusConfig) -> Result<()> {
    let recommendations = if args.all {
        CapabilityCatalog::seeded().recommend(args.category, args.complexity, &config.routing.scoring)
    } else {
        manager(config, false)
            .await?
            .recommend(args.category, args.complexity)
    };

    println!(
        "{}",
        format!("⭐ Recommendations for {} / {}", args.category, args.complexity)
            .bold()
            .cyan()
    );
    println!();

    if recommendations.is_empty() {
        println!("  No configured model handles this task. Try {}.", "--all".green());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Model").fg(Color::Cyan),
            Cell::new("Score").fg(Color::Cyan),
            Cell::new("Strengths").fg(Color::Cyan),
            Cell::new("Considerations").fg(Color::Cyan),
        ]);

    for (rank, rec) in recommendations.iter().take(args.limit).enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(rec.key.to_string()).fg(Color::Green),
            Cell::new(format!("{:.3}", rec.score)),
            Cell::new(rec.strengths.join("\n")),
            Cell::new(rec.considerations.join("\n")).fg(Color::Yellow),
        ]);
    }

    println!("{table}");
    Ok(())
}
