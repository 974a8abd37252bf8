//! Route command - explain which backend a request would go to
//!
//! Usage:
//! ```bash
//! plexus route "Refactor this module" --category code --complexity complex
//! plexus route "Patient notes..." --private --json
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use plexus_core::RoutingDecision;
use plexus_llm::Request;
use plexus_router::{PlexusConfig, Router, RouterError};

use super::{manager, RequirementArgs};
use crate::print_warning;

/// Arguments for the route command
#[derive(Args)]
pub struct RouteArgs {
    /// Prompt to route
    prompt: String,

    #[command(flatten)]
    requirements: RequirementArgs,

    /// The task needs function calling
    #[arg(long)]
    function_calling: bool,

    /// The task needs streaming
    #[arg(long)]
    streaming: bool,

    /// Route over the full built-in catalog, ignoring which backends are configured
    #[arg(long)]
    all: bool,

    /// Print the decision as JSON
    #[arg(long)]
    json: bool,
}

/// Run the route command
pub async fn run(args: RouteArgs, config: PlexusConfig) -> Result<()> {
    let mut requirements = args.requirements.to_requirements();
    requirements.requires_function_calling = args.function_calling;
    requirements.requires_streaming = args.streaming;

    let mut request = Request::new(args.prompt.as_str());
    if let Some(max_tokens) = requirements.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }

    let router = if args.all {
        Router::builder().config(config.routing.clone()).build()
    } else {
        manager(config, false).await?.router().clone()
    };

    let decision = match router.select(&request, &requirements) {
        Ok(decision) => decision,
        Err(RouterError::NoEligibleBackend { .. }) => router.emergency_decision(&request, &requirements),
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
        return Ok(());
    }

    print_decision(&decision);
    Ok(())
}

fn print_decision(decision: &RoutingDecision) {
    println!("{}", "🧭 Routing Decision".bold().cyan());
    println!("{}", "═".repeat(50).cyan());
    println!();

    println!("  {:<12} {}", "Chosen:".bold(), decision.chosen.to_string().green().bold());
    println!("  {:<12} {:.3}", "Confidence:".bold(), decision.confidence);
    println!(
        "  {:<12} {} / {}",
        "Task:".bold(),
        decision.task_category,
        decision.complexity
    );
    println!();
    println!("  {}", decision.rationale.dimmed());
    println!();

    if decision.emergency {
        print_warning("No catalog entry fit the request; using the emergency backend.");
        return;
    }

    if decision.alternatives.is_empty() {
        println!("  No alternatives were eligible.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Fallback").fg(Color::Cyan),
            Cell::new("Model").fg(Color::Cyan),
            Cell::new("Score").fg(Color::Cyan),
        ]);

    for (rank, alternative) in decision.alternatives.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(alternative.key.to_string()).fg(Color::Green),
            Cell::new(format!("{:.3}", alternative.score)),
        ]);
    }

    println!("{table}");
}
