//! Generate command - run a request through the router
//!
//! Usage:
//! ```bash
//! plexus generate "Explain lifetimes" --category code
//! plexus generate "Write a limerick" --stream --mock
//! plexus generate "Hello" --backend ollama --model llama3.1:8b
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;

use plexus_core::BackendKind;
use plexus_llm::Request;
use plexus_router::PlexusConfig;

use super::{manager, RequirementArgs};

/// Arguments for the generate command
#[derive(Args)]
pub struct GenerateArgs {
    /// Prompt to send
    prompt: String,

    /// System prompt
    #[arg(short, long)]
    system: Option<String>,

    /// Pin a backend instead of routing
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Pin a model; resolved through the catalog when no backend is pinned
    #[arg(short, long)]
    model: Option<String>,

    #[command(flatten)]
    requirements: RequirementArgs,

    /// Sampling temperature
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Print fragments as they arrive
    #[arg(long)]
    stream: bool,

    /// Serve from canned mock backends instead of real providers
    #[arg(long)]
    mock: bool,
}

/// Run the generate command
pub async fn run(args: GenerateArgs, config: PlexusConfig) -> Result<()> {
    let manager = manager(config, args.mock).await?;
    let requirements = args.requirements.to_requirements();

    let mut request = Request::new(args.prompt.as_str());
    if let Some(system) = &args.system {
        request = request.with_system(system.as_str());
    }
    if let Some(backend) = args.backend {
        request = request.pinned(backend, args.model.as_deref());
    } else if let Some(model) = &args.model {
        request.model = Some(model.clone());
    }
    if let Some(max_tokens) = requirements.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = args.temperature {
        request = request.with_temperature(temperature);
    }

    if args.stream {
        let mut fragments = manager.stream(&request.streaming(), Some(requirements)).await?;
        let mut stdout = std::io::stdout();
        while let Some(fragment) = fragments.next().await {
            write!(stdout, "{}", fragment?)?;
            stdout.flush()?;
        }
        println!();
        return Ok(());
    }

    let response = manager.generate(&request, Some(requirements)).await?;
    println!("{}", response.content);
    println!();
    println!(
        "{}",
        format!(
            "{}/{} · {} ms · {} tokens · ${:.6}",
            response.backend,
            response.model,
            response.latency_ms,
            response.usage.total_tokens,
            response.cost
        )
        .dimmed()
    );
    Ok(())
}
