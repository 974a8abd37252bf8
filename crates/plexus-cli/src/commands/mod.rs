//! Subcommands and the helpers they share

pub mod catalog;
pub mod generate;
pub mod info;
pub mod metrics;
pub mod recommend;
pub mod route;

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use plexus_core::{BackendKind, Complexity, TaskCategory, TaskRequirements};
use plexus_llm::MockBackend;
use plexus_router::{Manager, PlexusConfig};

/// Load configuration from a file, or from the environment when no path is given
pub fn load_config(path: Option<&Path>) -> Result<PlexusConfig> {
    match path {
        Some(path) => PlexusConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(PlexusConfig::from_env()),
    }
}

/// Manager over the configured backends, or over mocks of every backend
pub async fn manager(config: PlexusConfig, mock: bool) -> Result<Manager> {
    debug!(mock, "Building manager");
    let mut builder = Manager::builder().config(config);
    if mock {
        for kind in BackendKind::ALL {
            let reply = format!("This is a canned reply from the {kind} mock backend.");
            builder = builder.backend(Arc::new(MockBackend::constant(kind, &reply)));
        }
    }
    builder.build().await.context("Failed to start the router")
}

/// Task requirement flags shared by routing commands
#[derive(Args, Debug, Clone)]
pub struct RequirementArgs {
    /// Task category (general, code, analysis, creative, reasoning, math,
    /// summarization, translation, conversation, research)
    #[arg(long, default_value = "general")]
    pub category: TaskCategory,

    /// Complexity tier (simple, medium, complex, expert)
    #[arg(long, default_value = "medium")]
    pub complexity: Complexity,

    /// Prompt contains sensitive data; prefer local backends
    #[arg(long)]
    pub private: bool,

    /// Prefer cheaper models
    #[arg(long)]
    pub cheap: bool,

    /// Latency matters more than quality
    #[arg(long)]
    pub fast: bool,

    /// Quality matters more than latency
    #[arg(long)]
    pub quality: bool,

    /// Specialized knowledge the task needs (repeatable)
    #[arg(long = "knowledge", value_name = "TAG")]
    pub knowledge: Vec<String>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

impl RequirementArgs {
    pub fn to_requirements(&self) -> TaskRequirements {
        let mut requirements = TaskRequirements::new(self.category, self.complexity);
        requirements.privacy_sensitive = self.private;
        requirements.cost_priority = self.cheap;
        requirements.speed_priority = self.fast;
        requirements.quality_priority = self.quality;
        requirements.specialized_knowledge = self.knowledge.clone();
        requirements.max_tokens = self.max_tokens;
        requirements
    }
}
