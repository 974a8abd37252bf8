//! Built-in catalog entries with default performance estimates

use plexus_core::{BackendKind, Complexity, ModelCapability, TaskCategory};
use plexus_llm::CostTable;

use TaskCategory::*;

struct Seed {
    backend: BackendKind,
    model: &'static str,
    categories: &'static [TaskCategory],
    max_complexity: Complexity,
    function_calling: bool,
    max_tokens: u32,
    latency_ms: f64,
    success_rate: f64,
    specializations: &'static [&'static str],
}

const SEEDS: &[Seed] = &[
    Seed {
        backend: BackendKind::OpenAi,
        model: "gpt-4o",
        categories: &[General, Code, Analysis, Creative, Reasoning, Math, Summarization, Translation, Conversation, Research],
        max_complexity: Complexity::Expert,
        function_calling: true,
        max_tokens: 128_000,
        latency_ms: 2500.0,
        success_rate: 0.98,
        specializations: &["vision", "multilingual"],
    },
    Seed {
        backend: BackendKind::OpenAi,
        model: "gpt-4o-mini",
        categories: &[General, Code, Analysis, Summarization, Translation, Conversation],
        max_complexity: Complexity::Complex,
        function_calling: true,
        max_tokens: 128_000,
        latency_ms: 1200.0,
        success_rate: 0.97,
        specializations: &["multilingual"],
    },
    Seed {
        backend: BackendKind::Anthropic,
        model: "claude-3-5-sonnet-latest",
        categories: &[General, Code, Analysis, Creative, Reasoning, Math, Summarization, Conversation, Research],
        max_complexity: Complexity::Expert,
        function_calling: true,
        max_tokens: 200_000,
        latency_ms: 3000.0,
        success_rate: 0.98,
        specializations: &["code-review", "long-context", "writing"],
    },
    Seed {
        backend: BackendKind::Anthropic,
        model: "claude-3-5-haiku-latest",
        categories: &[General, Code, Summarization, Translation, Conversation],
        max_complexity: Complexity::Medium,
        function_calling: true,
        max_tokens: 200_000,
        latency_ms: 1000.0,
        success_rate: 0.97,
        specializations: &["long-context"],
    },
    Seed {
        backend: BackendKind::Anthropic,
        model: "claude-3-opus-latest",
        categories: &[General, Analysis, Creative, Reasoning, Research],
        max_complexity: Complexity::Expert,
        function_calling: true,
        max_tokens: 200_000,
        latency_ms: 6000.0,
        success_rate: 0.97,
        specializations: &["writing", "research", "long-context"],
    },
    Seed {
        backend: BackendKind::Ollama,
        model: "llama3.1:8b",
        categories: &[General, Code, Analysis, Summarization, Conversation],
        max_complexity: Complexity::Medium,
        function_calling: true,
        max_tokens: 8192,
        latency_ms: 1500.0,
        success_rate: 0.93,
        specializations: &[],
    },
    Seed {
        backend: BackendKind::Ollama,
        model: "llama3.1:70b",
        categories: &[General, Code, Analysis, Creative, Reasoning, Summarization, Research],
        max_complexity: Complexity::Complex,
        function_calling: true,
        max_tokens: 8192,
        latency_ms: 4000.0,
        success_rate: 0.94,
        specializations: &[],
    },
    Seed {
        backend: BackendKind::Ollama,
        model: "codellama:13b",
        categories: &[Code],
        max_complexity: Complexity::Medium,
        function_calling: false,
        max_tokens: 16_384,
        latency_ms: 2000.0,
        success_rate: 0.92,
        specializations: &["rust", "python", "javascript", "sql"],
    },
    Seed {
        backend: BackendKind::Ollama,
        model: "mistral:7b",
        categories: &[General, Creative, Translation, Conversation],
        max_complexity: Complexity::Medium,
        function_calling: false,
        max_tokens: 8192,
        latency_ms: 1200.0,
        success_rate: 0.92,
        specializations: &["multilingual"],
    },
];

/// Every built-in entry, priced from each backend's default cost table
pub fn default_capabilities() -> Vec<ModelCapability> {
    SEEDS
        .iter()
        .map(|seed| {
            let cost = CostTable::defaults_for(seed.backend)
                .rate(seed.model)
                .map(|rate| rate.blended())
                .unwrap_or(0.0);

            ModelCapability::new(seed.backend, seed.model)
                .with_categories(seed.categories)
                .with_max_complexity(seed.max_complexity)
                .with_function_calling(seed.function_calling)
                .with_streaming(true)
                .with_max_tokens(seed.max_tokens)
                .with_cost(cost)
                .with_performance(seed.latency_ms, seed.success_rate)
                .with_specializations(seed.specializations)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_backend_seeded() {
        let caps = default_capabilities();
        for kind in BackendKind::ALL {
            assert!(caps.iter().any(|c| c.backend == kind), "no seed for {kind}");
        }
    }

    #[test]
    fn test_seed_costs_follow_cost_tables() {
        let caps = default_capabilities();
        let sonnet = caps.iter().find(|c| c.model == "claude-3-5-sonnet-latest").unwrap();
        assert!((sonnet.cost_per_1k - 0.009).abs() < 1e-12);
        assert!(caps
            .iter()
            .filter(|c| c.backend.is_local())
            .all(|c| c.cost_per_1k == 0.0));
    }

    #[test]
    fn test_emergency_default_is_seeded() {
        assert!(default_capabilities()
            .iter()
            .any(|c| c.backend == BackendKind::Ollama && c.model == "llama3.1:8b"));
    }
}
