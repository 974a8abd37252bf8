//! Task requirements declared by callers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Broad category of work a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    #[default]
    General,
    Code,
    Analysis,
    Creative,
    Reasoning,
    Math,
    Summarization,
    Translation,
    Conversation,
    Research,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 10] = [
        TaskCategory::General,
        TaskCategory::Code,
        TaskCategory::Analysis,
        TaskCategory::Creative,
        TaskCategory::Reasoning,
        TaskCategory::Math,
        TaskCategory::Summarization,
        TaskCategory::Translation,
        TaskCategory::Conversation,
        TaskCategory::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::General => "general",
            TaskCategory::Code => "code",
            TaskCategory::Analysis => "analysis",
            TaskCategory::Creative => "creative",
            TaskCategory::Reasoning => "reasoning",
            TaskCategory::Math => "math",
            TaskCategory::Summarization => "summarization",
            TaskCategory::Translation => "translation",
            TaskCategory::Conversation => "conversation",
            TaskCategory::Research => "research",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse errors for task enums
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseTaskError {
    #[error("Unknown task category: {0}")]
    Category(String),
    #[error("Unknown complexity: {0}")]
    Complexity(String),
}

impl FromStr for TaskCategory {
    type Err = ParseTaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        TaskCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or(ParseTaskError::Category(needle))
    }
}

/// Complexity tier, ordered `Simple < Medium < Complex < Expert`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
    Expert,
}

impl Complexity {
    pub const ALL: [Complexity; 4] = [
        Complexity::Simple,
        Complexity::Medium,
        Complexity::Complex,
        Complexity::Expert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
            Complexity::Expert => "expert",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = ParseTaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Complexity::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or(ParseTaskError::Complexity(needle))
    }
}

/// What a request needs from a backend.
///
/// Every field has a neutral default, so an absent value routes like a
/// general-purpose, medium-complexity request with no priorities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRequirements {
    pub category: TaskCategory,
    pub complexity: Complexity,
    /// Prefer backends that keep data local
    pub privacy_sensitive: bool,
    /// Prefer cheaper backends
    pub cost_priority: bool,
    pub speed_priority: bool,
    pub quality_priority: bool,
    pub requires_function_calling: bool,
    pub requires_streaming: bool,
    /// Minimum token ceiling the model must offer
    pub max_tokens: Option<u32>,
    /// Specialized-knowledge tags, matched against capability specializations
    pub specialized_knowledge: Vec<String>,
    pub constraints: HashMap<String, serde_json::Value>,
}

impl TaskRequirements {
    pub fn new(category: TaskCategory, complexity: Complexity) -> Self {
        Self {
            category,
            complexity,
            ..Default::default()
        }
    }

    pub fn privacy_sensitive(mut self) -> Self {
        self.privacy_sensitive = true;
        self
    }

    pub fn cost_priority(mut self) -> Self {
        self.cost_priority = true;
        self
    }

    pub fn with_function_calling(mut self) -> Self {
        self.requires_function_calling = true;
        self
    }

    pub fn with_streaming(mut self) -> Self {
        self.requires_streaming = true;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_knowledge(mut self, tag: impl Into<String>) -> Self {
        self.specialized_knowledge.push(tag.into());
        self
    }

    /// Fold routing hints carried in request metadata into these requirements.
    ///
    /// Boolean hints only ever switch a flag on. `task_category` and `complexity`
    /// hints are applied when they parse.
    pub fn absorb_hints(&mut self, metadata: &HashMap<String, serde_json::Value>) {
        let flag = |name: &str| metadata.get(name).map(is_truthy).unwrap_or(false);

        self.privacy_sensitive |= flag("privacy_sensitive");
        self.cost_priority |= flag("cost_priority");
        self.speed_priority |= flag("speed_priority");
        self.quality_priority |= flag("quality_priority");

        if let Some(category) = metadata
            .get("task_category")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
        {
            self.category = category;
        }
        if let Some(complexity) = metadata
            .get("complexity")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
        {
            self.complexity = complexity;
        }
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_complexity_is_ordinal() {
        assert!(Complexity::Simple < Complexity::Medium);
        assert!(Complexity::Medium < Complexity::Complex);
        assert!(Complexity::Complex < Complexity::Expert);
    }

    #[test]
    fn test_parse_category_and_complexity() {
        assert_eq!("Analysis".parse::<TaskCategory>().unwrap(), TaskCategory::Analysis);
        assert_eq!(" expert ".parse::<Complexity>().unwrap(), Complexity::Expert);
        assert!("poetry".parse::<TaskCategory>().is_err());
    }

    #[test]
    fn test_absorb_hints() {
        let mut metadata = HashMap::new();
        metadata.insert("privacy_sensitive".to_string(), json!(true));
        metadata.insert("cost_priority".to_string(), json!("yes"));
        metadata.insert("task_category".to_string(), json!("code"));
        metadata.insert("complexity".to_string(), json!("nonsense"));

        let mut req = TaskRequirements::default();
        req.absorb_hints(&metadata);

        assert!(req.privacy_sensitive);
        assert!(req.cost_priority);
        assert!(!req.speed_priority);
        assert_eq!(req.category, TaskCategory::Code);
        assert_eq!(req.complexity, Complexity::Medium);
    }

    #[test]
    fn test_hints_never_clear_flags() {
        let mut metadata = HashMap::new();
        metadata.insert("privacy_sensitive".to_string(), json!(false));

        let mut req = TaskRequirements::default().privacy_sensitive();
        req.absorb_hints(&metadata);
        assert!(req.privacy_sensitive);
    }
}
