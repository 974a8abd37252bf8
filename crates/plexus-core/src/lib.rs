//! # Plexus Core
//!
//! Core types shared by every Plexus crate:
//! - [`TaskRequirements`]: caller-declared hints that drive routing
//! - [`ModelCapability`]: declared and learned facts about one (backend, model) pair
//! - [`RoutingDecision`]: the router's choice, ranked alternatives and rationale
//! - [`Outcome`]: one completed-request sample feeding the learning loop

pub mod backend;
pub mod capability;
pub mod decision;
pub mod task;

pub use backend::{BackendKind, ModelKey, ParseBackendError};
pub use capability::{ema, ModelCapability};
pub use decision::{Outcome, RoutingDecision, ScoredCandidate};
pub use task::{Complexity, ParseTaskError, TaskCategory, TaskRequirements};
