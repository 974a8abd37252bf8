//! # Plexus Persistence
//!
//! Durable storage for the routing layer: an append-only log of routing decisions and
//! outcome samples, plus the latest capability snapshot so learned latency and success
//! rates survive restarts.
//!
//! Supports:
//! - In-memory (for testing)
//! - SQLite (single node, enabled by the default `sqlite` feature)

pub mod backend;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use backend::{MemoryStore, RoutingStore, StorageError};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConfig, SqliteStore};
