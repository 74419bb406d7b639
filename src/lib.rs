//! Ranked Queue - skill-based matchmaking queue
//!
//! This crate continuously partitions waiting participants into
//! rank-compatible match groups, escalates participants that wait too long,
//! and hands ready groups off to an external match-instance provisioner.

pub mod config;
pub mod error;
pub mod handoff;
pub mod metrics;
pub mod queue;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{QueueError, Result};
pub use types::*;

// Re-export key components
pub use handoff::{MatchProvisioner, Notifier};
pub use queue::{CompatibilityPolicy, GroupBuilder, RankRatioPolicy};
pub use service::{QueueEngine, QueueHandle, QueueService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
