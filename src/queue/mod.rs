//! Matchmaking queue core
//!
//! This module holds the participant registry, match groups, the pluggable
//! compatibility policy, and the per-tick group builder.

pub mod builder;
pub mod group;
pub mod policy;
pub mod registry;
pub mod teams;

// Re-export commonly used types
pub use builder::{GroupBuilder, PassSummary};
pub use group::{GroupArena, GroupSnapshot, HandoffStage, MatchGroup};
pub use policy::{CompatibilityPolicy, RankRatioPolicy};
pub use registry::{ParticipantRegistry, QueueEntry};
