//! Queue engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs controlling partitioning, escalation and handoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of participants in a full match group
    pub max_group_size: usize,
    /// Waited cycles after which a participant bypasses compatibility checks
    pub escalation_cycles: u64,
    /// Waited cycles after which a short group may go ready with bots
    pub timeout_cycles: u64,
    /// Whether stalled groups may be handed off below `max_group_size`
    pub allow_incomplete_groups: bool,
    /// Team size; enables team mode when set
    pub team_size: Option<usize>,
    /// Period of the partitioning tick in milliseconds
    pub tick_period_ms: u64,
    /// Maximum |rank - average| / average accepted by the default policy
    pub rank_ratio_threshold: f64,
    /// Absolute rank difference always accepted by the default policy
    pub absolute_rank_threshold: f64,
    /// Kind of match instance requested from the provisioner
    pub instance_kind: String,
    /// Creation config passed to the provisioner
    pub instance_config: serde_json::Value,
    /// Ticks a seated group may wait for confirmations (none = unbounded)
    pub confirmation_timeout_cycles: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_group_size: 4,
            escalation_cycles: 5, // ~10s at the default period
            timeout_cycles: 8,    // ~15s at the default period
            allow_incomplete_groups: false,
            team_size: None,
            tick_period_ms: 2000,
            rank_ratio_threshold: 2.0,
            absolute_rank_threshold: 1.0,
            instance_kind: "match".to_string(),
            instance_config: serde_json::Value::Object(Default::default()),
            confirmation_timeout_cycles: None,
        }
    }
}

impl QueueConfig {
    /// Get the tick period as a Duration
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn team_mode(&self) -> bool {
        self.team_size.is_some()
    }
}
