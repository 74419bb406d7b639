//! Compatibility policies deciding whether a candidate may join a group

use crate::config::QueueConfig;
use crate::queue::group::MatchGroup;

/// Pure predicate injected into the group builder
pub trait CompatibilityPolicy: Send + Sync {
    /// Whether a candidate (or team block) of `candidate_rank` fits `group`
    fn is_compatible(&self, candidate_rank: f64, group: &MatchGroup) -> bool;
}

/// Default policy: accept small absolute gaps, or gaps up to a ratio of the group average
#[derive(Debug, Clone)]
pub struct RankRatioPolicy {
    absolute_threshold: f64,
    max_ratio: f64,
}

impl RankRatioPolicy {
    pub fn new(absolute_threshold: f64, max_ratio: f64) -> Self {
        Self {
            absolute_threshold,
            max_ratio,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.absolute_rank_threshold, config.rank_ratio_threshold)
    }
}

impl Default for RankRatioPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

impl CompatibilityPolicy for RankRatioPolicy {
    fn is_compatible(&self, candidate_rank: f64, group: &MatchGroup) -> bool {
        let average = group.average_rank();

        // All-zero (or empty) group: nothing to divide by
        if average <= 0.0 {
            return true;
        }

        let diff = (candidate_rank - average).abs();
        diff < self.absolute_threshold || diff / average <= self.max_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::group::GroupArena;

    fn group_with(ranks: &[f64]) -> MatchGroup {
        let mut arena = GroupArena::new();
        let id = arena.open();
        let group = arena.get_mut(id).unwrap();
        for (i, rank) in ranks.iter().enumerate() {
            group.push(format!("p{}", i), *rank);
        }
        group.clone()
    }

    #[test]
    fn test_ratio_branch() {
        let policy = RankRatioPolicy::default();
        let group = group_with(&[10.0]);

        assert!(policy.is_compatible(20.0, &group));
        assert!(policy.is_compatible(30.0, &group)); // ratio exactly 2
        assert!(!policy.is_compatible(31.0, &group));
    }

    #[test]
    fn test_absolute_branch_covers_tiny_averages() {
        let policy = RankRatioPolicy::new(1.0, 2.0);
        let group = group_with(&[0.1]);

        assert!(policy.is_compatible(0.9, &group));
        assert!(!policy.is_compatible(1.5, &group));
    }

    #[test]
    fn test_zero_average_is_always_compatible() {
        let policy = RankRatioPolicy::default();
        assert!(policy.is_compatible(5000.0, &group_with(&[0.0, 0.0])));
        assert!(policy.is_compatible(5000.0, &group_with(&[])));
    }
}
