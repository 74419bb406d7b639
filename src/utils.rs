//! Utility functions for the ranked queue

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique match instance ID
pub fn generate_instance_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a new unique seat session ID
pub fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Arithmetic mean of a rank slice, zero when empty
pub fn mean_rank(ranks: &[f64]) -> f64 {
    if ranks.is_empty() {
        return 0.0;
    }
    ranks.iter().sum::<f64>() / ranks.len() as f64
}

/// Ranks must be finite and non-negative
pub fn is_valid_rank(rank: f64) -> bool {
    rank.is_finite() && rank >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        assert_ne!(generate_instance_id(), generate_instance_id());
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn test_mean_rank() {
        assert_eq!(mean_rank(&[]), 0.0);
        assert_eq!(mean_rank(&[10.0, 20.0, 30.0, 20.0]), 20.0);
    }

    #[test]
    fn test_rank_validation() {
        assert!(is_valid_rank(0.0));
        assert!(is_valid_rank(1500.0));
        assert!(!is_valid_rank(-1.0));
        assert!(!is_valid_rank(f64::NAN));
        assert!(!is_valid_rank(f64::INFINITY));
    }
}
