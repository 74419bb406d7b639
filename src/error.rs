//! Error types for the ranked queue
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific queueing scenarios
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Participant already queued: {participant_id}")]
    DuplicateParticipant { participant_id: String },

    #[error("Participant not found: {participant_id}")]
    ParticipantNotFound { participant_id: String },

    #[error("Invalid rank {rank} for participant {participant_id}")]
    InvalidRank { participant_id: String, rank: f64 },

    #[error("Team {team_id} already has {team_size} queued members")]
    TeamFull { team_id: String, team_size: usize },

    #[error("Participant {participant_id} has no seat awaiting confirmation")]
    NotAwaitingConfirmation { participant_id: String },

    #[error("Instance provisioning failed: {message}")]
    ProvisioningError { message: String },

    #[error("Seat reservation failed for {participant_id}: {message}")]
    ReservationError {
        participant_id: String,
        message: String,
    },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Queue service unavailable: {message}")]
    ServiceUnavailable { message: String },
}
