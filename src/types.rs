//! Common types used throughout the ranked queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for queued participants
pub type ParticipantId = String;

/// Opaque authentication context handed through to seat reservation
pub type AuthContext = serde_json::Value;

/// Identifier of a match group inside the group arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

/// Options a participant joined with, passed through untouched to the provisioner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinOptions {
    pub payload: serde_json::Value,
    pub auth: Option<AuthContext>,
}

/// Request to enter the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub participant_id: ParticipantId,
    pub rank: f64,
    pub team_id: Option<String>,
    #[serde(default)]
    pub options: JoinOptions,
}

impl JoinRequest {
    /// Solo request with empty join options
    pub fn new(participant_id: impl Into<ParticipantId>, rank: f64) -> Self {
        Self {
            participant_id: participant_id.into(),
            rank,
            team_id: None,
            options: JoinOptions::default(),
        }
    }

    /// Attach a team id
    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Attach join options
    pub fn with_options(mut self, options: JoinOptions) -> Self {
        self.options = options;
        self
    }
}

/// Handle to a match instance created by the external provisioner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceHandle {
    pub instance_id: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Seat reserved for one participant inside a match instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatCredential {
    pub instance_id: String,
    pub session_id: String,
    pub payload: serde_json::Value,
}

/// Outbound notifications sent to queued participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueMessage {
    /// Current size of the participant's group
    Clients { count: usize },
    /// Seat reserved; the participant must confirm
    Seat { credential: SeatCredential },
    /// Handoff failed before any seat was reserved; participant stays queued
    Requeued { reason: String },
    /// Participant was removed from the queue without a seat
    MatchFailed { reason: String },
}

impl QueueMessage {
    /// Message type tag as sent on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            QueueMessage::Clients { .. } => "clients",
            QueueMessage::Seat { .. } => "seat",
            QueueMessage::Requeued { .. } => "requeued",
            QueueMessage::MatchFailed { .. } => "match_failed",
        }
    }
}

/// Inbound signals from the host, dispatched by the queue engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueSignal {
    Join(JoinRequest),
    Leave { participant_id: ParticipantId },
    Confirm { participant_id: ParticipantId },
}

impl QueueSignal {
    pub fn participant_id(&self) -> &str {
        match self {
            QueueSignal::Join(request) => &request.participant_id,
            QueueSignal::Leave { participant_id } | QueueSignal::Confirm { participant_id } => {
                participant_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_message_wire_tag() {
        let json = serde_json::to_value(QueueMessage::Clients { count: 3 }).unwrap();
        assert_eq!(json["type"], "clients");
        assert_eq!(json["count"], 3);
        assert_eq!(QueueMessage::Clients { count: 3 }.kind(), "clients");
    }

    #[test]
    fn test_signal_deserializes_from_tagged_json() {
        let signal: QueueSignal = serde_json::from_str(
            r#"{"type":"join","participant_id":"p1","rank":1200.0,"team_id":"blue"}"#,
        )
        .unwrap();

        match signal {
            QueueSignal::Join(request) => {
                assert_eq!(request.participant_id, "p1");
                assert_eq!(request.team_id.as_deref(), Some("blue"));
                assert_eq!(request.options, JoinOptions::default());
            }
            other => panic!("unexpected signal {:?}", other),
        }

        let confirm: QueueSignal =
            serde_json::from_str(r#"{"type":"confirm","participant_id":"p2"}"#).unwrap();
        assert_eq!(confirm.participant_id(), "p2");
    }
}
