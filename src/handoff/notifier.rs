//! Outbound notification channel
//!
//! Delivery is fire-and-forget: the queue never waits on a participant.

use crate::types::{ParticipantId, QueueMessage};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sends queue messages to participants
pub trait Notifier: Send + Sync {
    fn send(&self, participant_id: &str, message: QueueMessage);
}

/// Notifier that only logs
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, participant_id: &str, message: QueueMessage) {
        debug!("-> {}: {:?}", participant_id, message);
    }
}

/// Forwards every message to an unbounded channel owned by the host
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<(ParticipantId, QueueMessage)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ParticipantId, QueueMessage)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn send(&self, participant_id: &str, message: QueueMessage) {
        if self
            .sender
            .send((participant_id.to_string(), message))
            .is_err()
        {
            warn!("Notification receiver dropped, message for '{}' lost", participant_id);
        }
    }
}

/// Notifier that keeps every message, for tests
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(ParticipantId, QueueMessage)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages sent so far, in order
    pub fn messages(&self) -> Vec<(ParticipantId, QueueMessage)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Messages sent to one participant
    pub fn messages_for(&self, participant_id: &str) -> Vec<QueueMessage> {
        self.messages
            .lock()
            .map(|messages| {
                messages
                    .iter()
                    .filter(|(id, _)| id == participant_id)
                    .map(|(_, message)| message.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of messages of the given wire type
    pub fn count_of(&self, kind: &str) -> usize {
        self.messages
            .lock()
            .map(|messages| messages.iter().filter(|(_, m)| m.kind() == kind).count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, participant_id: &str, message: QueueMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((participant_id.to_string(), message));
        }
    }
}
