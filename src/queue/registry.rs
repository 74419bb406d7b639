//! Participant registry
//!
//! Owns every [`QueueEntry`] while its participant is queued. Iteration is in
//! join order; sorting by rank is the group builder's job.

use crate::error::{QueueError, Result};
use crate::types::{GroupId, JoinOptions, JoinRequest, ParticipantId};
use crate::utils::{current_timestamp, is_valid_rank};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Queueing state of one participant
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub participant_id: ParticipantId,
    pub rank: f64,
    pub team_id: Option<String>,
    pub options: JoinOptions,
    pub cycles_waited: u64,
    pub high_priority: bool,
    pub group: Option<GroupId>,
    pub last_reported_queue_size: Option<usize>,
    pub joined_at: DateTime<Utc>,
}

impl QueueEntry {
    fn from_request(request: JoinRequest) -> Self {
        Self {
            participant_id: request.participant_id,
            rank: request.rank,
            team_id: request.team_id,
            options: request.options,
            cycles_waited: 0,
            high_priority: false,
            group: None,
            last_reported_queue_size: None,
            joined_at: current_timestamp(),
        }
    }

    /// Whether this entry already sat through a partitioning pass before the latest one
    pub fn waited_previous_cycle(&self) -> bool {
        self.cycles_waited >= 2
    }

    /// Wall-clock time since the participant joined
    pub fn time_in_queue(&self) -> chrono::Duration {
        current_timestamp() - self.joined_at
    }
}

/// Registry of queued participants, iterated in insertion order
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    entries: BTreeMap<u64, QueueEntry>,
    index: HashMap<ParticipantId, u64>,
    next_seq: u64,
    team_size: Option<usize>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that enforces a per-team member limit
    pub fn with_team_size(team_size: Option<usize>) -> Self {
        Self {
            team_size,
            ..Self::default()
        }
    }

    /// Add a participant to the queue
    pub fn enqueue(&mut self, request: JoinRequest) -> Result<&QueueEntry> {
        if self.index.contains_key(&request.participant_id) {
            return Err(QueueError::DuplicateParticipant {
                participant_id: request.participant_id,
            }
            .into());
        }

        if !is_valid_rank(request.rank) {
            return Err(QueueError::InvalidRank {
                participant_id: request.participant_id,
                rank: request.rank,
            }
            .into());
        }

        if let (Some(team_size), Some(team_id)) = (self.team_size, request.team_id.as_deref()) {
            if self.team_count(team_id) >= team_size {
                return Err(QueueError::TeamFull {
                    team_id: team_id.to_string(),
                    team_size,
                }
                .into());
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        debug!(
            "Enqueued participant '{}' - rank: {:.1}, team: {:?}, seq: {}",
            request.participant_id, request.rank, request.team_id, seq
        );

        self.index.insert(request.participant_id.clone(), seq);
        let entry = self
            .entries
            .entry(seq)
            .or_insert_with(|| QueueEntry::from_request(request));
        Ok(&*entry)
    }

    /// Remove a participant regardless of its group state
    pub fn dequeue(&mut self, participant_id: &str) -> Option<QueueEntry> {
        let seq = self.index.remove(participant_id)?;
        self.entries.remove(&seq)
    }

    pub fn get(&self, participant_id: &str) -> Option<&QueueEntry> {
        self.index
            .get(participant_id)
            .and_then(|seq| self.entries.get(seq))
    }

    pub fn get_mut(&mut self, participant_id: &str) -> Option<&mut QueueEntry> {
        let seq = self.index.get(participant_id)?;
        self.entries.get_mut(seq)
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.index.contains_key(participant_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in join order
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut QueueEntry> {
        self.entries.values_mut()
    }

    /// Number of queued members of a team
    pub fn team_count(&self, team_id: &str) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.team_id.as_deref() == Some(team_id))
            .count()
    }
}
