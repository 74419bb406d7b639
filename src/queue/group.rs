//! Match groups and the arena that owns them
//!
//! Entries refer to their group by [`GroupId`] only. Unready groups are
//! discarded and rebuilt every tick; ready groups survive until their handoff
//! finishes.

use crate::types::{GroupId, InstanceHandle, ParticipantId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Where a ready group is in the handoff process
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffStage {
    /// Not handed off yet
    Idle,
    /// Instance creation / seat reservation outstanding
    InFlight,
    /// Seats delivered, waiting for confirmations since the given tick
    Confirming {
        instance: InstanceHandle,
        since_tick: u64,
    },
}

/// A candidate or finalized set of participants destined for one match instance
#[derive(Debug, Clone)]
pub struct MatchGroup {
    id: GroupId,
    members: Vec<ParticipantId>,
    rank_total: f64,
    average_rank: f64,
    pub ready: bool,
    /// Set once a high-priority member joined; later entries skip the compatibility check
    pub priority: bool,
    pub confirmed_count: Option<usize>,
    pub stage: HandoffStage,
}

impl MatchGroup {
    fn new(id: GroupId) -> Self {
        Self {
            id,
            members: Vec::new(),
            rank_total: 0.0,
            average_rank: 0.0,
            ready: false,
            priority: false,
            confirmed_count: None,
            stage: HandoffStage::Idle,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn members(&self) -> &[ParticipantId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Running mean of member ranks; only meaningful before the group is ready
    pub fn average_rank(&self) -> f64 {
        self.average_rank
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.members.iter().any(|member| member == participant_id)
    }

    /// Append a member and recompute the running average
    pub fn push(&mut self, participant_id: ParticipantId, rank: f64) {
        self.members.push(participant_id);
        self.rank_total += rank;
        self.average_rank = self.rank_total / self.members.len() as f64;
    }

    /// Drop a departed member; the average is left as it was
    pub(crate) fn forget(&mut self, participant_id: &str) {
        self.members.retain(|member| member != participant_id);
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            id: self.id,
            members: self.members.clone(),
            average_rank: self.average_rank,
            ready: self.ready,
            confirmed_count: self.confirmed_count,
        }
    }
}

/// Serializable view of a group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSnapshot {
    pub id: GroupId,
    pub members: Vec<ParticipantId>,
    pub average_rank: f64,
    pub ready: bool,
    pub confirmed_count: Option<usize>,
}

/// Indexed container of match groups, ordered by creation
#[derive(Debug, Default)]
pub struct GroupArena {
    groups: BTreeMap<GroupId, MatchGroup>,
    next_id: u64,
}

impl GroupArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty group and return its id
    pub fn open(&mut self) -> GroupId {
        self.next_id += 1;
        let id = GroupId(self.next_id);
        self.groups.insert(id, MatchGroup::new(id));
        id
    }

    pub fn get(&self, id: GroupId) -> Option<&MatchGroup> {
        self.groups.get(&id)
    }

    pub fn get_mut(&mut self, id: GroupId) -> Option<&mut MatchGroup> {
        self.groups.get_mut(&id)
    }

    pub fn remove(&mut self, id: GroupId) -> Option<MatchGroup> {
        self.groups.remove(&id)
    }

    pub fn is_ready(&self, id: GroupId) -> bool {
        self.groups.get(&id).map(|group| group.ready).unwrap_or(false)
    }

    /// Discard every group that is not ready
    pub fn retain_ready(&mut self) {
        self.groups.retain(|_, group| group.ready);
    }

    pub fn ids(&self) -> Vec<GroupId> {
        self.groups.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchGroup> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn snapshot(&self) -> Vec<GroupSnapshot> {
        self.groups.values().map(MatchGroup::snapshot).collect()
    }
}
