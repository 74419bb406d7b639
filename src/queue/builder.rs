//! Group builder and priority escalation
//!
//! Runs once per tick. Every participant not already in a ready group is
//! sorted by rank and greedily packed into groups using the injected
//! [`CompatibilityPolicy`]. Waiting cycles, high-priority escalation and
//! stalled-group promotion are applied during the same pass.

use crate::config::QueueConfig;
use crate::queue::group::{GroupArena, MatchGroup};
use crate::queue::policy::{CompatibilityPolicy, RankRatioPolicy};
use crate::queue::registry::ParticipantRegistry;
use crate::queue::teams::{build_blocks, Candidate, TeamBlock};
use crate::types::{GroupId, ParticipantId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// What a single partitioning pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassSummary {
    /// Participants reshuffled in this pass
    pub candidates: usize,
    /// Groups that reached `max_group_size`
    pub ready_full: Vec<GroupId>,
    /// Stalled groups promoted to ready below capacity
    pub ready_incomplete: Vec<GroupId>,
    /// Participants that became high priority
    pub escalated: Vec<ParticipantId>,
}

/// Partitions the queue into match groups
#[derive(Clone)]
pub struct GroupBuilder {
    config: QueueConfig,
    policy: Arc<dyn CompatibilityPolicy>,
}

impl GroupBuilder {
    pub fn new(config: QueueConfig) -> Self {
        let policy = Arc::new(RankRatioPolicy::from_config(&config));
        Self { config, policy }
    }

    pub fn with_policy(config: QueueConfig, policy: Arc<dyn CompatibilityPolicy>) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Discard unready groups and rebuild them from the current queue
    pub fn rebuild(&self, registry: &mut ParticipantRegistry, arena: &mut GroupArena) -> PassSummary {
        arena.retain_ready();
        for entry in registry.iter_mut() {
            if let Some(group_id) = entry.group {
                if !arena.is_ready(group_id) {
                    entry.group = None;
                }
            }
        }

        let mut candidates: Vec<Candidate> = registry
            .iter()
            .filter(|entry| entry.group.is_none())
            .map(|entry| Candidate {
                participant_id: entry.participant_id.clone(),
                rank: entry.rank,
                team_id: entry.team_id.clone(),
            })
            .collect();

        // Stable: equal ranks keep join order between ticks
        candidates.sort_by(|a, b| a.rank.total_cmp(&b.rank));

        let mut pass = Pass {
            config: &self.config,
            policy: self.policy.as_ref(),
            registry,
            arena,
            current: None,
            stalled: BTreeSet::new(),
            summary: PassSummary {
                candidates: candidates.len(),
                ..PassSummary::default()
            },
        };

        if self.config.team_mode() {
            pass.place_blocks(build_blocks(candidates));
        } else {
            for candidate in candidates {
                pass.place_single(candidate);
            }
        }

        pass.finish()
    }
}

/// Mutable state of one partitioning pass
struct Pass<'a> {
    config: &'a QueueConfig,
    policy: &'a dyn CompatibilityPolicy,
    registry: &'a mut ParticipantRegistry,
    arena: &'a mut GroupArena,
    current: Option<GroupId>,
    stalled: BTreeSet<GroupId>,
    summary: PassSummary,
}

impl Pass<'_> {
    fn current_group(&mut self) -> GroupId {
        match self.current {
            Some(id) => id,
            None => {
                let id = self.arena.open();
                self.current = Some(id);
                id
            }
        }
    }

    fn close_current(&mut self) {
        self.current = None;
    }

    fn is_high_priority(&self, participant_id: &str) -> bool {
        self.registry
            .get(participant_id)
            .map(|entry| entry.high_priority)
            .unwrap_or(false)
    }

    fn accepts(&self, group_id: GroupId, rank: f64, forced: bool) -> bool {
        match self.arena.get(group_id) {
            Some(group) => {
                group.is_empty() || forced || group.priority || self.policy.is_compatible(rank, group)
            }
            None => false,
        }
    }

    /// Current group if it accepts, otherwise a fresh one
    fn group_for(&mut self, rank: f64, forced: bool) -> GroupId {
        let group_id = self.current_group();
        if self.accepts(group_id, rank, forced) {
            return group_id;
        }
        self.close_current();
        self.current_group()
    }

    fn place_single(&mut self, candidate: Candidate) {
        let forced = self.is_high_priority(&candidate.participant_id);
        let group_id = self.group_for(candidate.rank, forced);
        self.append(group_id, candidate.participant_id, candidate.rank);
    }

    /// Team-level passes
    ///
    /// A block that overflows the current group fills the remaining seats and
    /// its other members are re-queued for the next pass.
    fn place_blocks(&mut self, blocks: Vec<TeamBlock>) {
        let mut pending = blocks;
        let mut round = 0;

        while !pending.is_empty() {
            round += 1;
            self.close_current();
            let mut requeued = Vec::new();

            for block in pending {
                let forced = block
                    .members
                    .iter()
                    .any(|(participant_id, _)| self.is_high_priority(participant_id));
                let group_id = self.group_for(block.average_rank, forced);

                let filled = self.arena.get(group_id).map(MatchGroup::len).unwrap_or(0);
                let room = self.config.max_group_size.saturating_sub(filled);
                let mut members = block.members;
                let overflow = if members.len() > room {
                    members.split_off(room)
                } else {
                    Vec::new()
                };

                for (participant_id, rank) in members {
                    let group_id = self.current_group();
                    self.append(group_id, participant_id, rank);
                }

                if !overflow.is_empty() {
                    requeued.push(TeamBlock::new(block.team_id, overflow));
                }
            }

            if !requeued.is_empty() {
                debug!(
                    "Team pass {} split {} blocks, re-queuing the overflow",
                    round,
                    requeued.len()
                );
            }
            pending = requeued;
        }
    }

    fn append(&mut self, group_id: GroupId, participant_id: ParticipantId, rank: f64) {
        let Some(group) = self.arena.get_mut(group_id) else {
            return;
        };
        let Some(entry) = self.registry.get_mut(&participant_id) else {
            return;
        };

        entry.group = Some(group_id);
        entry.cycles_waited += 1;

        if !entry.high_priority && entry.cycles_waited >= self.config.escalation_cycles {
            entry.high_priority = true;
            info!(
                "Participant '{}' escalated to high priority after {} cycles",
                participant_id, entry.cycles_waited
            );
            self.summary.escalated.push(participant_id.clone());
        }

        if entry.high_priority {
            group.priority = true;
        }

        if self.config.allow_incomplete_groups && entry.cycles_waited >= self.config.timeout_cycles {
            self.stalled.insert(group_id);
        }

        group.push(participant_id, rank);

        if group.len() >= self.config.max_group_size {
            group.ready = true;
            debug!(
                "{} is full - members: {}, average rank: {:.2}",
                group_id,
                group.len(),
                group.average_rank()
            );
            self.stalled.remove(&group_id);
            self.summary.ready_full.push(group_id);
            self.close_current();
        }
    }

    /// Promote stalled groups whose members all waited through an earlier pass
    fn finish(mut self) -> PassSummary {
        for group_id in std::mem::take(&mut self.stalled) {
            let Some(group) = self.arena.get_mut(group_id) else {
                continue;
            };
            if group.ready {
                continue;
            }

            let all_waited = group.members().iter().all(|member| {
                self.registry
                    .get(member)
                    .map(|entry| entry.waited_previous_cycle())
                    .unwrap_or(false)
            });

            if all_waited {
                group.ready = true;
                info!(
                    "{} stalled - ready with {}/{} members",
                    group_id,
                    group.len(),
                    self.config.max_group_size
                );
                self.summary.ready_incomplete.push(group_id);
            } else {
                debug!("{} stalled but holds a fresh participant, reshuffling", group_id);
            }
        }

        self.summary
    }
}
