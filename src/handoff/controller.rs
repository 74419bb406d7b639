//! Readiness and handoff controller
//!
//! Ready groups are handed off on background tasks: one instance is created,
//! then every member's seat is reserved concurrently. The background task
//! only reports a [`HandoffOutcome`]; the owner applies it to the registry and
//! arena through [`HandoffController::apply`].

use crate::error::{QueueError, Result};
use crate::handoff::notifier::Notifier;
use crate::handoff::provisioner::MatchProvisioner;
use crate::queue::{GroupArena, HandoffStage, ParticipantRegistry};
use crate::types::{GroupId, InstanceHandle, JoinOptions, ParticipantId, QueueMessage, SeatCredential};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Result of a background handoff, applied on the owner
#[derive(Debug, Clone)]
pub enum HandoffOutcome {
    /// Instance created and every seat reserved
    Seated {
        group_id: GroupId,
        instance: InstanceHandle,
        seats: Vec<(ParticipantId, SeatCredential)>,
    },
    /// Instance creation failed; members go back to the pool
    ProvisioningFailed { group_id: GroupId, error: String },
    /// A seat reservation failed; the whole group is aborted
    ReservationFailed {
        group_id: GroupId,
        instance: InstanceHandle,
        participant_id: ParticipantId,
        error: String,
    },
}

impl HandoffOutcome {
    pub fn group_id(&self) -> GroupId {
        match self {
            HandoffOutcome::Seated { group_id, .. }
            | HandoffOutcome::ProvisioningFailed { group_id, .. }
            | HandoffOutcome::ReservationFailed { group_id, .. } => *group_id,
        }
    }

    /// Metric label for this outcome
    pub fn label(&self) -> &'static str {
        match self {
            HandoffOutcome::Seated { .. } => "seated",
            HandoffOutcome::ProvisioningFailed { .. } => "provisioning_failed",
            HandoffOutcome::ReservationFailed { .. } => "reservation_failed",
        }
    }
}

/// Progress of a group's confirmation handshake after one confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmStatus {
    pub group_id: GroupId,
    pub confirmed: usize,
    pub total: usize,
    /// Group was torn down by this confirmation
    pub complete: bool,
}

/// Drives ready groups through provisioning, seat delivery and confirmation
pub struct HandoffController {
    provisioner: Arc<dyn MatchProvisioner>,
    notifier: Arc<dyn Notifier>,
    outcomes: mpsc::UnboundedSender<HandoffOutcome>,
    instance_kind: String,
    instance_config: serde_json::Value,
}

impl HandoffController {
    pub fn new(
        provisioner: Arc<dyn MatchProvisioner>,
        notifier: Arc<dyn Notifier>,
        outcomes: mpsc::UnboundedSender<HandoffOutcome>,
        instance_kind: String,
        instance_config: serde_json::Value,
    ) -> Self {
        Self {
            provisioner,
            notifier,
            outcomes,
            instance_kind,
            instance_config,
        }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Start handoffs for every ready group that has not started one yet
    pub fn start_ready_groups(
        &self,
        registry: &ParticipantRegistry,
        arena: &mut GroupArena,
    ) -> usize {
        let idle: Vec<GroupId> = arena
            .iter()
            .filter(|group| group.ready && group.stage == HandoffStage::Idle)
            .map(|group| group.id())
            .collect();

        idle.into_iter()
            .filter(|group_id| self.begin(*group_id, registry, arena))
            .count()
    }

    /// Spawn the handoff for one ready group
    ///
    /// Returns false if the group has no queued members left, in which case
    /// it is discarded.
    pub fn begin(
        &self,
        group_id: GroupId,
        registry: &ParticipantRegistry,
        arena: &mut GroupArena,
    ) -> bool {
        let Some(group) = arena.get_mut(group_id) else {
            return false;
        };
        if !group.ready || group.stage != HandoffStage::Idle {
            return false;
        }

        let members: Vec<(ParticipantId, JoinOptions)> = group
            .members()
            .iter()
            .filter_map(|member| registry.get(member))
            .filter(|entry| entry.group == Some(group_id))
            .map(|entry| (entry.participant_id.clone(), entry.options.clone()))
            .collect();

        if members.is_empty() {
            debug!("{} emptied before handoff, discarding", group_id);
            arena.remove(group_id);
            return false;
        }

        group.stage = HandoffStage::InFlight;
        info!("Starting handoff for {} with {} members", group_id, members.len());

        let provisioner = self.provisioner.clone();
        let kind = self.instance_kind.clone();
        let config = self.instance_config.clone();
        let outcomes = self.outcomes.clone();

        tokio::spawn(async move {
            let outcome = run_handoff(provisioner, &kind, &config, group_id, members).await;
            if outcomes.send(outcome).is_err() {
                debug!("Queue owner gone, dropping handoff outcome for {}", group_id);
            }
        });

        true
    }

    /// Apply a finished handoff on the owner
    pub fn apply(
        &self,
        outcome: HandoffOutcome,
        registry: &mut ParticipantRegistry,
        arena: &mut GroupArena,
        tick: u64,
    ) {
        match outcome {
            HandoffOutcome::Seated {
                group_id,
                instance,
                seats,
            } => {
                let Some(group) = arena.get_mut(group_id) else {
                    warn!("Seats reserved for unknown {}, ignoring", group_id);
                    return;
                };

                for (participant_id, credential) in seats {
                    let still_queued = registry
                        .get(&participant_id)
                        .map(|entry| entry.group == Some(group_id))
                        .unwrap_or(false);
                    if still_queued {
                        self.notifier
                            .send(&participant_id, QueueMessage::Seat { credential });
                    }
                }

                info!(
                    "{} seated in instance {}, awaiting confirmations",
                    group_id, instance.instance_id
                );
                group.confirmed_count = Some(0);
                group.stage = HandoffStage::Confirming {
                    instance,
                    since_tick: tick,
                };

                self.complete_if_done(group_id, registry, arena);
            }
            HandoffOutcome::ProvisioningFailed { group_id, error } => {
                warn!("Provisioning failed for {}: {}", group_id, error);
                let Some(group) = arena.remove(group_id) else {
                    return;
                };

                for member in group.members() {
                    if let Some(entry) = registry.get_mut(member) {
                        if entry.group == Some(group_id) {
                            entry.group = None;
                            self.notifier.send(
                                member,
                                QueueMessage::Requeued {
                                    reason: error.clone(),
                                },
                            );
                        }
                    }
                }
            }
            HandoffOutcome::ReservationFailed {
                group_id,
                instance,
                participant_id,
                error,
            } => {
                error!(
                    "Seat reservation for '{}' in instance {} failed, aborting {}: {}",
                    participant_id, instance.instance_id, group_id, error
                );
                let Some(group) = arena.remove(group_id) else {
                    return;
                };

                let reason = format!("seat reservation failed: {}", error);
                for member in group.members() {
                    let belongs = registry
                        .get(member)
                        .map(|entry| entry.group == Some(group_id))
                        .unwrap_or(false);
                    if belongs {
                        registry.dequeue(member);
                        self.notifier.send(
                            member,
                            QueueMessage::MatchFailed {
                                reason: reason.clone(),
                            },
                        );
                    }
                }
            }
        }
    }

    /// Record a seat confirmation and remove the participant from the queue
    pub fn confirm(
        &self,
        participant_id: &str,
        registry: &mut ParticipantRegistry,
        arena: &mut GroupArena,
    ) -> Result<ConfirmStatus> {
        let entry = registry
            .get(participant_id)
            .ok_or_else(|| QueueError::ParticipantNotFound {
                participant_id: participant_id.to_string(),
            })?;

        let not_awaiting = || QueueError::NotAwaitingConfirmation {
            participant_id: participant_id.to_string(),
        };
        let group_id = entry.group.ok_or_else(not_awaiting)?;
        let group = arena.get_mut(group_id).ok_or_else(not_awaiting)?;
        if !matches!(group.stage, HandoffStage::Confirming { .. }) {
            return Err(not_awaiting().into());
        }

        let confirmed = group.confirmed_count.unwrap_or(0) + 1;
        group.confirmed_count = Some(confirmed);
        let total = group.len();

        let waited_ms = registry
            .dequeue(participant_id)
            .map(|entry| entry.time_in_queue().num_milliseconds())
            .unwrap_or(0);
        debug!(
            "Participant '{}' confirmed seat in {} ({}/{}) after {}ms",
            participant_id, group_id, confirmed, total, waited_ms
        );

        let complete = self.complete_if_done(group_id, registry, arena);
        Ok(ConfirmStatus {
            group_id,
            confirmed,
            total,
            complete,
        })
    }

    /// Tear down a confirming group once no member is left in the queue
    pub fn complete_if_done(
        &self,
        group_id: GroupId,
        registry: &ParticipantRegistry,
        arena: &mut GroupArena,
    ) -> bool {
        let Some(group) = arena.get(group_id) else {
            return false;
        };
        if !matches!(group.stage, HandoffStage::Confirming { .. }) {
            return false;
        }

        let pending = group.members().iter().any(|member| {
            registry
                .get(member)
                .map(|entry| entry.group == Some(group_id))
                .unwrap_or(false)
        });
        if pending {
            return false;
        }

        info!(
            "{} handoff complete ({}/{} confirmed)",
            group_id,
            group.confirmed_count.unwrap_or(0),
            group.len()
        );
        arena.remove(group_id);
        true
    }

    /// Send each member of an open group its group size when it changed
    pub fn broadcast_group_size(&self, registry: &mut ParticipantRegistry, arena: &GroupArena) {
        for group in arena.iter().filter(|group| !group.ready) {
            let count = group.len();
            for member in group.members() {
                let Some(entry) = registry.get_mut(member) else {
                    continue;
                };
                if entry.last_reported_queue_size != Some(count) {
                    entry.last_reported_queue_size = Some(count);
                    self.notifier.send(member, QueueMessage::Clients { count });
                }
            }
        }
    }

    /// Abort confirming groups older than `timeout_cycles` ticks
    ///
    /// Unconfirmed members are removed with a failure notification. Returns
    /// the number of groups torn down.
    pub fn expire_confirmations(
        &self,
        tick: u64,
        timeout_cycles: u64,
        registry: &mut ParticipantRegistry,
        arena: &mut GroupArena,
    ) -> usize {
        let expired: Vec<GroupId> = arena
            .iter()
            .filter(|group| match group.stage {
                HandoffStage::Confirming { since_tick, .. } => {
                    tick.saturating_sub(since_tick) >= timeout_cycles
                }
                _ => false,
            })
            .map(|group| group.id())
            .collect();

        for group_id in &expired {
            let Some(group) = arena.remove(*group_id) else {
                continue;
            };
            warn!(
                "{} confirmation deadline passed ({}/{} confirmed)",
                group_id,
                group.confirmed_count.unwrap_or(0),
                group.len()
            );

            for member in group.members() {
                let belongs = registry
                    .get(member)
                    .map(|entry| entry.group == Some(*group_id))
                    .unwrap_or(false);
                if belongs {
                    registry.dequeue(member);
                    self.notifier.send(
                        member,
                        QueueMessage::MatchFailed {
                            reason: "confirmation timeout".to_string(),
                        },
                    );
                }
            }
        }

        expired.len()
    }
}

/// Create an instance and reserve every seat in it
///
/// Reservations run concurrently. If several fail, the earliest member in
/// group order is reported.
pub async fn run_handoff(
    provisioner: Arc<dyn MatchProvisioner>,
    kind: &str,
    config: &serde_json::Value,
    group_id: GroupId,
    members: Vec<(ParticipantId, JoinOptions)>,
) -> HandoffOutcome {
    let instance = match provisioner.create_instance(kind, config).await {
        Ok(instance) => instance,
        Err(e) => {
            return HandoffOutcome::ProvisioningFailed {
                group_id,
                error: e.to_string(),
            }
        }
    };

    let ids: Vec<ParticipantId> = members.iter().map(|(id, _)| id.clone()).collect();
    let mut reservations = JoinSet::new();
    for (index, (_, options)) in members.into_iter().enumerate() {
        let provisioner = provisioner.clone();
        let instance = instance.clone();
        reservations.spawn(async move {
            let result = provisioner.reserve_seat(&instance, &options).await;
            (index, result)
        });
    }

    let mut credentials: Vec<Option<SeatCredential>> = vec![None; ids.len()];
    let mut failure: Option<(usize, String)> = None;

    while let Some(joined) = reservations.join_next().await {
        match joined {
            Ok((index, Ok(credential))) => credentials[index] = Some(credential),
            Ok((index, Err(e))) => {
                if failure.as_ref().map_or(true, |(first, _)| index < *first) {
                    failure = Some((index, e.to_string()));
                }
            }
            Err(e) => warn!("Seat reservation task for {} aborted: {}", group_id, e),
        }
    }

    if failure.is_none() {
        // Aborted reservation tasks leave an empty slot behind
        failure = credentials
            .iter()
            .position(Option::is_none)
            .map(|index| (index, "reservation task aborted".to_string()));
    }

    if let Some((index, error)) = failure {
        return HandoffOutcome::ReservationFailed {
            group_id,
            instance,
            participant_id: ids[index].clone(),
            error,
        };
    }

    let seats = ids
        .into_iter()
        .zip(credentials.into_iter().flatten())
        .collect();

    HandoffOutcome::Seated {
        group_id,
        instance,
        seats,
    }
}
