//! Queue engine
//!
//! The single logical owner of all queue state. Every mutation of the
//! registry and the group arena goes through a `&mut QueueEngine`, so no
//! locking is needed. Handoffs run elsewhere and come back as
//! [`HandoffOutcome`]s applied with [`QueueEngine::apply_handoff`].

use crate::config::{validate_queue_config, QueueConfig};
use crate::error::{QueueError, Result};
use crate::handoff::{ConfirmStatus, HandoffController, HandoffOutcome, MatchProvisioner, Notifier};
use crate::metrics::MetricsCollector;
use crate::queue::{
    CompatibilityPolicy, GroupArena, GroupBuilder, GroupSnapshot, ParticipantRegistry, PassSummary,
    QueueEntry,
};
use crate::types::{JoinRequest, QueueMessage, QueueSignal};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What one tick did
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub pass: PassSummary,
    pub handoffs_started: usize,
    pub confirmations_expired: usize,
    pub waiting: usize,
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub tick: u64,
    pub waiting: usize,
    pub groups: Vec<GroupSnapshot>,
}

pub struct QueueEngine {
    config: QueueConfig,
    registry: ParticipantRegistry,
    arena: GroupArena,
    builder: GroupBuilder,
    controller: HandoffController,
    metrics: Arc<MetricsCollector>,
    tick: u64,
}

impl QueueEngine {
    /// Create an engine with the default rank-ratio policy
    ///
    /// Also returns the receiver on which background handoffs report back.
    pub fn new(
        config: QueueConfig,
        provisioner: Arc<dyn MatchProvisioner>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HandoffOutcome>)> {
        let builder = GroupBuilder::new(config.clone());
        Self::build(config, builder, provisioner, notifier, metrics)
    }

    /// Create an engine with a custom compatibility policy
    pub fn with_policy(
        config: QueueConfig,
        policy: Arc<dyn CompatibilityPolicy>,
        provisioner: Arc<dyn MatchProvisioner>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HandoffOutcome>)> {
        let builder = GroupBuilder::with_policy(config.clone(), policy);
        Self::build(config, builder, provisioner, notifier, metrics)
    }

    fn build(
        config: QueueConfig,
        builder: GroupBuilder,
        provisioner: Arc<dyn MatchProvisioner>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HandoffOutcome>)> {
        validate_queue_config(&config).map_err(|e| QueueError::ConfigurationError {
            message: e.to_string(),
        })?;

        let (outcomes, receiver) = mpsc::unbounded_channel();
        let controller = HandoffController::new(
            provisioner,
            notifier,
            outcomes,
            config.instance_kind.clone(),
            config.instance_config.clone(),
        );

        let engine = Self {
            registry: ParticipantRegistry::with_team_size(config.team_size),
            arena: GroupArena::new(),
            builder,
            controller,
            metrics,
            tick: 0,
            config,
        };

        Ok((engine, receiver))
    }

    /// Add a participant and acknowledge with a group size of one
    pub fn enqueue(&mut self, request: JoinRequest) -> Result<()> {
        let participant_id = request.participant_id.clone();
        let entry = self.registry.enqueue(request)?;
        info!(
            "Participant '{}' joined the queue with rank {:.1}",
            entry.participant_id, entry.rank
        );

        if let Some(entry) = self.registry.get_mut(&participant_id) {
            entry.last_reported_queue_size = Some(1);
        }
        self.controller
            .notifier()
            .send(&participant_id, QueueMessage::Clients { count: 1 });
        self.metrics.record_enqueued(self.registry.len());
        Ok(())
    }

    /// Remove a participant regardless of its group state
    pub fn dequeue(&mut self, participant_id: &str) -> Result<QueueEntry> {
        let entry = self
            .registry
            .dequeue(participant_id)
            .ok_or_else(|| QueueError::ParticipantNotFound {
                participant_id: participant_id.to_string(),
            })?;

        if let Some(group_id) = entry.group {
            if self.arena.is_ready(group_id) {
                // Handoff continues with the reduced membership
                self.controller
                    .complete_if_done(group_id, &self.registry, &mut self.arena);
            } else if let Some(group) = self.arena.get_mut(group_id) {
                group.forget(participant_id);
            }
        }

        info!(
            "Participant '{}' left the queue after {}ms",
            participant_id,
            entry.time_in_queue().num_milliseconds()
        );
        self.metrics.record_dequeued(self.registry.len());
        Ok(entry)
    }

    /// Record a seat confirmation
    pub fn confirm(&mut self, participant_id: &str) -> Result<ConfirmStatus> {
        let status = self
            .controller
            .confirm(participant_id, &mut self.registry, &mut self.arena)?;
        self.metrics.record_confirmation(self.registry.len());
        Ok(status)
    }

    /// Route an inbound signal
    pub fn dispatch(&mut self, signal: QueueSignal) -> Result<()> {
        match signal {
            QueueSignal::Join(request) => self.enqueue(request),
            QueueSignal::Leave { participant_id } => self.dequeue(&participant_id).map(|_| ()),
            QueueSignal::Confirm { participant_id } => self.confirm(&participant_id).map(|_| ()),
        }
    }

    /// Run one cycle: expire stale confirmations, partition, notify and hand off
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;

        let confirmations_expired = match self.config.confirmation_timeout_cycles {
            Some(timeout) => self.controller.expire_confirmations(
                self.tick,
                timeout,
                &mut self.registry,
                &mut self.arena,
            ),
            None => 0,
        };
        if confirmations_expired > 0 {
            self.metrics
                .record_confirmation_timeouts(confirmations_expired);
        }

        let started = Instant::now();
        let pass = self.builder.rebuild(&mut self.registry, &mut self.arena);
        let elapsed = started.elapsed();

        self.controller
            .broadcast_group_size(&mut self.registry, &self.arena);
        let handoffs_started = self
            .controller
            .start_ready_groups(&self.registry, &mut self.arena);

        let waiting = self.registry.len();
        self.metrics.record_pass(&pass, elapsed, waiting);

        debug!(
            "Tick {} - candidates: {}, groups: {}, handoffs started: {}, partitioned in {:.3}ms",
            self.tick,
            pass.candidates,
            self.arena.len(),
            handoffs_started,
            elapsed.as_secs_f64() * 1000.0
        );

        TickReport {
            tick: self.tick,
            pass,
            handoffs_started,
            confirmations_expired,
            waiting,
        }
    }

    /// Apply a background handoff result
    pub fn apply_handoff(&mut self, outcome: HandoffOutcome) {
        self.metrics.record_handoff(outcome.label());
        self.controller
            .apply(outcome, &mut self.registry, &mut self.arena, self.tick);
        self.metrics.set_waiting(self.registry.len());
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tick: self.tick,
            waiting: self.registry.len(),
            groups: self.arena.snapshot(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn arena(&self) -> &GroupArena {
        &self.arena
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }
}
