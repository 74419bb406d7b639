//! Test fixtures and scripted collaborators for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use ranked_queue::config::QueueConfig;
use ranked_queue::error::{QueueError, Result};
use ranked_queue::handoff::{HandoffOutcome, MatchProvisioner, RecordingNotifier};
use ranked_queue::metrics::MetricsCollector;
use ranked_queue::service::QueueEngine;
use ranked_queue::types::{InstanceHandle, JoinOptions, JoinRequest, SeatCredential};
use ranked_queue::utils::current_timestamp;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Payload marker that makes [`ScriptedProvisioner`] refuse a seat
pub const REFUSE_SEAT: &str = "refuse_seat";

/// Provisioner whose failures are scripted by the test
#[derive(Debug, Default)]
pub struct ScriptedProvisioner {
    /// Instance creations still to fail
    failing_creations: AtomicUsize,
    /// Time each instance creation takes
    creation_delay: Duration,
    created: AtomicUsize,
    reserved: AtomicUsize,
    seen_options: Mutex<Vec<JoinOptions>>,
}

impl ScriptedProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` instance creations
    pub fn failing_creations(count: usize) -> Self {
        Self {
            failing_creations: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    /// Take `delay` to create every instance
    pub fn with_creation_delay(delay: Duration) -> Self {
        Self {
            creation_delay: delay,
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::SeqCst)
    }

    /// Join options of every seat reservation, in call order
    pub fn seen_options(&self) -> Vec<JoinOptions> {
        self.seen_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl MatchProvisioner for ScriptedProvisioner {
    async fn create_instance(
        &self,
        kind: &str,
        _config: &serde_json::Value,
    ) -> Result<InstanceHandle> {
        if !self.creation_delay.is_zero() {
            tokio::time::sleep(self.creation_delay).await;
        }

        let should_fail = self
            .failing_creations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(QueueError::ProvisioningError {
                message: "scripted provisioning failure".to_string(),
            }
            .into());
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(InstanceHandle {
            instance_id: format!("instance-{}", n),
            kind: kind.to_string(),
            created_at: current_timestamp(),
        })
    }

    async fn reserve_seat(
        &self,
        instance: &InstanceHandle,
        options: &JoinOptions,
    ) -> Result<SeatCredential> {
        self.seen_options.lock().unwrap().push(options.clone());

        if options.payload == serde_json::json!(REFUSE_SEAT) {
            return Err(QueueError::ReservationError {
                participant_id: String::new(),
                message: "scripted reservation failure".to_string(),
            }
            .into());
        }

        let n = self.reserved.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SeatCredential {
            instance_id: instance.instance_id.clone(),
            session_id: format!("session-{}", n),
            payload: options.payload.clone(),
        })
    }
}

pub struct TestQueue {
    pub engine: QueueEngine,
    pub outcomes: mpsc::UnboundedReceiver<HandoffOutcome>,
    pub notifier: Arc<RecordingNotifier>,
    pub provisioner: Arc<ScriptedProvisioner>,
}

impl TestQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self::with_provisioner(config, ScriptedProvisioner::new())
    }

    pub fn with_provisioner(config: QueueConfig, provisioner: ScriptedProvisioner) -> Self {
        let provisioner = Arc::new(provisioner);
        let notifier = Arc::new(RecordingNotifier::new());
        let (engine, outcomes) = QueueEngine::new(
            config,
            provisioner.clone(),
            notifier.clone(),
            Arc::new(MetricsCollector::default()),
        )
        .expect("valid test config");

        Self {
            engine,
            outcomes,
            notifier,
            provisioner,
        }
    }

    /// Enqueue solo participants named by id
    pub fn join_all(&mut self, participants: &[(&str, f64)]) {
        for (id, rank) in participants {
            self.engine
                .enqueue(JoinRequest::new(*id, *rank))
                .expect("enqueue");
        }
    }

    /// Wait for `count` handoff outcomes and apply them in arrival order
    pub async fn settle(&mut self, count: usize) {
        for _ in 0..count {
            let outcome = self.outcomes.recv().await.expect("handoff outcome");
            self.engine.apply_handoff(outcome);
        }
    }
}

/// Config with small groups and a slow tick, for tests that tick by hand
pub fn pairs_config() -> QueueConfig {
    QueueConfig {
        max_group_size: 2,
        tick_period_ms: 60_000,
        ..QueueConfig::default()
    }
}

/// Join options that make the scripted provisioner refuse the seat
pub fn refused_seat() -> JoinOptions {
    JoinOptions {
        payload: serde_json::json!(REFUSE_SEAT),
        auth: None,
    }
}
