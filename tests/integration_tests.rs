//! Integration tests for the ranked queue
//!
//! These tests drive the whole pipeline through the public API:
//! - Partitioning into groups and readiness
//! - Handoff to the provisioner and seat delivery
//! - Confirmation handshake and teardown
//! - Failure isolation between groups
//! - The owner task and its handle

mod fixtures;

use fixtures::{pairs_config, refused_seat, ScriptedProvisioner, TestQueue};
use ranked_queue::config::QueueConfig;
use ranked_queue::error::QueueError;
use ranked_queue::handoff::{ChannelNotifier, HandoffOutcome};
use ranked_queue::metrics::MetricsCollector;
use ranked_queue::queue::HandoffStage;
use ranked_queue::service::{QueueEngine, QueueService};
use ranked_queue::types::{JoinRequest, QueueMessage, QueueSignal};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_complete_group_lifecycle() {
    let mut queue = TestQueue::new(QueueConfig::default());
    queue.join_all(&[("a", 1000.0), ("b", 1010.0), ("c", 1020.0), ("d", 1030.0)]);

    // Step 1: one full group becomes ready and is handed off
    let report = queue.engine.tick();
    assert_eq!(report.pass.ready_full.len(), 1);
    assert_eq!(report.handoffs_started, 1);
    let group_id = report.pass.ready_full[0];

    // Step 2: seats arrive
    queue.settle(1).await;
    assert_eq!(queue.notifier.count_of("seat"), 4);
    assert_eq!(queue.provisioner.created(), 1);
    let group = queue.engine.arena().get(group_id).unwrap();
    assert_eq!(group.confirmed_count, Some(0));

    // Step 3: everybody confirms
    let mut last = None;
    for id in ["a", "b", "c", "d"] {
        last = Some(queue.engine.confirm(id).unwrap());
    }
    let status = last.unwrap();

    assert_eq!(status.confirmed, status.total);
    assert_eq!(status.total, 4);
    assert!(status.complete);
    assert!(queue.engine.registry().is_empty());
    assert!(queue.engine.arena().is_empty());
}

#[tokio::test]
async fn test_seat_credentials_carry_join_payload() {
    let mut queue = TestQueue::new(pairs_config());
    let options = ranked_queue::types::JoinOptions {
        payload: serde_json::json!({"deck": "blue"}),
        auth: Some(serde_json::json!({"token": "t-1"})),
    };
    queue
        .engine
        .enqueue(JoinRequest::new("a", 10.0).with_options(options))
        .unwrap();
    queue.join_all(&[("b", 10.0)]);

    queue.engine.tick();
    queue.settle(1).await;

    let seat = queue
        .notifier
        .messages_for("a")
        .into_iter()
        .find_map(|message| match message {
            QueueMessage::Seat { credential } => Some(credential),
            _ => None,
        })
        .unwrap();
    assert_eq!(seat.payload["deck"], "blue");

    // The provisioner saw the auth context alongside the payload
    let seen = queue.provisioner.seen_options();
    assert_eq!(seen.len(), 2);
    let forwarded = seen
        .iter()
        .find(|options| options.payload == serde_json::json!({"deck": "blue"}))
        .unwrap();
    assert_eq!(forwarded.auth, Some(serde_json::json!({"token": "t-1"})));
}

#[tokio::test]
async fn test_reservation_failure_is_isolated_to_its_group() {
    let mut queue = TestQueue::new(pairs_config());
    queue.join_all(&[("a1", 10.0), ("a2", 11.0), ("b1", 1000.0)]);
    queue
        .engine
        .enqueue(JoinRequest::new("b2", 1001.0).with_options(refused_seat()))
        .unwrap();

    let report = queue.engine.tick();
    assert_eq!(report.handoffs_started, 2);
    let group_a = queue.engine.registry().get("a1").unwrap().group.unwrap();
    let group_b = queue.engine.registry().get("b1").unwrap().group.unwrap();
    assert_ne!(group_a, group_b);

    queue.settle(2).await;

    // Group B is gone with both members removed and told why
    assert!(queue.engine.arena().get(group_b).is_none());
    assert!(!queue.engine.registry().contains("b1"));
    assert!(!queue.engine.registry().contains("b2"));
    assert!(matches!(
        queue.notifier.messages_for("b1").last(),
        Some(QueueMessage::MatchFailed { .. })
    ));

    // Group A is untouched
    let a = queue.engine.arena().get(group_a).unwrap();
    assert!(a.ready);
    assert_eq!(a.confirmed_count, Some(0));
    assert!(matches!(a.stage, HandoffStage::Confirming { .. }));
    assert!(queue.engine.registry().contains("a1"));
    assert!(queue.engine.registry().contains("a2"));
}

#[tokio::test]
async fn test_provisioning_failure_requeues_and_retries() {
    let mut queue =
        TestQueue::with_provisioner(pairs_config(), ScriptedProvisioner::failing_creations(1));
    queue.join_all(&[("a", 10.0), ("b", 11.0)]);

    queue.engine.tick();
    queue.settle(1).await;

    assert_eq!(queue.notifier.count_of("requeued"), 2);
    assert_eq!(queue.engine.registry().len(), 2);
    assert!(queue.engine.registry().get("a").unwrap().group.is_none());

    // Next tick regroups them and the retry succeeds
    let report = queue.engine.tick();
    assert_eq!(report.handoffs_started, 1);
    queue.settle(1).await;

    assert_eq!(queue.notifier.count_of("seat"), 2);
    assert_eq!(queue.provisioner.created(), 1);
}

#[tokio::test]
async fn test_leave_during_handoff_reduces_membership() {
    let mut queue = TestQueue::new(pairs_config());
    queue.join_all(&[("a", 10.0), ("b", 11.0)]);

    queue.engine.tick();
    queue.engine.dequeue("b").unwrap();
    queue.settle(1).await;

    // Only the remaining member receives a seat
    let seats: Vec<_> = queue
        .notifier
        .messages()
        .into_iter()
        .filter(|(_, message)| message.kind() == "seat")
        .map(|(id, _)| id)
        .collect();
    assert_eq!(seats, vec!["a".to_string()]);

    let status = queue.engine.confirm("a").unwrap();
    assert!(status.complete);
    assert!(queue.engine.arena().is_empty());
}

#[tokio::test]
async fn test_tick_during_slow_provisioning_leaves_group_alone() {
    let provisioner = ScriptedProvisioner::with_creation_delay(Duration::from_millis(200));
    let mut queue = TestQueue::with_provisioner(pairs_config(), provisioner);
    queue.join_all(&[("a", 10.0), ("b", 11.0)]);

    let report = queue.engine.tick();
    assert_eq!(report.handoffs_started, 1);
    let group_id = report.pass.ready_full[0];

    // The outcome is still pending when the next tick runs
    queue.join_all(&[("c", 10.5)]);
    let report = queue.engine.tick();
    assert_eq!(report.handoffs_started, 0);

    let group = queue.engine.arena().get(group_id).unwrap();
    assert!(group.ready);
    assert_eq!(group.stage, HandoffStage::InFlight);
    assert_eq!(group.members().to_vec(), vec!["a", "b"]);

    let newcomer = queue.engine.registry().get("c").unwrap().group.unwrap();
    assert_ne!(newcomer, group_id);
    assert!(!queue.engine.arena().get(newcomer).unwrap().ready);

    queue.settle(1).await;
    assert_eq!(queue.notifier.count_of("seat"), 2);
    assert_eq!(queue.provisioner.created(), 1);
    let group = queue.engine.arena().get(group_id).unwrap();
    assert_eq!(group.confirmed_count, Some(0));
    assert!(queue.notifier.messages_for("c").iter().all(|m| m.kind() != "seat"));
}

#[tokio::test]
async fn test_incomplete_group_handed_off_after_timeout() {
    let config = QueueConfig {
        allow_incomplete_groups: true,
        timeout_cycles: 3,
        escalation_cycles: 100,
        ..QueueConfig::default()
    };
    let mut queue = TestQueue::new(config);
    queue.join_all(&[("a", 10.0), ("b", 12.0)]);

    assert_eq!(queue.engine.tick().handoffs_started, 0);
    assert_eq!(queue.engine.tick().handoffs_started, 0);
    let report = queue.engine.tick();

    assert_eq!(report.pass.ready_incomplete.len(), 1);
    assert_eq!(report.handoffs_started, 1);
    queue.settle(1).await;
    assert_eq!(queue.notifier.count_of("seat"), 2);
}

#[tokio::test]
async fn test_confirmation_timeout_frees_stuck_group() {
    let config = QueueConfig {
        confirmation_timeout_cycles: Some(3),
        ..pairs_config()
    };
    let mut queue = TestQueue::new(config);
    queue.join_all(&[("a", 10.0), ("b", 11.0)]);

    queue.engine.tick();
    queue.settle(1).await;
    queue.engine.confirm("a").unwrap();

    for _ in 0..2 {
        assert_eq!(queue.engine.tick().confirmations_expired, 0);
    }
    assert_eq!(queue.engine.tick().confirmations_expired, 1);

    assert!(queue.engine.registry().is_empty());
    assert!(queue.engine.arena().is_empty());
    assert_eq!(
        queue.notifier.messages_for("b").last(),
        Some(&QueueMessage::MatchFailed {
            reason: "confirmation timeout".to_string()
        })
    );
}

#[tokio::test]
async fn test_unconfirmed_group_waits_without_deadline() {
    let mut queue = TestQueue::new(pairs_config());
    queue.join_all(&[("a", 10.0), ("b", 11.0)]);

    queue.engine.tick();
    queue.settle(1).await;

    for _ in 0..50 {
        assert_eq!(queue.engine.tick().confirmations_expired, 0);
    }
    assert_eq!(queue.engine.arena().len(), 1);
    assert_eq!(queue.engine.registry().len(), 2);
}

#[tokio::test]
async fn test_outcome_for_discarded_group_is_ignored() {
    let mut queue = TestQueue::new(pairs_config());
    queue.join_all(&[("a", 10.0)]);

    queue.engine.apply_handoff(HandoffOutcome::ProvisioningFailed {
        group_id: ranked_queue::types::GroupId(999),
        error: "late".to_string(),
    });

    assert_eq!(queue.engine.registry().len(), 1);
    assert_eq!(queue.notifier.count_of("requeued"), 0);
}

#[tokio::test]
async fn test_service_pipeline_with_channel_notifier() {
    let (notifier, mut messages) = ChannelNotifier::new();
    let provisioner = Arc::new(ScriptedProvisioner::new());
    let (engine, outcomes) = QueueEngine::new(
        pairs_config(),
        provisioner.clone(),
        Arc::new(notifier),
        Arc::new(MetricsCollector::default()),
    )
    .unwrap();
    let (service, handle) = QueueService::new(engine, outcomes, 8);
    let task = tokio::spawn(service.run());

    let join: QueueSignal =
        serde_json::from_str(r#"{"type":"join","participant_id":"a","rank":10.0}"#).unwrap();
    handle.dispatch(join).await.unwrap();
    handle.enqueue(JoinRequest::new("b", 12.0)).await.unwrap();
    handle.tick_now().await.unwrap();

    let mut seats = 0;
    while seats < 2 {
        let (id, message) = messages.recv().await.unwrap();
        if matches!(message, QueueMessage::Seat { .. }) {
            seats += 1;
            handle
                .dispatch(QueueSignal::Confirm { participant_id: id })
                .await
                .unwrap();
        }
    }

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.waiting, 0);
    assert!(snapshot.groups.is_empty());
    assert_eq!(provisioner.reserved(), 2);

    handle.shutdown().await.unwrap();
    let engine = task.await.unwrap();
    assert_eq!(
        engine.metrics().handoff().confirmations_total.get(),
        2
    );

    let err = handle.enqueue(JoinRequest::new("late", 1.0)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<QueueError>(),
        Some(QueueError::ServiceUnavailable { .. })
    ));
}
