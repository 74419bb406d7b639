//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the ranked queue using
//! Prometheus metrics. Exposition is left to the host.

use crate::queue::PassSummary;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the ranked queue
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Queue and partitioning metrics
    queue_metrics: QueueMetrics,

    /// Handoff metrics
    handoff_metrics: HandoffMetrics,
}

/// Queue and partitioning metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Participants currently queued
    pub participants_waiting: IntGauge,

    /// Total participants enqueued
    pub participants_enqueued_total: IntCounter,

    /// Total participants that left the queue before being seated
    pub participants_dequeued_total: IntCounter,

    /// Groups marked ready, by kind (full / incomplete)
    pub groups_ready_total: IntCounterVec,

    /// Participants escalated to high priority
    pub escalations_total: IntCounter,

    /// Duration of the synchronous partitioning phase
    pub tick_duration_seconds: Histogram,
}

/// Handoff metrics
#[derive(Clone)]
pub struct HandoffMetrics {
    /// Handoff outcomes (seated / provisioning_failed / reservation_failed)
    pub handoffs_total: IntCounterVec,

    /// Seat confirmations received
    pub confirmations_total: IntCounter,

    /// Groups torn down because confirmations did not arrive in time
    pub confirmation_timeouts_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let queue_metrics = QueueMetrics::new(&registry)?;
        let handoff_metrics = HandoffMetrics::new(&registry)?;

        Ok(Self {
            registry,
            queue_metrics,
            handoff_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get handoff metrics
    pub fn handoff(&self) -> &HandoffMetrics {
        &self.handoff_metrics
    }

    pub fn record_enqueued(&self, waiting: usize) {
        self.queue_metrics.participants_enqueued_total.inc();
        self.queue_metrics.participants_waiting.set(waiting as i64);
    }

    pub fn record_dequeued(&self, waiting: usize) {
        self.queue_metrics.participants_dequeued_total.inc();
        self.queue_metrics.participants_waiting.set(waiting as i64);
    }

    /// Record the result of one partitioning pass
    pub fn record_pass(&self, summary: &PassSummary, duration: Duration, waiting: usize) {
        self.queue_metrics
            .groups_ready_total
            .with_label_values(&["full"])
            .inc_by(summary.ready_full.len() as u64);
        self.queue_metrics
            .groups_ready_total
            .with_label_values(&["incomplete"])
            .inc_by(summary.ready_incomplete.len() as u64);
        self.queue_metrics
            .escalations_total
            .inc_by(summary.escalated.len() as u64);
        self.queue_metrics
            .tick_duration_seconds
            .observe(duration.as_secs_f64());
        self.queue_metrics.participants_waiting.set(waiting as i64);
    }

    pub fn record_handoff(&self, outcome: &str) {
        self.handoff_metrics
            .handoffs_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_confirmation(&self, waiting: usize) {
        self.handoff_metrics.confirmations_total.inc();
        self.queue_metrics.participants_waiting.set(waiting as i64);
    }

    pub fn record_confirmation_timeouts(&self, groups: usize) {
        self.handoff_metrics
            .confirmation_timeouts_total
            .inc_by(groups as u64);
    }

    pub fn set_waiting(&self, waiting: usize) {
        self.queue_metrics.participants_waiting.set(waiting as i64);
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let participants_waiting = IntGauge::new(
            "ranked_queue_participants_waiting",
            "Participants currently queued",
        )?;
        registry.register(Box::new(participants_waiting.clone()))?;

        let participants_enqueued_total = IntCounter::new(
            "ranked_queue_participants_enqueued_total",
            "Total participants enqueued",
        )?;
        registry.register(Box::new(participants_enqueued_total.clone()))?;

        let participants_dequeued_total = IntCounter::new(
            "ranked_queue_participants_dequeued_total",
            "Total participants that left before being seated",
        )?;
        registry.register(Box::new(participants_dequeued_total.clone()))?;

        let groups_ready_total = IntCounterVec::new(
            Opts::new("ranked_queue_groups_ready_total", "Total groups marked ready"),
            &["kind"],
        )?;
        registry.register(Box::new(groups_ready_total.clone()))?;

        let escalations_total = IntCounter::new(
            "ranked_queue_escalations_total",
            "Participants escalated to high priority",
        )?;
        registry.register(Box::new(escalations_total.clone()))?;

        let tick_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "ranked_queue_tick_duration_seconds",
                "Duration of the partitioning phase",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(tick_duration_seconds.clone()))?;

        Ok(Self {
            participants_waiting,
            participants_enqueued_total,
            participants_dequeued_total,
            groups_ready_total,
            escalations_total,
            tick_duration_seconds,
        })
    }
}

impl HandoffMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let handoffs_total = IntCounterVec::new(
            Opts::new("ranked_queue_handoffs_total", "Handoff outcomes"),
            &["outcome"],
        )?;
        registry.register(Box::new(handoffs_total.clone()))?;

        let confirmations_total = IntCounter::new(
            "ranked_queue_confirmations_total",
            "Seat confirmations received",
        )?;
        registry.register(Box::new(confirmations_total.clone()))?;

        let confirmation_timeouts_total = IntCounter::new(
            "ranked_queue_confirmation_timeouts_total",
            "Groups torn down after the confirmation deadline",
        )?;
        registry.register(Box::new(confirmation_timeouts_total.clone()))?;

        Ok(Self {
            handoffs_total,
            confirmations_total,
            confirmation_timeouts_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
