//! Main entry point for the Ranked Queue service
//!
//! Loads configuration, starts the queue owner task with an in-process
//! provisioner, and runs until Ctrl+C or SIGTERM.

use anyhow::Result;
use clap::Parser;
use ranked_queue::config::{validate_config, AppConfig};
use ranked_queue::handoff::{ChannelNotifier, LocalProvisioner, Notifier, TracingNotifier};
use ranked_queue::metrics::MetricsCollector;
use ranked_queue::service::{QueueEngine, QueueHandle, QueueService};
use ranked_queue::types::{JoinRequest, ParticipantId, QueueMessage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Ranked Queue - skill-based matchmaking queue service
#[derive(Parser)]
#[command(
    name = "ranked-queue",
    version,
    about = "A skill-based matchmaking queue with priority escalation",
    long_about = "Ranked Queue partitions waiting participants into rank-compatible match \
                 groups on a fixed tick, escalates participants that wait too long, and hands \
                 ready groups off to a match-instance provisioner."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Tick period override
    #[arg(long, value_name = "MS", help = "Override the partitioning tick period")]
    tick_period_ms: Option<u64>,

    /// Group size override
    #[arg(long, value_name = "N", help = "Override the number of participants per match")]
    max_group_size: Option<usize>,

    /// Allow stalled groups to start short
    #[arg(long, help = "Allow stalled groups to be handed off below full size")]
    allow_incomplete_groups: bool,

    /// Synthetic participants to enqueue at startup
    #[arg(
        long,
        value_name = "N",
        default_value_t = 0,
        help = "Enqueue N synthetic participants and auto-confirm their seats"
    )]
    simulate: usize,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    let queue = &config.queue;
    info!("🚀 Ranked Queue");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Group size: {}", queue.max_group_size);
    info!("   Tick period: {}ms", queue.tick_period_ms);
    info!(
        "   Escalation / timeout: {} / {} cycles",
        queue.escalation_cycles, queue.timeout_cycles
    );
    info!("   Incomplete groups: {}", queue.allow_incomplete_groups);
    info!("   Team size: {:?}", queue.team_size);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(tick_period_ms) = args.tick_period_ms {
        config.queue.tick_period_ms = tick_period_ms;
    }

    if let Some(max_group_size) = args.max_group_size {
        config.queue.max_group_size = max_group_size;
    }

    if args.allow_incomplete_groups {
        config.queue.allow_incomplete_groups = true;
    }

    validate_config(&config)?;
    Ok(config)
}

/// Simulated participants confirm every seat straight away
async fn pump_notifications(
    mut messages: mpsc::UnboundedReceiver<(ParticipantId, QueueMessage)>,
    handle: QueueHandle,
) {
    while let Some((participant_id, message)) = messages.recv().await {
        debug!("-> {}: {}", participant_id, message.kind());

        if let QueueMessage::Seat { .. } = message {
            if let Err(e) = handle.confirm(participant_id.clone()).await {
                warn!("Auto-confirm for '{}' failed: {}", participant_id, e);
            }
        }
    }
}

/// Enqueue synthetic participants spread over a rank range
async fn simulate_load(handle: &QueueHandle, count: usize) -> Result<()> {
    info!("Enqueuing {} synthetic participants", count);
    for i in 0..count {
        let rank = 800.0 + ((i * 137) % 900) as f64;
        handle
            .enqueue(JoinRequest::new(format!("sim-{}", i), rank))
            .await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let metrics = Arc::new(MetricsCollector::new()?);
    let provisioner = Arc::new(LocalProvisioner::new());
    // Without simulated participants nobody answers seats, so messages are only logged
    let (notifier, messages): (Arc<dyn Notifier>, _) = if args.simulate > 0 {
        let (notifier, messages) = ChannelNotifier::new();
        (Arc::new(notifier), Some(messages))
    } else {
        (Arc::new(TracingNotifier), None)
    };

    let (engine, outcomes) = match QueueEngine::new(
        config.queue.clone(),
        provisioner.clone(),
        notifier,
        metrics.clone(),
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to initialize queue engine: {}", e);
            std::process::exit(1);
        }
    };

    let (service, handle) = QueueService::new(engine, outcomes, config.service.command_buffer);
    let service_task = tokio::spawn(service.run());
    let pump_task =
        messages.map(|messages| tokio::spawn(pump_notifications(messages, handle.clone())));

    if args.simulate > 0 {
        simulate_load(&handle, args.simulate).await?;
    }

    info!("✅ Ranked Queue is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");
    if let Err(e) = handle.shutdown().await {
        warn!("Queue service already stopped: {}", e);
    }

    match tokio::time::timeout(config.shutdown_timeout(), service_task).await {
        Ok(Ok(engine)) => {
            let snapshot = engine.snapshot();
            info!(
                "Final state - ticks: {}, waiting: {}, open groups: {}, instances created: {}",
                snapshot.tick,
                snapshot.waiting,
                snapshot.groups.len(),
                provisioner.instance_count()
            );
            info!("✅ Graceful shutdown completed successfully");
        }
        Ok(Err(e)) => {
            error!("Queue service task failed: {}", e);
        }
        Err(_) => {
            warn!("⚠️  Shutdown timeout exceeded, forcing exit");
        }
    }

    if let Some(pump_task) = pump_task {
        pump_task.abort();
    }
    info!("🛑 Ranked Queue stopped");
    Ok(())
}
