//! Tick scheduler and owner task
//!
//! [`QueueService`] owns the [`QueueEngine`] on a single task. It ticks on a
//! fixed period, applies handoff outcomes as they arrive, and serves
//! commands from any number of cloned [`QueueHandle`]s.

use crate::error::{QueueError, Result};
use crate::handoff::{ConfirmStatus, HandoffOutcome};
use crate::service::engine::{QueueEngine, QueueSnapshot, TickReport};
use crate::types::{JoinRequest, ParticipantId, QueueSignal};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

enum Command {
    Dispatch {
        signal: QueueSignal,
        reply: oneshot::Sender<Result<()>>,
    },
    Confirm {
        participant_id: ParticipantId,
        reply: oneshot::Sender<Result<ConfirmStatus>>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Tick {
        reply: oneshot::Sender<TickReport>,
    },
    Shutdown,
}

/// Owner task driving a queue engine
pub struct QueueService {
    engine: QueueEngine,
    outcomes: mpsc::UnboundedReceiver<HandoffOutcome>,
    commands: mpsc::Receiver<Command>,
    tick_period: Duration,
}

impl QueueService {
    /// Wrap an engine; `buffer` bounds the number of pending commands
    pub fn new(
        engine: QueueEngine,
        outcomes: mpsc::UnboundedReceiver<HandoffOutcome>,
        buffer: usize,
    ) -> (Self, QueueHandle) {
        let (sender, commands) = mpsc::channel(buffer.max(1));
        let tick_period = engine.config().tick_period();

        let service = Self {
            engine,
            outcomes,
            commands,
            tick_period,
        };
        (service, QueueHandle { commands: sender })
    }

    /// Run until shutdown is requested or every handle is dropped
    ///
    /// Returns the engine so the host can inspect the final state.
    pub async fn run(mut self) -> QueueEngine {
        let mut interval = tokio::time::interval(self.tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        info!(
            "Queue service started - tick period: {}ms",
            self.tick_period.as_millis()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.engine.tick();
                    if report.handoffs_started > 0 || !report.pass.escalated.is_empty() {
                        debug!(
                            "Tick {} - {} handoffs started, {} escalated, {} waiting",
                            report.tick,
                            report.handoffs_started,
                            report.pass.escalated.len(),
                            report.waiting
                        );
                    }
                }
                Some(outcome) = self.outcomes.recv() => {
                    self.engine.apply_handoff(outcome);
                }
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
            }
        }

        info!(
            "Queue service stopped after {} ticks with {} participants waiting",
            self.engine.current_tick(),
            self.engine.registry().len()
        );
        self.engine
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Dispatch { signal, reply } => {
                let participant_id = signal.participant_id().to_string();
                let result = self.engine.dispatch(signal);
                if let Err(e) = &result {
                    debug!("Signal from '{}' rejected: {}", participant_id, e);
                }
                respond(reply, result);
            }
            Command::Confirm {
                participant_id,
                reply,
            } => respond(reply, self.engine.confirm(&participant_id)),
            Command::Snapshot { reply } => respond(reply, self.engine.snapshot()),
            Command::Tick { reply } => respond(reply, self.engine.tick()),
            Command::Shutdown => {}
        }
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        warn!("Queue caller went away before the reply was sent");
    }
}

/// Cloneable handle to a running [`QueueService`]
#[derive(Clone)]
pub struct QueueHandle {
    commands: mpsc::Sender<Command>,
}

impl QueueHandle {
    pub async fn enqueue(&self, request: JoinRequest) -> Result<()> {
        self.dispatch(QueueSignal::Join(request)).await
    }

    pub async fn dequeue(&self, participant_id: impl Into<ParticipantId>) -> Result<()> {
        self.dispatch(QueueSignal::Leave {
            participant_id: participant_id.into(),
        })
        .await
    }

    pub async fn confirm(&self, participant_id: impl Into<ParticipantId>) -> Result<ConfirmStatus> {
        let participant_id = participant_id.into();
        self.request(|reply| Command::Confirm {
            participant_id,
            reply,
        })
        .await?
    }

    pub async fn dispatch(&self, signal: QueueSignal) -> Result<()> {
        self.request(|reply| Command::Dispatch { signal, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Run a tick immediately, outside the periodic schedule
    pub async fn tick_now(&self) -> Result<TickReport> {
        self.request(|reply| Command::Tick { reply }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| unavailable())?;
        Ok(())
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| unavailable())?;
        Ok(response.await.map_err(|_| unavailable())?)
    }
}

fn unavailable() -> QueueError {
    QueueError::ServiceUnavailable {
        message: "queue owner task is not running".to_string(),
    }
}
