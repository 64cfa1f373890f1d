//! Command Dispatcher
//!
//! Serializes commands from any number of producers into one ordered stream of
//! characteristic writes.
//!
//! ```text
//!  producers ──enqueue──▶ [ bounded FIFO ] ──▶ consumer task ──encode──▶ PeripheralWriter
//! ```
//!
//! The consumer is the only code that touches the peripheral. A `Reset` is
//! queued before anything a caller submits.

use crate::domain::command::Command;
use crate::domain::models::{BackPressure, DispatcherState, WriteFailurePolicy};
use crate::domain::peripheral::{PeripheralWriter, WriteError};
use crate::domain::settings::Settings;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Commands are a few bytes each; bursts from maneuvers stay well under this
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("command queue is full")]
    QueueFull,

    #[error("dispatcher is closed")]
    Closed,

    #[error("queue capacity must be at least 1")]
    InvalidCapacity,
}

/// Dispatcher behavior knobs
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub capacity: usize,
    pub back_pressure: BackPressure,
    pub write_failure: WriteFailurePolicy,
    /// Per-write limit; a hung write stalls everything behind it when unset
    pub write_timeout: Option<Duration>,
    /// LED color queued right after the initial reset
    pub startup_led: Option<[u8; 3]>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            back_pressure: BackPressure::Block,
            write_failure: WriteFailurePolicy::Skip,
            write_timeout: None,
            startup_led: None,
        }
    }
}

impl From<&Settings> for DispatcherConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            capacity: settings.queue_capacity,
            back_pressure: settings.back_pressure,
            write_failure: settings.write_failure,
            write_timeout: settings.write_timeout(),
            startup_led: settings.startup_led,
        }
    }
}

/// Counters returned when the consumer stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub written: u64,
    pub failed: u64,
    pub retried: u64,
}

/// Producer side. Cheap to clone; hand one to every component that issues commands.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Command>,
    back_pressure: BackPressure,
    state: watch::Receiver<DispatcherState>,
}

impl DispatcherHandle {
    /// Queue a command, honoring the configured back-pressure policy.
    pub async fn enqueue(&self, command: Command) -> Result<(), DispatchError> {
        match self.back_pressure {
            BackPressure::Block => self
                .tx
                .send(command)
                .await
                .map_err(|_| DispatchError::Closed),
            BackPressure::FailFast => self.try_enqueue(command),
        }
    }

    /// Queue a command without waiting, whatever the configured policy.
    pub fn try_enqueue(&self, command: Command) -> Result<(), DispatchError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::QueueFull,
            TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// Resolve once the consumer has stopped.
    pub async fn wait_stopped(&self) {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|s| *s == DispatcherState::Stopped)
            .await;
    }
}

/// Owner of the consumer task
pub struct Dispatcher {
    handle: DispatcherHandle,
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<DispatchStats>,
}

impl Dispatcher {
    /// Spawn the consumer on the current tokio runtime and queue the initial reset.
    pub fn start<W: PeripheralWriter>(
        writer: W,
        config: DispatcherConfig,
    ) -> Result<Self, DispatchError> {
        if config.capacity == 0 {
            return Err(DispatchError::InvalidCapacity);
        }

        let (tx, rx) = mpsc::channel(config.capacity);
        let (state_tx, state_rx) = watch::channel(DispatcherState::Created);
        let (close_tx, close_rx) = oneshot::channel();

        let handle = DispatcherHandle {
            tx,
            back_pressure: config.back_pressure,
            state: state_rx,
        };

        // The queue is empty and has room for at least one command
        handle.try_enqueue(Command::reset())?;
        if let Some([r, g, b]) = config.startup_led {
            if let Err(e) = handle.try_enqueue(Command::led(r, g, b)) {
                warn!("Skipping startup LED: {}", e);
            }
        }

        let consumer = Consumer {
            writer,
            write_failure: config.write_failure,
            write_timeout: config.write_timeout,
            state: state_tx,
            stats: DispatchStats::default(),
        };
        let task = tokio::spawn(consumer.run(rx, close_rx));

        info!(
            "Dispatcher started (capacity {}, {:?}, {:?})",
            config.capacity, config.back_pressure, config.write_failure
        );

        Ok(Self {
            handle,
            close_tx,
            task,
        })
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> DispatcherState {
        self.handle.state()
    }

    /// Close input, write whatever is already queued, then stop.
    pub async fn shutdown(self) -> DispatchStats {
        let Self {
            handle,
            close_tx,
            task,
        } = self;

        let _ = close_tx.send(());
        drop(handle);

        match task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Dispatcher task failed: {}", e);
                DispatchStats::default()
            }
        }
    }
}

struct Consumer<W> {
    writer: W,
    write_failure: WriteFailurePolicy,
    write_timeout: Option<Duration>,
    state: watch::Sender<DispatcherState>,
    stats: DispatchStats,
}

impl<W: PeripheralWriter> Consumer<W> {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Command>,
        mut close_rx: oneshot::Receiver<()>,
    ) -> DispatchStats {
        self.state.send_replace(DispatcherState::Running);
        let mut closing = false;

        loop {
            let next = if closing {
                rx.recv().await
            } else {
                tokio::select! {
                    biased;
                    // A dropped Dispatcher closes input just like shutdown()
                    _ = &mut close_rx => {
                        closing = true;
                        self.close_input(&mut rx);
                        continue;
                    }
                    command = rx.recv() => command,
                }
            };

            let Some(command) = next else {
                break;
            };

            if let Err(e) = self.deliver(&command).await {
                rx.close();
                let abandoned = rx.len();
                error!(
                    "Halting dispatcher after failed write of {}: {} ({} queued commands abandoned)",
                    command, e, abandoned
                );
                break;
            }
        }

        self.state.send_replace(DispatcherState::Stopped);
        info!(
            "Dispatcher stopped (written {}, failed {}, retried {})",
            self.stats.written, self.stats.failed, self.stats.retried
        );
        self.stats
    }

    /// Stop accepting commands. `Draining` only applies while something is queued.
    fn close_input(&mut self, rx: &mut mpsc::Receiver<Command>) {
        rx.close();
        if rx.is_empty() {
            debug!("Dispatcher input closed with an empty queue");
        } else {
            self.state.send_replace(DispatcherState::Draining);
            debug!("Dispatcher input closed, draining {} queued", rx.len());
        }
    }

    /// Write one command. Only returns `Err` when the policy says to halt.
    async fn deliver(&mut self, command: &Command) -> Result<(), WriteError> {
        let frame = command.encode();
        let (retries, backoff) = match self.write_failure {
            WriteFailurePolicy::Retry {
                attempts,
                backoff_ms,
            } => (attempts, Duration::from_millis(backoff_ms)),
            _ => (0, Duration::ZERO),
        };

        let mut attempt = 0;
        loop {
            match self.write_once(&frame).await {
                Ok(()) => {
                    self.stats.written += 1;
                    debug!("Wrote {} ({:02X?})", command, frame);
                    return Ok(());
                }
                Err(e) if attempt < retries => {
                    attempt += 1;
                    self.stats.retried += 1;
                    warn!(
                        "Write of {} failed: {}. Retry {}/{}",
                        command, e, attempt, retries
                    );
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => {
                    self.stats.failed += 1;
                    if self.write_failure == WriteFailurePolicy::Halt {
                        return Err(e);
                    }
                    warn!("Dropping {} after failed write: {}", command, e);
                    return Ok(());
                }
            }
        }
    }

    async fn write_once(&mut self, frame: &[u8]) -> Result<(), WriteError> {
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, self.writer.write(frame))
                .await
                .unwrap_or(Err(WriteError::TimedOut(limit))),
            None => self.writer.write(frame).await,
        }
    }
}
