//! Lifecycle Controller
//!
//! ## States
//! ```text
//! Stopped ──▶ Starting ──▶ Running ──▶ Draining ──▶ Stopped (terminal)
//!                │
//!                └──▶ Stopped (startup failed)
//! ```
//! Once `Draining` begins the engine can never run again.
//!
//! ## Scheduler
//! Periodic background tasks (flush, compaction) each get a thread driven by
//! a `crossbeam` tick channel. Dropping the shutdown sender wakes every task
//! thread and ends its loop.

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, select, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{LogKvError, Result};

// =============================================================================
// State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Draining,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
        };
        f.write_str(name)
    }
}

struct StateCell {
    current: LifecycleState,
    /// Set once Draining is entered; Stopped is then terminal
    drained: bool,
}

/// Guarded lifecycle state
pub struct Lifecycle {
    cell: Mutex<StateCell>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(StateCell {
                current: LifecycleState::Stopped,
                drained: false,
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.cell.lock().current
    }

    /// Move to `next`, rejecting transitions the state machine forbids
    pub fn transition(&self, next: LifecycleState) -> Result<()> {
        use LifecycleState::*;

        let mut cell = self.cell.lock();
        let allowed = match (cell.current, next) {
            (Stopped, Starting) => !cell.drained,
            (Starting, Running) | (Starting, Stopped) => true,
            (Running, Draining) => true,
            (Draining, Stopped) => true,
            _ => false,
        };

        if !allowed {
            return Err(LogKvError::Lifecycle(format!(
                "illegal transition {} -> {}",
                cell.current, next
            )));
        }

        if next == Draining {
            cell.drained = true;
        }
        tracing::info!(from = %cell.current, to = %next, "Lifecycle transition");
        cell.current = next;
        Ok(())
    }

    /// Whether writes are still accepted
    pub fn accepts_writes(&self) -> bool {
        matches!(
            self.state(),
            LifecycleState::Running | LifecycleState::Draining
        )
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Periodic Tasks
// =============================================================================

/// Context handed to each task run
pub struct Context {
    pub task_name: &'static str,
    pub run_id: u64,
}

/// A task run on a fixed period
pub trait BackgroundTask: Send + Sync {
    /// Task name for logging
    fn name(&self) -> &'static str;

    /// How often to run this task
    fn interval(&self) -> Duration;

    /// Execute one run
    fn execute(&self, ctx: &Context) -> Result<()>;
}

/// Runs registered tasks on their own threads until shut down
pub struct Scheduler {
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);
        Self {
            tasks: Mutex::new(Vec::new()),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
        }
    }

    /// Register a periodic background task
    pub fn register<T: BackgroundTask + 'static>(&self, task: T) -> Result<&Self> {
        let name = task.name();
        let interval = task.interval();
        let shutdown_rx = self.shutdown_rx.clone();

        let handle = thread::Builder::new()
            .name(format!("logkv-{}", name))
            .spawn(move || {
                let ticker = channel::tick(interval);
                let mut run_id = 0u64;

                loop {
                    select! {
                        recv(ticker) -> _ => {
                            run_id += 1;
                            let ctx = Context { task_name: name, run_id };
                            if let Err(e) = task.execute(&ctx) {
                                tracing::error!(task = name, run_id, error = %e, "Task execution failed");
                            }
                        }
                        recv(shutdown_rx) -> _ => {
                            tracing::info!(task = name, "Task shutting down");
                            break;
                        }
                    }
                }
            })?;

        tracing::debug!(task = name, interval_ms = interval.as_millis() as u64, "Registered task");
        self.tasks.lock().push(handle);
        Ok(self)
    }

    /// Stop ticking; runs already in progress finish on their own
    pub fn signal_shutdown(&self) {
        self.shutdown_tx.lock().take();
    }

    /// Stop ticking and wait for every task thread to exit
    pub fn shutdown(&self) {
        self.signal_shutdown();
        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Background task panicked before shutdown");
            }
        }
    }

    /// Number of registered task threads still owned
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Only signal: the last owner may be one of the task threads
        self.signal_shutdown();
    }
}
