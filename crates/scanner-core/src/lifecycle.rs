//! Process shutdown: cancel every worker, drain, then close the shell.

use crate::error::{Result, ScannerError};
use crate::scheduler::{Scheduler, WorkerOutcome};
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Presentation surface closed once shutdown has drained all workers.
pub trait Shell: Send + Sync {
    fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    ShuttingDown,
    Completed,
}

/// What happened to the workers that were running when shutdown began.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers running when shutdown started.
    pub workers: usize,
    /// The grace period elapsed before every worker settled.
    pub timed_out: bool,
    /// Workers that had to be aborted.
    pub aborted: usize,
    /// Workers that returned an error or panicked while stopping.
    pub failed: usize,
}

pub struct Lifecycle {
    scheduler: Arc<Scheduler>,
    shell: Arc<dyn Shell>,
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    pub fn new(scheduler: Arc<Scheduler>, shell: Arc<dyn Shell>) -> Self {
        Self {
            scheduler,
            shell,
            state: Mutex::new(LifecycleState::Idle),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Shut the process down once.
    ///
    /// Every running worker is cancelled. With `force` the stragglers are
    /// aborted immediately, otherwise they get `grace` to settle before being
    /// aborted. Worker failures are logged, never returned. The shell is
    /// closed last. A second call, concurrent or later, fails with
    /// [`ScannerError::ShutdownInProgress`] and has no effect.
    pub async fn shutdown(&self, force: bool, grace: Duration) -> Result<ShutdownReport> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != LifecycleState::Idle {
                log::warn!("Shutdown requested again, ignoring");
                return Err(ScannerError::ShutdownInProgress);
            }
            *state = LifecycleState::ShuttingDown;
        }

        log::info!("Shutting down{}", if force { " now" } else { "" });

        let running = self.scheduler.running_tasks();
        let mut report = ShutdownReport {
            workers: running.len(),
            ..Default::default()
        };

        if !running.is_empty() {
            log::info!("Cancelling {} background task(s)", running.len());
            for worker in &running {
                worker.cancel();
            }

            if force {
                for worker in &running {
                    worker.abort();
                }
            } else {
                let settled = join_all(running.iter().map(|w| w.wait()));
                if tokio::time::timeout(grace, settled).await.is_err() {
                    log::warn!(
                        "Graceful shutdown timed out after {:.1}s, aborting remaining tasks",
                        grace.as_secs_f64()
                    );
                    report.timed_out = true;
                    for worker in running.iter().filter(|w| !w.done()) {
                        worker.abort();
                    }
                }
            }

            let outcomes = join_all(running.iter().map(|w| w.wait())).await;
            for (worker, outcome) in running.iter().zip(outcomes) {
                match outcome {
                    WorkerOutcome::Completed | WorkerOutcome::Cancelled => {}
                    WorkerOutcome::Aborted => report.aborted += 1,
                    WorkerOutcome::Failed(e) => {
                        log::warn!("Task '{}' failed during shutdown: {}", worker.name(), e);
                        report.failed += 1;
                    }
                    WorkerOutcome::Panicked => {
                        log::warn!("Task '{}' panicked during shutdown", worker.name());
                        report.failed += 1;
                    }
                }
            }
        }

        self.shell.close();
        self.set_state(LifecycleState::Completed);
        log::info!("Shutdown complete");

        Ok(report)
    }
}
