//! Named background workers over one tokio runtime.
//!
//! At most one live worker exists per name. Workers are cancelled
//! cooperatively through a [`CancelToken`] and remove themselves from the
//! registry when they settle, however they exit.

use crate::error::{Result, ScannerError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;

/// Cancellation signal observed by a unit of work at its suspension points.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Every canceller is gone, so cancellation can no longer happen.
            std::future::pending::<()>().await;
        }
    }
}

/// Requesting side of a [`CancelToken`].
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Create a linked canceller and token.
pub fn cancel_pair() -> (Canceller, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx: Arc::new(tx) }, CancelToken { rx })
}

/// How a worker settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Returned `Ok` without being asked to stop.
    Completed,
    /// Returned `Ok` after cancellation was requested.
    Cancelled,
    /// Dropped by a forced abort before it returned.
    Aborted,
    /// Returned an error; the message is kept for reporting.
    Failed(String),
    Panicked,
}

/// Handle to one named worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Worker {
    name: String,
    id: u64,
    canceller: Canceller,
    settled: watch::Receiver<Option<WorkerOutcome>>,
    abort: AbortHandle,
}

impl Worker {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cooperative cancellation. Does not block.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.canceller.is_cancelled()
    }

    /// Drop the worker's future at its next suspension point.
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn done(&self) -> bool {
        self.settled.borrow().is_some()
    }

    pub fn outcome(&self) -> Option<WorkerOutcome> {
        self.settled.borrow().clone()
    }

    /// Wait until the worker has settled and been removed from the registry.
    pub async fn wait(&self) -> WorkerOutcome {
        let mut rx = self.settled.clone();
        let outcome = rx.wait_for(Option::is_some).await.map(|o| o.clone());
        match outcome {
            Ok(Some(outcome)) => outcome,
            _ => WorkerOutcome::Aborted,
        }
    }
}

type Registry = Arc<Mutex<HashMap<String, Worker>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, Worker>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deregisters the worker and publishes its outcome when dropped.
///
/// Created before the task is spawned and moved into it, so it also runs
/// when the task is aborted before its first poll.
struct SettleGuard {
    registry: Registry,
    name: String,
    id: u64,
    settled: watch::Sender<Option<WorkerOutcome>>,
    outcome: Option<WorkerOutcome>,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            if std::thread::panicking() {
                WorkerOutcome::Panicked
            } else {
                WorkerOutcome::Aborted
            }
        });

        // Already locked on this thread when the runtime drops a task inline
        // during `spawn`. Settled entries are skipped by every lookup and
        // pruned by the next spawn.
        let workers = match self.registry.try_lock() {
            Ok(workers) => Some(workers),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        };
        if let Some(mut workers) = workers {
            if workers.get(&self.name).is_some_and(|w| w.id == self.id) {
                workers.remove(&self.name);
            }
        }

        log::debug!("Worker '{}' settled: {:?}", self.name, outcome);
        self.settled.send_replace(Some(outcome));
    }
}

/// Registry of named workers running on one runtime.
pub struct Scheduler {
    runtime: Handle,
    workers: Registry,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            workers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start `unit` under `name`.
    ///
    /// `unit` is called before the name is checked; its future is dropped
    /// unpolled when the name is taken.
    ///
    /// Fails with [`ScannerError::DuplicateWorker`] while a worker with the
    /// same name is registered. Errors returned by the unit are logged and
    /// settle the worker as failed; they never reach other workers.
    pub fn spawn<F, Fut>(&self, name: &str, unit: F) -> Result<Worker>
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        // Built unlocked: the unit may look at the registry.
        let (canceller, token) = cancel_pair();
        let work = unit(token.clone());

        let mut workers = lock(&self.workers);
        if workers.get(name).is_some_and(|w| !w.done()) {
            return Err(ScannerError::DuplicateWorker(name.to_string()));
        }
        workers.retain(|_, w| !w.done());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (settled_tx, settled_rx) = watch::channel(None);

        let guard = SettleGuard {
            registry: self.workers.clone(),
            name: name.to_string(),
            id,
            settled: settled_tx,
            outcome: None,
        };

        let task = async move {
            let mut guard = guard;
            let result = work.await;
            guard.outcome = Some(match result {
                Ok(()) if token.is_cancelled() => WorkerOutcome::Cancelled,
                Ok(()) => WorkerOutcome::Completed,
                Err(e) => {
                    log::error!("Worker '{}' failed: {:#}", guard.name, e);
                    WorkerOutcome::Failed(e.to_string())
                }
            });
        };

        // The registry lock is held until the entry exists, so the task
        // cannot deregister before it was registered.
        let handle = self.runtime.spawn(task);
        let worker = Worker {
            name: name.to_string(),
            id,
            canceller,
            settled: settled_rx,
            abort: handle.abort_handle(),
        };
        workers.insert(name.to_string(), worker.clone());
        log::debug!("Worker '{}' spawned", name);

        Ok(worker)
    }

    pub fn has_worker(&self, name: &str) -> bool {
        lock(&self.workers).get(name).is_some_and(|w| !w.done())
    }

    pub fn get(&self, name: &str) -> Option<Worker> {
        lock(&self.workers).get(name).filter(|w| !w.done()).cloned()
    }

    /// Request cancellation of `name`. No-op when absent or settled.
    pub fn stop_worker(&self, name: &str) {
        if let Some(worker) = self.get(name) {
            worker.cancel();
        }
    }

    /// Request cancellation and wait up to `timeout` for the worker to
    /// settle. A timeout is swallowed; check [`Scheduler::has_worker`] when
    /// a hard guarantee is needed.
    pub async fn stop_and_wait(&self, name: &str, timeout: Duration) {
        let Some(worker) = self.get(name) else {
            return;
        };

        worker.cancel();
        if tokio::time::timeout(timeout, worker.wait()).await.is_err() {
            log::warn!(
                "Worker '{}' did not stop within {:.1}s",
                name,
                timeout.as_secs_f64()
            );
        }
    }

    /// Snapshot of workers that have not settled.
    pub fn running_tasks(&self) -> Vec<Worker> {
        lock(&self.workers)
            .values()
            .filter(|w| !w.done())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn scheduler() -> Scheduler {
        Scheduler::new(Handle::current())
    }

    async fn idle_until_cancelled(token: CancelToken) -> anyhow::Result<()> {
        token.cancelled().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_while_running() {
        let scheduler = scheduler();
        let first = scheduler.spawn("poll", idle_until_cancelled).unwrap();

        let err = scheduler.spawn("poll", idle_until_cancelled).unwrap_err();
        assert!(matches!(err, ScannerError::DuplicateWorker(name) if name == "poll"));

        first.cancel();
        assert_eq!(first.wait().await, WorkerOutcome::Cancelled);
        assert!(!scheduler.has_worker("poll"));

        let second = scheduler.spawn("poll", idle_until_cancelled).unwrap();
        assert!(scheduler.has_worker("poll"));
        second.cancel();
        second.wait().await;
    }

    #[tokio::test]
    async fn test_completed_worker_is_deregistered() {
        let scheduler = scheduler();
        let worker = scheduler.spawn("once", |_| async { Ok(()) }).unwrap();
        assert_eq!(worker.wait().await, WorkerOutcome::Completed);
        assert!(worker.done());
        assert!(!scheduler.has_worker("once"));
        assert!(scheduler.get("once").is_none());
        assert!(scheduler.running_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_failed_worker_settles_as_failed() {
        let scheduler = scheduler();
        let worker = scheduler
            .spawn("broken", |_| async { Err(anyhow::anyhow!("feed exploded")) })
            .unwrap();
        assert_eq!(
            worker.wait().await,
            WorkerOutcome::Failed("feed exploded".into())
        );
        assert!(!scheduler.has_worker("broken"));
    }

    #[tokio::test]
    async fn test_stop_worker_is_noop_when_absent() {
        let scheduler = scheduler();
        scheduler.stop_worker("missing");
        scheduler
            .stop_and_wait("missing", Duration::from_millis(10))
            .await;
        assert!(!scheduler.has_worker("missing"));
    }

    #[tokio::test]
    async fn test_stop_and_wait_settles_cooperative_worker() {
        let scheduler = scheduler();
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = cleaned.clone();
        scheduler
            .spawn("poll", move |token| async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                    }
                }
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        scheduler.stop_and_wait("poll", Duration::from_secs(1)).await;
        assert!(cleaned.load(Ordering::SeqCst));
        assert!(!scheduler.has_worker("poll"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_wait_swallows_timeout() {
        let scheduler = scheduler();
        let worker = scheduler
            .spawn("stubborn", |_token| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .unwrap();

        scheduler
            .stop_and_wait("stubborn", Duration::from_millis(50))
            .await;
        assert!(scheduler.has_worker("stubborn"));
        assert!(worker.is_cancel_requested());

        worker.abort();
        assert_eq!(worker.wait().await, WorkerOutcome::Aborted);
        assert!(!scheduler.has_worker("stubborn"));
    }

    #[tokio::test]
    async fn test_running_tasks_snapshot() {
        let scheduler = scheduler();
        let a = scheduler.spawn("a", idle_until_cancelled).unwrap();
        let b = scheduler.spawn("b", idle_until_cancelled).unwrap();

        let mut names: Vec<String> = scheduler
            .running_tasks()
            .iter()
            .map(|w| w.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);

        a.cancel();
        a.wait().await;
        assert_eq!(scheduler.running_tasks().len(), 1);
        b.cancel();
        b.wait().await;
    }

    #[tokio::test]
    async fn test_abort_before_first_poll_still_deregisters() {
        let scheduler = scheduler();
        let worker = scheduler.spawn("early", idle_until_cancelled).unwrap();
        worker.abort();
        assert_eq!(worker.wait().await, WorkerOutcome::Aborted);
        assert!(!scheduler.has_worker("early"));
    }

    #[tokio::test]
    async fn test_unit_may_query_the_registry_while_starting() {
        let scheduler = Arc::new(scheduler());
        let registry = scheduler.clone();
        let worker = scheduler
            .spawn("watcher", move |token| {
                let running = registry.has_worker("watcher");
                let others = registry.running_tasks().len();
                async move {
                    assert!(!running);
                    assert_eq!(others, 0);
                    idle_until_cancelled(token).await
                }
            })
            .unwrap();

        assert!(scheduler.has_worker("watcher"));
        worker.cancel();
        assert_eq!(worker.wait().await, WorkerOutcome::Cancelled);
    }

    #[test]
    fn test_spawn_on_stopped_runtime_settles_as_aborted() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = runtime.handle().clone();
        drop(runtime);

        let scheduler = Scheduler::new(handle);
        let worker = scheduler.spawn("late", idle_until_cancelled).unwrap();
        assert_eq!(worker.outcome(), Some(WorkerOutcome::Aborted));
        assert!(!scheduler.has_worker("late"));
        assert!(scheduler.running_tasks().is_empty());

        // The settled entry does not block the name.
        assert!(scheduler.spawn("late", idle_until_cancelled).is_ok());
    }
}
