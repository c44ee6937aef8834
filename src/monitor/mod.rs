//! Task monitor: mirrors execution event streams into the task store.
//!
//! One watcher task runs per active task. It is the only writer of
//! `Running`/position updates and of `Completed`/`Failed` outcomes; the
//! orchestrator writes `Cancelled` after stopping the watcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::errors::StoreError;
use crate::executor::{TaskEvent, TaskEvents, deadline_after};
use crate::grid::Position;
use crate::store::TaskStore;
use crate::task::{TaskId, TaskStatus};

/// Failure message recorded when a task outlives the monitor's ceiling.
pub const TIMEOUT_MESSAGE: &str = "task timeout";

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Maximum time a task may stay active before it is failed.
    pub lifetime: Duration,
    /// Maximum number of watchers processing events at once.
    pub max_watchers: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(30 * 60),
            max_watchers: 256,
        }
    }
}

struct WatchHandle {
    generation: u64,
    stop: CancellationToken,
    finished: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<TaskId, WatchHandle>>>;

/// Registry of per-task watchers.
pub struct TaskMonitor {
    store: Arc<dyn TaskStore>,
    config: MonitorConfig,
    permits: Arc<Semaphore>,
    registry: Registry,
    generations: AtomicU64,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl TaskMonitor {
    pub fn new(store: Arc<dyn TaskStore>, config: MonitorConfig) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(config.max_watchers.max(1))),
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Start watching `task_id`'s event stream.
    ///
    /// The lifetime clock starts now, even if the watcher has to wait for a
    /// free slot. Events buffer in the stream meanwhile. Returns `false`
    /// when no watcher was started because the monitor is shut down.
    pub fn watch(&self, task_id: impl Into<TaskId>, events: TaskEvents) -> bool {
        let task_id = task_id.into();
        if self.shutdown.is_cancelled() {
            warn!(task_id = %task_id, "monitor is shut down, not watching task");
            return false;
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let stop = self.shutdown.child_token();
        let finished = CancellationToken::new();

        match self.registry.lock() {
            Ok(mut registry) => {
                let handle = WatchHandle {
                    generation,
                    stop: stop.clone(),
                    finished: finished.clone(),
                };
                if let Some(previous) = registry.insert(task_id.clone(), handle) {
                    warn!(task_id = %task_id, "replacing an existing watcher");
                    previous.stop.cancel();
                }
            }
            Err(_) => {
                warn!(task_id = %task_id, "monitor registry poisoned, not watching task");
                return false;
            }
        }

        let watcher = Watcher {
            task_id,
            store: Arc::clone(&self.store),
            deadline: deadline_after(self.config.lifetime),
            stop,
            guard: Deregister {
                registry: Arc::clone(&self.registry),
                generation,
                finished,
            },
        };
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(watcher.run(permits, events));
        true
    }

    /// Stop the watcher for `task_id` without a terminal write and wait for
    /// it to exit. Position events already delivered are persisted first.
    ///
    /// Returns `false` if no watcher was registered.
    pub async fn stop(&self, task_id: &str) -> bool {
        let handle = match self.registry.lock() {
            Ok(mut registry) => registry.remove(task_id),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return false;
        };
        handle.stop.cancel();
        handle.finished.cancelled().await;
        debug!(task_id, "watcher stopped");
        true
    }

    pub fn is_watching(&self, task_id: &str) -> bool {
        self.registry
            .lock()
            .map(|registry| registry.contains_key(task_id))
            .unwrap_or(false)
    }

    /// Number of registered watchers.
    pub fn active_count(&self) -> usize {
        self.registry
            .lock()
            .map(|registry| registry.len())
            .unwrap_or(0)
    }

    /// Signal every watcher to stop and wait until all have exited.
    pub async fn shutdown(&self) {
        info!(active = self.active_count(), "shutting down task monitor");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Removes the registry entry and signals completion on every exit path.
struct Deregister {
    registry: Registry,
    generation: u64,
    finished: CancellationToken,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.retain(|_, handle| handle.generation != self.generation);
        }
        self.finished.cancel();
    }
}

enum Outcome {
    Continue,
    Done,
}

struct Watcher {
    task_id: TaskId,
    store: Arc<dyn TaskStore>,
    deadline: Instant,
    stop: CancellationToken,
    guard: Deregister,
}

impl Watcher {
    async fn run(self, permits: Arc<Semaphore>, mut events: TaskEvents) {
        let _permit = tokio::select! {
            biased;
            _ = self.stop.cancelled() => {
                self.drain(&mut events);
                return;
            }
            permit = permits.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };
        debug!(task_id = %self.task_id, "watching task");

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    self.drain(&mut events);
                    break;
                }
                event = events.recv() => {
                    if let Outcome::Done = self.on_event(event) {
                        break;
                    }
                }
                _ = sleep_until(self.deadline) => {
                    warn!(task_id = %self.task_id, "task exceeded its lifetime");
                    self.persist_outcome(TaskStatus::Failed, Some(TIMEOUT_MESSAGE));
                    break;
                }
            }
        }
        drop(self.guard);
    }

    fn on_event(&self, event: Option<TaskEvent>) -> Outcome {
        match event {
            Some(TaskEvent::Position { position }) => {
                self.record_position(position);
                Outcome::Continue
            }
            Some(TaskEvent::Completed) | None => {
                self.persist_outcome(TaskStatus::Completed, None);
                Outcome::Done
            }
            Some(TaskEvent::Failed { message }) => {
                self.persist_outcome(TaskStatus::Failed, Some(&message));
                Outcome::Done
            }
            Some(TaskEvent::Cancelled) => {
                debug!(task_id = %self.task_id, "task cancelled, leaving terminal write to canceller");
                Outcome::Done
            }
        }
    }

    /// Persist position events already in the stream, ignoring anything else.
    fn drain(&self, events: &mut TaskEvents) {
        while let Ok(event) = events.try_recv() {
            if let TaskEvent::Position { position } = event {
                self.record_position(position);
            }
        }
    }

    fn record_position(&self, position: Position) {
        match self.store.get_by_id(&self.task_id) {
            Ok(task) if task.is_terminal() => {
                debug!(task_id = %self.task_id, status = %task.status, "ignoring position for finished task");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(task_id = %self.task_id, error = %err, "cannot read task before position update");
                return;
            }
        }
        if let Err(err) =
            self.store
                .update_position(&self.task_id, position, TaskStatus::Running)
        {
            self.log_write_failure(&err);
        } else {
            debug!(task_id = %self.task_id, position = %position, "position recorded");
        }
    }

    fn persist_outcome(&self, status: TaskStatus, error: Option<&str>) {
        match self.store.update_status(&self.task_id, status, error) {
            Ok(()) => info!(task_id = %self.task_id, status = %status, "task finished"),
            Err(err) => self.log_write_failure(&err),
        }
    }

    fn log_write_failure(&self, err: &StoreError) {
        match err {
            StoreError::Terminal { .. } => {
                debug!(task_id = %self.task_id, error = %err, "task already finalized")
            }
            _ => warn!(task_id = %self.task_id, error = %err, "failed to persist task update"),
        }
    }
}
