//! Task orchestration: the create/cancel/retrieve use cases.
//!
//! The orchestrator enforces at most one active task per robot, derives
//! each new task's start position from the robot's task history, and runs
//! the bounded retry protocol for cancellation.

mod retry;

pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::config::WarehouseConfig;
use crate::errors::{ExecutorError, StoreError, TaskError};
use crate::executor::{Fleet, RobotExecutor, Submission};
use crate::grid::{Grid, Position};
use crate::monitor::TaskMonitor;
use crate::plan::{Plan, simulate};
use crate::store::{InMemoryTaskStore, TaskStore};
use crate::task::{RobotId, Task, TaskSnapshot, TaskStatus};

/// Error message recorded on tasks cancelled through [`TaskOrchestrator::cancel_task`].
pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Error recorded on tasks accepted after the monitor shut down.
pub const MONITOR_UNAVAILABLE: &str = "task monitor is shut down";

/// A robot and its live position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotSnapshot {
    pub robot_id: RobotId,
    pub position: Position,
}

pub struct TaskOrchestrator {
    fleet: Fleet,
    store: Arc<dyn TaskStore>,
    monitor: TaskMonitor,
    grid: Grid,
    retry: RetryPolicy,
    admission: Mutex<HashMap<RobotId, Arc<AsyncMutex<()>>>>,
}

impl TaskOrchestrator {
    pub fn new(fleet: Fleet, store: Arc<dyn TaskStore>, monitor: TaskMonitor, grid: Grid) -> Self {
        Self {
            fleet,
            store,
            monitor,
            grid,
            retry: RetryPolicy::default(),
            admission: Mutex::new(HashMap::new()),
        }
    }

    /// Wire a simulated fleet, an in-memory store and a monitor from config.
    ///
    /// Spawns the robot workers, so it must run inside a tokio runtime.
    pub fn from_config(config: &WarehouseConfig) -> Self {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let fleet = Fleet::simulated(config.fleet.robots, config.executor_config());
        let monitor = TaskMonitor::new(Arc::clone(&store), config.monitor_config());
        Self::new(fleet, store, monitor, config.grid()).with_retry_policy(config.retry_policy())
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    /// Validate `commands` and queue them on `robot_id`.
    ///
    /// The plan is checked from the position the robot will hold when the
    /// task starts: the last known position of its most recently finished
    /// task, or the origin.
    pub async fn create_task(
        &self,
        robot_id: &str,
        commands: &str,
    ) -> Result<TaskSnapshot, TaskError> {
        let robot = self.resolve(robot_id)?;
        let robot_id = robot.id().to_string();

        let lock = self.admission_lock(&robot_id)?;
        let _admitted = lock.lock().await;

        let tasks = self.store.get_by_robot(&robot_id)?;
        if let Some(active) = tasks.iter().find(|task| task.status.is_active()) {
            info!(robot_id = %robot_id, active_task = %active.id, "robot busy, rejecting task");
            return Err(TaskError::TaskQueueFull { robot_id });
        }

        let start = resume_position(&tasks);
        let plan = Plan::parse_non_empty(commands)?;
        let end = simulate(self.grid, start, &plan)?;

        let Submission { task_id, events } =
            robot.submit(plan.clone()).await.map_err(|err| match err {
                ExecutorError::QueueFull { .. } => TaskError::TaskQueueFull {
                    robot_id: robot_id.clone(),
                },
                other => TaskError::Internal(other.to_string()),
            })?;

        let task = Task::pending(task_id.clone(), robot_id.clone(), &plan);
        let snapshot = TaskSnapshot::from(&task);
        let persisted = self.store.create(task);

        // The robot already accepted the plan, so its events are mirrored
        // even if the record could not be written.
        let watching = self.monitor.watch(task_id.clone(), events);

        if let Err(err) = persisted {
            error!(task_id = %task_id, robot_id = %robot_id, error = %err, "failed to persist new task");
            return Err(TaskError::Internal(err.to_string()));
        }

        if !watching {
            error!(task_id = %task_id, robot_id = %robot_id, "task monitor unavailable, abandoning task");
            if let Err(err) = robot.cancel(&task_id).await {
                warn!(task_id = %task_id, error = %err, "failed to withdraw unmonitored task");
            }
            if let Err(err) =
                self.store
                    .update_status(&task_id, TaskStatus::Failed, Some(MONITOR_UNAVAILABLE))
            {
                warn!(task_id = %task_id, error = %err, "failed to record unmonitored task");
            }
            return Err(TaskError::Internal(MONITOR_UNAVAILABLE.to_string()));
        }

        info!(
            task_id = %task_id,
            robot_id = %robot_id,
            commands = %plan,
            from = %start,
            to = %end,
            "task created"
        );
        Ok(snapshot)
    }

    /// Cancel a pending or running task.
    ///
    /// On success the task is `Cancelled`. If every attempt is rejected the
    /// record is left untouched and `CancelFailed` is returned.
    pub async fn cancel_task(&self, task_id: &str) -> Result<(), TaskError> {
        let task = self.store.get_by_id(task_id)?;
        if task.is_terminal() {
            return Err(TaskError::TaskAlreadyTerminal {
                task_id: task.id,
            });
        }
        let robot = self.resolve(&task.robot_id)?;

        let mut attempt = 0;
        loop {
            match robot.cancel(task_id).await {
                Ok(()) => break,
                Err(err) if !err.is_retryable() => {
                    return Err(match err {
                        ExecutorError::AlreadyTerminal { .. } => TaskError::TaskAlreadyTerminal {
                            task_id: task_id.to_string(),
                        },
                        ExecutorError::NotFound { .. } => TaskError::TaskNotFound {
                            task_id: task_id.to_string(),
                        },
                        other => TaskError::Internal(other.to_string()),
                    });
                }
                Err(err) => {
                    warn!(task_id, attempt = attempt + 1, error = %err, "cancel attempt failed");
                    if !self.retry.has_next(attempt) {
                        return Err(TaskError::CancelFailed {
                            task_id: task_id.to_string(),
                            attempts: attempt + 1,
                            source: err,
                        });
                    }
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }

        if !self.monitor.stop(task_id).await {
            info!(task_id, "no watcher left for cancelled task");
        }
        match self
            .store
            .update_status(task_id, TaskStatus::Cancelled, Some(CANCELLED_BY_USER))
        {
            Ok(()) => {}
            Err(StoreError::Terminal { status, .. }) => {
                warn!(task_id, status = %status, "task finished before cancellation was recorded");
            }
            Err(err) => return Err(err.into()),
        }

        info!(task_id, robot_id = %task.robot_id, "task cancelled");
        Ok(())
    }

    pub fn retrieve_task(&self, task_id: &str) -> Result<TaskSnapshot, TaskError> {
        Ok(TaskSnapshot::from(self.store.get_by_id(task_id)?))
    }

    /// Every task of `robot_id`, oldest first.
    pub fn list_robot_tasks(&self, robot_id: &str) -> Result<Vec<TaskSnapshot>, TaskError> {
        let robot = self.resolve(robot_id)?;
        let mut tasks = self.store.get_by_robot(robot.id())?;
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| task_number(&a.id).cmp(&task_number(&b.id)))
        });
        Ok(tasks.into_iter().map(TaskSnapshot::from).collect())
    }

    /// IDs and live positions of the whole fleet.
    pub async fn robots(&self) -> Result<Vec<RobotSnapshot>, TaskError> {
        let mut robots = Vec::with_capacity(self.fleet.len());
        for robot in self.fleet.robots() {
            let position = robot
                .position()
                .await
                .map_err(|err| TaskError::Internal(err.to_string()))?;
            robots.push(RobotSnapshot {
                robot_id: robot.id().to_string(),
                position,
            });
        }
        Ok(robots)
    }

    /// Drain every watcher, then stop the robots.
    pub async fn shutdown(&self) {
        self.monitor.shutdown().await;
        self.fleet.shutdown().await;
    }

    fn resolve(&self, robot_id: &str) -> Result<Arc<dyn RobotExecutor>, TaskError> {
        self.fleet
            .resolve(robot_id)
            .ok_or_else(|| TaskError::RobotNotFound {
                robot_id: robot_id.to_string(),
            })
    }

    fn admission_lock(&self, robot_id: &str) -> Result<Arc<AsyncMutex<()>>, TaskError> {
        let mut locks = self
            .admission
            .lock()
            .map_err(|_| TaskError::Internal("admission lock poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(robot_id.to_string()).or_default()))
    }
}

/// Last known position of the most recently finished task, or the origin.
fn resume_position(tasks: &[Task]) -> Position {
    tasks
        .iter()
        .filter(|task| task.is_terminal())
        .filter_map(|task| {
            task.current_position
                .map(|position| ((task.updated_at, task.revision), position))
        })
        .max_by_key(|(order, _)| *order)
        .map(|(_, position)| position)
        .unwrap_or_else(Position::origin)
}

/// Sequence number of an executor-issued ID such as `task_0_12`.
fn task_number(task_id: &str) -> u64 {
    task_id
        .rsplit('_')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorConfig, TaskEvent, TaskEvents};
    use crate::monitor::MonitorConfig;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinSet;
    use tokio::time::Instant;

    const STEP: Duration = Duration::from_secs(2);

    fn simulated(grid: Grid, robots: usize) -> (TaskOrchestrator, Arc<InMemoryTaskStore>) {
        let store = Arc::new(InMemoryTaskStore::new());
        let fleet = Fleet::simulated(
            robots,
            ExecutorConfig {
                grid,
                capacity: 5,
                step_delay: STEP,
            },
        );
        let monitor = TaskMonitor::new(store.clone(), MonitorConfig::default());
        (TaskOrchestrator::new(fleet, store.clone(), monitor, grid), store)
    }

    fn with_robot(robot: Arc<dyn RobotExecutor>) -> (TaskOrchestrator, Arc<InMemoryTaskStore>) {
        let store = Arc::new(InMemoryTaskStore::new());
        let monitor = TaskMonitor::new(store.clone(), MonitorConfig::default());
        let orchestrator =
            TaskOrchestrator::new(Fleet::new(vec![robot]), store.clone(), monitor, Grid::default());
        (orchestrator, store)
    }

    async fn wait_until_finished(orchestrator: &TaskOrchestrator, task_id: &str) -> TaskSnapshot {
        loop {
            let snapshot = orchestrator.retrieve_task(task_id).unwrap();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Robot that accepts plans, never runs them, and rejects cancel
    /// requests a configurable number of times.
    struct StubbornRobot {
        rejections: u32,
        terminal: bool,
        calls: std::sync::Mutex<Vec<Instant>>,
        issued: AtomicU32,
        streams: std::sync::Mutex<Vec<mpsc::UnboundedSender<TaskEvent>>>,
    }

    impl StubbornRobot {
        fn rejecting(rejections: u32) -> Arc<Self> {
            Arc::new(Self {
                rejections,
                terminal: false,
                calls: Default::default(),
                issued: AtomicU32::new(0),
                streams: Default::default(),
            })
        }

        fn finished() -> Arc<Self> {
            Arc::new(Self {
                rejections: 0,
                terminal: true,
                calls: Default::default(),
                issued: AtomicU32::new(0),
                streams: Default::default(),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RobotExecutor for StubbornRobot {
        fn id(&self) -> &str {
            "0"
        }

        async fn submit(&self, _plan: Plan) -> Result<Submission, ExecutorError> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            let (tx, events): (_, TaskEvents) = mpsc::unbounded_channel();
            self.streams.lock().unwrap().push(tx);
            Ok(Submission {
                task_id: format!("task_0_{n}"),
                events,
            })
        }

        async fn cancel(&self, task_id: &str) -> Result<(), ExecutorError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Instant::now());
            if self.terminal {
                return Err(ExecutorError::AlreadyTerminal {
                    task_id: task_id.to_string(),
                });
            }
            if calls.len() as u32 <= self.rejections {
                return Err(ExecutorError::Rejected("robot busy".into()));
            }
            Ok(())
        }

        async fn position(&self) -> Result<Position, ExecutorError> {
            Ok(Position::origin())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn nnnn_completes_at_the_top_row() {
        let (orchestrator, _store) = simulated(Grid::new(10, 5), 1);

        let created = orchestrator.create_task("0", "NNNN").await.unwrap();
        assert_eq!(created.status, TaskStatus::Pending);
        assert_eq!(created.task_id, "task_0_1");
        assert!(created.current_state.is_none());

        let finished = wait_until_finished(&orchestrator, &created.task_id).await;
        assert_eq!(finished.status, TaskStatus::Completed);
        assert_eq!(finished.current_state, Some(Position::new(0, 4, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_violation_creates_no_record() {
        let (orchestrator, store) = simulated(Grid::default(), 1);

        let err = orchestrator.create_task("0", "S").await.unwrap_err();
        assert!(matches!(err, TaskError::Boundary(_)));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_or_empty_commands_are_validation_errors() {
        let (orchestrator, store) = simulated(Grid::default(), 1);

        let err = orchestrator.create_task("0", "NXN").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let err = orchestrator.create_task("0", "  ").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_robot_is_rejected() {
        let (orchestrator, _store) = simulated(Grid::default(), 2);
        for id in ["2", "robot-1", "-1", ""] {
            let err = orchestrator.create_task(id, "N").await.unwrap_err();
            assert!(matches!(err, TaskError::RobotNotFound { .. }), "{id}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_task_while_first_is_active_is_rejected() {
        let (orchestrator, _store) = simulated(Grid::default(), 1);

        orchestrator.create_task("0", "NN").await.unwrap();
        let err = orchestrator.create_task("0", "SS").await.unwrap_err();
        assert!(matches!(err, TaskError::TaskQueueFull { ref robot_id } if robot_id == "0"));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn robots_are_admitted_independently() {
        let (orchestrator, _store) = simulated(Grid::default(), 2);
        orchestrator.create_task("0", "NN").await.unwrap();
        let other = orchestrator.create_task("1", "EE").await.unwrap();
        assert_eq!(other.task_id, "task_1_1");
    }

    #[tokio::test(start_paused = true)]
    async fn lenient_robot_ids_share_the_canonical_admission() {
        let (orchestrator, _store) = simulated(Grid::default(), 1);
        let created = orchestrator.create_task("+0", "N").await.unwrap();
        assert_eq!(created.robot_id, "0");
        assert!(matches!(
            orchestrator.create_task("0", "E").await,
            Err(TaskError::TaskQueueFull { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_creates_admit_exactly_one() {
        let (orchestrator, _store) = simulated(Grid::default(), 1);
        let orchestrator = Arc::new(orchestrator);

        let mut set = JoinSet::new();
        for _ in 0..10 {
            let orchestrator = Arc::clone(&orchestrator);
            set.spawn(async move { orchestrator.create_task("0", "N").await });
        }

        let mut admitted = 0;
        let mut rejected = 0;
        while let Some(result) = set.join_next().await {
            match result.unwrap() {
                Ok(_) => admitted += 1,
                Err(TaskError::TaskQueueFull { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!((admitted, rejected), (1, 9));
    }

    #[tokio::test(start_paused = true)]
    async fn next_task_starts_where_the_last_one_ended() {
        let (orchestrator, _store) = simulated(Grid::new(10, 5), 1);

        let first = orchestrator.create_task("0", "NNNN").await.unwrap();
        wait_until_finished(&orchestrator, &first.task_id).await;

        // Valid from the origin but not from (0, 4).
        let err = orchestrator.create_task("0", "N").await.unwrap_err();
        assert!(matches!(err, TaskError::Boundary(_)));

        let second = orchestrator.create_task("0", "SE").await.unwrap();
        let finished = wait_until_finished(&orchestrator, &second.task_id).await;
        assert_eq!(finished.current_state, Some(Position::new(1, 3, false)));
    }

    #[test]
    fn resume_position_prefers_latest_finished_task() {
        let plan = Plan::parse("N").unwrap();
        let now = Utc::now();

        let mut older = Task::pending("task_0_1", "0", &plan);
        older.status = TaskStatus::Completed;
        older.current_position = Some(Position::new(1, 1, false));
        older.updated_at = now - ChronoDuration::seconds(10);

        let mut newer = Task::pending("task_0_2", "0", &plan);
        newer.status = TaskStatus::Failed;
        newer.current_position = Some(Position::new(2, 2, false));
        newer.updated_at = now;

        let mut positionless = Task::pending("task_0_3", "0", &plan);
        positionless.status = TaskStatus::Cancelled;
        positionless.updated_at = now + ChronoDuration::seconds(10);

        let mut active = Task::pending("task_0_4", "0", &plan);
        active.status = TaskStatus::Running;
        active.current_position = Some(Position::new(3, 3, false));
        active.updated_at = now + ChronoDuration::seconds(20);

        let tasks = vec![older.clone(), newer.clone(), positionless, active];
        assert_eq!(resume_position(&tasks), Position::new(2, 2, false));

        // Equal timestamps fall back to the store revision.
        older.updated_at = now;
        older.revision = 9;
        newer.revision = 3;
        assert_eq!(resume_position(&[newer, older]), Position::new(1, 1, false));

        assert_eq!(resume_position(&[]), Position::origin());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unknown_task_is_not_found() {
        let (orchestrator, _store) = simulated(Grid::default(), 1);
        let err = orchestrator.cancel_task("task_0_42").await.unwrap_err();
        assert!(matches!(err, TaskError::TaskNotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_completed_task_is_rejected_without_mutation() {
        let (orchestrator, _store) = simulated(Grid::default(), 1);
        let created = orchestrator.create_task("0", "E").await.unwrap();
        let before = wait_until_finished(&orchestrator, &created.task_id).await;

        let err = orchestrator.cancel_task(&created.task_id).await.unwrap_err();
        assert!(matches!(err, TaskError::TaskAlreadyTerminal { .. }));
        assert_eq!(orchestrator.retrieve_task(&created.task_id).unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_running_task_records_partial_progress() {
        let (orchestrator, _store) = simulated(Grid::default(), 1);
        let created = orchestrator.create_task("0", "NNNN").await.unwrap();

        tokio::time::sleep(STEP + STEP / 2).await;
        orchestrator.cancel_task(&created.task_id).await.unwrap();

        let cancelled = orchestrator.retrieve_task(&created.task_id).unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert_eq!(cancelled.error.as_deref(), Some(CANCELLED_BY_USER));
        assert_eq!(cancelled.current_state, Some(Position::new(0, 1, false)));

        // Nothing moves a cancelled task afterwards.
        tokio::time::sleep(STEP * 4).await;
        assert_eq!(orchestrator.retrieve_task(&created.task_id).unwrap(), cancelled);

        let next = orchestrator.create_task("0", "E").await.unwrap();
        let finished = wait_until_finished(&orchestrator, &next.task_id).await;
        assert_eq!(finished.current_state, Some(Position::new(1, 1, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_gives_up_after_three_attempts_with_doubling_delays() {
        let robot = StubbornRobot::rejecting(u32::MAX);
        let (orchestrator, _store) = with_robot(robot.clone());
        let created = orchestrator.create_task("0", "N").await.unwrap();

        let err = orchestrator.cancel_task(&created.task_id).await.unwrap_err();
        match err {
            TaskError::CancelFailed {
                ref task_id,
                attempts,
                ref source,
            } => {
                assert_eq!(task_id, &created.task_id);
                assert_eq!(attempts, 3);
                assert_eq!(source, &ExecutorError::Rejected("robot busy".into()));
            }
            other => panic!("expected CancelFailed, got {other:?}"),
        }

        let calls = robot.calls();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert!(first_gap >= Duration::from_millis(100));
        assert!(second_gap >= Duration::from_millis(200));
        assert!(second_gap > first_gap);

        assert_eq!(
            orchestrator.retrieve_task(&created.task_id).unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_succeeds_on_a_later_attempt() {
        let robot = StubbornRobot::rejecting(1);
        let (orchestrator, _store) = with_robot(robot.clone());
        let created = orchestrator.create_task("0", "N").await.unwrap();

        orchestrator.cancel_task(&created.task_id).await.unwrap();
        assert_eq!(robot.calls().len(), 2);

        let snapshot = orchestrator.retrieve_task(&created.task_id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Cancelled);
        assert_eq!(snapshot.error.as_deref(), Some(CANCELLED_BY_USER));
    }

    #[tokio::test(start_paused = true)]
    async fn executor_reporting_finished_task_is_not_retried() {
        let robot = StubbornRobot::finished();
        let (orchestrator, _store) = with_robot(robot.clone());
        let created = orchestrator.create_task("0", "N").await.unwrap();

        let err = orchestrator.cancel_task(&created.task_id).await.unwrap_err();
        assert!(matches!(err, TaskError::TaskAlreadyTerminal { .. }));
        assert_eq!(robot.calls().len(), 1);
    }

    /// Store whose inserts always collide; every other call is delegated.
    #[derive(Default)]
    struct CollidingStore {
        inner: InMemoryTaskStore,
    }

    impl TaskStore for CollidingStore {
        fn create(&self, task: Task) -> Result<(), StoreError> {
            Err(StoreError::AlreadyExists { task_id: task.id })
        }

        fn get_by_id(&self, task_id: &str) -> Result<Task, StoreError> {
            self.inner.get_by_id(task_id)
        }

        fn get_by_robot(&self, robot_id: &str) -> Result<Vec<Task>, StoreError> {
            self.inner.get_by_robot(robot_id)
        }

        fn update(&self, task: Task) -> Result<(), StoreError> {
            self.inner.update(task)
        }

        fn update_status(
            &self,
            task_id: &str,
            status: TaskStatus,
            error: Option<&str>,
        ) -> Result<(), StoreError> {
            self.inner.update_status(task_id, status, error)
        }

        fn update_position(
            &self,
            task_id: &str,
            position: Position,
            status: TaskStatus,
        ) -> Result<(), StoreError> {
            self.inner.update_position(task_id, position, status)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_insert_still_watches_the_accepted_task() {
        let store: Arc<dyn TaskStore> = Arc::new(CollidingStore::default());
        let monitor = TaskMonitor::new(Arc::clone(&store), MonitorConfig::default());
        let robot: Arc<dyn RobotExecutor> = StubbornRobot::rejecting(0);
        let orchestrator = TaskOrchestrator::new(
            Fleet::new(vec![robot]),
            store,
            monitor,
            Grid::default(),
        );

        let err = orchestrator.create_task("0", "N").await.unwrap_err();
        assert!(matches!(err, TaskError::Internal(_)), "{err:?}");
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(orchestrator.monitor.is_watching("task_0_1"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_without_a_watcher_still_records_cancellation() {
        let robot = StubbornRobot::rejecting(0);
        let (orchestrator, store) = with_robot(robot.clone());
        let created = orchestrator.create_task("0", "N").await.unwrap();

        assert!(orchestrator.monitor.stop(&created.task_id).await);
        assert!(!orchestrator.monitor.is_watching(&created.task_id));

        orchestrator.cancel_task(&created.task_id).await.unwrap();
        assert_eq!(robot.calls().len(), 1);

        let task = store.get_by_id(&created.task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.error.as_deref(), Some(CANCELLED_BY_USER));
    }

    #[tokio::test(start_paused = true)]
    async fn create_after_monitor_shutdown_is_internal_and_not_left_pending() {
        let (orchestrator, store) = simulated(Grid::default(), 1);
        orchestrator.monitor.shutdown().await;

        let err = orchestrator.create_task("0", "N").await.unwrap_err();
        assert!(matches!(err, TaskError::Internal(ref msg) if msg == MONITOR_UNAVAILABLE));

        let task = store.get_by_id("task_0_1").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some(MONITOR_UNAVAILABLE));

        // The abandoned task does not block the robot.
        tokio::time::sleep(STEP * 2).await;
        assert_eq!(
            orchestrator.robots().await.unwrap()[0].position,
            Position::origin()
        );
        assert!(!matches!(
            orchestrator.create_task("0", "E").await,
            Err(TaskError::TaskQueueFull { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_executor_errors_are_not_retried() {
        #[derive(Default)]
        struct FullRobot {
            streams: std::sync::Mutex<Vec<mpsc::UnboundedSender<TaskEvent>>>,
        }

        #[async_trait]
        impl RobotExecutor for FullRobot {
            fn id(&self) -> &str {
                "0"
            }

            async fn submit(&self, _plan: Plan) -> Result<Submission, ExecutorError> {
                let (tx, events) = mpsc::unbounded_channel();
                self.streams.lock().unwrap().push(tx);
                Ok(Submission {
                    task_id: "task_0_1".into(),
                    events,
                })
            }

            async fn cancel(&self, _task_id: &str) -> Result<(), ExecutorError> {
                Err(ExecutorError::QueueFull { capacity: 5 })
            }

            async fn position(&self) -> Result<Position, ExecutorError> {
                Ok(Position::origin())
            }
        }

        let (orchestrator, _store) = with_robot(Arc::new(FullRobot::default()));
        let created = orchestrator.create_task("0", "N").await.unwrap();
        let started = Instant::now();

        let err = orchestrator.cancel_task(&created.task_id).await.unwrap_err();
        assert!(matches!(err, TaskError::Internal(_)), "{err:?}");
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn list_and_fleet_views() {
        let (orchestrator, _store) = simulated(Grid::default(), 2);

        let first = orchestrator.create_task("1", "E").await.unwrap();
        wait_until_finished(&orchestrator, &first.task_id).await;
        let second = orchestrator.create_task("1", "N").await.unwrap();
        wait_until_finished(&orchestrator, &second.task_id).await;

        let ids: Vec<_> = orchestrator
            .list_robot_tasks("1")
            .unwrap()
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        assert_eq!(ids, vec!["task_1_1", "task_1_2"]);
        assert!(orchestrator.list_robot_tasks("0").unwrap().is_empty());
        assert!(matches!(
            orchestrator.list_robot_tasks("9"),
            Err(TaskError::RobotNotFound { .. })
        ));

        let robots = orchestrator.robots().await.unwrap();
        assert_eq!(
            robots,
            vec![
                RobotSnapshot {
                    robot_id: "0".into(),
                    position: Position::origin()
                },
                RobotSnapshot {
                    robot_id: "1".into(),
                    position: Position::new(1, 1, false)
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retrieve_is_read_only() {
        let (orchestrator, store) = simulated(Grid::default(), 1);
        let created = orchestrator.create_task("0", "N").await.unwrap();
        let finished = wait_until_finished(&orchestrator, &created.task_id).await;

        let revision = store.get_by_id(&created.task_id).unwrap().revision;
        for _ in 0..3 {
            assert_eq!(orchestrator.retrieve_task(&created.task_id).unwrap(), finished);
        }
        assert_eq!(store.get_by_id(&created.task_id).unwrap().revision, revision);
        assert!(matches!(
            orchestrator.retrieve_task("task_0_99"),
            Err(TaskError::TaskNotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_watchers() {
        let (orchestrator, _store) = simulated(Grid::default(), 1);
        orchestrator.create_task("0", "NNN").await.unwrap();
        orchestrator.shutdown().await;
        assert!(orchestrator.robots().await.is_err());
    }

    #[test]
    fn task_numbers_order_numerically() {
        assert!(task_number("task_0_2") < task_number("task_0_10"));
        assert_eq!(task_number("bogus"), u64::MAX);
    }
}
