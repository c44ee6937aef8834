//! Per-robot task queue executors.
//!
//! Each robot owns a FIFO of accepted plans and runs them one at a time,
//! publishing an ordered [`TaskEvent`] stream per task. The
//! [`RobotExecutor`] trait is the driver seam: [`SimulatedRobot`] walks the
//! grid with a fixed per-step delay instead of talking to hardware.

mod fleet;
mod simulated;

pub use fleet::Fleet;
pub use simulated::SimulatedRobot;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::errors::ExecutorError;
use crate::grid::{Grid, Position};
use crate::plan::Plan;
use crate::task::TaskId;

/// Events published while a task executes.
///
/// A stream carries zero or more `Position` events followed by exactly one
/// terminal event, after which it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// The robot's position after a step. The first one is the start snapshot.
    Position { position: Position },
    /// Every directive was applied.
    Completed,
    /// Execution stopped on an error.
    Failed { message: String },
    /// The task was cancelled before finishing.
    Cancelled,
}

/// Receiving half of a task's event stream.
pub type TaskEvents = mpsc::UnboundedReceiver<TaskEvent>;

/// An accepted plan: its ID and the stream of its execution events.
#[derive(Debug)]
pub struct Submission {
    pub task_id: TaskId,
    pub events: TaskEvents,
}

/// Settings shared by every simulated robot.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub grid: Grid,
    /// Maximum tasks held per robot, counting the one in flight.
    pub capacity: usize,
    /// Simulated travel time of a single step.
    pub step_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            grid: Grid::default(),
            capacity: 5,
            step_delay: Duration::from_secs(2),
        }
    }
}

/// Horizon used when a delay is too large to represent as a deadline.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `delay` from now, clamped to a far-future deadline instead of overflowing.
pub(crate) fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Driver interface of a single robot's task queue.
#[async_trait]
pub trait RobotExecutor: Send + Sync {
    /// Robot identifier, unique within the fleet.
    fn id(&self) -> &str;

    /// Enqueue a plan. Fails with `QueueFull` without touching the queue
    /// when the robot already holds `capacity` tasks.
    async fn submit(&self, plan: Plan) -> Result<Submission, ExecutorError>;

    /// Cancel a queued or running task.
    async fn cancel(&self, task_id: &str) -> Result<(), ExecutorError>;

    /// Live position of the robot.
    async fn position(&self) -> Result<Position, ExecutorError>;

    /// Stop accepting work and fail whatever is still queued.
    async fn shutdown(&self) {}
}
