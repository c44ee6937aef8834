//! Task records and their lifecycle status.

mod snapshot;

pub use snapshot::TaskSnapshot;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::Position;
use crate::plan::Plan;

/// Executor-assigned task identifier, e.g. `task_0_3`.
pub type TaskId = String;
/// Robot identifier: the decimal index into the fleet, e.g. `"0"`.
pub type RobotId = String;

/// Lifecycle status of a task.
///
/// `Pending → Running → {Completed, Failed, Cancelled}`; `Running` may be
/// skipped. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Pending or running.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` follows the transition graph.
    ///
    /// Re-asserting `Running` (a further position update) is allowed.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Pending) => false,
            (Self::Pending, _) => true,
            (Self::Running, Self::Pending) => false,
            (Self::Running, _) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// A durable task record as held by the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub robot_id: RobotId,
    /// Normalized plan, e.g. `NNEE`.
    pub commands: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Store-assigned write sequence number; breaks `updated_at` ties.
    #[serde(default)]
    pub revision: u64,
}

impl Task {
    /// A freshly submitted task with no position yet.
    pub fn pending(id: impl Into<TaskId>, robot_id: impl Into<RobotId>, plan: &Plan) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            robot_id: robot_id.into(),
            commands: plan.to_string(),
            status: TaskStatus::Pending,
            current_position: None,
            error: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
