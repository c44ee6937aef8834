use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RobotId, Task, TaskId, TaskStatus};
use crate::grid::Position;

/// Public view of a task, as returned to callers of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub robot_id: RobotId,
    pub commands: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            robot_id: task.robot_id.clone(),
            commands: task.commands.clone(),
            status: task.status,
            current_state: task.current_position,
            error: task.error.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

impl From<Task> for TaskSnapshot {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            robot_id: task.robot_id,
            commands: task.commands,
            status: task.status,
            current_state: task.current_position,
            error: task.error,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}
