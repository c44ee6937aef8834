//! Typed error hierarchy for the task lifecycle engine.
//!
//! One enum per layer:
//! - `PlanError`: command parsing and boundary validation
//! - `ExecutorError`: per-robot queue executor failures
//! - `StoreError`: task state store failures
//! - `TaskError`: the closed taxonomy surfaced by the orchestrator
//!
//! Callers match on variants; no error is ever classified by its message.

use thiserror::Error;

use crate::grid::Position;
use crate::task::TaskStatus;

/// Errors from parsing or simulating a command plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("commands cannot be empty")]
    Empty,

    #[error(
        "invalid command character '{command}' at position {position}. Only N, S, E, W are allowed"
    )]
    InvalidCommand { command: char, position: usize },

    #[error("start position {start} is outside the {width}x{height} grid")]
    InvalidStart {
        start: Position,
        width: u32,
        height: u32,
    },

    #[error(
        "command '{command}' at step {step} would move the robot out of bounds: {from} -> ({x}, {y}) on a {width}x{height} grid"
    )]
    OutOfBounds {
        step: usize,
        command: char,
        from: Position,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },
}

impl PlanError {
    /// Whether this error is a boundary violation rather than malformed input.
    pub fn is_boundary(&self) -> bool {
        matches!(self, Self::InvalidStart { .. } | Self::OutOfBounds { .. })
    }
}

/// Errors from a robot's task queue executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("task queue is full: maximum {capacity} tasks allowed per robot")]
    QueueFull { capacity: usize },

    #[error("task {task_id} is not known to this robot")]
    NotFound { task_id: String },

    #[error("task {task_id} has already finished")]
    AlreadyTerminal { task_id: String },

    #[error("robot executor has stopped")]
    Stopped,

    #[error("robot rejected the request: {0}")]
    Rejected(String),
}

impl ExecutorError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Stopped | Self::Rejected(_))
    }
}

/// Errors from the task state store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("task {task_id} already exists")]
    AlreadyExists { task_id: String },

    #[error("task {task_id} not found")]
    NotFound { task_id: String },

    #[error("task {task_id} is already {status} and can no longer change")]
    Terminal { task_id: String, status: TaskStatus },

    #[error("task store lock poisoned")]
    LockPoisoned,
}

/// Errors surfaced by the task orchestrator to its callers.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Validation(PlanError),

    #[error(transparent)]
    Boundary(PlanError),

    #[error("robot {robot_id} not found")]
    RobotNotFound { robot_id: String },

    #[error("task {task_id} not found")]
    TaskNotFound { task_id: String },

    #[error("robot {robot_id} cannot accept another task right now")]
    TaskQueueFull { robot_id: String },

    #[error("task {task_id} has already finished and cannot be cancelled")]
    TaskAlreadyTerminal { task_id: String },

    #[error("failed to cancel task {task_id} after {attempts} attempts: {source}")]
    CancelFailed {
        task_id: String,
        attempts: u32,
        #[source]
        source: ExecutorError,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Boundary(_) => "BOUNDARY_ERROR",
            Self::RobotNotFound { .. } => "ROBOT_NOT_FOUND",
            Self::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Self::TaskQueueFull { .. } => "TASK_QUEUE_FULL",
            Self::TaskAlreadyTerminal { .. } => "TASK_ALREADY_TERMINAL",
            Self::CancelFailed { .. } => "SDK_CANCEL_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may sensibly repeat the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TaskQueueFull { .. } | Self::CancelFailed { .. })
    }
}

impl From<PlanError> for TaskError {
    fn from(err: PlanError) -> Self {
        if err.is_boundary() {
            Self::Boundary(err)
        } else {
            Self::Validation(err)
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { task_id } => Self::TaskNotFound { task_id },
            StoreError::Terminal { task_id, .. } => Self::TaskAlreadyTerminal { task_id },
            other @ (StoreError::AlreadyExists { .. } | StoreError::LockPoisoned) => {
                Self::Internal(other.to_string())
            }
        }
    }
}
