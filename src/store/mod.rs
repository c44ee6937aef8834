//! Task state store.
//!
//! The store is the only resource shared by every component. It owns the
//! durable task records and hands out detached copies: nothing outside the
//! store ever holds a reference into its map.

mod memory;

pub use memory::InMemoryTaskStore;

use crate::errors::StoreError;
use crate::grid::Position;
use crate::task::{Task, TaskStatus};

/// Concurrent key/value store of task records keyed by task ID.
///
/// Every method is atomic on its own; no transaction spans two calls. Writes
/// to a record that already reached a terminal status are rejected.
pub trait TaskStore: Send + Sync {
    /// Insert a new record, rejecting duplicate IDs.
    fn create(&self, task: Task) -> Result<(), StoreError>;

    fn get_by_id(&self, task_id: &str) -> Result<Task, StoreError>;

    /// Unordered snapshot of every record owned by `robot_id`.
    fn get_by_robot(&self, robot_id: &str) -> Result<Vec<Task>, StoreError>;

    /// Replace an existing record wholesale.
    fn update(&self, task: Task) -> Result<(), StoreError>;

    /// Set the status, and the error message when one is given.
    fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    fn update_position(
        &self,
        task_id: &str,
        position: Position,
        status: TaskStatus,
    ) -> Result<(), StoreError>;
}
