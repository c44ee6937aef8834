use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::TaskStore;
use crate::errors::StoreError;
use crate::grid::Position;
use crate::task::{Task, TaskStatus};

/// In-memory task store guarded by a reader/writer lock.
///
/// State is lost on restart. The lock is held for a single operation only
/// and never across an `.await`.
#[derive(Default)]
pub struct InMemoryTaskStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, Task>,
    next_revision: u64,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    /// Mutable access to a record that may still change.
    fn writable(&mut self, task_id: &str) -> Result<&mut Task, StoreError> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound {
                task_id: task_id.to_string(),
            })?;
        if task.status.is_terminal() {
            return Err(StoreError::Terminal {
                task_id: task_id.to_string(),
                status: task.status,
            });
        }
        Ok(task)
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl TaskStore for InMemoryTaskStore {
    fn create(&self, mut task: Task) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if inner.tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists { task_id: task.id });
        }
        task.revision = inner.bump();
        inner.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    fn get_by_id(&self, task_id: &str) -> Result<Task, StoreError> {
        let inner = self.read()?;
        inner
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    fn get_by_robot(&self, robot_id: &str) -> Result<Vec<Task>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .tasks
            .values()
            .filter(|task| task.robot_id == robot_id)
            .cloned()
            .collect())
    }

    fn update(&self, mut task: Task) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.writable(&task.id)?;
        task.updated_at = Utc::now();
        task.revision = inner.bump();
        inner.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let revision = inner.bump();
        let task = inner.writable(task_id)?;
        task.status = status;
        if let Some(message) = error {
            task.error = Some(message.to_string());
        }
        task.updated_at = Utc::now();
        task.revision = revision;
        Ok(())
    }

    fn update_position(
        &self,
        task_id: &str,
        position: Position,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let revision = inner.bump();
        let task = inner.writable(task_id)?;
        task.current_position = Some(position);
        task.status = status;
        task.updated_at = Utc::now();
        task.revision = revision;
        Ok(())
    }
}
