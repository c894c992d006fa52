//! Read-only task store seam plus an in-memory implementation

use crate::error::{Result, StoreError};
use crate::types::{IdentityToken, TaskId, TaskRecord};

use std::collections::HashMap;
use std::sync::RwLock;

/// Queries the probe engine runs against persisted tasks
pub trait TaskStore: Send + Sync {
    /// Whether any stored task currently carries `identity`
    fn exists_identity(&self, identity: IdentityToken) -> Result<bool>;

    /// Re-read a task by primary key
    fn read_task(&self, id: TaskId) -> Result<Option<TaskRecord>>;
}

/// Task store backed by a map, used by tests and ad-hoc runs
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl InMemoryTaskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record
    pub fn insert(&self, record: TaskRecord) -> Result<()> {
        let mut tasks = self.tasks.write().map_err(|_| StoreError::LockPoisoned)?;
        tasks.insert(record.id, record);
        Ok(())
    }

    /// Update the running flag; returns false if the task does not exist
    pub fn set_running(&self, id: TaskId, running: bool) -> Result<bool> {
        let mut tasks = self.tasks.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tasks
            .get_mut(&id)
            .map(|record| record.running = running)
            .is_some())
    }

    /// Replace the identity token; returns false if the task does not exist
    pub fn set_identity(&self, id: TaskId, identity: IdentityToken) -> Result<bool> {
        let mut tasks = self.tasks.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tasks
            .get_mut(&id)
            .map(|record| record.identity = identity)
            .is_some())
    }

    /// Remove a task; returns false if it did not exist
    pub fn remove(&self, id: TaskId) -> Result<bool> {
        let mut tasks = self.tasks.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tasks.remove(&id).is_some())
    }

    /// Number of stored tasks
    pub fn len(&self) -> usize {
        self.tasks.read().map(|tasks| tasks.len()).unwrap_or(0)
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskStore for InMemoryTaskStore {
    fn exists_identity(&self, identity: IdentityToken) -> Result<bool> {
        let tasks = self.tasks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tasks.values().any(|record| record.identity == identity))
    }

    fn read_task(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let tasks = self.tasks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tasks.get(&id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store_lifecycle() {
        let store = InMemoryTaskStore::new();
        assert!(store.is_empty());

        store.insert(TaskRecord::new(1, 100, true)).unwrap();
        assert!(store.exists_identity(100).unwrap());
        assert!(!store.exists_identity(101).unwrap());

        assert!(store.set_running(1, false).unwrap());
        assert_eq!(store.read_task(1).unwrap(), Some(TaskRecord::new(1, 100, false)));

        assert!(store.set_identity(1, 200).unwrap());
        assert!(!store.exists_identity(100).unwrap());

        assert!(store.remove(1).unwrap());
        assert_eq!(store.read_task(1).unwrap(), None);
        assert!(!store.set_running(1, true).unwrap());
    }
}
