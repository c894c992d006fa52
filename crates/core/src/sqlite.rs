//! SQLite-backed task store

use crate::error::{Result, StoreError};
use crate::identity::IdentityGenerator;
use crate::store::TaskStore;
use crate::types::{AccessType, IdentityToken, NetworkTask, NewTask, TaskId, TaskRecord};

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS network_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    schedule_id INTEGER NOT NULL,
    access_type TEXT NOT NULL,
    address TEXT NOT NULL,
    port INTEGER NOT NULL DEFAULT 0,
    interval_minutes INTEGER NOT NULL DEFAULT 15,
    running INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_network_tasks_schedule_id ON network_tasks (schedule_id);
";

/// Task store persisting to a SQLite database
#[derive(Debug)]
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
    generator: IdentityGenerator,
    retry_budget: u32,
}

impl SqliteTaskStore {
    /// Open (and migrate) a database file
    pub fn open<P: AsRef<Path>>(path: P, retry_budget: u32) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!("Opened task store at {}", path.as_ref().display());
        Self::with_connection(conn, retry_budget)
    }

    /// Open a private in-memory database
    pub fn open_in_memory(retry_budget: u32) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, retry_budget)
    }

    fn with_connection(conn: Connection, retry_budget: u32) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            generator: IdentityGenerator::new(),
            retry_budget,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock().map_err(|_| StoreError::LockPoisoned)?)
    }

    /// Insert a task, assigning a unique identity in the same transaction
    pub fn insert_task(&self, task: &NewTask) -> Result<NetworkTask> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let identity = self
            .generator
            .generate_unique(|token| identity_in_use(&tx, token), self.retry_budget)?;

        tx.execute(
            "INSERT INTO network_tasks (schedule_id, access_type, address, port, interval_minutes, running)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                identity,
                task.access_type.as_str(),
                task.address,
                task.port,
                task.interval_minutes,
                task.running,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!("Inserted task {} with identity {}", id, identity);
        Ok(NetworkTask {
            id,
            identity,
            access_type: task.access_type,
            address: task.address.clone(),
            port: task.port,
            interval_minutes: task.interval_minutes,
            running: task.running,
        })
    }

    /// Give a task a fresh identity and mark it running
    pub fn reschedule(&self, id: TaskId) -> Result<IdentityToken> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let identity = self
            .generator
            .generate_unique(|token| identity_in_use(&tx, token), self.retry_budget)?;

        let updated = tx.execute(
            "UPDATE network_tasks SET schedule_id = ?1, running = 1 WHERE id = ?2",
            params![identity, id],
        )?;
        if updated == 0 {
            return Err(StoreError::TaskNotFound { id }.into());
        }
        tx.commit()?;

        debug!("Rescheduled task {} with identity {}", id, identity);
        Ok(identity)
    }

    /// Mark a task as stopped
    pub fn stop(&self, id: TaskId) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE network_tasks SET running = 0 WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            return Err(StoreError::TaskNotFound { id }.into());
        }
        Ok(())
    }

    /// Delete a task; returns false if it did not exist
    pub fn delete(&self, id: TaskId) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM network_tasks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Load a full task definition
    pub fn load(&self, id: TaskId) -> Result<Option<NetworkTask>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, schedule_id, access_type, address, port, interval_minutes, running
                 FROM network_tasks WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u16>(4)?,
                        row.get::<_, u32>(5)?,
                        row.get::<_, bool>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, identity, access_type, address, port, interval_minutes, running)) = row
        else {
            return Ok(None);
        };

        let access_type = access_type
            .parse::<AccessType>()
            .map_err(|_| StoreError::InvalidColumn {
                column: "access_type",
                value: access_type.clone(),
            })?;

        Ok(Some(NetworkTask {
            id,
            identity,
            access_type,
            address,
            port,
            interval_minutes,
            running,
        }))
    }
}

fn identity_in_use(conn: &Connection, token: IdentityToken) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM network_tasks WHERE schedule_id = ?1)",
        params![token],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn task_record(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        identity: row.get(1)?,
        running: row.get(2)?,
    })
}

impl TaskStore for SqliteTaskStore {
    fn exists_identity(&self, identity: IdentityToken) -> Result<bool> {
        let conn = self.lock()?;
        identity_in_use(&conn, identity)
    }

    fn read_task(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT id, schedule_id, running FROM network_tasks WHERE id = ?1",
                params![id],
                task_record,
            )
            .optional()?;
        Ok(record)
    }
}
