//! CLI command implementations

use anyhow::{anyhow, bail, Context, Result};
use netkeeper_core::{
    AccessType, Config, IdentityGenerator, InMemoryTaskStore, NetworkTask, SqliteTaskStore,
    TaskRecord, TaskStore,
};
use netkeeper_probes::{ProbeExecutor, ProbeOutcome};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Command;

/// Id of the ephemeral task used when no database is given
const EPHEMERAL_TASK_ID: i64 = 1;

/// Run one command and return its outcome
pub async fn execute(command: &Command, mut config: Config) -> Result<ProbeOutcome> {
    let (task, store) = match command {
        Command::Ping { address } => ephemeral(&config, AccessType::Ping, address, 0)?,
        Command::Connect { address, port } => {
            ephemeral(&config, AccessType::Connect, address, *port)?
        }
        Command::Download {
            url,
            db,
            task_id,
            dir,
            keep,
            no_redirects,
        } => {
            if let Some(dir) = dir {
                config.download.directory = dir.clone();
            }
            if *keep {
                config.download.delete_after_download = false;
            }
            if *no_redirects {
                config.download.follow_redirects = false;
            }

            match (db, task_id) {
                (Some(db), Some(id)) => persisted(&config, db, *id, url)?,
                _ => ephemeral(&config, AccessType::Download, url, 0)?,
            }
        }
    };

    let executor = ProbeExecutor::new(&config, store).context("Failed to set up probes")?;
    let cancel = CancellationToken::new();
    let _ctrl_c = interrupt_on_ctrl_c(cancel.clone());

    Ok(executor.execute(&task, cancel).await)
}

/// A running task that only lives in memory for this invocation
fn ephemeral(
    config: &Config,
    access_type: AccessType,
    address: &str,
    port: u16,
) -> Result<(NetworkTask, Arc<dyn TaskStore>)> {
    let memory = Arc::new(InMemoryTaskStore::new());
    let identity = IdentityGenerator::new()
        .generate_unique_in(memory.as_ref(), config.identity.retry_budget)
        .context("Failed to allocate a task identity")?;
    memory.insert(TaskRecord::new(EPHEMERAL_TASK_ID, identity, true))?;
    let store: Arc<dyn TaskStore> = memory;

    let task = NetworkTask {
        id: EPHEMERAL_TASK_ID,
        identity,
        access_type,
        address: address.to_string(),
        port,
        interval_minutes: 0,
        running: true,
    };
    debug!("Ephemeral {} task with identity {}", access_type, identity);
    Ok((task, store))
}

/// A download bound to a task in a SQLite database
fn persisted(
    config: &Config,
    db: &Path,
    id: i64,
    url: &str,
) -> Result<(NetworkTask, Arc<dyn TaskStore>)> {
    let store = SqliteTaskStore::open(db, config.identity.retry_budget)
        .with_context(|| format!("Failed to open task database {}", db.display()))?;
    let mut task = store
        .load(id)?
        .ok_or_else(|| anyhow!("Task {} not found in {}", id, db.display()))?;

    if task.access_type != AccessType::Download {
        bail!("Task {} is a {} task, not a download", id, task.access_type);
    }
    if !task.running {
        warn!("Task {} is not running, the download will stop at the first poll", id);
    }

    task.address = url.to_string();
    let store: Arc<dyn TaskStore> = Arc::new(store);
    Ok((task, store))
}

/// Cancel `token` on Ctrl-C; the watcher is aborted when the guard drops
fn interrupt_on_ctrl_c(token: CancellationToken) -> AbortOnDrop {
    AbortOnDrop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the running probe");
            token.cancel();
        }
    }))
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netkeeper_core::NewTask;
    use tempfile::TempDir;

    #[test]
    fn test_ephemeral_task_is_running() {
        let (task, store) = ephemeral(&Config::default(), AccessType::Connect, "127.0.0.1", 22).unwrap();
        assert_eq!(task.port, 22);
        let record = store.read_task(task.id).unwrap().unwrap();
        assert!(record.running);
        assert_eq!(record.identity, task.identity);
    }

    #[test]
    fn test_persisted_task_checks() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("tasks.db");
        let store = SqliteTaskStore::open(&db, 10).unwrap();
        let connect = store
            .insert_task(&NewTask {
                access_type: AccessType::Connect,
                address: "10.0.0.1".to_string(),
                port: 80,
                interval_minutes: 5,
                running: true,
            })
            .unwrap();
        let download = store
            .insert_task(&NewTask {
                access_type: AccessType::Download,
                address: "http://old.example.com/f".to_string(),
                port: 0,
                interval_minutes: 5,
                running: true,
            })
            .unwrap();
        drop(store);

        let config = Config::default();
        assert!(persisted(&config, &db, connect.id, "http://x/").is_err());
        assert!(persisted(&config, &db, 999, "http://x/").is_err());

        let (task, _) = persisted(&config, &db, download.id, "http://new.example.com/f").unwrap();
        assert_eq!(task.identity, download.identity);
        assert_eq!(task.address, "http://new.example.com/f");
    }
}
