//! Dispatch of network tasks to the matching probe

use crate::common::{AggregatedResult, ProbeError};
use crate::connect::ConnectProbe;
use crate::download::{DownloadProbe, DownloadResult};
use crate::files::{FileManager, LocalFileManager};
use crate::ping::{PingProbe, PingResult};
use crate::process::{ProcessExecutor, SystemProcessExecutor};

use netkeeper_core::{AccessType, Config, NetworkTask, SystemTimeSource, TaskStore, TimeSource};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of one task execution, tagged by probe kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "lowercase")]
pub enum ProbeOutcome {
    Ping(PingResult),
    Connect(AggregatedResult),
    Download(DownloadResult),
}

impl ProbeOutcome {
    pub fn kind(&self) -> AccessType {
        match self {
            ProbeOutcome::Ping(_) => AccessType::Ping,
            ProbeOutcome::Connect(_) => AccessType::Connect,
            ProbeOutcome::Download(_) => AccessType::Download,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            ProbeOutcome::Ping(result) => result.aggregate.success,
            ProbeOutcome::Connect(result) => result.success,
            ProbeOutcome::Download(result) => result.is_success(),
        }
    }

    /// The error carried by the result, if any
    pub fn error(&self) -> Option<&ProbeError> {
        match self {
            ProbeOutcome::Ping(result) => result.aggregate.last_error.as_ref(),
            ProbeOutcome::Connect(result) => result.last_error.as_ref(),
            ProbeOutcome::Download(result) => result.error.as_ref(),
        }
    }
}

/// Owns one probe per access type and routes tasks to them
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    ping: PingProbe,
    connect: ConnectProbe,
    download: DownloadProbe,
}

impl ProbeExecutor {
    /// Executor with system processes, the local file system and the system clock
    pub fn new(config: &Config, store: Arc<dyn TaskStore>) -> Result<Self, ProbeError> {
        Self::with_collaborators(
            config,
            store,
            Arc::new(SystemProcessExecutor),
            Arc::new(LocalFileManager::new(config.download.directory.clone())),
            Arc::new(SystemTimeSource),
        )
    }

    pub fn with_collaborators(
        config: &Config,
        store: Arc<dyn TaskStore>,
        processes: Arc<dyn ProcessExecutor>,
        files: Arc<dyn FileManager>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, ProbeError> {
        let ping = PingProbe::with_collaborators(config.ping.clone(), processes, Arc::clone(&time));
        let connect = ConnectProbe::with_time_source(config.connect.clone(), Arc::clone(&time));
        let download = DownloadProbe::new(config.download.clone(), store, files, time)?;

        Ok(Self {
            ping,
            connect,
            download,
        })
    }

    /// Run the probe for `task`.
    ///
    /// `cancel` interrupts downloads; ping and connect run to completion.
    pub async fn execute(&self, task: &NetworkTask, cancel: CancellationToken) -> ProbeOutcome {
        debug!(
            "Executing task {} ({}) against {}",
            task.id, task.access_type, task.address
        );

        let outcome = match task.access_type {
            AccessType::Ping => ProbeOutcome::Ping(self.ping.run(&task.address).await),
            AccessType::Connect => {
                ProbeOutcome::Connect(self.connect.run(&task.address, task.port).await)
            }
            AccessType::Download => ProbeOutcome::Download(
                self.download
                    .run(task.id, task.identity, &task.address, cancel)
                    .await,
            ),
        };

        info!(
            "Task {} ({}) finished, success: {}",
            task.id,
            outcome.kind(),
            outcome.is_success()
        );
        outcome
    }
}
