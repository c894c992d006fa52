//! Network probes for netkeeper
//!
//! This crate executes the three probe kinds a monitoring task can carry:
//! - Ping through the system ping command, with output parsing
//! - TCP connect with per-attempt timeouts
//! - HTTP download with manual redirects and cooperative cancellation
//!
//! Ping and connect repeat a fixed number of attempts and aggregate them into
//! an [`AggregatedResult`]. A download streams once while a
//! [`CancellationMonitor`] re-checks the owning task in the background.

pub mod common;
pub mod connect;
pub mod download;
pub mod files;
pub mod manager;
pub mod monitor;
pub mod ping;
pub mod process;
pub mod redirect;

// Re-export commonly used types
pub use common::{AggregatedResult, AttemptAggregator, AttemptOutcome, ProbeError};
pub use connect::{ConnectProbe, Connector, TcpConnector};
pub use download::{DownloadProbe, DownloadResult};
pub use files::{FileManager, FileSink, LocalFileManager};
pub use manager::{ProbeExecutor, ProbeOutcome};
pub use monitor::{CancellationMonitor, MonitorHandle, TransferFlags, Verdict};
pub use ping::{PingCommandTemplate, PingProbe, PingResult};
pub use process::{CommandLine, ProcessExecutor, ProcessOutput, SystemProcessExecutor};
pub use redirect::{RedirectResolver, RedirectStep};

// Re-export from core
pub use netkeeper_core::{
    config::Config,
    error::{Error, Result},
    types::{AccessType, NetworkTask},
};

/// Constants shared by the probes
pub mod constants {
    use std::time::Duration;

    /// Shortest interval the cancellation monitor polls at
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// Numbered suffixes tried when a download name is taken
    pub const MAX_NAME_SUFFIX: u32 = 1000;

    /// Status codes treated as redirects
    pub const REDIRECT_STATUS_CODES: &[u16] = &[301, 302, 303, 307, 308];
}
