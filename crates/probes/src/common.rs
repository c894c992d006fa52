//! Common types and utilities for network probes

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Common probe error types
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeError {
    #[error("Connection timeout")]
    Timeout,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Host unreachable")]
    HostUnreachable,

    #[error("Network unreachable")]
    NetworkUnreachable,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unable to determine a file name for the download")]
    FileName,

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProbeError {
    /// Whether this error represents a timeout rather than a failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout)
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::ConnectionRefused => ProbeError::ConnectionRefused,
            std::io::ErrorKind::TimedOut => ProbeError::Timeout,
            std::io::ErrorKind::HostUnreachable => ProbeError::HostUnreachable,
            std::io::ErrorKind::NetworkUnreachable => ProbeError::NetworkUnreachable,
            std::io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied,
            _ => ProbeError::IoError(e.to_string()),
        }
    }
}

/// Outcome of a single attempt that ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    /// Whether the target answered
    pub success: bool,
    /// Elapsed time, never negative
    pub duration: Duration,
}

impl AttemptOutcome {
    /// The target answered in `duration`
    pub fn success(duration: Duration) -> Self {
        Self {
            success: true,
            duration,
        }
    }

    /// The attempt completed without an answer (timeout)
    pub fn timed_out(duration: Duration) -> Self {
        Self {
            success: false,
            duration,
        }
    }
}

/// Summary over all attempts of one probe invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// At least one attempt succeeded
    pub success: bool,
    pub attempts: u32,
    pub successful_attempts: u32,
    pub timeouts: u32,
    pub errors: u32,
    /// Mean duration of the successful attempts, zero if there were none
    pub average_duration: Duration,
    /// Last error encountered; informational only
    pub last_error: Option<ProbeError>,
}

impl AggregatedResult {
    /// A result for an invocation that could not run a single attempt
    pub fn not_started(error: ProbeError) -> Self {
        Self {
            success: false,
            attempts: 0,
            successful_attempts: 0,
            timeouts: 0,
            errors: 1,
            average_duration: Duration::ZERO,
            last_error: Some(error),
        }
    }

    /// Percentage of attempts that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            (self.successful_attempts as f64 / self.attempts as f64) * 100.0
        }
    }
}

/// Accumulates attempt outcomes into an [`AggregatedResult`].
///
/// A completed attempt without an answer counts as a timeout; an attempt that
/// failed with an error counts as an error and records it.
#[derive(Debug, Clone, Default)]
pub struct AttemptAggregator {
    attempts: u32,
    successes: u32,
    timeouts: u32,
    errors: u32,
    total_duration: Duration,
    last_error: Option<ProbeError>,
}

impl AttemptAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of one attempt
    pub fn record(&mut self, attempt: Result<AttemptOutcome, ProbeError>) {
        self.attempts += 1;
        match attempt {
            Ok(outcome) if outcome.success => {
                self.successes += 1;
                self.total_duration += outcome.duration;
            }
            Ok(_) => self.timeouts += 1,
            Err(e) => {
                trace!("Attempt {} failed: {}", self.attempts, e);
                self.errors += 1;
                self.last_error = Some(e);
            }
        }
    }

    /// Produce the summary
    pub fn finish(self) -> AggregatedResult {
        let average_duration = if self.successes > 0 {
            self.total_duration / self.successes
        } else {
            Duration::ZERO
        };

        AggregatedResult {
            success: self.successes > 0,
            attempts: self.attempts,
            successful_attempts: self.successes,
            timeouts: self.timeouts,
            errors: self.errors,
            average_duration,
            last_error: self.last_error,
        }
    }
}
