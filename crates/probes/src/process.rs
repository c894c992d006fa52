//! External command execution for process-based probes

use crate::common::ProbeError;

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// A program and its rendered arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    /// Trimmed standard output, or trimmed standard error if stdout is empty
    pub fn text(&self) -> &str {
        let stdout = self.stdout.trim();
        if stdout.is_empty() {
            self.stderr.trim()
        } else {
            stdout
        }
    }
}

/// Runs external commands
#[async_trait]
pub trait ProcessExecutor: Send + Sync + fmt::Debug {
    /// Run `command` to completion within `limit`.
    ///
    /// Implementations must release the process on every path, including
    /// timeout and cancellation of the returned future.
    async fn execute(&self, command: &CommandLine, limit: Duration)
        -> Result<ProcessOutput, ProbeError>;
}

/// Executor spawning real child processes through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessExecutor;

#[async_trait]
impl ProcessExecutor for SystemProcessExecutor {
    async fn execute(
        &self,
        command: &CommandLine,
        limit: Duration,
    ) -> Result<ProcessOutput, ProbeError> {
        debug!("Executing {}", command);

        // kill_on_drop covers the timeout branch below and a dropped future:
        // the child is killed and reaped by the runtime
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::Spawn(format!("{}: {}", command.program, e)))?;

        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let output = ProcessOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code(),
                };
                trace!("{} exited with {:?}", command.program, output.exit_code);
                Ok(output)
            }
            Ok(Err(e)) => {
                warn!("Waiting for {} failed: {}", command.program, e);
                Err(ProbeError::IoError(e.to_string()))
            }
            Err(_) => {
                debug!("{} exceeded {:?}, killed", command.program, limit);
                Err(ProbeError::Timeout)
            }
        }
    }
}
