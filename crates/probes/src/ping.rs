//! Ping probe built on the system ping command
//!
//! Each attempt runs the configured program once with packet count and
//! timeout baked into its arguments. A zero exit status is a success; a
//! non-zero status or a process that outlives its limit counts as a timeout.
//! The text of the last attempt is fed to [`PingOutputParser`].

use crate::common::{AggregatedResult, AttemptAggregator, AttemptOutcome, ProbeError};
use crate::process::{CommandLine, ProcessExecutor, ProcessOutput, SystemProcessExecutor};
use netkeeper_core::config::{
    PingConfig, ADDRESS_PLACEHOLDER, COUNT_PLACEHOLDER, TIMEOUT_PLACEHOLDER,
};
use netkeeper_core::time::{elapsed_between, SystemTimeSource, TimeSource};
use netkeeper_parsers::{PingOutputParser, PingStatistics};

use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Renders ping command lines from the configured argument template
#[derive(Debug, Clone)]
pub struct PingCommandTemplate {
    program: String,
    program_v6: String,
    args: Vec<String>,
    packet_count: u32,
    timeout: Duration,
}

impl PingCommandTemplate {
    pub fn from_config(config: &PingConfig) -> Self {
        Self {
            program: config.program.clone(),
            program_v6: config.program_v6.clone(),
            args: config.args.clone(),
            packet_count: config.packet_count,
            timeout: config.timeout,
        }
    }

    /// Build the command line for `address`
    pub fn render(&self, address: &str) -> CommandLine {
        let host = address.trim().trim_start_matches('[').trim_end_matches(']');
        let program = if host.parse::<Ipv6Addr>().is_ok() {
            &self.program_v6
        } else {
            &self.program
        };

        let count = self.packet_count.to_string();
        let timeout = timeout_seconds(self.timeout).to_string();
        let args = self
            .args
            .iter()
            .map(|arg| {
                arg.replace(COUNT_PLACEHOLDER, &count)
                    .replace(TIMEOUT_PLACEHOLDER, &timeout)
                    .replace(ADDRESS_PLACEHOLDER, host)
            })
            .collect();

        CommandLine::new(program.as_str(), args)
    }
}

/// Whole seconds, rounded up, never below one
fn timeout_seconds(timeout: Duration) -> u64 {
    let mut secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 {
        secs += 1;
    }
    secs.max(1)
}

/// Result of a ping probe invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResult {
    pub aggregate: AggregatedResult,
    /// Rendered command line
    pub command: String,
    /// Trimmed text of the last completed attempt
    pub output: String,
    pub exit_code: Option<i32>,
    pub statistics: PingStatistics,
}

/// Runs the configured ping command a fixed number of times
#[derive(Debug, Clone)]
pub struct PingProbe {
    config: PingConfig,
    template: PingCommandTemplate,
    executor: Arc<dyn ProcessExecutor>,
    time: Arc<dyn TimeSource>,
}

impl PingProbe {
    /// Probe spawning real processes, timed by the system clock
    pub fn new(config: PingConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(SystemProcessExecutor),
            Arc::new(SystemTimeSource),
        )
    }

    pub fn with_collaborators(
        config: PingConfig,
        executor: Arc<dyn ProcessExecutor>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let template = PingCommandTemplate::from_config(&config);
        Self {
            config,
            template,
            executor,
            time,
        }
    }

    pub async fn run(&self, address: &str) -> PingResult {
        let command = self.template.render(address);
        debug!("Ping probe: {} ({} attempts)", command, self.config.attempts);

        let mut aggregator = AttemptAggregator::new();
        let mut last_output: Option<ProcessOutput> = None;

        for _ in 0..self.config.attempts {
            let start = self.time.now();
            let execution = self
                .executor
                .execute(&command, self.config.process_timeout)
                .await;
            let duration = elapsed_between(start, self.time.now());

            match execution {
                Ok(output) => {
                    let success = output.exit_code == Some(0);
                    trace!("Ping exited with {:?} after {:?}", output.exit_code, duration);
                    aggregator.record(Ok(if success {
                        AttemptOutcome::success(duration)
                    } else {
                        AttemptOutcome::timed_out(duration)
                    }));
                    last_output = Some(output);
                }
                Err(ProbeError::Timeout) => {
                    trace!("Ping process exceeded {:?}", self.config.process_timeout);
                    aggregator.record(Ok(AttemptOutcome::timed_out(duration)));
                }
                Err(e @ ProbeError::Spawn(_)) => {
                    // the environment cannot run the probe at all
                    warn!("Ping probe cannot start: {}", e);
                    aggregator.record(Err(e));
                    break;
                }
                Err(e) => aggregator.record(Err(e)),
            }
        }

        let (output, exit_code, statistics) = match last_output {
            Some(process) => {
                let text = process.text().to_string();
                let mut parser = PingOutputParser::new();
                parser.parse(&text);
                (text, process.exit_code, parser.into_statistics())
            }
            None => (String::new(), None, PingStatistics::invalid()),
        };

        let aggregate = aggregator.finish();
        debug!(
            "Ping probe to {} finished: {}/{} successful, statistics valid: {}",
            address, aggregate.successful_attempts, aggregate.attempts, statistics.valid
        );

        PingResult {
            aggregate,
            command: command.to_string(),
            output,
            exit_code,
            statistics,
        }
    }
}
