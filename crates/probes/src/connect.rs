//! TCP connect probe

use crate::common::{AggregatedResult, AttemptAggregator, AttemptOutcome, ProbeError};
use netkeeper_core::config::ConnectConfig;
use netkeeper_core::time::{elapsed_between, SystemTimeSource, TimeSource};

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Opens one connection; the probe bounds it with its own timeout
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    async fn connect(&self, target: SocketAddr) -> io::Result<()>;
}

/// Plain TCP connects through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, target: SocketAddr) -> io::Result<()> {
        let stream = TcpStream::connect(target).await?;
        drop(stream);
        Ok(())
    }
}

/// Repeated TCP connect attempts against one endpoint
#[derive(Debug, Clone)]
pub struct ConnectProbe {
    config: ConnectConfig,
    connector: Arc<dyn Connector>,
    time: Arc<dyn TimeSource>,
}

impl ConnectProbe {
    /// Create a probe using the system clock
    pub fn new(config: ConnectConfig) -> Self {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Create a probe with an injected clock
    pub fn with_time_source(config: ConnectConfig, time: Arc<dyn TimeSource>) -> Self {
        Self::with_collaborators(config, Arc::new(TcpConnector), time)
    }

    pub fn with_collaborators(
        config: ConnectConfig,
        connector: Arc<dyn Connector>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            connector,
            time,
        }
    }

    /// Run the configured number of attempts against `address:port`
    pub async fn run(&self, address: &str, port: u16) -> AggregatedResult {
        debug!(
            "Connect probe to {}:{} ({} attempts)",
            address, port, self.config.attempts
        );

        if port == 0 {
            return AggregatedResult::not_started(ProbeError::InvalidTarget(format!(
                "{}: port 0",
                address
            )));
        }

        let mut aggregator = AttemptAggregator::new();
        for _ in 0..self.config.attempts {
            let attempt = match resolve(address, port).await {
                Ok(target) => self.attempt(target).await,
                Err(e) => Err(e),
            };
            aggregator.record(attempt);
        }

        let result = aggregator.finish();
        debug!(
            "Connect probe to {}:{} finished: {}/{} successful",
            address, port, result.successful_attempts, result.attempts
        );
        result
    }

    /// One bounded connect; a timeout completes the attempt without success
    async fn attempt(&self, target: SocketAddr) -> Result<AttemptOutcome, ProbeError> {
        let start = self.time.now();
        let connect = timeout(self.config.timeout, self.connector.connect(target)).await;
        let duration = elapsed_between(start, self.time.now());

        match connect {
            Ok(Ok(())) => {
                trace!("TCP connect successful to {} in {:?}", target, duration);
                Ok(AttemptOutcome::success(duration))
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => {
                trace!("TCP connect to {} timed out at the socket layer", target);
                Ok(AttemptOutcome::timed_out(duration))
            }
            Ok(Err(e)) => {
                trace!("TCP connect failed to {}: {}", target, e);
                Err(ProbeError::from(e))
            }
            Err(_) => {
                trace!("TCP connect timeout to {}", target);
                Ok(AttemptOutcome::timed_out(duration))
            }
        }
    }

    /// Configured per-attempt timeout
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

/// Resolve `address` (IP literal or host name) to the first socket address
pub async fn resolve(address: &str, port: u16) -> Result<SocketAddr, ProbeError> {
    let host = address.trim().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(ProbeError::InvalidTarget("empty address".to_string()));
    }

    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ProbeError::DnsResolution(format!("{}: {}", host, e)))?;
    addrs
        .next()
        .ok_or_else(|| ProbeError::DnsResolution(format!("no addresses for {}", host)))
}
