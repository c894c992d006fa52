//! Configuration management for netkeeper

use crate::error::{ConfigError, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder replaced by the target address in the ping template
pub const ADDRESS_PLACEHOLDER: &str = "{address}";
/// Placeholder replaced by the packet count in the ping template
pub const COUNT_PLACEHOLDER: &str = "{count}";
/// Placeholder replaced by the per-packet timeout (seconds) in the ping template
pub const TIMEOUT_PLACEHOLDER: &str = "{timeout}";

/// Upper bound on configured attempts per probe invocation
pub const MAX_ATTEMPTS: u32 = 10;

/// Largest download chunk; the monitor is only consulted between chunks
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Main configuration structure for netkeeper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ping probe configuration
    pub ping: PingConfig,
    /// Connect probe configuration
    pub connect: ConnectConfig,
    /// Download probe configuration
    pub download: DownloadConfig,
    /// Identity token configuration
    pub identity: IdentityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// External ping command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    /// Executable for IPv4 and host names
    pub program: String,
    /// Executable for IPv6 literals
    pub program_v6: String,
    /// Argument template
    pub args: Vec<String>,
    /// Echo requests per invocation, baked into the command line
    pub packet_count: u32,
    /// Per-reply timeout, baked into the command line
    pub timeout: Duration,
    /// Invocations per probe
    pub attempts: u32,
    /// Hard limit on a single invocation
    pub process_timeout: Duration,
}

/// TCP connect probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Connection timeout per attempt
    pub timeout: Duration,
    /// Attempts per probe
    pub attempts: u32,
}

/// Download probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Idle read timeout
    pub read_timeout: Duration,
    /// Follow HTTP redirects
    pub follow_redirects: bool,
    /// Maximum redirect hops
    pub max_redirects: u32,
    /// Bytes copied between cancellation checks
    pub chunk_size: usize,
    /// Interval at which the owning task is re-read
    pub poll_interval: Duration,
    /// Delete the file once its existence was verified
    pub delete_after_download: bool,
    /// Destination directory
    pub directory: PathBuf,
}

/// Identity assignment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Collisions tolerated before giving up
    pub retry_budget: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Log format
    pub format: LogFormat,
    /// Include timestamps in logs
    pub timestamps: bool,
    /// Include module names
    pub module_names: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Log formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            program_v6: "ping6".to_string(),
            args: vec![
                "-c".to_string(),
                COUNT_PLACEHOLDER.to_string(),
                "-W".to_string(),
                TIMEOUT_PLACEHOLDER.to_string(),
                ADDRESS_PLACEHOLDER.to_string(),
            ],
            packet_count: 3,
            timeout: Duration::from_secs(5),
            attempts: 1,
            process_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            attempts: 3,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(15),
            follow_redirects: true,
            max_redirects: 20,
            chunk_size: 8 * 1024,
            poll_interval: Duration::from_secs(5),
            delete_after_download: true,
            directory: std::env::temp_dir().join("netkeeper"),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { retry_budget: 100 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Human,
            timestamps: true,
            module_names: true,
        }
    }
}

impl Config {
    /// Load configuration from a `.json`, `.toml` or `.yaml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|_e| {
            Error::from(ConfigError::ConfigFileNotFound {
                path: path.as_ref().display().to_string(),
            })
        })?;

        let config: Config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                Error::from(ConfigError::InvalidFormat {
                    reason: e.to_string(),
                })
            })?,
            Some("toml") => toml::from_str(&content).map_err(|e| {
                Error::from(ConfigError::InvalidFormat {
                    reason: e.to_string(),
                })
            })?,
            _ => {
                return Err(ConfigError::InvalidFormat {
                    reason: "Unsupported configuration file format".to_string(),
                }
                .into())
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self).map_err(|e| {
                Error::from(ConfigError::InvalidFormat {
                    reason: e.to_string(),
                })
            })?,
            Some("toml") => toml::to_string_pretty(self).map_err(|e| {
                Error::from(ConfigError::InvalidFormat {
                    reason: e.to_string(),
                })
            })?,
            _ => {
                return Err(ConfigError::InvalidFormat {
                    reason: "Unsupported configuration file format".to_string(),
                }
                .into())
            }
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        check_timeout("ping.timeout", self.ping.timeout)?;
        check_timeout("ping.process_timeout", self.ping.process_timeout)?;
        check_timeout("connect.timeout", self.connect.timeout)?;
        check_timeout("download.connect_timeout", self.download.connect_timeout)?;
        check_timeout("download.read_timeout", self.download.read_timeout)?;
        check_timeout("download.poll_interval", self.download.poll_interval)?;

        check_attempts("ping.attempts", self.ping.attempts)?;
        check_attempts("ping.packet_count", self.ping.packet_count)?;
        check_attempts("connect.attempts", self.connect.attempts)?;

        if self.download.chunk_size == 0 || self.download.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize {
                value: self.download.chunk_size,
            }
            .into());
        }

        if self.ping.program.trim().is_empty() || self.ping.program_v6.trim().is_empty() {
            return Err(ConfigError::InvalidTemplate {
                reason: "ping program must not be empty".to_string(),
            }
            .into());
        }

        if !self.ping.args.iter().any(|arg| arg.contains(ADDRESS_PLACEHOLDER)) {
            return Err(ConfigError::InvalidTemplate {
                reason: format!("arguments must contain {}", ADDRESS_PLACEHOLDER),
            }
            .into());
        }

        Ok(())
    }
}

fn check_timeout(field: &'static str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(ConfigError::InvalidTimeout {
            field,
            value: value.as_millis() as u64,
        }
        .into());
    }
    Ok(())
}

fn check_attempts(field: &'static str, value: u32) -> Result<()> {
    if value == 0 || value > MAX_ATTEMPTS {
        return Err(ConfigError::InvalidAttempts { field, value }.into());
    }
    Ok(())
}
