//! Core types and data structures for netkeeper

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary key of a persisted monitoring task
pub type TaskId = i64;

/// Per-schedule identity token.
///
/// Unique among the stored tasks at the moment it is assigned; a task gets a
/// fresh token every time it is (re)scheduled.
pub type IdentityToken = i32;

/// Kind of probe a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// ICMP echo through the system ping executable
    Ping,
    /// Plain TCP connect
    Connect,
    /// HTTP download
    Download,
}

impl AccessType {
    /// Stable lowercase name used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Ping => "ping",
            AccessType::Connect => "connect",
            AccessType::Download => "download",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ping" => Ok(AccessType::Ping),
            "connect" => Ok(AccessType::Connect),
            "download" => Ok(AccessType::Download),
            other => Err(format!("unknown access type: {}", other)),
        }
    }
}

/// The slice of a persisted task the cancellation monitor re-reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Primary key
    pub id: TaskId,
    /// Identity token of the current schedule
    pub identity: IdentityToken,
    /// Whether the task is currently scheduled to run
    pub running: bool,
}

impl TaskRecord {
    /// Create a new record
    pub fn new(id: TaskId, identity: IdentityToken, running: bool) -> Self {
        Self {
            id,
            identity,
            running,
        }
    }
}

/// A monitoring task definition as supplied by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTask {
    /// Primary key
    pub id: TaskId,
    /// Identity token of the current schedule
    pub identity: IdentityToken,
    /// Probe kind
    pub access_type: AccessType,
    /// Host name, IP literal, or URL for downloads
    pub address: String,
    /// Port for connect probes
    pub port: u16,
    /// Scheduling interval in minutes
    pub interval_minutes: u32,
    /// Whether the task is currently scheduled
    pub running: bool,
}

impl NetworkTask {
    /// The record the cancellation monitor compares against
    pub fn record(&self) -> TaskRecord {
        TaskRecord::new(self.id, self.identity, self.running)
    }
}

/// Values for inserting a new task; the store assigns id and identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub access_type: AccessType,
    pub address: String,
    pub port: u16,
    pub interval_minutes: u32,
    pub running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_type_parsing() {
        assert_eq!("ping".parse::<AccessType>(), Ok(AccessType::Ping));
        assert_eq!("CONNECT".parse::<AccessType>(), Ok(AccessType::Connect));
        assert_eq!("Download".parse::<AccessType>(), Ok(AccessType::Download));
        assert!("ftp".parse::<AccessType>().is_err());
    }

    #[test]
    fn test_access_type_serde() {
        let json = serde_json::to_string(&AccessType::Download).unwrap();
        assert_eq!(json, "\"download\"");
        assert_eq!(AccessType::Connect.to_string(), "connect");
    }

    #[test]
    fn test_task_record() {
        let task = NetworkTask {
            id: 3,
            identity: -17,
            access_type: AccessType::Ping,
            address: "192.168.1.1".to_string(),
            port: 0,
            interval_minutes: 15,
            running: true,
        };
        assert_eq!(task.record(), TaskRecord::new(3, -17, true));
    }
}
