//! # netkeeper core
//!
//! Shared building blocks for the netkeeper probe engine:
//!
//! - **Errors**: layered `thiserror` taxonomy
//! - **Configuration**: probe, identity and logging settings with file loading
//! - **Identity tokens**: random per-schedule tokens with bounded uniqueness retries
//! - **Task store**: the read-only seam probes use to re-check task state,
//!   with in-memory and SQLite implementations
//! - **Time source**: injectable clock for deterministic duration measurement
//!
//! ## Example
//!
//! ```rust,no_run
//! use netkeeper_core::{AccessType, NewTask, SqliteTaskStore};
//!
//! fn main() -> netkeeper_core::Result<()> {
//!     let store = SqliteTaskStore::open("tasks.db", 100)?;
//!     let task = store.insert_task(&NewTask {
//!         access_type: AccessType::Connect,
//!         address: "example.com".to_string(),
//!         port: 443,
//!         interval_minutes: 15,
//!         running: true,
//!     })?;
//!     println!("task {} scheduled with identity {}", task.id, task.identity);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod sqlite;
pub mod store;
pub mod time;
pub mod types;

// Re-export main types
pub use config::Config;
pub use error::{Error, Result};
pub use identity::IdentityGenerator;
pub use sqlite::SqliteTaskStore;
pub use store::{InMemoryTaskStore, TaskStore};
pub use time::{elapsed_between, ScriptedTimeSource, SystemTimeSource, TimeSource};
pub use types::{AccessType, IdentityToken, NetworkTask, NewTask, TaskId, TaskRecord};

/// Current version of the netkeeper core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests
pub const USER_AGENT: &str = concat!("netkeeper/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_user_agent() {
        assert!(USER_AGENT.starts_with("netkeeper/"));
    }
}
