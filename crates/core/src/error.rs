//! Error types for netkeeper core

use thiserror::Error;

/// Result type alias for netkeeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for netkeeper core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Task store errors
    #[error("Task store error: {0}")]
    Store(#[from] StoreError),

    /// Identity token assignment errors
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid timeout value for {field}: {value}ms")]
    InvalidTimeout { field: &'static str, value: u64 },

    #[error("Invalid attempt count for {field}: {value}")]
    InvalidAttempts { field: &'static str, value: u32 },

    #[error("Invalid chunk size: {value}")]
    InvalidChunkSize { value: usize },

    #[error("Invalid ping command template: {reason}")]
    InvalidTemplate { reason: String },

    #[error("Configuration file not found: {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },
}

/// Task store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Task {id} not found")]
    TaskNotFound { id: i64 },

    #[error("Invalid stored value in column {column}: {value}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Identity token assignment errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("No unused identity token found within a retry budget of {budget}")]
    Exhausted { budget: u32 },
}

impl Error {
    /// Check if this error signals identity exhaustion
    pub fn is_identity_exhausted(&self) -> bool {
        matches!(self, Error::Identity(IdentityError::Exhausted { .. }))
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Store(_) => "store",
            Error::Identity(_) => "identity",
            Error::Io(_) => "io",
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(StoreError::Sqlite(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(ConfigError::InvalidFormat {
            reason: err.to_string(),
        })
    }
}
