//! Error handling for the service host

use thiserror::Error;

/// Service host error types
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Path name for log file not found in service arguments")]
    LogPathMissing,

    #[error("Cannot prepare log destination {path}: {reason}")]
    LogDestination { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Daemon entry error: {0}")]
    Entry(String),

    #[error("Daemon exited with status {0}")]
    DaemonExit(i32),

    #[error("Daemon worker panicked")]
    WorkerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for service host operations
pub type Result<T> = std::result::Result<T, DaemonError>;
