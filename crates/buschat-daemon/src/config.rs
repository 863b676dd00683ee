//! Service host configuration
//!
//! Everything the worker needs is fixed here once at start and handed to
//! `ServiceHost`; nothing is kept in process-wide state. Loaded from an
//! optional TOML file, every field falling back to its default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

pub const DEFAULT_PROGRAM_NAME: &str = "AlljoynService";
pub const DEFAULT_LOG_FILE_PREFIX: &str = "DaemonLog_";
pub const DEFAULT_WORKER_THREAD_NAME: &str = "bus-daemon";
pub const DEFAULT_DAEMON_PROGRAM: &str = "alljoyn-daemon";

/// Configuration for the service host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Executable run by `ProcessDaemon`
    pub daemon_program: PathBuf,

    /// Token placed in front of the forwarded arguments
    pub program_name: String,

    /// Prefix of generated log file names
    pub log_file_prefix: String,

    /// Name of the worker thread running the daemon entry point
    pub worker_thread_name: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            daemon_program: PathBuf::from(DEFAULT_DAEMON_PROGRAM),
            program_name: DEFAULT_PROGRAM_NAME.to_string(),
            log_file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.daemon_program.as_os_str().is_empty() {
            return Err(DaemonError::Config("daemon_program must not be empty".to_string()));
        }
        if self.program_name.is_empty() || self.program_name.contains(char::is_whitespace) {
            return Err(DaemonError::Config(format!(
                "program_name '{}' must be a single token",
                self.program_name
            )));
        }
        if self.log_file_prefix.is_empty() || self.log_file_prefix.contains(['/', '\\']) {
            return Err(DaemonError::Config(format!(
                "log_file_prefix '{}' must be a non-empty file name",
                self.log_file_prefix
            )));
        }
        if self.worker_thread_name.is_empty() {
            return Err(DaemonError::Config("worker_thread_name must not be empty".to_string()));
        }
        Ok(())
    }
}
