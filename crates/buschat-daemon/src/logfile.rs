//! Log destination for the native daemon

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{DaemonError, Result};

/// File name for a log started at `at`: `DaemonLog_2026-10-18_09_05_33.txt`
pub fn generate_log_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}{}.txt", prefix, at.format("%Y-%m-%d_%H_%M_%S"))
}

/// Make sure `dir` exists and return the log file path inside it
///
/// Failure to create the directory is fatal for the start path and is not
/// retried.
pub fn prepare_log_destination(dir: &Path, prefix: &str, at: DateTime<Utc>) -> Result<PathBuf> {
    if !dir.is_dir() {
        fs::create_dir_all(dir).map_err(|e| DaemonError::LogDestination {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        info!("Created log directory {}", dir.display());
    }
    Ok(dir.join(generate_log_name(prefix, at)))
}
