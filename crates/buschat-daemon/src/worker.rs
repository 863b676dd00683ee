//! Daemon worker
//!
//! `ServiceHost::start` resolves the log destination, hands it to the daemon
//! entry point, then runs the entry's long-running main on exactly one named
//! background thread. The host does not watch that thread: a `WorkerHandle`
//! may be dropped, and a failed or finished daemon is neither reported nor
//! restarted unless the caller joins the handle.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread::{self, JoinHandle};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::args::ServiceArgs;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::logfile::prepare_log_destination;

// ----------------------------------------------------------------------------
// Daemon Entry Point
// ----------------------------------------------------------------------------

/// Entry points of the native bus daemon
pub trait DaemonEntry: Send + 'static {
    /// Direct daemon logging to `path`; called once before `daemon_main`
    fn set_log_file(&mut self, path: &Path) -> Result<()>;

    /// Receive the forwarded arguments, unsplit; called once before `daemon_main`
    fn set_arguments(&mut self, _forwarded: &[String]) -> Result<()> {
        Ok(())
    }

    /// Run the daemon until it exits
    fn daemon_main(&mut self, command_line: &str) -> Result<()>;
}

/// Runs the daemon as an external executable
#[derive(Debug, Clone)]
pub struct ProcessDaemon {
    program: PathBuf,
    log_file: Option<PathBuf>,
    args: Vec<String>,
}

impl ProcessDaemon {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            log_file: None,
            args: Vec::new(),
        }
    }
}

impl DaemonEntry for ProcessDaemon {
    fn set_log_file(&mut self, path: &Path) -> Result<()> {
        self.log_file = Some(path.to_path_buf());
        Ok(())
    }

    fn set_arguments(&mut self, forwarded: &[String]) -> Result<()> {
        self.args = forwarded.to_vec();
        Ok(())
    }

    fn daemon_main(&mut self, command_line: &str) -> Result<()> {
        let mut command = Command::new(&self.program);
        if let Some(log_file) = &self.log_file {
            command.arg("--log-file").arg(log_file);
        }
        command.args(&self.args);

        info!("Running {} as '{}'", self.program.display(), command_line);
        let status = command.status().map_err(|e| {
            DaemonError::Entry(format!("cannot run {}: {}", self.program.display(), e))
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(DaemonError::DaemonExit(status.code().unwrap_or(-1)))
        }
    }
}

// ----------------------------------------------------------------------------
// Service Host
// ----------------------------------------------------------------------------

/// The single background worker running the daemon
#[derive(Debug)]
pub struct WorkerHandle {
    log_file: PathBuf,
    command_line: String,
    thread: JoinHandle<Result<()>>,
}

impl WorkerHandle {
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the daemon to exit and return its outcome
    pub fn join(self) -> Result<()> {
        self.thread.join().map_err(|_| DaemonError::WorkerPanicked)?
    }
}

/// Starts the native daemon on a worker thread
#[derive(Debug, Clone)]
pub struct ServiceHost {
    config: DaemonConfig,
}

impl ServiceHost {
    pub fn new(config: DaemonConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Prepare the log destination and spawn the worker
    ///
    /// Nothing is spawned when the arguments carry no log path or the log
    /// directory cannot be created.
    pub fn start<E: DaemonEntry>(&self, args: &ServiceArgs, mut entry: E) -> Result<WorkerHandle> {
        let Some(log_dir) = &args.log_path else {
            warn!(
                "Path name for log file not found in '{}'",
                args.forwarded.join(" ")
            );
            return Err(DaemonError::LogPathMissing);
        };

        let log_file = prepare_log_destination(log_dir, &self.config.log_file_prefix, Utc::now())?;
        entry.set_log_file(&log_file)?;
        entry.set_arguments(&args.forwarded)?;

        let command_line = args.command_line(&self.config.program_name);
        info!(
            "Starting daemon worker '{}': {} (log {})",
            self.config.worker_thread_name,
            command_line,
            log_file.display()
        );

        let line = command_line.clone();
        let thread = thread::Builder::new()
            .name(self.config.worker_thread_name.clone())
            .spawn(move || {
                let result = entry.daemon_main(&line);
                match &result {
                    Ok(()) => info!("Daemon main returned"),
                    Err(e) => error!("Daemon main failed: {}", e),
                }
                result
            })?;

        Ok(WorkerHandle {
            log_file,
            command_line,
            thread,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_log_path_does_not_spawn() {
        struct Unreachable;
        impl DaemonEntry for Unreachable {
            fn set_log_file(&mut self, _: &Path) -> Result<()> {
                panic!("log file must not be set");
            }
            fn daemon_main(&mut self, _: &str) -> Result<()> {
                panic!("daemon must not run");
            }
        }

        let host = ServiceHost::new(DaemonConfig::default()).unwrap();
        let args = ServiceArgs::parse(["--nofork"]);

        assert!(matches!(
            host.start(&args, Unreachable),
            Err(DaemonError::LogPathMissing)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_daemon_reports_exit_status() {
        let mut daemon = ProcessDaemon::new("false");
        assert!(matches!(
            daemon.daemon_main("AlljoynService"),
            Err(DaemonError::DaemonExit(1))
        ));

        let mut daemon = ProcessDaemon::new("true");
        daemon.set_log_file(Path::new("/tmp/ignored.txt")).unwrap();
        daemon.set_arguments(&["--nofork".to_string()]).unwrap();
        assert!(daemon.daemon_main("AlljoynService --nofork").is_ok());
    }

    #[test]
    fn test_process_daemon_missing_program() {
        let mut daemon = ProcessDaemon::new("/nonexistent/bus-daemon");
        assert!(matches!(
            daemon.daemon_main("AlljoynService"),
            Err(DaemonError::Entry(_))
        ));
    }
}
