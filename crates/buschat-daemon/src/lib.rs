//! BusChat service host
//!
//! Runs the native message bus daemon on a single background worker: picks
//! the log directory out of the service arguments, names a timestamped log
//! file in it, and forwards the remaining arguments to the daemon entry
//! point.

pub mod args;
pub mod cli;
pub mod config;
pub mod error;
pub mod logfile;
pub mod worker;

pub use args::ServiceArgs;
pub use cli::Cli;
pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use logfile::{generate_log_name, prepare_log_destination};
pub use worker::{DaemonEntry, ProcessDaemon, ServiceHost, WorkerHandle};
