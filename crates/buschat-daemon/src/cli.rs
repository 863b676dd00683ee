//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Daemon executable, overriding the configuration file
    #[arg(long)]
    pub daemon: Option<PathBuf>,

    /// Exit with the daemon's failure instead of ignoring it
    #[arg(long)]
    pub observe_worker: bool,

    /// Service arguments: `logpath=<dir>` plus arguments for the daemon
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub service_args: Vec<String>,
}
