//! BusChat service host entry point

use clap::Parser;
use tracing::{error, info};

use buschat_daemon::{Cli, DaemonConfig, ProcessDaemon, Result, ServiceArgs, ServiceHost};

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        error!("Service host failed: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_configuration(&cli)?;
    if let Some(daemon) = &cli.daemon {
        config.daemon_program = daemon.clone();
    }

    let host = ServiceHost::new(config)?;
    let args = ServiceArgs::parse(&cli.service_args);
    let daemon = ProcessDaemon::new(host.config().daemon_program.clone());
    let worker = host.start(&args, daemon)?;
    info!("Daemon logging to {}", worker.log_file().display());

    // Stay resident like a service process while the worker runs.
    let outcome = worker.join();
    if cli.observe_worker {
        outcome
    } else {
        info!("Daemon worker finished");
        Ok(())
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<DaemonConfig> {
    if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path);
        DaemonConfig::load_from_file(config_path)
    } else {
        info!("Using default configuration");
        Ok(DaemonConfig::default())
    }
}
