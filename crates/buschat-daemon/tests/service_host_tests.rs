//! Integration tests for the service host worker
//!
//! A recording `DaemonEntry` stands in for the native daemon so the tests can
//! observe what the worker thread receives.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use buschat_daemon::*;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Call {
    SetLogFile(PathBuf),
    SetArguments(Vec<String>),
    DaemonMain { command_line: String, thread: Option<String> },
}

struct RecordingDaemon {
    calls: mpsc::Sender<Call>,
    fail: bool,
}

impl DaemonEntry for RecordingDaemon {
    fn set_log_file(&mut self, path: &Path) -> Result<()> {
        let _ = self.calls.send(Call::SetLogFile(path.to_path_buf()));
        Ok(())
    }

    fn set_arguments(&mut self, forwarded: &[String]) -> Result<()> {
        let _ = self.calls.send(Call::SetArguments(forwarded.to_vec()));
        Ok(())
    }

    fn daemon_main(&mut self, command_line: &str) -> Result<()> {
        let _ = self.calls.send(Call::DaemonMain {
            command_line: command_line.to_string(),
            thread: thread::current().name().map(str::to_string),
        });
        if self.fail {
            Err(DaemonError::DaemonExit(2))
        } else {
            Ok(())
        }
    }
}

fn recording(fail: bool) -> (RecordingDaemon, mpsc::Receiver<Call>) {
    let (calls, received) = mpsc::channel();
    (RecordingDaemon { calls, fail }, received)
}

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("buschat-host-{}", Uuid::new_v4()))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[test]
fn test_worker_receives_log_file_and_command_line() {
    let dir = scratch_dir();
    let host = ServiceHost::new(DaemonConfig::default()).unwrap();
    let args = ServiceArgs::parse([
        "--nofork".to_string(),
        format!("LOGPATH=\"{}\"", dir.display()),
        "--config-file=bus.conf".to_string(),
    ]);
    let (daemon, calls) = recording(false);

    let worker = host.start(&args, daemon).unwrap();
    assert_eq!(
        worker.command_line(),
        "AlljoynService --nofork --config-file=bus.conf"
    );
    let log_file = worker.log_file().to_path_buf();
    worker.join().unwrap();

    assert!(dir.is_dir());
    assert_eq!(log_file.parent(), Some(dir.as_path()));
    let name = log_file.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("DaemonLog_") && name.ends_with(".txt"));

    let received: Vec<Call> = calls.try_iter().collect();
    assert_eq!(
        received,
        vec![
            Call::SetLogFile(log_file),
            Call::SetArguments(vec![
                "--nofork".to_string(),
                "--config-file=bus.conf".to_string()
            ]),
            Call::DaemonMain {
                command_line: "AlljoynService --nofork --config-file=bus.conf".to_string(),
                thread: Some("bus-daemon".to_string()),
            },
        ]
    );
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_missing_log_path_spawns_nothing() {
    let host = ServiceHost::new(DaemonConfig::default()).unwrap();
    let (daemon, calls) = recording(false);

    let result = host.start(&ServiceArgs::parse(["logpath="]), daemon);

    assert!(matches!(result, Err(DaemonError::LogPathMissing)));
    assert!(calls.try_recv().is_err());
}

#[test]
fn test_dropped_worker_still_runs() {
    let dir = scratch_dir();
    let host = ServiceHost::new(DaemonConfig::default()).unwrap();
    let (daemon, calls) = recording(true);

    let worker = host
        .start(&ServiceArgs::parse([format!("logpath={}", dir.display())]), daemon)
        .unwrap();
    drop(worker);

    // Log file and arguments first, then the daemon main on the detached thread.
    assert!(matches!(calls.recv(), Ok(Call::SetLogFile(_))));
    assert_eq!(calls.recv(), Ok(Call::SetArguments(Vec::new())));
    assert!(matches!(
        calls.recv_timeout(Duration::from_secs(5)),
        Ok(Call::DaemonMain { .. })
    ));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_joined_worker_reports_failure() {
    let dir = scratch_dir();
    let config = DaemonConfig {
        worker_thread_name: "daemon-under-test".to_string(),
        ..DaemonConfig::default()
    };
    let host = ServiceHost::new(config).unwrap();
    let (daemon, calls) = recording(true);

    let worker = host
        .start(&ServiceArgs::parse([format!("logpath={}", dir.display())]), daemon)
        .unwrap();

    assert!(matches!(worker.join(), Err(DaemonError::DaemonExit(2))));
    let thread = calls.try_iter().find_map(|call| match call {
        Call::DaemonMain { thread, .. } => thread,
        Call::SetLogFile(_) | Call::SetArguments(_) => None,
    });
    assert_eq!(thread.as_deref(), Some("daemon-under-test"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[cfg(unix)]
#[test]
fn test_process_daemon_receives_arguments_unsplit() {
    use std::os::unix::fs::PermissionsExt;

    let dir = scratch_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let received = dir.join("argv.txt");
    let script = dir.join("fake-daemon.sh");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\nfor a in \"$@\"; do printf '[%s]\\n' \"$a\"; done > '{}'\n",
            received.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let log_dir = dir.join("logs");
    let host = ServiceHost::new(DaemonConfig::default()).unwrap();
    let args = ServiceArgs::parse([
        format!("logpath={}", log_dir.display()),
        r"--config-file=C:\My Files\bus.conf".to_string(),
    ]);

    let worker = host.start(&args, ProcessDaemon::new(&script)).unwrap();
    let log_file = worker.log_file().to_path_buf();
    worker.join().unwrap();

    let argv = std::fs::read_to_string(&received).unwrap();
    assert_eq!(
        argv.lines().collect::<Vec<_>>(),
        vec![
            "[--log-file]".to_string(),
            format!("[{}]", log_file.display()),
            r"[--config-file=C:\My Files\bus.conf]".to_string(),
        ]
    );
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_config_file_loading() {
    let dir = scratch_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("daemon.toml");
    std::fs::write(
        &path,
        "daemon_program = \"/opt/bus/alljoyn-daemon\"\nprogram_name = \"BusService\"\n",
    )
    .unwrap();

    let config = DaemonConfig::load_from_file(&path).unwrap();
    assert_eq!(config.daemon_program, PathBuf::from("/opt/bus/alljoyn-daemon"));
    assert_eq!(config.program_name, "BusService");
    assert_eq!(config.log_file_prefix, "DaemonLog_");

    std::fs::write(&path, "program_name = \"\"\n").unwrap();
    assert!(matches!(
        DaemonConfig::load_from_file(&path),
        Err(DaemonError::Config(_))
    ));

    std::fs::write(&path, "program_name = [").unwrap();
    assert!(matches!(
        DaemonConfig::load_from_file(&path),
        Err(DaemonError::TomlParsing(_))
    ));
    std::fs::remove_dir_all(&dir).unwrap();
}
