//! Service argument handling
//!
//! The host receives a flat argument list. One `logpath=<dir>` argument names
//! the log directory; every other argument is forwarded to the daemon, in
//! order, behind the program-name token.

use std::path::PathBuf;

use tracing::warn;

const LOG_PATH_KEY: &str = "logpath=";

/// Arguments split into the log directory and the daemon's own arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceArgs {
    pub log_path: Option<PathBuf>,
    pub forwarded: Vec<String>,
}

impl ServiceArgs {
    /// Split `args`, matching the `logpath=` key case-insensitively
    ///
    /// The last `logpath=` argument wins. An empty or malformed value counts
    /// as no log path. Forwarded arguments are kept exactly as given.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Self::default();
        for arg in args {
            let arg = arg.as_ref();
            match log_path_value(arg.trim_start()) {
                Some(value) => parsed.log_path = clean_path(value),
                None => parsed.forwarded.push(arg.to_string()),
            }
        }
        parsed
    }

    /// Command line handed to the daemon entry point
    ///
    /// Joined with single spaces for display. It cannot be split back into
    /// `forwarded` when an argument contains whitespace.
    pub fn command_line(&self, program_name: &str) -> String {
        std::iter::once(program_name)
            .chain(self.forwarded.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn log_path_value(arg: &str) -> Option<&str> {
    let key = arg.get(..LOG_PATH_KEY.len())?;
    key.eq_ignore_ascii_case(LOG_PATH_KEY)
        .then(|| &arg[LOG_PATH_KEY.len()..])
}

fn clean_path(value: &str) -> Option<PathBuf> {
    let path = value.trim().trim_matches('"').trim();
    if path.is_empty() {
        return None;
    }
    // Quotes left inside the value mean it was not quoted as a whole.
    if path.contains('"') {
        warn!("Ignoring malformed log path {}", value);
        return None;
    }
    Some(PathBuf::from(path))
}
