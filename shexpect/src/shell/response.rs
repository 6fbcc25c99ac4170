//! Results of command execution.

use std::fmt;
use std::time::Duration;

/// Output and exit status of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The command that was executed.
    pub command: String,

    /// The command output (echo and trailing prompt removed).
    pub output: String,

    /// Exit status of the command.
    pub status: i32,

    /// Time taken, including the status query.
    pub elapsed: Duration,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Get the output lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }

    /// Check if the output contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.output.contains(pattern)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.output)
    }
}

/// Options of [`ShellSession::cmd`](super::ShellSession::cmd).
#[derive(Debug, Clone)]
pub struct CmdOptions {
    /// How long to wait for the command to finish (default: 60s).
    pub timeout: Duration,

    /// Exit statuses that count as success (default: `[0]`).
    pub ok_statuses: Vec<i32>,

    /// Return `None` instead of any error.
    pub ignore_all_errors: bool,
}

impl CmdOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ok_statuses(mut self, statuses: impl Into<Vec<i32>>) -> Self {
        self.ok_statuses = statuses.into();
        self
    }

    pub fn ignore_all_errors(mut self, ignore: bool) -> Self {
        self.ignore_all_errors = ignore;
        self
    }
}

impl Default for CmdOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            ok_statuses: vec![0],
            ignore_all_errors: false,
        }
    }
}
