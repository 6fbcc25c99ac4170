//! Error types for shexpect.
//!
//! Errors are layered the same way the crate is: process-level failures,
//! expect-level failures (no match before the deadline, child died) and
//! shell-level failures, which are expect failures re-mapped with the
//! command that was running. Every failure that happens while waiting for
//! output carries the output read so far.

use std::fmt;
use std::io;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use thiserror::Error;

/// Main error type for shexpect operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Process spawning, I/O and signal errors
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Pattern matching errors
    #[error("Expect error: {0}")]
    Expect(#[from] ExpectError),

    /// Shell command errors
    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl Error {
    /// Output read before the failure, when the failure happened while waiting.
    pub fn output(&self) -> Option<&str> {
        match self {
            Error::Expect(e) => Some(e.output()),
            Error::Shell(e) => Some(e.output()),
            _ => None,
        }
    }

    /// Whether this is a timeout at either the expect or the shell level.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Expect(ExpectError::Timeout { .. }) | Error::Shell(ShellError::Timeout { .. })
        )
    }

    /// Whether the child process terminated while it was being waited on.
    pub fn is_process_terminated(&self) -> bool {
        matches!(
            self,
            Error::Expect(ExpectError::ProcessTerminated { .. })
                | Error::Shell(ShellError::ProcessTerminated { .. })
        )
    }
}

/// Process driver errors (spawning, raw I/O, signals).
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The command to spawn was empty
    #[error("Incorrect command supplied: '{command}'")]
    EmptyCommand { command: String },

    /// The shell running the command could not be started
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// openpty() failed
    #[error("Failed to allocate PTY: {0}")]
    PtyAllocation(#[source] Errno),

    /// The character has no ctrl+<char> equivalent
    #[error("Unable to map {0:?} to a control character")]
    UnmappableControlChar(char),

    /// kill() failed
    #[error("Failed to send {signal:?} to pid {pid}: {source}")]
    Signal {
        signal: Signal,
        pid: i32,
        #[source]
        source: Errno,
    },

    /// I/O error on the pty master or a pipe
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Expect-level errors, raised while waiting for output to match.
#[derive(Error, Debug)]
pub enum ExpectError {
    /// No pattern matched before the deadline and the process is alive
    #[error("Timeout expired while looking for {}    (output: {output:?})", PatternsDisplay(.patterns))]
    Timeout {
        patterns: Vec<String>,
        output: String,
    },

    /// The process died while waiting for a match
    #[error(
        "Process terminated while looking for {}    (status: {},    output: {output:?})",
        PatternsDisplay(.patterns),
        StatusDisplay(.status)
    )]
    ProcessTerminated {
        patterns: Vec<String>,
        status: Option<i32>,
        output: String,
    },

    /// Neither a clean timeout nor a dead process (e.g. the endpoint closed
    /// while the process is still running)
    #[error("Unknown error occurred while looking for {}    (output: {output:?})", PatternsDisplay(.patterns))]
    Unknown {
        patterns: Vec<String>,
        output: String,
    },
}

impl ExpectError {
    /// The patterns that were being looked for.
    pub fn patterns(&self) -> &[String] {
        match self {
            ExpectError::Timeout { patterns, .. }
            | ExpectError::ProcessTerminated { patterns, .. }
            | ExpectError::Unknown { patterns, .. } => patterns,
        }
    }

    /// Everything read before the failure.
    pub fn output(&self) -> &str {
        match self {
            ExpectError::Timeout { output, .. }
            | ExpectError::ProcessTerminated { output, .. }
            | ExpectError::Unknown { output, .. } => output,
        }
    }

    /// Rewrite the accumulated output, keeping everything else.
    pub fn map_output<F>(self, f: F) -> Self
    where
        F: FnOnce(String) -> String,
    {
        match self {
            ExpectError::Timeout { patterns, output } => ExpectError::Timeout {
                patterns,
                output: f(output),
            },
            ExpectError::ProcessTerminated {
                patterns,
                status,
                output,
            } => ExpectError::ProcessTerminated {
                patterns,
                status,
                output: f(output),
            },
            ExpectError::Unknown { patterns, output } => ExpectError::Unknown {
                patterns,
                output: f(output),
            },
        }
    }

    /// Consume the error, keeping the accumulated output.
    pub fn into_output(self) -> String {
        match self {
            ExpectError::Timeout { output, .. }
            | ExpectError::ProcessTerminated { output, .. }
            | ExpectError::Unknown { output, .. } => output,
        }
    }
}

/// Shell-level errors, raised by command execution on a [`ShellSession`].
///
/// [`ShellSession`]: crate::shell::ShellSession
#[derive(Error, Debug)]
pub enum ShellError {
    /// Generic failure while executing a command
    #[error("Could not execute shell command {cmd:?}    (output: {output:?})")]
    Generic { cmd: String, output: String },

    /// The prompt did not come back in time
    #[error("Timeout expired while waiting for shell command to complete: {cmd:?}    (output: {output:?})")]
    Timeout { cmd: String, output: String },

    /// The shell process itself terminated
    #[error(
        "Shell process terminated while waiting for command to complete: {cmd:?}    (status: {},    output: {output:?})",
        StatusDisplay(.status)
    )]
    ProcessTerminated {
        cmd: String,
        status: Option<i32>,
        output: String,
    },

    /// The exit status of the command could not be obtained
    #[error("Could not get exit status of command: {cmd:?}    (output: {output:?})")]
    Status { cmd: String, output: String },

    /// The command exited with a status outside the accepted set
    #[error("Shell command failed: {cmd:?}    (status: {status},    output: {output:?})")]
    Cmd {
        cmd: String,
        status: i32,
        output: String,
    },
}

impl ShellError {
    /// Re-map an expect failure observed while running `cmd`.
    ///
    /// `output` replaces the raw output of the expect error, so callers can
    /// strip the echoed command first.
    pub fn from_expect(cmd: impl Into<String>, err: ExpectError, output: String) -> Self {
        let cmd = cmd.into();
        match err {
            ExpectError::Timeout { .. } => ShellError::Timeout { cmd, output },
            ExpectError::ProcessTerminated { status, .. } => {
                ShellError::ProcessTerminated { cmd, status, output }
            }
            ExpectError::Unknown { .. } => ShellError::Generic { cmd, output },
        }
    }

    /// The command that failed.
    pub fn command(&self) -> &str {
        match self {
            ShellError::Generic { cmd, .. }
            | ShellError::Timeout { cmd, .. }
            | ShellError::ProcessTerminated { cmd, .. }
            | ShellError::Status { cmd, .. }
            | ShellError::Cmd { cmd, .. } => cmd,
        }
    }

    /// Output obtained before the failure.
    pub fn output(&self) -> &str {
        match self {
            ShellError::Generic { output, .. }
            | ShellError::Timeout { output, .. }
            | ShellError::ProcessTerminated { output, .. }
            | ShellError::Status { output, .. }
            | ShellError::Cmd { output, .. } => output,
        }
    }

    /// Exit status, when one is known.
    pub fn status(&self) -> Option<i32> {
        match self {
            ShellError::ProcessTerminated { status, .. } => *status,
            ShellError::Cmd { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias using shexpect's Error.
pub type Result<T> = std::result::Result<T, Error>;

struct PatternsDisplay<'a>(&'a [String]);

impl fmt::Display for PatternsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [single] => write!(f, "pattern {single:?}"),
            many => write!(f, "patterns {many:?}"),
        }
    }
}

struct StatusDisplay<'a>(&'a Option<i32>);

impl fmt::Display for StatusDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(status) => write!(f, "{status}"),
            None => f.write_str("unknown"),
        }
    }
}
