//! Terminal mode of a shell session.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How command completion is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtyMode {
    /// The shell echoes input and prints a prompt; the prompt marks
    /// completion and exit statuses are queried with a status command.
    Tty,

    /// No prompt is visible; a marker command appended to every command
    /// marks completion and reports the exit status.
    NonTty,
}

impl TtyMode {
    pub fn is_tty(self) -> bool {
        self == TtyMode::Tty
    }
}

impl From<bool> for TtyMode {
    fn from(tty: bool) -> Self {
        if tty { TtyMode::Tty } else { TtyMode::NonTty }
    }
}

impl fmt::Display for TtyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtyMode::Tty => f.write_str("tty"),
            TtyMode::NonTty => f.write_str("non-tty"),
        }
    }
}
