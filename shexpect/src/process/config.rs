//! Process spawn configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How to launch the child process.
///
/// The command always runs through `shell -c`, so pipelines, redirections
/// and environment assignments work as they would at a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Command line handed to the shell.
    pub command: String,

    /// Attach the child to a pseudo-terminal (true) or to pipes (false).
    pub use_pty: bool,

    /// Shell used to interpret `command`.
    pub shell: PathBuf,

    /// Extra environment variables.
    pub env: Vec<(String, String)>,

    /// Value of `TERM` for the child; `None` leaves it inherited.
    ///
    /// Defaults to `dumb` so line editors do not emit bracketed-paste or
    /// colour sequences into the output.
    pub term: Option<String>,

    /// Terminal width and height set when the pty is allocated.
    pub terminal_size: (u16, u16),

    /// Appended by [`Session::sendline`](super::Session::sendline).
    pub linesep: String,
}

impl SpawnConfig {
    /// Configuration for `command` with default settings.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Use a pty (true) or pipes (false).
    pub fn with_pty(mut self, use_pty: bool) -> Self {
        self.use_pty = use_pty;
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the `TERM` value (`None` to inherit).
    pub fn with_term(mut self, term: Option<String>) -> Self {
        self.term = term;
        self
    }

    /// Set the line separator.
    pub fn with_linesep(mut self, linesep: impl Into<String>) -> Self {
        self.linesep = linesep.into();
        self
    }

    /// Set the initial terminal dimensions.
    pub fn with_terminal_size(mut self, width: u16, height: u16) -> Self {
        self.terminal_size = (width, height);
        self
    }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            use_pty: true,
            shell: PathBuf::from("/bin/sh"),
            env: Vec::new(),
            term: Some("dumb".to_string()),
            terminal_size: (511, 24),
            linesep: "\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SpawnConfig::new("bash -i");
        assert_eq!(config.command, "bash -i");
        assert!(config.use_pty);
        assert_eq!(config.shell, PathBuf::from("/bin/sh"));
        assert_eq!(config.term.as_deref(), Some("dumb"));
        assert_eq!(config.terminal_size, (511, 24));
        assert_eq!(config.linesep, "\n");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SpawnConfig =
            serde_json::from_str(r#"{"command": "cat", "use_pty": false}"#).unwrap();
        assert_eq!(config.command, "cat");
        assert!(!config.use_pty);
        assert_eq!(config.terminal_size, (511, 24));
    }
}
