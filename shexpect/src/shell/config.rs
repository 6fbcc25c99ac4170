//! Shell session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::ExpectConfig;

/// Default prompt: a line ending in `#` or `$`, maybe followed by whitespace.
pub const DEFAULT_PROMPT: &str = r"[\#\$]\s*$";

/// Default command printing the last exit status in tty mode.
pub const DEFAULT_STATUS_COMMAND: &str = "echo $?";

/// Behaviour of a [`ShellSession`](super::ShellSession).
///
/// Durations are (de)serialized as fractional seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Label used in transcript lines.
    pub name: String,

    /// Appended to every line sent.
    pub linesep: String,

    /// Regular expression matching the prompt line in tty mode.
    pub prompt: String,

    /// Command printing the last exit status in tty mode.
    pub status_test_command: String,

    /// Start in tty mode.
    pub tty: bool,

    /// Check responsiveness on start; `None` skips the check.
    #[serde(with = "opt_seconds")]
    pub responsive_timeout: Option<Duration>,

    /// Per-read wait; see [`ExpectConfig::internal_timeout`].
    #[serde(with = "seconds")]
    pub internal_timeout: Duration,

    /// See [`ExpectConfig::termination_grace`].
    #[serde(with = "seconds")]
    pub termination_grace: Duration,

    /// Ignore terminal escape sequences when looking for the prompt, and
    /// remove them from command output.
    pub strip_ansi: bool,

    /// Pattern that may precede the status on the non-tty marker line.
    pub sentinel_prefix: Option<String>,
}

impl ShellConfig {
    pub(crate) fn expect_config(&self) -> ExpectConfig {
        ExpectConfig {
            internal_timeout: self.internal_timeout,
            termination_grace: self.termination_grace,
            ..ExpectConfig::default()
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        let expect = ExpectConfig::default();
        Self {
            name: String::new(),
            linesep: "\n".to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            status_test_command: DEFAULT_STATUS_COMMAND.to_string(),
            tty: true,
            responsive_timeout: Some(Duration::from_secs(5)),
            internal_timeout: expect.internal_timeout,
            termination_grace: expect.termination_grace,
            strip_ansi: false,
            sentinel_prefix: None,
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

mod opt_seconds {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}
