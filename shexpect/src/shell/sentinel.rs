//! The exit status marker used in non-tty mode.
//!
//! After each command the session sends
//!
//! ```text
//! RET=$?; echo; echo "$RET --< END OF THE COMMAND <token> >--"
//! ```
//!
//! and waits for a last line of the form `<status> --< END OF THE COMMAND
//! <token> >--`. The first `echo` puts the marker on a line of its own even
//! when the command's output does not end with a newline. The token is
//! random per command, so output that merely contains the marker text is
//! never mistaken for it.

use std::borrow::Cow;

use rand::Rng;
use rand::distributions::{Alphanumeric, Distribution};
use regex::Regex;

use crate::channel::PatternList;
use crate::error::Result;

/// Fixed text of every marker.
pub const MARKER_TEXT: &str = "END OF THE COMMAND";

/// Length of the random token.
pub const TOKEN_LEN: usize = 12;

/// Random alphanumeric token of [`TOKEN_LEN`] characters.
pub fn generate_token<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    (0..TOKEN_LEN)
        .map(|_| char::from(Alphanumeric.sample(rng)))
        .collect()
}

/// One marker command and the patterns recognising its output.
#[derive(Debug, Clone)]
pub struct Sentinel {
    token: String,
    marker: String,
    command: String,
    line: Regex,
    echo: Regex,
}

impl Sentinel {
    /// Build the marker for `token`.
    ///
    /// `prompt_prefix` is a pattern allowed (but not required) in front of
    /// the status, for shells that print something before it.
    pub fn new(token: impl Into<String>, prompt_prefix: Option<&str>) -> Result<Self> {
        let token = token.into();
        let marker = format!("--< {MARKER_TEXT} {token} >--");
        let command = format!("RET=$?; echo; echo \"$RET {marker}\"");
        let prefix = prompt_prefix
            .map(|p| format!("(?:{p})?"))
            .unwrap_or_default();
        let line = Regex::new(&format!(r"^{prefix}(\d*) {}\s*$", regex::escape(&marker)))?;
        let echo = Regex::new(&format!(r"{}\r?\n?", regex::escape(&command)))?;
        Ok(Self {
            token,
            marker,
            command,
            line,
            echo,
        })
    }

    /// A marker with a fresh token drawn from `rng`.
    pub fn generate<R>(rng: &mut R, prompt_prefix: Option<&str>) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        Self::new(generate_token(rng), prompt_prefix)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The `--< END OF THE COMMAND <token> >--` text.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The command line to send.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Patterns for the expect engine, to be matched against the last
    /// non-blank line.
    pub fn patterns(&self) -> PatternList {
        PatternList::from(self.line.clone())
    }

    /// Exit status reported on `line`.
    ///
    /// `None` when `line` is not this marker's output; `Some(None)` when it
    /// is but carries no status.
    pub fn parse_status(&self, line: &str) -> Option<Option<i32>> {
        let caps = self.line.captures(line)?;
        Some(caps.get(1).and_then(|m| m.as_str().parse().ok()))
    }

    /// Remove every echoed copy of the marker command from `output`.
    pub fn strip_command<'a>(&self, output: &'a str) -> Cow<'a, str> {
        self.echo.replace_all(output, "")
    }
}
