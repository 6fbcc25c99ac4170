//! Command execution on an interactive shell.
//!
//! A [`ShellSession`] sends commands to a shell and decides when each one
//! has finished. In [`TtyMode::Tty`] the shell's prompt marks completion and
//! the exit status is queried with a status command (`echo $?`). In
//! [`TtyMode::NonTty`] there is no prompt to wait for, so an exit status
//! marker (see [`Sentinel`]) is sent after every command instead; its output
//! both marks completion and carries the status.

mod builder;
mod config;
mod mode;
mod output;
mod response;
mod sentinel;

use std::fmt;
use std::time::Duration;

use log::debug;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

pub use builder::ShellSessionBuilder;
pub use config::{DEFAULT_PROMPT, DEFAULT_STATUS_COMMAND, ShellConfig};
pub use mode::TtyMode;
pub use output::{first_status_line, normalize_output, strip_command_echo, strip_last_non_blank_line};
pub use response::{CmdOptions, Response};
pub use sentinel::{MARKER_TEXT, Sentinel, TOKEN_LEN, generate_token};

use crate::channel::{
    Expect, LastNonBlankLine, OutputFilter, PatternList, StripAnsi, Transport, last_non_blank_line,
};
use crate::error::{Error, Result, ShellError};
use crate::process::{ChildProcess, Session, Terminator};
use crate::sink::LogSink;

/// How long the tty status query may take.
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between reads while probing for responsiveness.
const RESPONSIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Transcript text standing in for secrets.
const HIDDEN: &str = "********";

/// An interactive shell driven command by command.
///
/// Commands must not contain newlines, and one command must finish before
/// the next is sent.
pub struct ShellSession<T: Transport = Session> {
    expect: Expect<T>,
    mode: TtyMode,
    prompt: PatternList,
    status_test_command: String,
    sentinel_prefix: Option<String>,
    strip_ansi: bool,
    last_status: Option<i32>,
    rng: Box<dyn RngCore + Send + Sync>,
}

impl<T: Transport> ShellSession<T> {
    pub(crate) fn new(
        expect: Expect<T>,
        prompt: PatternList,
        config: &ShellConfig,
        rng: Box<dyn RngCore + Send + Sync>,
    ) -> Self {
        Self {
            expect,
            mode: TtyMode::from(config.tty),
            prompt,
            status_test_command: config.status_test_command.clone(),
            sentinel_prefix: config.sentinel_prefix.clone(),
            strip_ansi: config.strip_ansi,
            last_status: None,
            rng,
        }
    }

    pub fn name(&self) -> &str {
        self.expect.name()
    }

    pub fn linesep(&self) -> &str {
        self.expect.linesep()
    }

    pub fn mode(&self) -> TtyMode {
        self.mode
    }

    pub fn is_tty(&self) -> bool {
        self.mode.is_tty()
    }

    /// The tty prompt pattern.
    pub fn prompt(&self) -> &str {
        self.prompt.sources().first().map_or("", String::as_str)
    }

    /// Replace the tty prompt pattern.
    pub fn set_prompt(&mut self, prompt: &str) -> Result<()> {
        self.prompt = PatternList::new([prompt])?;
        Ok(())
    }

    pub fn status_test_command(&self) -> &str {
        &self.status_test_command
    }

    pub fn set_status_test_command(&mut self, command: impl Into<String>) {
        self.status_test_command = command.into();
    }

    /// The underlying expect engine.
    pub fn expect(&self) -> &Expect<T> {
        &self.expect
    }

    pub fn expect_mut(&mut self) -> &mut Expect<T> {
        &mut self.expect
    }

    pub fn transport(&self) -> &T {
        self.expect.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.expect.transport_mut()
    }

    pub fn set_sink(&mut self, sink: LogSink) {
        self.expect.set_sink(sink);
    }

    /// Stored transcript, when the sink is a [`LogSink::Store`].
    pub fn log_records(&self) -> Option<String> {
        self.expect.sink().records()
    }

    /// Send `data` as is.
    pub async fn send(&mut self, data: &str) -> Result<usize> {
        self.expect.send(data).await
    }

    /// Send `line` followed by the line separator.
    pub async fn sendline(&mut self, line: &str) -> Result<usize> {
        self.expect.sendline(line).await
    }

    /// Send a secret line; the transcript shows it masked.
    pub async fn sendline_secret(&mut self, secret: &SecretString) -> Result<usize> {
        self.expect.log_sent(HIDDEN);
        self.expect.send_unlogged(secret.expose_secret()).await
    }

    /// Send ctrl+`c`.
    pub async fn send_control(&mut self, c: char) -> Result<usize> {
        self.expect.send_control(c).await
    }

    /// Read a burst of output; see [`Expect::read_nonblocking`].
    pub async fn read_nonblocking(
        &mut self,
        internal_timeout: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<String> {
        self.expect.read_nonblocking(internal_timeout, timeout).await
    }

    pub fn is_alive(&self) -> bool {
        self.expect.is_alive()
    }

    /// Wait up to `timeout` for the shell's exit status.
    pub async fn get_status(&self, timeout: Duration) -> Option<i32> {
        self.expect.get_status(timeout).await
    }

    /// Switch between tty and non-tty mode, then check responsiveness.
    ///
    /// A `false` result means input sent meanwhile may have been dropped.
    pub async fn set_tty(&mut self, tty: bool, timeout: Duration) -> Result<bool> {
        self.mode = TtyMode::from(tty);
        debug!("{}: switched to {} mode", self.name(), self.mode);
        self.is_responsive(timeout).await
    }

    /// Whether the shell answers a bare newline within `timeout`.
    ///
    /// Pending output is drained first, so only output caused by the newline
    /// counts.
    pub async fn is_responsive(&mut self, timeout: Duration) -> Result<bool> {
        self.expect
            .read_nonblocking(Some(Duration::ZERO), Some(timeout))
            .await?;
        self.expect.sendline("").await?;

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(RESPONSIVE_POLL_INTERVAL.min(deadline - now)).await;

            let remaining = deadline.saturating_duration_since(Instant::now());
            let output = self
                .expect
                .read_nonblocking(Some(Duration::ZERO), Some(remaining))
                .await?;
            if !output.is_empty() {
                return Ok(true);
            }
        }
    }

    /// Read until the shell is ready for the next command.
    ///
    /// Returns everything read, including the prompt or status marker line.
    pub async fn read_up_to_prompt(&mut self, timeout: Duration) -> Result<String> {
        match self.mode {
            TtyMode::Tty => self.read_up_to_prompt_tty(timeout).await,
            TtyMode::NonTty => self.read_up_to_prompt_nontty(timeout).await,
        }
    }

    async fn read_up_to_prompt_tty(&mut self, timeout: Duration) -> Result<String> {
        let prompt = self.prompt.clone();
        self.read_until_last_line(&prompt, timeout).await
    }

    async fn read_up_to_prompt_nontty(&mut self, timeout: Duration) -> Result<String> {
        let sentinel = Sentinel::generate(&mut *self.rng, self.sentinel_prefix.as_deref())?;
        self.expect.sendline(sentinel.command()).await?;

        let output = self
            .read_until_last_line(&sentinel.patterns(), timeout)
            .await
            .map_err(|e| map_expect_output(e, |o| sentinel.strip_command(&o).into_owned()))?;
        self.last_status = sentinel
            .parse_status(last_non_blank_line(&output))
            .flatten();
        Ok(sentinel.strip_command(&output).into_owned())
    }

    async fn read_until_last_line(
        &mut self,
        patterns: &PatternList,
        timeout: Duration,
    ) -> Result<String> {
        if self.strip_ansi {
            let filter = StripAnsi.then(LastNonBlankLine);
            let m = self
                .expect
                .read_until_matches(patterns, &filter, timeout, None)
                .await
                .map_err(|e| map_expect_output(e, |o| StripAnsi.apply(&o).into_owned()))?;
            Ok(StripAnsi.apply(&m.output).into_owned())
        } else {
            let m = self
                .expect
                .read_until_last_line_matches(patterns, timeout, None)
                .await?;
            Ok(m.output)
        }
    }

    /// Run `cmd` and return its output.
    ///
    /// The echoed command and the trailing prompt are removed, `\r\n` is
    /// converted to `\n` and trailing line terminators are dropped.
    pub async fn cmd_output(&mut self, cmd: &str, timeout: Duration) -> Result<String> {
        self.expect
            .read_nonblocking(Some(Duration::ZERO), Some(timeout))
            .await?;
        self.expect.sendline(cmd).await?;

        let output = match self.read_up_to_prompt(timeout).await {
            Ok(output) => output,
            Err(Error::Expect(e)) => {
                let output = strip_command_echo(e.output(), cmd).to_string();
                return Err(ShellError::from_expect(cmd, e, output).into());
            }
            Err(e) => return Err(e),
        };

        Ok(normalize_output(strip_last_non_blank_line(
            strip_command_echo(&output, cmd),
        )))
    }

    /// Exit status of the last command.
    ///
    /// In tty mode this runs the status command; in non-tty mode it returns
    /// the status carried by the last marker line.
    pub async fn get_last_status(&mut self) -> Result<i32> {
        match self.mode {
            TtyMode::Tty => {
                let cmd = self.status_test_command.clone();
                let output = self.cmd_output(&cmd, STATUS_TIMEOUT).await?;
                first_status_line(&output)
                    .ok_or_else(|| ShellError::Generic { cmd, output }.into())
            }
            TtyMode::NonTty => self.last_status.ok_or_else(|| {
                ShellError::Generic {
                    cmd: "$?".to_string(),
                    output: String::new(),
                }
                .into()
            }),
        }
    }

    /// Run `cmd` and return its output together with its exit status.
    ///
    /// Fails with [`ShellError::Status`] when the output was obtained but the
    /// status could not be.
    pub async fn cmd_status_output(&mut self, cmd: &str, timeout: Duration) -> Result<Response> {
        let start = Instant::now();
        let output = self.cmd_output(cmd, timeout).await?;
        let status = match self.get_last_status().await {
            Ok(status) => status,
            Err(Error::Shell(e)) => {
                debug!("{}: no exit status for {cmd:?}: {e}", self.name());
                return Err(ShellError::Status {
                    cmd: cmd.to_string(),
                    output,
                }
                .into());
            }
            Err(e) => return Err(e),
        };

        Ok(Response {
            command: cmd.to_string(),
            output,
            status,
            elapsed: start.elapsed(),
        })
    }

    /// Run `cmd` and return its exit status.
    pub async fn cmd_status(&mut self, cmd: &str, timeout: Duration) -> Result<i32> {
        Ok(self.cmd_status_output(cmd, timeout).await?.status)
    }

    /// Run `cmd`, failing with [`ShellError::Cmd`] unless its status is one
    /// of `options.ok_statuses`.
    ///
    /// With `options.ignore_all_errors` every error becomes `Ok(None)`.
    pub async fn cmd(&mut self, cmd: &str, options: &CmdOptions) -> Result<Option<String>> {
        let result = match self.cmd_status_output(cmd, options.timeout).await {
            Ok(response) if options.ok_statuses.contains(&response.status) => Ok(response.output),
            Ok(response) => Err(ShellError::Cmd {
                cmd: response.command,
                status: response.status,
                output: response.output,
            }
            .into()),
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => Ok(Some(output)),
            Err(e) if options.ignore_all_errors => {
                debug!("{}: ignoring error: {e}", self.name());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Rewrite the output carried by an expect-level error.
fn map_expect_output<F>(err: Error, f: F) -> Error
where
    F: FnOnce(String) -> String,
{
    match err {
        Error::Expect(e) => Error::Expect(e.map_output(f)),
        other => other,
    }
}

impl ShellSession<Session> {
    /// Terminate the shell process.
    pub fn terminate(&self) -> Result<()> {
        self.transport().terminate()
    }

    /// Handle that can terminate the shell from another task or thread.
    pub fn terminator(&self) -> Terminator {
        self.transport().terminator()
    }

    /// OS process id of the shell.
    pub fn pid(&self) -> u32 {
        self.transport().pid()
    }

    /// Direct children of the shell accepted by `filter`.
    pub fn child_pids<F>(&self, filter: F) -> Result<Vec<ChildProcess>>
    where
        F: Fn(&ChildProcess) -> bool,
    {
        self.transport().child_pids_filtered(filter)
    }
}

impl<T: Transport> fmt::Debug for ShellSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellSession")
            .field("name", &self.name())
            .field("mode", &self.mode)
            .field("prompt", &self.prompt())
            .field("last_status", &self.last_status)
            .finish_non_exhaustive()
    }
}
