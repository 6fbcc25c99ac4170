//! Builder for shell sessions.

use std::time::Duration;

use log::warn;
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::ShellSession;
use super::config::ShellConfig;
use crate::channel::{Expect, PatternList, Transport};
use crate::error::Result;
use crate::process::{Session, SpawnConfig};
use crate::sink::LogSink;

/// Builder for [`ShellSession`]s.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use shexpect::ShellSessionBuilder;
///
/// # async fn example() -> Result<(), shexpect::Error> {
/// let mut shell = ShellSessionBuilder::new("bash --norc -i")
///     .name("local")
///     .env("PS1", "$ ")
///     .responsive_timeout(Some(Duration::from_secs(2)))
///     .spawn()
///     .await?;
/// let output = shell.cmd_output("uname -s", Duration::from_secs(10)).await?;
/// # Ok(())
/// # }
/// ```
pub struct ShellSessionBuilder {
    spawn: SpawnConfig,
    shell: ShellConfig,
    sink: LogSink,
    rng: Option<Box<dyn RngCore + Send + Sync>>,
}

impl ShellSessionBuilder {
    /// Create a builder that will spawn `command` in a pty.
    pub fn new(command: impl Into<String>) -> Self {
        Self::from_config(SpawnConfig::new(command), ShellConfig::default())
    }

    /// Create a builder from complete configurations.
    pub fn from_config(spawn: SpawnConfig, shell: ShellConfig) -> Self {
        Self {
            spawn,
            shell,
            sink: LogSink::Disabled,
            rng: None,
        }
    }

    /// Attach the child to a pty (default) or to pipes.
    pub fn use_pty(mut self, use_pty: bool) -> Self {
        self.spawn.use_pty = use_pty;
        self
    }

    /// Add an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spawn.env.push((key.into(), value.into()));
        self
    }

    /// Set `TERM` for the child (`None` to inherit; default `dumb`).
    pub fn term(mut self, term: Option<String>) -> Self {
        self.spawn.term = term;
        self
    }

    /// Set terminal dimensions.
    pub fn terminal_size(mut self, width: u16, height: u16) -> Self {
        self.spawn.terminal_size = (width, height);
        self
    }

    /// Set the session name used in transcripts.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.shell.name = name.into();
        self
    }

    /// Set the line separator (default: `"\n"`).
    pub fn linesep(mut self, linesep: impl Into<String>) -> Self {
        let linesep = linesep.into();
        self.spawn.linesep = linesep.clone();
        self.shell.linesep = linesep;
        self
    }

    /// Set the prompt pattern used in tty mode.
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.shell.prompt = prompt.into();
        self
    }

    /// Set the status query command used in tty mode (default: `echo $?`).
    pub fn status_test_command(mut self, command: impl Into<String>) -> Self {
        self.shell.status_test_command = command.into();
        self
    }

    /// Start in tty (default) or non-tty mode.
    pub fn tty(mut self, tty: bool) -> Self {
        self.shell.tty = tty;
        self
    }

    /// Check responsiveness on start (`None` skips the check).
    pub fn responsive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shell.responsive_timeout = timeout;
        self
    }

    /// Set the per-read wait.
    pub fn internal_timeout(mut self, timeout: Duration) -> Self {
        self.shell.internal_timeout = timeout;
        self
    }

    /// Set how long to watch for process death after a failed match.
    pub fn termination_grace(mut self, grace: Duration) -> Self {
        self.shell.termination_grace = grace;
        self
    }

    /// Ignore terminal escape sequences in prompts and output.
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.shell.strip_ansi = strip;
        self
    }

    /// Allow `prefix` in front of the status on the non-tty marker line.
    pub fn sentinel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shell.sentinel_prefix = Some(prefix.into());
        self
    }

    /// Record the transcript in `sink`.
    pub fn sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    /// Draw marker tokens from `rng` instead of an entropy-seeded generator.
    pub fn rng<R>(mut self, rng: R) -> Self
    where
        R: RngCore + Send + Sync + 'static,
    {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Spawn the configured command and wrap it.
    pub async fn spawn(self) -> Result<ShellSession<Session>> {
        let session = Session::spawn_with(&self.spawn)?;
        self.attach(session).await
    }

    /// Wrap an existing transport.
    ///
    /// Runs the responsiveness check unless it is disabled; an unresponsive
    /// shell is logged, not treated as an error.
    pub async fn attach<T: Transport>(self, transport: T) -> Result<ShellSession<T>> {
        let prompt = PatternList::new([&self.shell.prompt])?;
        let expect = Expect::new(transport, self.shell.name.clone())
            .with_linesep(self.shell.linesep.clone())
            .with_sink(self.sink)
            .with_config(self.shell.expect_config());
        let rng = self
            .rng
            .unwrap_or_else(|| Box::new(StdRng::from_entropy()));

        let mut session = ShellSession::new(expect, prompt, &self.shell, rng);
        if let Some(timeout) = self.shell.responsive_timeout {
            if !session.set_tty(self.shell.tty, timeout).await? {
                warn!(
                    "{}: shell did not respond within {timeout:?}",
                    session.name()
                );
            }
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ShellError};
    use crate::shell::CmdOptions;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// An interactive `sh` in a pty with a predictable prompt.
    async fn interactive_sh() -> ShellSession<Session> {
        init_logging();
        let mut shell = ShellSessionBuilder::new("sh -i")
            .name("sh")
            .env("PS1", "$ ")
            .env("ENV", "")
            .responsive_timeout(Some(Duration::from_secs(5)))
            .spawn()
            .await
            .unwrap();
        // Let the prompt printed after the check arrive
        shell
            .read_nonblocking(Some(Duration::from_millis(200)), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        shell
    }

    #[tokio::test]
    async fn test_tty_roundtrip() {
        let mut shell = interactive_sh().await;
        assert!(shell.is_tty());

        let out = shell
            .cmd_output("echo hello", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out, "hello");

        let out = shell
            .cmd_output("printf 'a\\nb\\n'", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out, "a\nb");
    }

    #[tokio::test]
    async fn test_tty_statuses() {
        let mut shell = interactive_sh().await;

        let out = shell.cmd("true", &CmdOptions::default()).await.unwrap();
        assert_eq!(out.as_deref(), Some(""));

        assert_eq!(
            shell.cmd_status("false", Duration::from_secs(10)).await.unwrap(),
            1
        );

        let err = shell
            .cmd("(exit 7)", &CmdOptions::default())
            .await
            .unwrap_err();
        match err {
            Error::Shell(ShellError::Cmd { cmd, status, .. }) => {
                assert_eq!(cmd, "(exit 7)");
                assert_eq!(status, 7);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tty_interrupt() {
        let mut shell = interactive_sh().await;
        shell.sendline("sleep 30").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        shell.send_control('c').await.unwrap();
        shell.read_up_to_prompt(Duration::from_secs(10)).await.unwrap();

        let out = shell
            .cmd_output("echo back", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out, "back");
    }

    #[tokio::test]
    async fn test_killed_shell_is_process_terminated() {
        let mut shell = interactive_sh().await;
        let terminator = shell.terminator();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            terminator.terminate().unwrap();
        });

        let started = std::time::Instant::now();
        let err = shell
            .cmd_output("sleep 30", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_process_terminated(), "unexpected error: {err:?}");
        assert!(started.elapsed() < Duration::from_secs(8));
        assert!(!shell.is_alive());
    }

    #[tokio::test]
    async fn test_nontty_over_pipes() {
        init_logging();
        let mut shell = ShellSessionBuilder::new("sh")
            .use_pty(false)
            .tty(false)
            .responsive_timeout(None)
            .sink(LogSink::store())
            .spawn()
            .await
            .unwrap();

        let response = shell
            .cmd_status_output("echo hello; echo oops >&2", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(response.output, "hello\noops");
        assert_eq!(response.status, 0);

        assert_eq!(
            shell.cmd_status("(exit 3)", Duration::from_secs(10)).await.unwrap(),
            3
        );

        // Marker text with a different token is plain output
        let out = shell
            .cmd_output(
                "echo '0 --< END OF THE COMMAND xxxxxxxxxxxx >--'",
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        assert_eq!(out, "0 --< END OF THE COMMAND xxxxxxxxxxxx >--");

        let records = shell.log_records().unwrap();
        assert!(records.contains(">>: echo hello; echo oops >&2"));
        assert!(records.contains("<<: hello"));
    }

    #[tokio::test]
    async fn test_nontty_in_pty_is_responsive_twice() {
        let mut shell = interactive_sh().await;
        // No prompt, like a shell attached without a terminal
        shell.sendline("PS1=''").await.unwrap();
        let first = shell.set_tty(false, Duration::from_secs(5)).await.unwrap();
        let second = shell.set_tty(false, Duration::from_secs(5)).await.unwrap();
        assert!(first);
        assert_eq!(first, second);

        let out = shell
            .cmd_output("echo hello", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(out.contains("hello"), "output: {out:?}");
        assert!(!out.contains("END OF THE COMMAND"), "output: {out:?}");
    }
}
