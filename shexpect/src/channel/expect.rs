//! The expect engine: send input, wait for output to match.

use std::time::Duration;

use log::{debug, trace};
use tokio::time::Instant;

use super::buffer::OutputBuffer;
use super::filter::{Identity, LastNonBlankLine, OutputFilter};
use super::patterns::PatternList;
use super::reader::read_nonblocking;
use super::transport::Transport;
use crate::error::{ExpectError, Result};
use crate::process::{Session, control_byte};
use crate::sink::{LogSink, RECEIVED, SENT};

/// Timing knobs of the expect engine.
#[derive(Debug, Clone)]
pub struct ExpectConfig {
    /// Per-read wait; a read that sees nothing for this long ends a burst.
    pub internal_timeout: Duration,

    /// How long to watch for the process dying after a failed match.
    pub termination_grace: Duration,

    /// Interval between liveness checks during `termination_grace`.
    pub grace_poll_interval: Duration,
}

impl Default for ExpectConfig {
    fn default() -> Self {
        Self {
            internal_timeout: Duration::from_millis(100),
            termination_grace: Duration::from_millis(500),
            grace_poll_interval: Duration::from_millis(50),
        }
    }
}

/// A successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Position of the matching pattern in the pattern list.
    pub index: usize,

    /// All output read during the call, untransformed.
    pub output: String,
}

/// Drives a [`Transport`]: writes input, accumulates output and matches it
/// against patterns, recording both directions in a [`LogSink`].
#[derive(Debug)]
pub struct Expect<T: Transport = Session> {
    transport: T,
    name: String,
    linesep: String,
    sink: LogSink,
    config: ExpectConfig,
}

impl<T: Transport> Expect<T> {
    /// Wrap `transport`; `name` labels transcript lines.
    pub fn new(transport: T, name: impl Into<String>) -> Self {
        Self {
            transport,
            name: name.into(),
            linesep: "\n".to_string(),
            sink: LogSink::Disabled,
            config: ExpectConfig::default(),
        }
    }

    /// Line separator appended by [`Expect::sendline`].
    pub fn with_linesep(mut self, linesep: impl Into<String>) -> Self {
        self.linesep = linesep.into();
        self
    }

    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_config(mut self, config: ExpectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn linesep(&self) -> &str {
        &self.linesep
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Replace the transcript sink.
    pub fn set_sink(&mut self, sink: LogSink) {
        self.sink = sink;
    }

    pub fn config(&self) -> &ExpectConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send `data` as is.
    pub async fn send(&mut self, data: &str) -> Result<usize> {
        self.sink.write(SENT, &self.name, data);
        self.transport.send(data.as_bytes()).await
    }

    /// Send `line` followed by the line separator.
    pub async fn sendline(&mut self, line: &str) -> Result<usize> {
        self.sink.write(SENT, &self.name, line);
        self.send_unlogged(line).await
    }

    /// Send `line` followed by the line separator, without recording it.
    pub(crate) async fn send_unlogged(&mut self, line: &str) -> Result<usize> {
        let mut data = String::with_capacity(line.len() + self.linesep.len());
        data.push_str(line);
        data.push_str(&self.linesep);
        self.transport.send(data.as_bytes()).await
    }

    /// Record `line` as sent without sending anything.
    pub(crate) fn log_sent(&self, line: &str) {
        self.sink.write(SENT, &self.name, line);
    }

    /// Send ctrl+`c`.
    pub async fn send_control(&mut self, c: char) -> Result<usize> {
        let byte = control_byte(c)?;
        self.sink
            .write(SENT, &self.name, &format!("^{}", c.to_ascii_uppercase()));
        self.transport.send(&[byte]).await
    }

    /// Read a burst of output.
    ///
    /// `internal_timeout` defaults to the configured one. Without `timeout`
    /// a single read is made.
    pub async fn read_nonblocking(
        &mut self,
        internal_timeout: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let internal = internal_timeout.unwrap_or(self.config.internal_timeout);
        let data = read_nonblocking(&mut self.transport, internal, timeout).await?;
        let text = String::from_utf8_lossy(&data).into_owned();
        self.sink.write(RECEIVED, &self.name, &text);
        Ok(text)
    }

    /// Read until one of `patterns` matches `filter` applied to everything
    /// read so far.
    ///
    /// Fails with [`ExpectError::ProcessTerminated`] when the process dies
    /// first, [`ExpectError::Timeout`] when `timeout` passes with the process
    /// alive, and [`ExpectError::Unknown`] when output ends while the process
    /// is still running.
    pub async fn read_until_matches<F>(
        &mut self,
        patterns: &PatternList,
        filter: &F,
        timeout: Duration,
        internal_timeout: Option<Duration>,
    ) -> Result<Match>
    where
        F: OutputFilter + ?Sized,
    {
        let internal = internal_timeout.unwrap_or(self.config.internal_timeout);
        let deadline = Instant::now() + timeout;
        let mut buffer = OutputBuffer::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let data =
                read_nonblocking(&mut self.transport, internal.min(remaining), Some(remaining))
                    .await?;

            if !data.is_empty() {
                self.sink
                    .write(RECEIVED, &self.name, &String::from_utf8_lossy(&data));
                buffer.extend(&data);
            }

            {
                let text = buffer.as_str_lossy();
                if let Some(index) = patterns.first_match(&filter.apply(&text)) {
                    trace!("{}: matched {:?}", self.name, patterns.sources()[index]);
                    return Ok(Match {
                        index,
                        output: text.into_owned(),
                    });
                }
            }

            if self.transport.at_eof() || Instant::now() >= deadline {
                break;
            }
            if data.is_empty() {
                tokio::task::yield_now().await;
            }
        }

        Err(self.classify_failure(patterns, buffer.into_string()).await.into())
    }

    /// Read until the last non-blank line of the output matches one of
    /// `patterns`.
    pub async fn read_until_last_line_matches(
        &mut self,
        patterns: &PatternList,
        timeout: Duration,
        internal_timeout: Option<Duration>,
    ) -> Result<Match> {
        self.read_until_matches(patterns, &LastNonBlankLine, timeout, internal_timeout)
            .await
    }

    /// Read until one of `patterns` matches anywhere in the output.
    pub async fn read_until_output_matches(
        &mut self,
        patterns: &PatternList,
        timeout: Duration,
    ) -> Result<Match> {
        self.read_until_matches(patterns, &Identity, timeout, None).await
    }

    /// Work out why a match failed.
    ///
    /// Gives the process a moment to be reaped, so one that exited just
    /// before the deadline is reported as terminated rather than timed out.
    async fn classify_failure(&self, patterns: &PatternList, output: String) -> ExpectError {
        let patterns = patterns.sources().to_vec();
        let grace_deadline = Instant::now() + self.config.termination_grace;

        loop {
            if !self.transport.is_alive() {
                let status = self
                    .transport
                    .exit_status(self.config.termination_grace)
                    .await;
                debug!("{}: process terminated (status {status:?})", self.name);
                return ExpectError::ProcessTerminated {
                    patterns,
                    status,
                    output,
                };
            }
            let now = Instant::now();
            if now >= grace_deadline {
                break;
            }
            tokio::time::sleep(self.config.grace_poll_interval.min(grace_deadline - now)).await;
        }

        if self.transport.at_eof() {
            debug!("{}: output ended but the process is alive", self.name);
            ExpectError::Unknown { patterns, output }
        } else {
            ExpectError::Timeout { patterns, output }
        }
    }

    /// Whether the process is still running.
    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Wait up to `timeout` for the process's exit status.
    pub async fn get_status(&self, timeout: Duration) -> Option<i32> {
        self.transport.exit_status(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::ScriptedTransport;
    use crate::error::Error;

    fn expect(transport: ScriptedTransport) -> Expect<ScriptedTransport> {
        Expect::new(transport, "test").with_config(ExpectConfig {
            internal_timeout: Duration::from_millis(10),
            termination_grace: Duration::from_millis(50),
            grace_poll_interval: Duration::from_millis(10),
        })
    }

    #[tokio::test]
    async fn test_first_pattern_by_index_wins() {
        let mut session = expect(ScriptedTransport::new().with_output(["foo bar"]));
        let patterns = PatternList::new(["bar", "foo"]).unwrap();
        let m = session
            .read_until_output_matches(&patterns, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.output, "foo bar");
    }

    #[tokio::test]
    async fn test_match_across_chunks() {
        let transport = ScriptedTransport::new().with_output(["out", "put\nus", "er$ "]);
        let mut session = expect(transport);
        let patterns = PatternList::new([r"\$\s*$"]).unwrap();
        let m = session
            .read_until_last_line_matches(&patterns, Duration::from_secs(1), None)
            .await
            .unwrap();
        assert_eq!(m.output, "output\nuser$ ");
    }

    #[tokio::test]
    async fn test_last_line_ignores_earlier_matches() {
        let transport = ScriptedTransport::new().with_output(["a $\nstill running\n"]);
        let mut session = expect(transport);
        let patterns = PatternList::new([r"\$\s*$"]).unwrap();
        let err = session
            .read_until_last_line_matches(&patterns, Duration::from_millis(100), None)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.output(), Some("a $\nstill running\n"));
    }

    #[tokio::test]
    async fn test_timeout_carries_output() {
        let mut session = expect(ScriptedTransport::new().with_output(["partial"]));
        let patterns = PatternList::new(["never"]).unwrap();
        let started = std::time::Instant::now();
        let err = session
            .read_until_output_matches(&patterns, Duration::from_millis(200))
            .await
            .unwrap_err();
        match err {
            Error::Expect(ExpectError::Timeout { patterns, output }) => {
                assert_eq!(patterns, ["never"]);
                assert_eq!(output, "partial");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_dead_process_reports_status() {
        let transport = ScriptedTransport::new()
            .with_output(["bye\n"])
            .exited(3);
        let mut session = expect(transport);
        let patterns = PatternList::new(["never"]).unwrap();
        let err = session
            .read_until_output_matches(&patterns, Duration::from_secs(10))
            .await
            .unwrap_err();
        match err {
            Error::Expect(ExpectError::ProcessTerminated { status, output, .. }) => {
                assert_eq!(status, Some(3));
                assert_eq!(output, "bye\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_eof_with_live_process_is_unknown() {
        let mut session = expect(ScriptedTransport::new().with_eof());
        let patterns = PatternList::new(["never"]).unwrap();
        let started = std::time::Instant::now();
        let err = session
            .read_until_output_matches(&patterns, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Expect(ExpectError::Unknown { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_custom_filter() {
        let transport = ScriptedTransport::new().with_output(["HELLO"]);
        let mut session = expect(transport);
        let patterns = PatternList::new(["^hello$"]).unwrap();
        let lower = |s: &str| s.to_lowercase();
        let m = session
            .read_until_matches(&patterns, &lower, Duration::from_secs(1), None)
            .await
            .unwrap();
        assert_eq!(m.output, "HELLO");
    }

    #[tokio::test]
    async fn test_transcript() {
        let transport = ScriptedTransport::shell(true);
        let mut session = expect(transport)
            .with_linesep("\n")
            .with_sink(LogSink::store());
        session.sendline("echo hi").await.unwrap();
        session.send_control('c').await.unwrap();
        let out = session
            .read_nonblocking(None, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(out, "echo hi\r\nhi\r\n$ ");
        assert_eq!(
            session.sink().records().unwrap(),
            ">>test: echo hi\n>>test: ^C\n<<test: echo hi\n<<test: hi\n<<test: $ "
        );
        assert_eq!(session.transport().sent(), "echo hi\n\x03");
    }

    #[tokio::test]
    async fn test_sendline_uses_linesep() {
        let mut session = expect(ScriptedTransport::new()).with_linesep("\r\n");
        session.sendline("ls").await.unwrap();
        assert_eq!(session.transport().sent(), "ls\r\n");
    }
}
