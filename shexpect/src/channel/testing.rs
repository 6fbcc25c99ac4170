//! In-memory transports for tests.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use super::reader::NonBlockingRead;
use super::transport::Transport;
use crate::error::Result;

/// State a responder can change in reaction to input.
#[derive(Debug)]
pub(crate) struct Script {
    output: VecDeque<Bytes>,
    alive: bool,
    status: Option<i32>,
    eof: bool,
}

impl Script {
    /// Queue `data` to be read.
    pub fn emit(&mut self, data: impl AsRef<[u8]>) {
        let data = data.as_ref();
        if !data.is_empty() {
            self.output.push_back(Bytes::copy_from_slice(data));
        }
    }

    /// The fake process exits with `status`; pending output stays readable.
    pub fn exit(&mut self, status: i32) {
        self.alive = false;
        self.status = Some(status);
        self.eof = true;
    }
}

type Responder = Box<dyn FnMut(&str, &mut Script) + Send + Sync>;

/// A transport that replays queued chunks and answers input via a callback.
///
/// Each read returns one queued chunk. Once the queue is empty, reads wait
/// out their timeout and return nothing (or return at once after EOF).
pub(crate) struct ScriptedTransport {
    script: Script,
    responder: Option<Responder>,
    line: Vec<u8>,
    sent: Vec<u8>,
    read_delay: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Script {
                output: VecDeque::new(),
                alive: true,
                status: None,
                eof: false,
            },
            responder: None,
            line: Vec::new(),
            sent: Vec::new(),
            read_delay: Duration::ZERO,
        }
    }

    /// Queue chunks readable from the start.
    pub fn with_output<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        for chunk in chunks {
            self.script.emit(chunk);
        }
        self
    }

    /// Call `responder` with every complete line written to the transport.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&str, &mut Script) + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Delay each chunk by `delay`.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Start out as an exited process.
    pub fn exited(mut self, status: i32) -> Self {
        self.script.exit(status);
        self
    }

    /// Reach EOF while the process stays alive.
    pub fn with_eof(mut self) -> Self {
        self.script.eof = true;
        self
    }

    /// A minimal shell.
    ///
    /// Understands `echo`, `true`, `false`, `echo $?`, the exit status marker
    /// line and `hang`, after which nothing is answered any more (input is
    /// still echoed). `exit N` sets the status the
    /// way a subshell would; `logout N` ends the shell. With `tty` set it
    /// echoes input and prints a `$ ` prompt after every command.
    pub fn shell(tty: bool) -> Self {
        let mut last_status = 0;
        let mut hung = false;
        Self::new().with_responder(move |line, script| {
            if tty {
                script.emit(format!("{line}\r\n"));
            }
            if hung {
                return;
            }
            if let Some(marker) = status_marker(line) {
                script.emit(format!("\n{last_status} {marker}\n"));
                return;
            }
            let line = line.trim();
            let output = match line {
                "" => String::new(),
                "hang" => {
                    hung = true;
                    return;
                }
                "true" => {
                    last_status = 0;
                    String::new()
                }
                "false" => {
                    last_status = 1;
                    String::new()
                }
                "echo $?" => format!("{last_status}\r\n"),
                _ => {
                    if let Some(code) = line.strip_prefix("logout ") {
                        script.exit(code.trim().parse().unwrap_or(0));
                        return;
                    }
                    if let Some(code) = line.strip_prefix("exit ") {
                        last_status = code.trim().parse().unwrap_or(0);
                        String::new()
                    } else if let Some(text) = line.strip_prefix("echo ") {
                        last_status = 0;
                        format!("{}\r\n", text.trim_matches(['"', '\'']))
                    } else {
                        last_status = 127;
                        format!("sh: {line}: not found\r\n")
                    }
                }
            };
            script.emit(output);
            if tty {
                script.emit("$ ");
            }
        })
    }

    /// Everything written so far.
    pub fn sent(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }
}

/// The quoted marker of an exit status marker command, if `line` is one.
fn status_marker(line: &str) -> Option<&str> {
    line.strip_prefix("RET=$?; echo; echo \"$RET ")?
        .strip_suffix('"')
}

impl NonBlockingRead for ScriptedTransport {
    async fn try_read(&mut self, timeout: Duration) -> Result<Bytes> {
        if self.script.output.is_empty() || self.read_delay > timeout {
            if !self.script.eof {
                tokio::time::sleep(timeout).await;
            }
            return Ok(Bytes::new());
        }
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        Ok(self.script.output.pop_front().unwrap_or_default())
    }
}

impl Transport for ScriptedTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.sent.extend_from_slice(data);
        for &byte in data {
            if byte != b'\n' {
                self.line.push(byte);
                continue;
            }
            let line = String::from_utf8_lossy(&std::mem::take(&mut self.line)).into_owned();
            if let Some(responder) = self.responder.as_mut() {
                if self.script.alive {
                    responder(&line, &mut self.script);
                }
            }
        }
        Ok(data.len())
    }

    fn is_alive(&self) -> bool {
        self.script.alive
    }

    async fn exit_status(&self, _timeout: Duration) -> Option<i32> {
        self.script.status
    }

    fn at_eof(&self) -> bool {
        self.script.eof && self.script.output.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_shell_tty() {
        let mut shell = ScriptedTransport::shell(true);
        shell.send(b"echo hi\n").await.unwrap();
        let mut output = Vec::new();
        loop {
            let chunk = shell.try_read(Duration::from_millis(10)).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            output.extend_from_slice(&chunk);
        }
        assert_eq!(output, b"echo hi\r\nhi\r\n$ ");
        assert_eq!(shell.sent(), "echo hi\n");
    }

    #[tokio::test]
    async fn test_fake_shell_exit() {
        let mut shell = ScriptedTransport::shell(false);
        shell.send(b"logout 7\n").await.unwrap();
        assert!(!shell.is_alive());
        assert!(shell.at_eof());
        assert_eq!(shell.exit_status(Duration::ZERO).await, Some(7));
    }

    #[tokio::test]
    async fn test_fake_shell_hang() {
        let mut shell = ScriptedTransport::shell(true);
        shell.send(b"hang\necho hi\n").await.unwrap();
        let mut output = Vec::new();
        loop {
            let chunk = shell.try_read(Duration::from_millis(10)).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            output.extend_from_slice(&chunk);
        }
        assert_eq!(output, b"hang\r\necho hi\r\n");
    }

    /// The transport futures must be `Send` so sessions can move across tasks.
    #[test]
    fn test_transport_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScriptedTransport>();
    }

    #[test]
    fn test_status_marker() {
        assert_eq!(
            status_marker(r#"RET=$?; echo; echo "$RET --< END OF THE COMMAND abc >--""#),
            Some("--< END OF THE COMMAND abc >--")
        );
        assert_eq!(status_marker("echo hi"), None);
    }
}
