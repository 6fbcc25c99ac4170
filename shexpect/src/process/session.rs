//! A spawned child process and its pty or pipe endpoint.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use log::{debug, trace, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc;
use nix::pty::{OpenptyResult, Winsize, openpty};
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::{Pid, pipe2, setsid};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;

use super::children::{ChildProcess, children_of, process_tree};
use super::config::SpawnConfig;
use super::control::control_byte;
use super::fd::{FdStream, set_cloexec};
use crate::channel::{NonBlockingRead, Transport};
use crate::error::{ProcessError, Result};

/// Bytes requested from the endpoint per read.
const READ_CHUNK: usize = 1024;

/// Interval between exit status checks in [`Session::get_status`].
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A child process attached to a pseudo-terminal or to pipes.
///
/// The session exclusively owns the endpoint descriptors and the child.
/// Dropping it terminates the child.
///
/// # Example
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use shexpect::process::Session;
/// # async fn example() -> Result<(), shexpect::Error> {
/// let mut session = Session::spawn("cat", true)?;
/// session.sendline("hello").await?;
/// session.send_control('d').await?;
/// let status = session.get_status(Duration::from_secs(5)).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session {
    reader: FdStream,
    writer: FdStream,
    terminator: Terminator,
    pid: u32,
    command: String,
    use_pty: bool,
    linesep: String,
    started_at: SystemTime,
    started: Instant,
    eof: bool,
}

impl Session {
    /// Spawn `command` through `/bin/sh -c` with default settings.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(command: &str, use_pty: bool) -> Result<Self> {
        Self::spawn_with(&SpawnConfig::new(command).with_pty(use_pty))
    }

    /// Spawn a child as described by `config`.
    pub fn spawn_with(config: &SpawnConfig) -> Result<Self> {
        if config.command.trim().is_empty() {
            return Err(ProcessError::EmptyCommand {
                command: config.command.clone(),
            }
            .into());
        }

        let mut cmd = Command::new(&config.shell);
        cmd.arg("-c").arg(&config.command);
        if let Some(term) = &config.term {
            cmd.env("TERM", term);
        }
        cmd.envs(config.env.iter().map(|(k, v)| (k, v)));

        // Either way the child leads its own process group, so signals can
        // reach everything it starts
        let (reader, writer) = if config.use_pty {
            attach_pty(&mut cmd, config.terminal_size)?
        } else {
            cmd.process_group(0);
            attach_pipes(&mut cmd)?
        };

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: config.command.clone(),
            source,
        })?;
        // The command still holds the child's ends; closing them lets EOF
        // reach us once the child exits.
        drop(cmd);

        let pid = child.id().unwrap_or_default();
        debug!(
            "Spawned {:?} (pid {pid}, {})",
            config.command,
            if config.use_pty { "pty" } else { "pipes" }
        );

        Ok(Self {
            reader: FdStream::new(reader).map_err(ProcessError::Io)?,
            writer: FdStream::new(writer).map_err(ProcessError::Io)?,
            terminator: Terminator::new(child, pid),
            pid,
            command: config.command.clone(),
            use_pty: config.use_pty,
            linesep: config.linesep.clone(),
            started_at: SystemTime::now(),
            started: Instant::now(),
            eof: false,
        })
    }

    /// Write all of `data` to the child, returning the number of bytes written.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize> {
        let written = write_fully(&mut self.writer, data)
            .await
            .map_err(ProcessError::Io)?;
        trace!("pid {}: sent {} bytes", self.pid, written);
        Ok(written)
    }

    /// Write `line` followed by the line separator.
    pub async fn sendline(&mut self, line: &str) -> Result<usize> {
        let mut data = String::with_capacity(line.len() + self.linesep.len());
        data.push_str(line);
        data.push_str(&self.linesep);
        self.send(data.as_bytes()).await
    }

    /// Send the control character for `c` (`'c'` sends ctrl+C).
    pub async fn send_control(&mut self, c: char) -> Result<usize> {
        let byte = control_byte(c)?;
        self.send(&[byte]).await
    }

    /// Terminate the child and every process it started.
    ///
    /// See [`Terminator::terminate`].
    pub fn terminate(&self) -> Result<()> {
        self.terminator.terminate()
    }

    /// Deliver `signal` to the child's process group if the child is still
    /// alive.
    pub fn kill(&self, signal: Signal) -> Result<()> {
        self.terminator.kill(signal)
    }

    /// Whether the child is still running.
    pub fn is_alive(&self) -> bool {
        self.terminator.is_alive()
    }

    /// Wait up to `timeout` for the child to exit and return its exit code.
    pub async fn get_status(&self, timeout: Duration) -> Option<i32> {
        self.terminator.get_status(timeout).await
    }

    /// Handle that can terminate the child from another task or thread.
    pub fn terminator(&self) -> Terminator {
        self.terminator.clone()
    }

    /// Direct children of the spawned process.
    pub fn child_pids(&self) -> Result<Vec<ChildProcess>> {
        self.child_pids_filtered(|_| true)
    }

    /// Direct children of the spawned process accepted by `filter`.
    pub fn child_pids_filtered<F>(&self, filter: F) -> Result<Vec<ChildProcess>>
    where
        F: Fn(&ChildProcess) -> bool,
    {
        let mut children = children_of(self.pid).map_err(ProcessError::Io)?;
        children.retain(|c| filter(c));
        Ok(children)
    }

    /// OS process id of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The command line the child was spawned with.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Line separator appended by [`Session::sendline`].
    pub fn linesep(&self) -> &str {
        &self.linesep
    }

    /// Whether the child is attached to a pseudo-terminal.
    pub fn uses_pty(&self) -> bool {
        self.use_pty
    }

    /// Wall-clock time the child was spawned.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Time since the child was spawned.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the endpoint has reported end-of-file.
    pub fn at_eof(&self) -> bool {
        self.eof
    }
}

impl NonBlockingRead for Session {
    async fn try_read(&mut self, timeout: Duration) -> Result<Bytes> {
        if self.eof {
            return Ok(Bytes::new());
        }

        let mut buf = vec![0u8; READ_CHUNK];
        let n = match self.reader.read_now(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if timeout.is_zero() {
                    return Ok(Bytes::new());
                }
                match tokio::time::timeout(timeout, self.reader.read(&mut buf)).await {
                    Ok(read) => read.map_err(ProcessError::Io)?,
                    Err(_) => return Ok(Bytes::new()),
                }
            }
            Err(e) => return Err(ProcessError::Io(e).into()),
        };

        if n == 0 {
            debug!("pid {}: end of output", self.pid);
            self.eof = true;
            return Ok(Bytes::new());
        }
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }
}

impl Transport for Session {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        Session::send(self, data).await
    }

    fn is_alive(&self) -> bool {
        Session::is_alive(self)
    }

    async fn exit_status(&self, timeout: Duration) -> Option<i32> {
        self.get_status(timeout).await
    }

    fn at_eof(&self) -> bool {
        self.eof
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.terminator.terminate() {
            warn!("Failed to terminate pid {}: {e}", self.pid);
        }
    }
}

/// Cloneable handle to a session's child process.
///
/// Safe to use from a different thread than the one reading the session.
#[derive(Debug, Clone)]
pub struct Terminator {
    state: Arc<Mutex<ChildState>>,
}

#[derive(Debug)]
struct ChildState {
    child: Child,
    pid: u32,
    status: Option<i32>,
}

impl ChildState {
    fn poll(&mut self) -> Option<i32> {
        if self.status.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.status = Some(exit_code(status)),
                Ok(None) => {}
                Err(e) => warn!("Failed to query child status: {e}"),
            }
        }
        self.status
    }

    /// Signal the child's process group.
    fn signal_group(&self, signal: Signal) -> Result<()> {
        // killpg(0) would hit our own group
        if self.pid == 0 {
            return Ok(());
        }
        let pid = self.pid as i32;
        match killpg(Pid::from_raw(pid), signal) {
            // Exited between the liveness check and the kill
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(ProcessError::Signal {
                signal,
                pid,
                source,
            }
            .into()),
        }
    }
}

/// Signal each of `pids`, skipping the ones that are already gone.
fn signal_each(pids: &[u32], signal: Signal) {
    for &pid in pids {
        match kill(Pid::from_raw(pid as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!("Failed to send {signal:?} to pid {pid}: {e}"),
        }
    }
}

impl Terminator {
    fn new(child: Child, pid: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChildState {
                child,
                pid,
                status: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChildState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `SIGTERM`, then `SIGKILL` to whatever did not exit at once.
    ///
    /// Covers the child and every process in its tree: the shell the
    /// command line started, background jobs, and processes orphaned by an
    /// earlier exit of the child. Does nothing when all of them are gone.
    pub fn terminate(&self) -> Result<()> {
        let mut state = self.lock();
        let tree = process_tree(state.pid).unwrap_or_else(|e| {
            warn!("Failed to list processes of pid {}: {e}", state.pid);
            Vec::new()
        });
        let alive = state.poll().is_none();
        if !alive && tree.is_empty() {
            return Ok(());
        }
        debug!("Terminating pid {} and {} related processes", state.pid, tree.len());

        if alive {
            state.signal_group(Signal::SIGTERM)?;
        }
        signal_each(&tree, Signal::SIGTERM);

        if state.poll().is_none() {
            debug!("Child still alive after SIGTERM, killing it");
            if let Err(e) = state.child.start_kill() {
                // InvalidInput means it was already reaped
                if e.kind() != io::ErrorKind::InvalidInput {
                    return Err(ProcessError::Io(e).into());
                }
            }
        }
        // Interactive shells ignore SIGTERM
        signal_each(&tree, Signal::SIGKILL);
        Ok(())
    }

    /// Deliver `signal` to the child's process group if the child is still
    /// alive.
    pub fn kill(&self, signal: Signal) -> Result<()> {
        let mut state = self.lock();
        if state.poll().is_some() {
            return Ok(());
        }
        state.signal_group(signal)
    }

    /// Whether the child is still running.
    pub fn is_alive(&self) -> bool {
        self.lock().poll().is_none()
    }

    /// Wait up to `timeout` for the child to exit and return its exit code.
    ///
    /// `None` means it is still running; that is not an error.
    pub async fn get_status(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.lock().poll() {
                return Some(status);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(STATUS_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

/// Exit code of a finished process; `128 + signal` when it was killed.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

/// Write all of `data`, retrying partial writes.
pub(crate) async fn write_fully<W>(writer: &mut W, data: &[u8]) -> io::Result<usize>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]).await? {
            0 => return Err(io::ErrorKind::WriteZero.into()),
            n => written += n,
        }
    }
    writer.flush().await?;
    Ok(written)
}

/// Allocate a pty and wire its slave side to the child's stdio.
///
/// Returns the reader and writer descriptors for the master side.
fn attach_pty(
    cmd: &mut Command,
    (width, height): (u16, u16),
) -> Result<(std::os::fd::OwnedFd, std::os::fd::OwnedFd)> {
    let winsize = Winsize {
        ws_row: height,
        ws_col: width,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let OpenptyResult { master, slave } =
        openpty(Some(&winsize), None).map_err(ProcessError::PtyAllocation)?;
    set_cloexec(&master).map_err(ProcessError::Io)?;
    set_cloexec(&slave).map_err(ProcessError::Io)?;

    let stdin = slave.try_clone().map_err(ProcessError::Io)?;
    let stdout = slave.try_clone().map_err(ProcessError::Io)?;
    cmd.stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(slave));

    // SAFETY: only async-signal-safe calls between fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            setsid()?;
            // Stdin is the pty slave by now; make it the controlling tty
            if libc::ioctl(0, libc::TIOCSCTTY as _, 0) < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let reader = master.try_clone().map_err(ProcessError::Io)?;
    Ok((reader, master))
}

/// Connect stdin to one pipe and stdout plus stderr to another.
fn attach_pipes(cmd: &mut Command) -> Result<(std::os::fd::OwnedFd, std::os::fd::OwnedFd)> {
    let (stdin_read, stdin_write) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| ProcessError::Io(e.into()))?;
    let (output_read, output_write) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| ProcessError::Io(e.into()))?;

    let stderr = output_write.try_clone().map_err(ProcessError::Io)?;
    cmd.stdin(Stdio::from(stdin_read))
        .stdout(Stdio::from(output_write))
        .stderr(Stdio::from(stderr));

    Ok((output_read, stdin_write))
}
