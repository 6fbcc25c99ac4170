//! One-shot command execution without a session.

use std::process::Stdio;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::exit_code;
use crate::error::{ProcessError, Result, ShellError};

/// How long to wait for the output pipes to drain after a timed out
/// command has been killed.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run `command` through `/bin/sh -c` and return its standard output.
///
/// Fails with [`ShellError::Timeout`] when the command does not finish
/// within `timeout` (it is killed first), and with [`ShellError::Cmd`] when
/// it exits non-zero. The output attached to either error has the form
/// `"STDOUT:\n<stdout>\nSTDERR:\n<stderr>"`.
pub async fn execute(command: &str, timeout: Duration) -> Result<String> {
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let stdout = collect(child.stdout.take());
    let stderr = collect(child.stderr.take());

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => Some(status.map_err(ProcessError::Io)?),
        Err(_) => {
            debug!("execute: {command:?} did not finish in {timeout:?}, killing it");
            child.start_kill().map_err(ProcessError::Io)?;
            child.wait().await.map_err(ProcessError::Io)?;
            None
        }
    };

    let stdout = drain(stdout).await;
    let stderr = drain(stderr).await;

    match status {
        Some(status) if status.success() => Ok(stdout),
        Some(status) => Err(ShellError::Cmd {
            cmd: command.to_string(),
            status: exit_code(status),
            output: format!("STDOUT:\n{stdout}\nSTDERR:\n{stderr}"),
        }
        .into()),
        None => Err(ShellError::Timeout {
            cmd: command.to_string(),
            output: format!("STDOUT:\n{stdout}\nSTDERR:\n{stderr}"),
        }
        .into()),
    }
}

fn collect<R>(pipe: Option<R>) -> Option<JoinHandle<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut data = Vec::new();
            // Partial output is still useful if the read fails midway
            let _ = pipe.read_to_end(&mut data).await;
            String::from_utf8_lossy(&data).into_owned()
        })
    })
}

async fn drain(task: Option<JoinHandle<String>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    // Grandchildren may keep the pipe open after the child is gone
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    }
}
