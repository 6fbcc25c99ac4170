//! # shexpect
//!
//! Async expect-style automation of local shells and other interactive
//! programs.
//!
//! shexpect spawns a child process attached to a pseudo-terminal (or to
//! pipes), sends it input and waits for its output to match regular
//! expressions, in the spirit of Tcl's `expect` and Python's `pexpect`.
//!
//! ## Features
//!
//! - Pty or pipe children with signal-aware exit statuses
//! - Time-boxed, caller-driven reads on tokio; no background reader
//! - First-match-wins pattern lists with pluggable output filters
//! - Shell sessions that strip echoed commands and prompts and recover exit
//!   statuses, with or without a visible prompt
//! - Session transcripts through a pluggable sink
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use shexpect::{CmdOptions, ShellSessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), shexpect::Error> {
//!     let mut shell = ShellSessionBuilder::new("bash --norc -i")
//!         .env("PS1", "$ ")
//!         .spawn()
//!         .await?;
//!
//!     let output = shell.cmd_output("uname -a", Duration::from_secs(10)).await?;
//!     println!("{output}");
//!
//!     let status = shell.cmd_status("test -d /tmp", Duration::from_secs(10)).await?;
//!     println!("status: {status}");
//!
//!     shell.cmd("ls /nonexistent", &CmdOptions::default().ok_statuses([0, 2])).await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod process;
pub mod shell;
pub mod sink;

// Re-export main types for convenience
pub use channel::{Expect, ExpectConfig, Match, NonBlockingRead, OutputFilter, PatternList, Transport};
pub use error::{Error, ExpectError, ProcessError, Result, ShellError};
pub use process::{Session, SpawnConfig, execute};
pub use shell::{CmdOptions, Response, ShellConfig, ShellSession, ShellSessionBuilder, TtyMode};
pub use sink::LogSink;
