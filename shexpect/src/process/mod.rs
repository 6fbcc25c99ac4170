//! Child process management.
//!
//! A [`Session`] owns one child process and the endpoint it talks through:
//! the master side of a pseudo-terminal, or a pair of pipes with stdout and
//! stderr merged. Everything above this layer sees it only through the
//! [`Transport`](crate::channel::Transport) trait.

mod children;
mod config;
mod control;
mod exec;
mod fd;
mod session;

pub use children::{ChildProcess, children_of, process_tree};
pub use config::SpawnConfig;
pub use control::{CONTROL_SYMBOLS, control_byte};
pub use exec::execute;
pub use fd::FdStream;
pub use nix::sys::signal::Signal;
pub use session::{Session, Terminator};

pub(crate) use session::exit_code;
