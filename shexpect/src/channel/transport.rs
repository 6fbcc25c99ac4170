//! The endpoint abstraction the expect engine drives.

use std::future::Future;
use std::time::Duration;

use super::reader::NonBlockingRead;
use crate::error::Result;

/// A child process plus its communication endpoint.
///
/// [`Session`](crate::process::Session) is the real implementation; tests
/// substitute scripted endpoints.
pub trait Transport: NonBlockingRead {
    /// Write all of `data`, returning the number of bytes written.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Whether the child process is still running.
    fn is_alive(&self) -> bool;

    /// Wait up to `timeout` for the process to exit and return its status.
    ///
    /// `None` means the status is not known yet; it is not an error.
    fn exit_status(&self, timeout: Duration) -> impl Future<Output = Option<i32>> + Send;

    /// Whether the endpoint has reported end-of-file.
    fn at_eof(&self) -> bool;
}
