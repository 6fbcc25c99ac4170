//! Time-boxed reads layered over a non-blocking endpoint.

use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use crate::error::Result;

/// Endpoint that can be polled for output with a bounded wait.
pub trait NonBlockingRead: Send {
    /// Wait up to `timeout` for data and return what is available.
    ///
    /// Returns empty bytes when nothing arrived in time (or the endpoint is
    /// at end-of-file). Never waits past `timeout`.
    fn try_read(&mut self, timeout: Duration) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Read a burst of output.
///
/// Calls [`NonBlockingRead::try_read`] with `internal_timeout` until one
/// call yields nothing (the burst is over) or `timeout` elapses. With no
/// overall timeout (or a zero one) a single read is made and returned
/// immediately.
pub async fn read_nonblocking<R>(
    reader: &mut R,
    internal_timeout: Duration,
    timeout: Option<Duration>,
) -> Result<BytesMut>
where
    R: NonBlockingRead + ?Sized,
{
    let deadline = timeout
        .filter(|t| !t.is_zero())
        .map(|t| Instant::now() + t);

    let mut data = BytesMut::new();
    data.extend_from_slice(&reader.try_read(internal_timeout).await?);

    let Some(deadline) = deadline else {
        return Ok(data);
    };

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let chunk = reader.try_read(internal_timeout.min(deadline - now)).await?;
        if chunk.is_empty() {
            break;
        }
        data.extend_from_slice(&chunk);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::ScriptedTransport;

    #[tokio::test]
    async fn test_single_read_without_overall_timeout() {
        let mut reader = ScriptedTransport::new().with_output(["one", "two"]);
        let data = read_nonblocking(&mut reader, Duration::from_millis(10), None)
            .await
            .unwrap();
        assert_eq!(&data[..], b"one");
    }

    #[tokio::test]
    async fn test_reads_whole_burst() {
        let mut reader = ScriptedTransport::new().with_output(["one", "two", "three"]);
        let data = read_nonblocking(
            &mut reader,
            Duration::from_millis(10),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert_eq!(&data[..], b"onetwothree");
    }

    #[tokio::test]
    async fn test_quiet_endpoint_returns_empty() {
        let mut reader = ScriptedTransport::new();
        let started = std::time::Instant::now();
        let data = read_nonblocking(
            &mut reader,
            Duration::from_millis(20),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert!(data.is_empty());
        // One quiet period ends the burst, the overall timeout is not used up
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_overall_timeout_bounds_a_chatty_endpoint() {
        let chunks: Vec<String> = (0..10_000).map(|i| format!("{i}\n")).collect();
        let mut reader = ScriptedTransport::new()
            .with_output(chunks)
            .with_read_delay(Duration::from_millis(5));
        let started = std::time::Instant::now();
        let data = read_nonblocking(
            &mut reader,
            Duration::from_millis(50),
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap();
        assert!(!data.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
