//! Non-blocking file descriptor stream for pty masters and pipe ends.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};
use nix::libc;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Async stream over a raw descriptor registered with the tokio reactor.
///
/// Reading a pty master after the slave side is gone fails with `EIO` on
/// Linux; that is reported as end-of-file, the same as a closed pipe.
#[derive(Debug)]
pub struct FdStream {
    inner: AsyncFd<File>,
}

impl FdStream {
    /// Switch `fd` to non-blocking mode and register it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            inner: AsyncFd::new(File::from(fd))?,
        })
    }

    /// Read whatever is available right now, without waiting for readiness.
    ///
    /// Returns `WouldBlock` when nothing is buffered.
    pub fn read_now(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = self.inner.get_ref();
        match file.read(buf) {
            Err(e) if is_hangup(&e) => Ok(0),
            other => other,
        }
    }
}

impl AsRawFd for FdStream {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.inner.as_raw_fd()
    }
}

impl AsyncRead for FdStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(unfilled)
            }) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) if is_hangup(&e) => return Poll::Ready(Ok(())),
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for FdStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.write(buf)
            }) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn is_hangup(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EIO)
}

/// Set `O_NONBLOCK` on a descriptor.
pub(crate) fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Set `FD_CLOEXEC` so the descriptor does not leak into spawned children.
pub(crate) fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pipe_roundtrip() {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let mut reader = FdStream::new(read_end).unwrap();
        let mut writer = FdStream::new(write_end).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(
            reader.read_now(&mut buf).unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );

        writer.write_all(b"hello").await.unwrap();
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn test_eof_after_writer_closed() {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let mut reader = FdStream::new(read_end).unwrap();
        drop(write_end);

        let mut buf = [0u8; 16];
        assert_eq!(reader.read_now(&mut buf).unwrap(), 0);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }
}
