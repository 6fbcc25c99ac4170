//! Accumulator for output read while waiting for a match.

use std::borrow::Cow;

use bytes::{Bytes, BytesMut};

/// Output collected during one expect call.
///
/// Bytes are kept raw; text views are decoded lossily on demand, so a
/// multi-byte character split across two reads decodes correctly once its
/// second half arrives.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    buffer: BytesMut,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Append newly read data.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Raw contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Contents decoded as UTF-8, invalid sequences replaced.
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Take the contents and reset the buffer.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Consume the buffer as a string.
    pub fn into_string(self) -> String {
        self.as_str_lossy().into_owned()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
