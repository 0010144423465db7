//! Receive buffer for ESL framing

use crate::{
    constants::{BUF_CHUNK, MAX_BUFFER_SIZE},
    error::{EslError, EslResult},
};

/// Growable byte buffer with a read cursor.
///
/// Consumed bytes stay in place until [`compact`](Self::compact) shifts the
/// unread tail to the front.
pub(crate) struct EslBuffer {
    data: Vec<u8>,
    position: usize,
}

impl EslBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(BUF_CHUNK),
            position: 0,
        }
    }

    /// Unread bytes.
    pub fn len(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        if self.data.capacity() - self.data.len() < bytes.len() {
            self.data
                .reserve(bytes.len().max(BUF_CHUNK));
        }
        self.data
            .extend_from_slice(bytes);
    }

    pub fn check_size_limits(&self) -> EslResult<()> {
        if self.len() > MAX_BUFFER_SIZE {
            return Err(EslError::protocol_error(format!(
                "Buffer size {} exceeds limit {}",
                self.len(),
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Take everything up to `pattern`, consuming the pattern itself.
    pub fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let unread = &self.data[self.position..];
        let index = unread
            .windows(pattern.len())
            .position(|window| window == pattern)?;
        let extracted = unread[..index].to_vec();
        self.position += index + pattern.len();
        Some(extracted)
    }

    /// Take exactly `length` bytes, or nothing if fewer are buffered.
    pub fn extract_bytes(&mut self, length: usize) -> Option<Vec<u8>> {
        if self.len() < length {
            return None;
        }
        let extracted = self.data[self.position..self.position + length].to_vec();
        self.position += length;
        Some(extracted)
    }

    pub fn compact(&mut self) {
        if self.position == 0 {
            return;
        }
        self.data
            .drain(..self.position);
        self.position = 0;
    }
}
