//! Receive buffer of one connection.
//!
//! One growable byte vector plus a fill cursor. Socket reads land in the
//! spare region; [`FrameBuffer::commit`] finds the end of the last complete
//! record among the newly received bytes; [`FrameBuffer::consume`] moves the
//! unterminated tail to the front so the next read continues it.
//!
//! Capacity only grows, and only when the buffer is full.

use crate::codec::DELIMITER;

/// Smallest capacity a buffer is created with.
pub const MIN_CAPACITY: usize = 64;

pub struct FrameBuffer {
    data: Vec<u8>,
    filled: usize,
}

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![0; capacity.max(MIN_CAPACITY)], filled: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.filled == self.data.len()
    }

    /// Region the next read writes into. Never empty between passes.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.filled..]
    }

    /// Bytes received so far.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Copy `bytes` into the spare region, growing as needed. The caller
    /// commits them like a socket read.
    pub fn load(&mut self, bytes: &[u8]) -> usize {
        while self.data.len() - self.filled < bytes.len() {
            self.grow();
        }
        self.data[self.filled..self.filled + bytes.len()].copy_from_slice(bytes);
        bytes.len()
    }

    /// Account for `n` freshly written bytes.
    ///
    /// Only the new bytes are scanned: everything before them is a tail that
    /// had no delimiter. Returns the end of the terminated prefix, if any.
    pub fn commit(&mut self, n: usize) -> Option<usize> {
        let start = self.filled;
        self.filled = (self.filled + n).min(self.data.len());
        self.data[start..self.filled]
            .iter()
            .rposition(|&b| b == DELIMITER)
            .map(|pos| start + pos + 1)
    }

    /// Drop the first `end` bytes, keeping the tail at the front.
    pub fn consume(&mut self, end: usize) {
        let end = end.min(self.filled);
        self.data.copy_within(end..self.filled, 0);
        self.filled -= end;
    }

    /// Double the capacity, keeping the content. Returns `(old, new)`.
    pub fn grow(&mut self) -> (usize, usize) {
        let old = self.data.len();
        let new = old * 2;
        self.data.resize(new, 0);
        (old, new)
    }
}
