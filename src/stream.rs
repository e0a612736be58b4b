use std::collections::VecDeque;

use bytes::Bytes;

/// Capacity-bounded FIFO of bytes with an EOF marker and a latched error
/// flag. One side pushes, the other peeks and pops; the containing endpoint
/// serializes the two, so no synchronization lives here.
#[derive(Debug)]
pub struct ByteStream {
    buffer: VecDeque<u8>,
    capacity: usize,
    pushed: u64,
    popped: u64,
    closed: bool,
    error: bool,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            pushed: 0,
            popped: 0,
            closed: false,
            error: false,
        }
    }

    /// Append as much of `data` as fits, silently truncating the rest.
    /// Bytes pushed after `close` are discarded. Returns the number of
    /// bytes actually appended.
    pub fn push(&mut self, data: &[u8]) -> usize {
        if self.closed {
            return 0;
        }
        let take = data.len().min(self.available_capacity());
        self.buffer.extend(&data[..take]);
        self.pushed += take as u64;
        take
    }

    /// Mark the end of the stream. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Contiguous view of the front of the buffer. May be shorter than
    /// `bytes_buffered()`; callers wanting more peek again after popping.
    pub fn peek(&self) -> &[u8] {
        self.buffer.as_slices().0
    }

    /// Discard up to `n` bytes from the front.
    pub fn pop(&mut self, n: usize) {
        let take = n.min(self.buffer.len());
        self.buffer.drain(..take);
        self.popped += take as u64;
    }

    /// Remove up to `n` bytes from the front and hand them out as an owned
    /// buffer.
    pub fn read(&mut self, n: usize) -> Bytes {
        let take = n.min(self.buffer.len());
        let out: Vec<u8> = self.buffer.drain(..take).collect();
        self.popped += take as u64;
        Bytes::from(out)
    }

    pub fn available_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    pub fn bytes_buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.pushed
    }

    pub fn bytes_popped(&self) -> u64 {
        self.popped
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closed and fully drained.
    pub fn is_finished(&self) -> bool {
        self.closed && self.buffer.is_empty()
    }
}
