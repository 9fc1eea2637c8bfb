//! A bounded producer/consumer byte queue with closure and error signaling.
//!
//! The original implementation this crate is modeled on represents the
//! writer and reader as sibling views obtained by downcasting a shared base
//! class. Rust has no such trick (nor should it): `ByteStream` instead owns
//! all of its state directly and exposes two method families, one named for
//! what the writer does (`push`, `close`, `set_error`) and one for what the
//! reader does (`peek`, `pop`). Both halves of an `Endpoint` hold a `&mut
//! ByteStream` rather than aliased reader/writer handles, since each stream
//! has exactly one writer and one reader and both live on the same thread.

use std::collections::VecDeque;

/// A segmented byte buffer: a queue of owned chunks plus a cursor into the
/// front chunk. Popping bytes advances the cursor (or drops whole chunks)
/// instead of shifting every remaining byte, which is what lets `pop` stay
/// cheap regardless of how much has been buffered.
#[derive(Debug)]
pub struct ByteStream {
    capacity: u64,
    chunks: VecDeque<Vec<u8>>,
    front_pos: usize,
    bytes_pushed: u64,
    bytes_popped: u64,
    closed: bool,
    error: bool,
}

impl ByteStream {
    pub fn new(capacity: u64) -> Self {
        ByteStream {
            capacity,
            chunks: VecDeque::new(),
            front_pos: 0,
            bytes_pushed: 0,
            bytes_popped: 0,
            closed: false,
            error: false,
        }
    }

    // --- writer side ---

    /// Push as many bytes of `data` as fit in the remaining capacity. Silently
    /// drops the tail if `data` is longer than `available_capacity()`.
    pub fn push(&mut self, data: &[u8]) {
        if self.closed {
            return;
        }
        let n = std::cmp::min(self.available_capacity(), data.len() as u64) as usize;
        if n == 0 {
            return;
        }
        self.chunks.push_back(data[..n].to_vec());
        self.bytes_pushed += n as u64;
    }

    /// Idempotent: no further bytes may be pushed once closed.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Idempotent: latches the error flag, observed by both ends.
    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn available_capacity(&self) -> u64 {
        self.capacity - self.bytes_buffered()
    }

    pub fn bytes_pushed(&self) -> u64 {
        self.bytes_pushed
    }

    // --- reader side ---

    /// A contiguous view of some prefix of the buffered bytes. Non-empty
    /// whenever `bytes_buffered() > 0`.
    pub fn peek(&self) -> &[u8] {
        match self.chunks.front() {
            Some(chunk) => &chunk[self.front_pos..],
            None => &[],
        }
    }

    /// Discard up to `min(len, bytes_buffered())` bytes from the front.
    pub fn pop(&mut self, mut len: u64) {
        len = std::cmp::min(len, self.bytes_buffered());
        let popped = len;
        while len > 0 {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let remaining_in_front = (front.len() - self.front_pos) as u64;
            if len >= remaining_in_front {
                len -= remaining_in_front;
                self.chunks.pop_front();
                self.front_pos = 0;
            } else {
                self.front_pos += len as usize;
                len = 0;
            }
        }
        self.bytes_popped += popped;
    }

    pub fn is_finished(&self) -> bool {
        self.closed && self.bytes_buffered() == 0
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn bytes_buffered(&self) -> u64 {
        self.bytes_pushed - self.bytes_popped
    }

    pub fn bytes_popped(&self) -> u64 {
        self.bytes_popped
    }
}

/// Pop and accumulate up to `len` bytes from `stream` into a fresh `Vec`,
/// stopping early if the stream runs dry.
pub fn read(stream: &mut ByteStream, len: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(len as usize);
    while stream.bytes_buffered() > 0 && (out.len() as u64) < len {
        let view = stream.peek();
        debug_assert!(!view.is_empty());
        let take = std::cmp::min(view.len() as u64, len - out.len() as u64) as usize;
        out.extend_from_slice(&view[..take]);
        stream.pop(take as u64);
    }
    out
}
