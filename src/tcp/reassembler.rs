//! Reorders and deduplicates out-of-order substrings into a [`ByteStream`]
//! under the stream's own capacity window.

use std::collections::BTreeMap;

use super::byte_stream::ByteStream;

#[derive(Debug, Default)]
pub struct Reassembler {
    /// Coalesced, non-overlapping intervals keyed by their starting offset,
    /// all at or beyond the writer's `bytes_pushed()`.
    stored: BTreeMap<u64, Vec<u8>>,
    /// Absolute offset one past the final byte of the stream, once known.
    last_index: Option<u64>,
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler::default()
    }

    /// Deliver `data` starting at absolute offset `first_index`. If
    /// `is_last`, this call's range fixes the end of the stream: once the
    /// writer's pushed count reaches it, `writer` is closed.
    pub fn insert(&mut self, first_index: u64, data: &[u8], is_last: bool, writer: &mut ByteStream) {
        if writer.is_closed() {
            return;
        }

        if is_last {
            self.last_index = Some(first_index + data.len() as u64);
        }

        let next_expected = writer.bytes_pushed();
        let window_end = next_expected + writer.available_capacity();

        let mut start = first_index;
        let mut bytes = data;

        // drop (or clip) the portion already delivered
        if start < next_expected {
            let skip = (next_expected - start) as usize;
            bytes = if skip >= bytes.len() { &[] } else { &bytes[skip..] };
            start = next_expected;
        }

        // drop (or clip) the portion beyond available capacity
        if start >= window_end {
            bytes = &[];
        } else {
            let max_len = (window_end - start) as usize;
            if bytes.len() > max_len {
                bytes = &bytes[..max_len];
            }
        }

        if !bytes.is_empty() {
            self.store(start, bytes);
        }

        self.drain_into(writer);
    }

    /// Bytes currently held (post coalescing), not yet delivered.
    pub fn bytes_pending(&self) -> u64 {
        self.stored.values().map(|v| v.len() as u64).sum()
    }

    /// Merge `[start, start + data.len())` into the stored interval set,
    /// coalescing with any existing interval it overlaps or touches. Assumes
    /// overlapping submissions carry identical bytes, per the reassembler's
    /// idempotence invariant.
    fn store(&mut self, start: u64, data: &[u8]) {
        let mut merge_start = start;
        let mut merge_end = start + data.len() as u64;
        let mut pieces: Vec<(u64, Vec<u8>)> = vec![(start, data.to_vec())];

        loop {
            let overlap = self
                .stored
                .iter()
                .find(|(&k, v)| {
                    let k_end = k + v.len() as u64;
                    k_end >= merge_start && k <= merge_end
                })
                .map(|(&k, _)| k);

            let Some(k) = overlap else { break };
            let v = self.stored.remove(&k).unwrap();
            merge_start = merge_start.min(k);
            merge_end = merge_end.max(k + v.len() as u64);
            pieces.push((k, v));
        }

        let mut buf = vec![0u8; (merge_end - merge_start) as usize];
        for (k, v) in pieces {
            let offset = (k - merge_start) as usize;
            buf[offset..offset + v.len()].copy_from_slice(&v);
        }

        self.stored.insert(merge_start, buf);
    }

    /// Push every interval reachable from the writer's current offset, in
    /// order, then close `writer` if the stream has reached its known end.
    fn drain_into(&mut self, writer: &mut ByteStream) {
        loop {
            let next_expected = writer.bytes_pushed();
            match self.stored.remove(&next_expected) {
                Some(data) => writer.push(&data),
                None => break,
            }
        }

        if let Some(last) = self.last_index {
            if writer.bytes_pushed() == last {
                self.stored.clear();
                writer.close();
            }
        }
    }
}
