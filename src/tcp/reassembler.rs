use std::collections::BTreeMap;

use bytes::Bytes;

use crate::stream::ByteStream;

/// Turns out-of-order, possibly overlapping byte ranges (keyed by absolute
/// stream index) back into a contiguous stream.
///
/// Ranges are stored as received and reconciled when the contiguous prefix
/// is pushed, so overlapping entries may coexist in the map. Every stored
/// range lies within `[first_unassembled, first_unassembled + available
/// capacity)` of the output stream.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: BTreeMap<u64, Bytes>,
    first_unassembled: u64,
    finish_received: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `data` at absolute index `first_index`, pushing whatever
    /// becomes contiguous into `output`. `is_last` marks the byte one past
    /// the end of `data` as the end of the stream.
    pub fn insert(
        &mut self,
        first_index: u64,
        mut data: Bytes,
        mut is_last: bool,
        output: &mut ByteStream,
    ) {
        let first_unacceptable = self.first_unassembled + output.available_capacity() as u64;

        // Beyond the window entirely. An empty finish marker sitting exactly
        // on the edge is still meaningful; anything else is not.
        if first_index > first_unacceptable
            || (first_index == first_unacceptable && !data.is_empty())
        {
            return;
        }

        let end = first_index + data.len() as u64;
        // Entirely assembled already.
        if !data.is_empty() && end <= self.first_unassembled {
            return;
        }

        if end > first_unacceptable {
            data = data.slice(..(first_unacceptable - first_index) as usize);
            // The clipped tail carried the finish marker, if any.
            is_last = false;
        }

        // Same starting index: keep the longer range.
        match self.pending.get(&first_index) {
            Some(existing) if existing.len() >= data.len() => {}
            _ => {
                self.pending.insert(first_index, data);
            }
        }

        // Push the contiguous prefix, skipping whatever each range repeats.
        while let Some(entry) = self.pending.first_entry() {
            let index = *entry.key();
            if index > self.first_unassembled {
                break;
            }
            let range = entry.remove();
            let range_end = index + range.len() as u64;
            if range_end > self.first_unassembled {
                let skip = (self.first_unassembled - index) as usize;
                output.push(&range[skip..]);
                self.first_unassembled = range_end;
            }
        }

        if is_last {
            self.finish_received = true;
        }
        if self.finish_received && self.pending.is_empty() {
            output.close();
        }
    }

    /// Buffered bytes not yet part of the contiguous prefix, with overlaps
    /// counted once.
    pub fn bytes_pending(&self) -> u64 {
        let mut total = 0;
        let mut covered_to = self.first_unassembled;
        for (&index, range) in &self.pending {
            let end = index + range.len() as u64;
            let start = index.max(covered_to);
            if end > start {
                total += end - start;
                covered_to = end;
            }
        }
        total
    }

    /// Next absolute index the output stream is waiting for.
    pub fn first_unassembled(&self) -> u64 {
        self.first_unassembled
    }
}
