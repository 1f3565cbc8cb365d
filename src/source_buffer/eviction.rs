//! Buffered media bookkeeping and coded frame eviction.
//!
//! Media is tracked at segment granularity. Eviction removes whole segments,
//! oldest presentation start first (ties broken by append order), and only
//! segments that end at or before the current playback position. It either
//! frees enough room for the incoming bytes or removes nothing.

use crate::error::{Error, Result};
use tracing::debug;

/// One accepted media segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedSegment {
    /// Presentation start in seconds.
    pub start: f64,
    /// Presentation end in seconds.
    pub end: f64,
    /// Bytes the segment occupied in the append stream.
    pub bytes: usize,
    /// Append order.
    pub sequence: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TrackBuffer {
    /// Sorted by (start, sequence).
    segments: Vec<BufferedSegment>,
    total_bytes: usize,
    next_sequence: u64,
}

impl TrackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted segment.
    pub fn push(&mut self, start: f64, end: f64, bytes: usize) {
        let segment = BufferedSegment {
            start,
            end,
            bytes,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        // Sequence numbers only grow, so inserting after every segment with
        // start <= this one keeps ties in append order.
        let index = self.segments.partition_point(|s| s.start <= start);
        self.segments.insert(index, segment);
        self.total_bytes += bytes;
    }

    pub fn segments(&self) -> &[BufferedSegment] {
        &self.segments
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Largest presentation end, if anything is buffered.
    pub fn highest_end(&self) -> Option<f64> {
        self.segments.iter().map(|s| s.end).reduce(f64::max)
    }

    /// Buffered time ranges, merged where segments touch or overlap.
    pub fn buffered_ranges(&self) -> Vec<(f64, f64)> {
        let mut ranges: Vec<(f64, f64)> = Vec::new();
        for segment in &self.segments {
            match ranges.last_mut() {
                Some(last) if segment.start <= last.1 => last.1 = last.1.max(segment.end),
                _ => ranges.push((segment.start, segment.end)),
            }
        }
        ranges
    }

    /// Make room for `incoming` bytes under `quota`.
    ///
    /// Returns the number of bytes freed.
    pub fn evict(&mut self, current_time: f64, incoming: usize, quota: usize) -> Result<usize> {
        let target = quota.saturating_sub(incoming);
        if incoming <= quota && self.total_bytes <= target {
            return Ok(0);
        }

        let mut remaining = self.total_bytes;
        let mut victims = Vec::new();
        for (index, segment) in self.segments.iter().enumerate() {
            if remaining <= target && incoming <= quota {
                break;
            }
            if segment.end <= current_time {
                remaining -= segment.bytes;
                victims.push(index);
            }
        }

        if incoming > quota || remaining > target {
            return Err(Error::QuotaExceeded {
                needed: incoming,
                available: quota.saturating_sub(self.total_bytes),
            });
        }

        let freed = self.total_bytes - remaining;
        for index in victims.into_iter().rev() {
            let removed = self.segments.remove(index);
            debug!(
                start = removed.start,
                end = removed.end,
                bytes = removed.bytes,
                "Evicted buffered segment"
            );
        }
        self.total_bytes = remaining;
        Ok(freed)
    }
}
