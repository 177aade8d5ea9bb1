//! Channel buffer ring
//!
//! Ordered queue of raw pushed chunks sitting in front of a scanner, with
//! aggregate byte/chunk counters and the two overload strategies.
//!
//! Counters always equal the sum over queued chunks. Gap markers carry no
//! bytes and are not counted as chunks.

use std::collections::VecDeque;

use crate::payload::Payload;

/// What to do when the ring is over capacity or ingress is disabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverloadStrategy {
    /// Evict the oldest chunks; with ingress disabled, never let the total
    /// held (queue plus downstream) grow past what it was when disabled
    #[default]
    Overwrite,
    /// Discard new chunks and record a gap
    Reject,
}

#[derive(Debug)]
enum Entry<P> {
    Chunk(P),
    Gap,
}

/// Outcome of a ring push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// The pushed chunk is queued
    pub accepted: bool,
    /// Bytes discarded by this push (the pushed chunk or evicted ones)
    pub dropped_bytes: usize,
    /// Chunks discarded by this push
    pub dropped_chunks: usize,
    /// A gap marker was inserted
    pub gap_inserted: bool,
}

/// Bounded chunk queue with an overload strategy
#[derive(Debug)]
pub struct ChunkRing<P> {
    entries: VecDeque<Entry<P>>,
    strategy: OverloadStrategy,
    bytes: usize,
    chunks: usize,
    max_bytes: usize,
    max_chunks: usize,
    /// Total byte bound captured when ingress was disabled (overwrite only)
    pinned_bytes: Option<usize>,
    ingress_enabled: bool,
    /// A gap has been recorded for the current run of discarded data
    in_gap: bool,
}

impl<P: Payload> ChunkRing<P> {
    pub fn new(strategy: OverloadStrategy, max_bytes: usize, max_chunks: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            strategy,
            bytes: 0,
            chunks: 0,
            max_bytes,
            max_chunks: max_chunks.max(1),
            pinned_bytes: None,
            ingress_enabled: true,
            in_gap: false,
        }
    }

    #[inline]
    pub fn strategy(&self) -> OverloadStrategy {
        self.strategy
    }

    /// Queued bytes
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    /// Queued chunks (gap markers excluded)
    #[inline]
    pub fn len(&self) -> usize {
        self.chunks
    }

    /// No chunks and no gap markers
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn ingress_enabled(&self) -> bool {
        self.ingress_enabled
    }

    /// Stop growing: overwrite pins the current total, reject drops everything
    ///
    /// `held` is what the consumer of this ring already holds; it counts
    /// toward the pinned total together with the queue.
    pub fn disable_ingress(&mut self, held: usize) {
        if !self.ingress_enabled {
            return;
        }
        self.ingress_enabled = false;
        if self.strategy == OverloadStrategy::Overwrite {
            self.pinned_bytes = Some(self.bytes + held);
        }
    }

    pub fn enable_ingress(&mut self) {
        self.ingress_enabled = true;
        self.pinned_bytes = None;
    }

    /// Queue a chunk according to the strategy
    ///
    /// `held` is the consumer's current share of a pinned total.
    pub fn push(&mut self, chunk: P, held: usize) -> PushOutcome {
        match self.strategy {
            OverloadStrategy::Overwrite => self.push_overwrite(chunk, held),
            OverloadStrategy::Reject => self.push_reject(chunk),
        }
    }

    fn push_overwrite(&mut self, chunk: P, held: usize) -> PushOutcome {
        self.enqueue(chunk);
        let bound = self
            .pinned_bytes
            .map_or(self.max_bytes, |pinned| pinned.saturating_sub(held));

        let mut outcome = PushOutcome {
            accepted: true,
            ..Default::default()
        };
        while self.bytes > bound || self.chunks > self.max_chunks {
            let Some(evicted) = self.pop_front_chunk() else {
                break;
            };
            outcome.dropped_bytes += evicted.byte_len();
            outcome.dropped_chunks += 1;
        }
        if outcome.dropped_chunks > 0 {
            // The pushed chunk itself may have been trimmed away
            outcome.accepted = self.chunks > 0;
            if !matches!(self.entries.front(), Some(Entry::Gap)) {
                self.entries.push_front(Entry::Gap);
                outcome.gap_inserted = true;
            }
        }
        outcome
    }

    fn push_reject(&mut self, chunk: P) -> PushOutcome {
        let len = chunk.byte_len();
        let over = self.bytes + len > self.max_bytes || self.chunks >= self.max_chunks;
        if self.ingress_enabled && !over {
            self.in_gap = false;
            self.enqueue(chunk);
            return PushOutcome {
                accepted: true,
                ..Default::default()
            };
        }

        let mut outcome = PushOutcome {
            accepted: false,
            dropped_bytes: len,
            dropped_chunks: 1,
            gap_inserted: false,
        };
        if !self.in_gap {
            self.in_gap = true;
            self.entries.push_back(Entry::Gap);
            outcome.gap_inserted = true;
        }
        outcome
    }

    fn enqueue(&mut self, chunk: P) {
        self.bytes += chunk.byte_len();
        self.chunks += 1;
        self.entries.push_back(Entry::Chunk(chunk));
    }

    /// Remove the oldest chunk, discarding any gap markers in front of it
    fn pop_front_chunk(&mut self) -> Option<P> {
        while let Some(entry) = self.entries.pop_front() {
            if let Entry::Chunk(chunk) = entry {
                self.bytes -= chunk.byte_len();
                self.chunks -= 1;
                return Some(chunk);
            }
        }
        None
    }

    /// Whether the next entry is a gap marker
    #[inline]
    pub fn front_is_gap(&self) -> bool {
        matches!(self.entries.front(), Some(Entry::Gap))
    }

    /// Consume a gap marker at the front; false if the front is not a gap
    pub fn pop_gap(&mut self) -> bool {
        if self.front_is_gap() {
            self.entries.pop_front();
            true
        } else {
            false
        }
    }

    /// Take the next chunk unless a gap marker is in front
    pub fn pop_chunk(&mut self) -> Option<P> {
        match self.entries.front() {
            Some(Entry::Chunk(_)) => self.pop_front_chunk(),
            _ => None,
        }
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
        self.chunks = 0;
        self.in_gap = false;
    }
}
