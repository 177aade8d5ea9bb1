//! Channel buffer - per-connection ingest queue in front of a scanner
//!
//! Receivers push raw chunks; the scheduler calls [`ChannelBuffer::process`]
//! with a time slice. Chunks wait in a [`ChunkRing`] until the scanner has
//! scanned everything it holds, then move into the scanner as slots allow.
//!
//! # Flushing
//!
//! A partial trailing message is emitted without a newline when:
//!
//! - the channel is closing and its ring is empty
//! - nothing was pushed for `idle_timeout`
//! - the next ring entry is a gap (data was dropped in between)
//! - the caller asks for it
//!
//! # Backpressure
//!
//! [`disable_ingress`](ChannelBuffer::disable_ingress) applies the
//! configured [`OverloadStrategy`]; [`enable_ingress`](ChannelBuffer::enable_ingress)
//! lifts it. Under overwrite the bound covers bytes already moved into the
//! scanner, not just the queue.

use std::fmt;
use std::time::{Duration, Instant};

use crate::payload::Payload;
use crate::ring::{ChunkRing, OverloadStrategy};
use crate::scanner::{MessageCallback, ProcessOutcome, Scanner, ScannerConfig};

/// Default byte bound of the ring (8MB)
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 8 * 1024 * 1024;

/// Default chunk bound of the ring
pub const DEFAULT_MAX_BUFFERED_CHUNKS: usize = 4096;

/// Default idle flush timeout
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// Channel buffer configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub strategy: OverloadStrategy,
    pub max_buffered_bytes: usize,
    pub max_buffered_chunks: usize,
    /// Flush a partial message after this long without pushes
    pub idle_timeout: Duration,
    pub scanner: ScannerConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            strategy: OverloadStrategy::default(),
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            max_buffered_chunks: DEFAULT_MAX_BUFFERED_CHUNKS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            scanner: ScannerConfig::default(),
        }
    }
}

impl ChannelConfig {
    pub fn with_strategy(mut self, strategy: OverloadStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Lifetime counters of one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub chunks_accepted: u64,
    pub bytes_accepted: u64,
    pub chunks_dropped: u64,
    pub bytes_dropped: u64,
    pub gaps: u64,
    pub messages: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closing,
    Erased,
}

// =============================================================================
// Channel Buffer
// =============================================================================

/// Ring + scanner + lifecycle for one logical data stream
pub struct ChannelBuffer<P: Payload> {
    ring: ChunkRing<P>,
    scanner: Scanner<P>,
    idle_timeout: Duration,
    state: State,
    last_push: Instant,
    stats: ChannelStats,
}

impl<P: Payload> ChannelBuffer<P> {
    pub fn new(config: ChannelConfig, on_message: MessageCallback<P>) -> Self {
        Self {
            ring: ChunkRing::new(
                config.strategy,
                config.max_buffered_bytes,
                config.max_buffered_chunks,
            ),
            scanner: Scanner::new(config.scanner, on_message),
            idle_timeout: config.idle_timeout,
            state: State::Open,
            last_push: Instant::now(),
            stats: ChannelStats::default(),
        }
    }

    /// Queue a raw chunk; false if it was not kept
    ///
    /// Pushes after [`close`](Self::close) are ignored.
    pub fn push(&mut self, chunk: P) -> bool {
        if self.state != State::Open {
            return false;
        }
        let len = chunk.byte_len() as u64;
        self.last_push = Instant::now();

        let outcome = self.ring.push(chunk, self.scanner.buffered_bytes());
        if outcome.accepted {
            self.stats.chunks_accepted += 1;
            self.stats.bytes_accepted += len;
        }
        self.stats.chunks_dropped += outcome.dropped_chunks as u64;
        self.stats.bytes_dropped += outcome.dropped_bytes as u64;
        self.stats.gaps += u64::from(outcome.gap_inserted);
        outcome.accepted
    }

    /// Frame buffered data for at most `budget`
    ///
    /// With `flush`, the trailing partial message is emitted once every
    /// queued chunk has been scanned.
    pub fn process(&mut self, budget: Duration, flush: bool) -> ProcessOutcome {
        let started = Instant::now();
        let mut total = ProcessOutcome::default();
        if self.state == State::Erased {
            return total;
        }

        loop {
            let remaining = budget.saturating_sub(started.elapsed());

            if !self.scanner.has_unscanned() {
                if self.ring.pop_gap() {
                    // Never join data from both sides of a gap
                    let outcome = self.scanner.process(remaining, true);
                    absorb(&mut total, outcome);
                    continue;
                }
                self.admit();
            }

            let at_tail = self.ring.is_empty();
            let flush_now = at_tail && (flush || self.should_flush());
            let outcome = self.scanner.process(remaining, flush_now);
            absorb(&mut total, outcome);

            if outcome.has_more_work {
                total.has_more_work = true;
                break;
            }
            if at_tail {
                break;
            }
            if started.elapsed() >= budget {
                total.has_more_work = true;
                break;
            }
        }

        self.stats.messages += total.messages as u64;
        total.total_time = started.elapsed();
        total
    }

    /// Move queued chunks into the scanner up to its free slots
    fn admit(&mut self) {
        for _ in 0..self.scanner.free_slots() {
            let Some(chunk) = self.ring.pop_chunk() else {
                break;
            };
            if let Err(chunk) = self.scanner.try_push(chunk) {
                tracing::warn!(bytes = chunk.byte_len(), "scanner refused chunk with free slots");
                break;
            }
        }
    }

    fn should_flush(&self) -> bool {
        self.state == State::Closing || self.last_push.elapsed() >= self.idle_timeout
    }

    /// Whether a call to [`process`](Self::process) would make progress
    pub fn is_ready(&self) -> bool {
        if self.state == State::Erased {
            return false;
        }
        !self.ring.is_empty()
            || self.scanner.is_ready()
            || (self.state == State::Closing && !self.scanner.is_empty())
    }

    /// A partial message is waiting for more data
    pub fn has_partial(&self) -> bool {
        self.ring.is_empty() && !self.scanner.is_empty()
    }

    /// Stop accepting pushes; queued data still drains
    pub fn close(&mut self) {
        if self.state == State::Open {
            self.state = State::Closing;
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state != State::Open
    }

    /// Closed and fully drained (or erased)
    pub fn is_done(&self) -> bool {
        match self.state {
            State::Open => false,
            State::Closing => self.ring.is_empty() && self.scanner.is_empty(),
            State::Erased => true,
        }
    }

    /// Drop all buffered data and stop the channel for good
    pub fn erase(&mut self) {
        self.ring.clear();
        self.scanner.erase();
        self.state = State::Erased;
    }

    /// Apply the overload strategy to further pushes
    ///
    /// Under overwrite the ring and scanner together never hold more than
    /// they did at this call.
    pub fn disable_ingress(&mut self) {
        self.ring.disable_ingress(self.scanner.buffered_bytes());
    }

    pub fn enable_ingress(&mut self) {
        self.ring.enable_ingress();
    }

    #[inline]
    pub fn ingress_enabled(&self) -> bool {
        self.ring.ingress_enabled()
    }

    #[inline]
    pub fn strategy(&self) -> OverloadStrategy {
        self.ring.strategy()
    }

    /// Time since the last push (or creation)
    pub fn last_push_elapsed(&self) -> Duration {
        self.last_push.elapsed()
    }

    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Bytes queued in the ring plus bytes held by the scanner
    pub fn buffered_bytes(&self) -> usize {
        self.ring.byte_len() + self.scanner.buffered_bytes()
    }

    /// Chunks queued in the ring plus chunks held by the scanner
    pub fn buffered_chunks(&self) -> usize {
        self.ring.len() + self.scanner.buffered_chunks()
    }

    /// Bytes queued in the ring only
    pub fn queued_bytes(&self) -> usize {
        self.ring.byte_len()
    }

    #[inline]
    pub fn stats(&self) -> ChannelStats {
        self.stats
    }
}

fn absorb(total: &mut ProcessOutcome, outcome: ProcessOutcome) {
    total.parse_time += outcome.parse_time;
    total.messages += outcome.messages;
}

impl<P: Payload> fmt::Debug for ChannelBuffer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBuffer")
            .field("state", &self.state)
            .field("strategy", &self.ring.strategy())
            .field("queued_chunks", &self.ring.len())
            .field("queued_bytes", &self.ring.byte_len())
            .field("scanner", &self.scanner)
            .finish()
    }
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod channel_test;
