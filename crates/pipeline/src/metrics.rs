//! Scheduler metrics
//!
//! Atomic counters with relaxed ordering; values are eventually consistent.
//! The metrics live behind an `Arc` so a reporter on another thread can
//! read them while the scheduler runs on its `LocalSet`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use strand_framing::ChannelStats;

/// Metrics for the scheduler
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Scheduler ticks run
    ticks: AtomicU64,

    /// Times the scheduler fell back to the poll timer
    idle_waits: AtomicU64,

    /// Messages handed to the consumer
    messages_dispatched: AtomicU64,

    /// Batches handed to the consumer
    batches_dispatched: AtomicU64,

    /// Batches the consumer refused
    batches_dropped: AtomicU64,

    /// Messages lost with refused batches
    messages_dropped: AtomicU64,

    /// Channels registered
    channels_opened: AtomicU64,

    /// Closed channels drained and erased
    channels_reaped: AtomicU64,

    /// Bytes dropped by reaped channels' overload strategy
    bytes_shed: AtomicU64,

    /// Gaps recorded by reaped channels
    gaps: AtomicU64,
}

impl SchedulerMetrics {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            idle_waits: AtomicU64::new(0),
            messages_dispatched: AtomicU64::new(0),
            batches_dispatched: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            channels_opened: AtomicU64::new(0),
            channels_reaped: AtomicU64::new(0),
            bytes_shed: AtomicU64::new(0),
            gaps: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_idle_wait(&self) {
        self.idle_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatched(&self, messages: u64) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.messages_dispatched.fetch_add(messages, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self, messages: u64) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.messages_dropped.fetch_add(messages, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_opened(&self) {
        self.channels_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a finished channel's lifetime counters in
    pub fn record_reaped(&self, stats: &ChannelStats) {
        self.channels_reaped.fetch_add(1, Ordering::Relaxed);
        self.bytes_shed
            .fetch_add(stats.bytes_dropped, Ordering::Relaxed);
        self.gaps.fetch_add(stats.gaps, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            idle_waits: self.idle_waits.load(Ordering::Relaxed),
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            channels_opened: self.channels_opened.load(Ordering::Relaxed),
            channels_reaped: self.channels_reaped.load(Ordering::Relaxed),
            bytes_shed: self.bytes_shed.load(Ordering::Relaxed),
            gaps: self.gaps.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of scheduler metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub idle_waits: u64,
    pub messages_dispatched: u64,
    pub batches_dispatched: u64,
    pub batches_dropped: u64,
    pub messages_dropped: u64,
    pub channels_opened: u64,
    pub channels_reaped: u64,
    pub bytes_shed: u64,
    pub gaps: u64,
}

// =============================================================================
// Drop Logging
// =============================================================================

/// Log interval for aggregated drop reports
const LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Batches per interval that escalate the report to ERROR
const CRITICAL_DROP_THRESHOLD: u64 = 100;

/// Rate-limited logging of refused batches
///
/// Aggregates drops and logs at most once per second instead of once per
/// batch.
#[derive(Debug)]
pub struct DropTracker {
    interval_drops: u64,
    interval_messages: u64,
    last_log: Instant,
}

impl DropTracker {
    pub fn new() -> Self {
        Self {
            interval_drops: 0,
            interval_messages: 0,
            last_log: Instant::now(),
        }
    }

    /// Record a dropped batch; returns true if a report was logged
    pub fn record_drop(&mut self, message_count: u64) -> bool {
        self.interval_drops += 1;
        self.interval_messages += message_count;
        self.maybe_log()
    }

    fn maybe_log(&mut self) -> bool {
        if self.last_log.elapsed() < LOG_INTERVAL {
            return false;
        }
        self.last_log = Instant::now();

        let drops = std::mem::take(&mut self.interval_drops);
        let messages = std::mem::take(&mut self.interval_messages);
        if drops == 0 {
            return false;
        }

        if drops > CRITICAL_DROP_THRESHOLD {
            tracing::error!(
                dropped_batches = drops,
                dropped_messages = messages,
                threshold = CRITICAL_DROP_THRESHOLD,
                "consumer cannot keep up, shedding batches"
            );
        } else {
            tracing::warn!(
                dropped_batches = drops,
                dropped_messages = messages,
                "batches dropped by consumer in last second"
            );
        }
        true
    }

    #[cfg(test)]
    pub fn current_drops(&self) -> u64 {
        self.interval_drops
    }
}

impl Default for DropTracker {
    fn default() -> Self {
        Self::new()
    }
}
