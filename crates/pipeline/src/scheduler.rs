//! Scheduler - cooperative round-robin over channel buffers
//!
//! Owns every live channel buffer. Each tick visits channels in order and
//! gives each a slice of `tick_budget / active channels` (never below
//! `min_slice`). Messages completed during the tick collect in one outbound
//! batch that is handed to the consumer once per tick, or early when it
//! reaches `max_batch_size`.
//!
//! # Ordering
//!
//! The channel list is a plain `Vec`. A channel with no further work is
//! swapped to the end of the active range, so busy channels stay in front;
//! closed and drained channels are swap-removed and erased.
//!
//! # Waiting
//!
//! While any channel has work the loop yields to the runtime between ticks
//! (`yield_now`), letting receiver tasks run. When nothing has work it waits
//! on a `Notify` signalled by pushes, closes and registrations, bounded by
//! `poll_interval` so idle timeouts are still noticed.
//!
//! # Backpressure
//!
//! A consumer refusing a batch disables ingress on every channel until a
//! batch is accepted again. Handles can do the same explicitly.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use strand_framing::{ChannelBuffer, ChannelConfig};
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelSlot, SchedulerHandle, Shared};
use crate::consumer::BatchConsumer;
use crate::error::ConsumerError;
use crate::message::FramedMessage;
use crate::metrics::{DropTracker, SchedulerMetrics};

// =============================================================================
// Constants
// =============================================================================

/// Default total work per tick
pub const DEFAULT_TICK_BUDGET: Duration = Duration::from_millis(10);

/// Default lower bound for one channel's slice
pub const DEFAULT_MIN_SLICE: Duration = Duration::from_micros(100);

/// Default fallback timer while idle
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default batch size that triggers an early dispatch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10_000;

// =============================================================================
// Configuration
// =============================================================================

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Work per tick, divided across active channels
    pub tick_budget: Duration,

    /// Smallest slice a channel gets
    pub min_slice: Duration,

    /// Fallback wake-up while no channel has work
    pub poll_interval: Duration,

    /// Outbound batch size that triggers an early dispatch
    pub max_batch_size: usize,

    /// Settings for every channel buffer
    pub channel: ChannelConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_budget: DEFAULT_TICK_BUDGET,
            min_slice: DEFAULT_MIN_SLICE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            channel: ChannelConfig::default(),
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Some channel still has work; tick again soon
    pub has_more_work: bool,

    /// Messages framed during the tick
    pub messages: usize,

    /// Channels reaped during the tick
    pub reaped: usize,
}

/// What visiting a channel left it as
enum Visit {
    /// Budget ran out; keep it in the active range
    More,
    /// Nothing left to do for now
    Idle,
    /// Closed and drained
    Done,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Cooperative scheduler over all channel buffers
pub struct Scheduler<C: BatchConsumer> {
    config: SchedulerConfig,
    shared: Rc<Shared>,
    channels: Vec<Rc<ChannelSlot>>,
    consumer: C,
    metrics: Arc<SchedulerMetrics>,
    drops: DropTracker,
    /// Ingress state last applied to the channels
    ingress_applied: bool,
    /// Consumer refused the last batch
    consumer_pressure: bool,
}

impl<C: BatchConsumer> Scheduler<C> {
    pub fn new(config: SchedulerConfig, consumer: C) -> Self {
        Self {
            shared: Rc::new(Shared::new(config.channel.clone())),
            config,
            channels: Vec::new(),
            consumer,
            metrics: Arc::new(SchedulerMetrics::new()),
            drops: DropTracker::new(),
            ingress_applied: true,
            consumer_pressure: false,
        }
    }

    /// Handle for receivers (implements `ChannelFactory`)
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(Rc::clone(&self.shared))
    }

    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.metrics
    }

    /// Live channels, including ones registered since the last tick
    pub fn channel_count(&self) -> usize {
        self.channels.len() + self.shared.pending.borrow().len()
    }

    /// Run one round over all channels
    pub fn tick(&mut self) -> TickOutcome {
        self.metrics.record_tick();
        self.adopt_pending();
        self.sync_ingress();

        let mut outcome = TickOutcome::default();
        let ready = self
            .channels
            .iter()
            .filter(|slot| slot.buffer.try_borrow().is_ok_and(|b| needs_visit(&b)))
            .count();
        let slice = (self.config.tick_budget / ready.max(1) as u32).max(self.config.min_slice);

        let mut end = self.channels.len();
        let mut i = 0;
        while i < end {
            let slot = Rc::clone(&self.channels[i]);
            let (visit, messages) = Self::visit(&slot, slice);
            outcome.messages += messages;

            match visit {
                Visit::More => {
                    outcome.has_more_work = true;
                    i += 1;
                }
                Visit::Idle => {
                    end -= 1;
                    self.channels.swap(i, end);
                }
                Visit::Done => {
                    end -= 1;
                    self.channels.swap(i, end);
                    self.channels.swap_remove(end);
                    self.reap(&slot);
                    outcome.reaped += 1;
                }
            }

            if self.shared.outbound.borrow().len() >= self.config.max_batch_size {
                self.dispatch();
            }
        }

        self.dispatch();
        outcome
    }

    /// Give one channel its slice
    fn visit(slot: &ChannelSlot, slice: Duration) -> (Visit, usize) {
        let Ok(mut buffer) = slot.buffer.try_borrow_mut() else {
            // In use elsewhere; try again next tick
            return (Visit::More, 0);
        };

        if buffer.is_done() {
            return (Visit::Done, 0);
        }
        if !needs_visit(&buffer) {
            return (Visit::Idle, 0);
        }

        let processed = buffer.process(slice, false);
        let visit = if buffer.is_done() {
            Visit::Done
        } else if processed.has_more_work {
            Visit::More
        } else {
            Visit::Idle
        };
        (visit, processed.messages)
    }

    fn reap(&self, slot: &ChannelSlot) {
        match slot.buffer.try_borrow_mut() {
            Ok(mut buffer) => {
                self.metrics.record_reaped(&buffer.stats());
                buffer.erase();
            }
            Err(_) => {
                tracing::debug!(channel_id = slot.id, "channel busy during reap");
            }
        }
        tracing::debug!(channel_id = slot.id, source = %slot.info, "channel reaped");
    }

    fn adopt_pending(&mut self) {
        let pending = std::mem::take(&mut *self.shared.pending.borrow_mut());
        for slot in pending {
            self.metrics.record_opened();
            if !self.ingress_applied
                && let Ok(mut buffer) = slot.buffer.try_borrow_mut()
            {
                buffer.disable_ingress();
            }
            self.channels.push(slot);
        }
    }

    /// Push the effective ingress state down to channels when it changes
    fn sync_ingress(&mut self) {
        if self.consumer_pressure && self.consumer.is_ready() {
            self.consumer_pressure = false;
        }
        let wanted = self.shared.ingress_enabled.get() && !self.consumer_pressure;
        if wanted == self.ingress_applied {
            return;
        }
        self.ingress_applied = wanted;

        for slot in &self.channels {
            if let Ok(mut buffer) = slot.buffer.try_borrow_mut() {
                if wanted {
                    buffer.enable_ingress();
                } else {
                    buffer.disable_ingress();
                }
            }
        }
        tracing::info!(ingress_enabled = wanted, channels = self.channels.len(), "ingress toggled");
    }

    /// Hand the outbound batch to the consumer
    fn dispatch(&mut self) {
        let batch: Vec<FramedMessage> = std::mem::take(&mut *self.shared.outbound.borrow_mut());
        if batch.is_empty() {
            return;
        }
        let count = batch.len() as u64;

        match self.consumer.consume(batch) {
            Ok(()) => {
                self.metrics.record_dispatched(count);
                if self.consumer_pressure {
                    self.consumer_pressure = false;
                    self.sync_ingress();
                }
            }
            Err(e) => {
                self.metrics.record_dropped(count);
                self.drops.record_drop(count);
                if let ConsumerError::Closed(_) = e {
                    tracing::debug!(error = %e, "consumer closed");
                }
                if !self.consumer_pressure {
                    self.consumer_pressure = true;
                    self.sync_ingress();
                }
            }
        }
    }

    /// Tick until cancelled
    ///
    /// On cancellation every channel is flushed, the last batch dispatched
    /// and all channels erased.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            tick_budget = ?self.config.tick_budget,
            poll_interval = ?self.config.poll_interval,
            "scheduler started"
        );

        let notify = Rc::clone(&self.shared.notify);
        while !cancel.is_cancelled() {
            if self.tick().has_more_work {
                tokio::task::yield_now().await;
                continue;
            }

            self.metrics.record_idle_wait();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = notify.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        self.shutdown();
    }

    /// Flush and erase every channel; later registrations are refused
    pub fn shutdown(&mut self) {
        self.shared.shutting_down.set(true);
        self.adopt_pending();

        for slot in std::mem::take(&mut self.channels) {
            if let Ok(mut buffer) = slot.buffer.try_borrow_mut() {
                buffer.close();
                buffer.process(self.config.tick_budget, true);
            }
            self.reap(&slot);
        }
        self.dispatch();

        let s = self.metrics.snapshot();
        tracing::info!(
            messages = s.messages_dispatched,
            batches = s.batches_dispatched,
            dropped_batches = s.batches_dropped,
            "scheduler stopped"
        );
    }
}

/// Whether processing the channel now could make progress
fn needs_visit(buffer: &ChannelBuffer<bytes::Bytes>) -> bool {
    buffer.is_ready()
        || buffer.is_done()
        || (buffer.has_partial() && buffer.last_push_elapsed() >= buffer.idle_timeout())
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;
