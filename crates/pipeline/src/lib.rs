//! Strand Pipeline
//!
//! The cooperative scheduler that drives every channel buffer and hands
//! framed messages downstream in batches.
//!
//! # Architecture
//!
//! ```text
//! [Receivers]              [Scheduler]                        [Consumer]
//!    TCP ────┐                                  one batch
//!    UDP ────┼──→ SchedulerHandle ──→ ChannelBuffer ×N ──→ per tick ──→ BatchConsumer
//!    UDP6 ───┘    (ChannelFactory)     round-robin slices
//! ```
//!
//! # Key Design
//!
//! - **Single-threaded**: runs on a `LocalSet`; channels are shared with
//!   receivers as `Rc<RefCell<_>>`
//! - **Time-sliced**: each tick splits a fixed budget across active channels
//! - **Coalesced output**: one consumer call per tick
//! - **Backpressure**: a refused batch disables ingress on all channels until
//!   the consumer catches up
//!
//! # Example
//!
//! ```ignore
//! use strand_pipeline::{Scheduler, SchedulerConfig, consumer_fn};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default(), consumer_fn(|batch| {
//!     for msg in batch {
//!         println!("{}", msg.payload_lossy());
//!     }
//! }));
//! let handle = scheduler.handle();   // pass to receivers as their ChannelFactory
//! tokio::task::spawn_local(scheduler.run(cancel));
//! ```

mod channel;
mod consumer;
mod error;
mod message;
mod metrics;
mod scheduler;

pub use channel::{SchedulerChannel, SchedulerHandle};
pub use consumer::{BatchConsumer, FnConsumer, consumer_fn};
pub use error::{ConsumerError, Result, SchedulerError};
pub use message::FramedMessage;
pub use metrics::{DropTracker, MetricsSnapshot, SchedulerMetrics};
pub use scheduler::{
    DEFAULT_MAX_BATCH_SIZE, DEFAULT_MIN_SLICE, DEFAULT_POLL_INTERVAL, DEFAULT_TICK_BUDGET,
    Scheduler, SchedulerConfig, TickOutcome,
};
