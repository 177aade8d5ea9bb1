//! Scheduler configuration

use std::time::Duration;

use serde::Deserialize;
use strand_framing::ChannelConfig;
use strand_pipeline::{
    DEFAULT_MAX_BATCH_SIZE, DEFAULT_MIN_SLICE, DEFAULT_POLL_INTERVAL, DEFAULT_TICK_BUDGET,
    SchedulerConfig,
};

/// Scheduler settings
///
/// # Example
///
/// ```toml
/// [scheduler]
/// tick_budget = "10ms"
/// poll_interval = "250ms"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Work per tick, divided across active channels
    /// Default: 10ms
    #[serde(with = "humantime_serde")]
    pub tick_budget: Duration,

    /// Smallest slice one channel gets
    /// Default: 100us
    #[serde(with = "humantime_serde")]
    pub min_slice: Duration,

    /// Fallback wake-up while nothing has work
    /// Default: 250ms
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Outbound batch size that triggers an early dispatch
    /// Default: 10000
    pub max_batch_size: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_budget: DEFAULT_TICK_BUDGET,
            min_slice: DEFAULT_MIN_SLICE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl SchedulerSection {
    pub fn to_scheduler_config(&self, channel: ChannelConfig) -> SchedulerConfig {
        SchedulerConfig {
            tick_budget: self.tick_budget,
            min_slice: self.min_slice,
            poll_interval: self.poll_interval,
            max_batch_size: self.max_batch_size,
            channel,
        }
    }
}
