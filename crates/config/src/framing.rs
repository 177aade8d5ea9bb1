//! Scanner and channel buffer configuration

use std::time::Duration;

use serde::Deserialize;
use strand_framing::channel::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_BUFFERED_BYTES, DEFAULT_MAX_BUFFERED_CHUNKS,
};
use strand_framing::scanner::{
    DEFAULT_CATEGORY_MARKER, DEFAULT_CHUNK_CAPACITY, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_SEPARATOR_CAPACITY, DEFAULT_TIME_CHECK_INTERVAL,
};
use strand_framing::{ChannelConfig, OverloadStrategy, ScannerConfig};

/// Scanner settings
///
/// # Example
///
/// ```toml
/// [scanner]
/// max_message_size = 65536
/// category_marker = "$EventCategory"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerSection {
    /// Messages longer than this many units are force-split
    /// Default: 65536
    pub max_message_size: usize,

    /// Pending chunk slots
    /// Default: 64
    pub chunk_capacity: usize,

    /// Units scanned between clock checks
    /// Default: 1024
    pub time_check_interval: usize,

    /// Separator offsets recorded per message
    /// Default: 64
    pub separator_capacity: usize,

    /// Literal located in each message; empty string disables it
    /// Default: "$EventCategory"
    pub category_marker: String,
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            time_check_interval: DEFAULT_TIME_CHECK_INTERVAL,
            separator_capacity: DEFAULT_SEPARATOR_CAPACITY,
            category_marker: DEFAULT_CATEGORY_MARKER.into(),
        }
    }
}

impl ScannerSection {
    pub fn to_scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            max_message_size: self.max_message_size,
            chunk_capacity: self.chunk_capacity,
            time_check_interval: self.time_check_interval,
            separator_capacity: self.separator_capacity,
            category_marker: (!self.category_marker.is_empty())
                .then(|| self.category_marker.clone()),
        }
    }
}

/// Overload strategy names
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Evict the oldest queued chunks (default)
    #[default]
    Overwrite,
    /// Discard new chunks while full
    Reject,
}

impl From<Strategy> for OverloadStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Overwrite => OverloadStrategy::Overwrite,
            Strategy::Reject => OverloadStrategy::Reject,
        }
    }
}

/// Channel buffer settings, shared by every channel
///
/// # Example
///
/// ```toml
/// [channel]
/// strategy = "reject"
/// idle_timeout = "2s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    /// What to do with data beyond the bounds
    /// Default: overwrite
    pub strategy: Strategy,

    /// Queued byte bound
    /// Default: 8MB
    pub max_buffered_bytes: usize,

    /// Queued chunk bound
    /// Default: 4096
    pub max_buffered_chunks: usize,

    /// Silence after which trailing data is flushed
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            strategy: Strategy::Overwrite,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            max_buffered_chunks: DEFAULT_MAX_BUFFERED_CHUNKS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl ChannelSection {
    pub fn to_channel_config(&self, scanner: &ScannerSection) -> ChannelConfig {
        ChannelConfig {
            strategy: self.strategy.into(),
            max_buffered_bytes: self.max_buffered_bytes,
            max_buffered_chunks: self.max_buffered_chunks,
            idle_timeout: self.idle_timeout,
            scanner: scanner.to_scanner_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_framing_defaults() {
        let scanner: ScannerSection = toml::from_str("").unwrap();
        let config = scanner.to_scanner_config();
        let expected = ScannerConfig::default();
        assert_eq!(config.max_message_size, expected.max_message_size);
        assert_eq!(config.chunk_capacity, expected.chunk_capacity);
        assert_eq!(config.category_marker, expected.category_marker);
    }

    #[test]
    fn test_empty_marker_disables_category() {
        let scanner: ScannerSection = toml::from_str("category_marker = \"\"").unwrap();
        assert_eq!(scanner.to_scanner_config().category_marker, None);
    }

    #[test]
    fn test_channel_section() {
        let toml = r#"
strategy = "reject"
max_buffered_bytes = 1024
idle_timeout = "250ms"
"#;
        let section: ChannelSection = toml::from_str(toml).unwrap();
        let config = section.to_channel_config(&ScannerSection::default());
        assert_eq!(config.strategy, OverloadStrategy::Reject);
        assert_eq!(config.max_buffered_bytes, 1024);
        assert_eq!(config.max_buffered_chunks, DEFAULT_MAX_BUFFERED_CHUNKS);
        assert_eq!(config.idle_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!(toml::from_str::<ChannelSection>("strategy = \"block\"").is_err());
    }
}
