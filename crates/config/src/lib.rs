//! Strand configuration file
//!
//! One TOML document: every section has defaults, and a file only needs
//! to list its `[[receivers]]`. Parsing validates the whole document, so a
//! `Config` that exists is one the server can start from.
//!
//! ```
//! use strand_config::Config;
//!
//! let config: Config = "[[receivers]]\nport = 6514".parse().unwrap();
//! assert_eq!(config.receivers[0].id(), "tcp-6514");
//! ```
//!
//! ```toml
//! [channel]
//! strategy = "reject"
//!
//! [[receivers]]
//! protocol = "tcp"
//! port = 6514
//!
//! [[receivers]]
//! protocol = "udp"
//! family = "dual"
//! port = 6514
//! ```
//!
//! Sections: `[log]`, `[scanner]`, `[channel]`, `[scheduler]`,
//! `[[receivers]]`.

mod error;
mod framing;
mod logging;
mod receivers;
mod scheduler;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use framing::{ChannelSection, ScannerSection, Strategy};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use receivers::{Family, Protocol, ReceiverConfig};
pub use scheduler::SchedulerSection;

use serde::Deserialize;
use strand_pipeline::SchedulerConfig;

/// Parsed and validated configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,

    /// Applied to every channel
    pub scanner: ScannerSection,

    pub channel: ChannelSection,

    pub scheduler: SchedulerSection,

    pub receivers: Vec<ReceiverConfig>,
}

impl Config {
    /// Read, parse and validate `path`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        fs::read_to_string(path)
            .map_err(|source| ConfigError::IoError {
                path: path.display().to_string(),
                source,
            })?
            .parse()
    }

    /// Checks that parsing alone cannot express; see `validation`
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Scheduler settings with the channel and scanner sections folded in
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let channel = self.channel.to_channel_config(&self.scanner);
        self.scheduler.to_scheduler_config(channel)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
