//! `[log]` section
//!
//! Diagnostics always go to stderr; stdout carries framed messages. The
//! CLI `--log-level` flag replaces `level` but keeps `directives`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Minimum severity written
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// Case-insensitive, as typed on the command line
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [Self::Trace, Self::Debug, Self::Info, Self::Warn, Self::Error]
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log level '{s}'"))
    }
}

/// Line format of diagnostics
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one event per line
    #[default]
    Console,
    /// One JSON object per event, for log shippers
    Json,
}

/// Diagnostic logging settings
///
/// ```toml
/// [log]
/// level = "info"
/// format = "json"
/// directives = "strand_sources=debug"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,

    pub format: LogFormat,

    /// Extra `EnvFilter` directives appended after the level,
    /// e.g. `"strand_pipeline=trace"`
    pub directives: Option<String>,
}

impl LogConfig {
    /// Filter string for `level`, followed by any extra directives
    pub fn filter(&self, level: LogLevel) -> String {
        match self.directives.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("{level},{extra}"),
            _ => level.to_string(),
        }
    }
}
