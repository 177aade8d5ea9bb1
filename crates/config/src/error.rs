//! Load and validation failures

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file named on the command line could not be read
    #[error("cannot read '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A field is out of range, e.g. a zero-sized buffer
    #[error("{component} '{name}': {field} {message}")]
    InvalidValue {
        /// `"scanner"`, `"channel"`, `"scheduler"` or `"receiver"`
        component: &'static str,
        name: String,
        field: &'static str,
        message: String,
    },

    /// Two receivers bind the same protocol and port
    #[error("{protocol} port {port} claimed by {receivers}")]
    DuplicatePort {
        protocol: &'static str,
        port: u16,
        /// Comma-separated receiver ids
        receivers: String,
    },

    #[error("no [[receivers]] configured")]
    NoReceivers,
}

impl ConfigError {
    pub fn invalid_value(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            component,
            name: name.into(),
            field,
            message: message.into(),
        }
    }

    pub fn duplicate_port(protocol: &'static str, port: u16, receivers: impl Into<String>) -> Self {
        Self::DuplicatePort {
            protocol,
            port,
            receivers: receivers.into(),
        }
    }
}
