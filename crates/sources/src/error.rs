//! Receiver errors

use std::io;

/// Receiver errors
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// Failed to bind to address
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Address could not be parsed
    #[error("invalid socket address: {address}")]
    InvalidAddress { address: String },

    /// Socket creation or option setup failed
    #[error("socket setup failed: {0}")]
    Socket(#[from] io::Error),

    /// Accepting connections failed after startup
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// Receiving datagrams failed after startup
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),

    /// One half of a dual-stack pair failed
    #[error("{family} receiver failed: {source}")]
    DualStack {
        family: &'static str,
        #[source]
        source: Box<ReceiverError>,
    },

    /// The supervisor gave up
    #[error("giving up after {attempts} restart attempts: {source}")]
    RestartsExhausted {
        attempts: u32,
        #[source]
        source: Box<ReceiverError>,
    },

    /// `start` called on a running receiver
    #[error("receiver already running")]
    AlreadyRunning,

    /// Background tasks went away without reporting an error
    #[error("receiver stopped unexpectedly")]
    Stopped,
}

/// Result type for receiver operations
pub type Result<T> = std::result::Result<T, ReceiverError>;

/// Errors that mean the peer went away, not that the receiver is broken
pub(crate) fn is_connection_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe
    )
}
