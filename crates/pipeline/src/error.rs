//! Pipeline error types

use thiserror::Error;

/// Scheduler errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Scheduler has stopped and takes no new channels
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Why a consumer did not take a batch
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsumerError {
    /// Consumer queue is full; the batch is dropped
    #[error("consumer full, {0} messages dropped")]
    Full(usize),

    /// Consumer went away; the batch is dropped
    #[error("consumer closed, {0} messages dropped")]
    Closed(usize),
}

impl ConsumerError {
    /// Messages lost with the batch
    pub fn dropped(&self) -> usize {
        match self {
            Self::Full(n) | Self::Closed(n) => *n,
        }
    }
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;
