//! Batch consumers
//!
//! The scheduler hands every tick's messages to a [`BatchConsumer`] in one
//! call. Consumers must not block: a consumer that cannot take a batch
//! reports it and the batch is dropped.

use tokio::sync::mpsc;

use crate::error::ConsumerError;
use crate::message::FramedMessage;

/// Downstream receiver of message batches
pub trait BatchConsumer {
    fn consume(&mut self, batch: Vec<FramedMessage>) -> Result<(), ConsumerError>;

    /// Whether a batch would be accepted right now
    ///
    /// Polled while ingress is disabled after a refusal.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Consumer calling a closure for every batch
#[derive(Debug, Clone)]
pub struct FnConsumer<F>(F);

/// Wrap a closure as a [`BatchConsumer`]
pub fn consumer_fn<F>(f: F) -> FnConsumer<F>
where
    F: FnMut(Vec<FramedMessage>),
{
    FnConsumer(f)
}

impl<F> BatchConsumer for FnConsumer<F>
where
    F: FnMut(Vec<FramedMessage>),
{
    fn consume(&mut self, batch: Vec<FramedMessage>) -> Result<(), ConsumerError> {
        (self.0)(batch);
        Ok(())
    }
}

/// Bounded channel to a consumer task; never waits for capacity
impl BatchConsumer for mpsc::Sender<Vec<FramedMessage>> {
    fn consume(&mut self, batch: Vec<FramedMessage>) -> Result<(), ConsumerError> {
        self.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(batch) => ConsumerError::Full(batch.len()),
            mpsc::error::TrySendError::Closed(batch) => ConsumerError::Closed(batch.len()),
        })
    }

    fn is_ready(&self) -> bool {
        self.capacity() > 0
    }
}
