//! Receiver-side view of a channel
//!
//! Receivers know nothing about framing or scheduling. They ask a
//! [`ChannelFactory`] for a channel when a new connection (TCP) or remote
//! endpoint (UDP) shows up, and push raw reads into it.

use std::time::Duration;

use bytes::Bytes;

use crate::common::ConnectionInfo;

/// Channel errors seen by receivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel was closed or erased by its owner
    #[error("channel closed")]
    Closed,

    /// The channel is being used further up the stack
    #[error("channel busy")]
    Busy,
}

/// Sink for the raw bytes of one connection or remote endpoint
pub trait IngressChannel {
    /// Hand over a chunk read from the network
    fn push(&self, data: Bytes) -> Result<(), ChannelError>;

    /// No more data will follow; buffered data still drains
    fn close(&self) -> Result<(), ChannelError>;

    /// Time since the last push
    fn last_push_elapsed(&self) -> Duration;
}

/// Creates a channel per connection / remote endpoint
pub trait ChannelFactory: Clone + 'static {
    type Channel: IngressChannel + 'static;

    fn open(&self, info: &ConnectionInfo) -> Self::Channel;
}
