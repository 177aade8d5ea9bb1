//! Strand Sources
//!
//! Network receivers that turn connections and datagram remotes into
//! channels and push raw reads into them.
//!
//! # Available Receivers
//!
//! - **TCP** - one channel per accepted connection
//! - **UDP** - one channel per remote `address:port`, swept when idle
//! - **Dual-stack UDP** - an IPv4 and an IPv6-only UDP receiver acting as one
//!
//! # Design Principles
//!
//! - **Zero-copy reads**: `bytes::BytesMut` reads frozen into `Bytes` chunks
//! - **Single-threaded**: receivers spawn their tasks on a `LocalSet` and
//!   share state through `Rc<RefCell<_>>`
//! - **No framing here**: receivers only move bytes; see `strand-framing`
//! - **Fatal path**: errors after startup surface through
//!   [`Receiver::fatal`] and are handled by [`supervise`]
//!
//! # Example
//!
//! ```ignore
//! use strand_sources::{TcpReceiver, TcpReceiverConfig, RestartPolicy, supervise};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut receiver = TcpReceiver::new(TcpReceiverConfig::with_port(6514), factory);
//! supervise(&mut receiver, RestartPolicy::default(), CancellationToken::new()).await?;
//! ```

pub mod channel;
mod common;
pub mod dual_stack;
mod error;
mod receiver;
pub mod supervisor;
pub mod tcp;
pub mod udp;

pub use channel::{ChannelError, ChannelFactory, IngressChannel};
pub use common::{ConnectionInfo, MetricsSnapshot, ReceiverMetrics, Transport};
pub use dual_stack::DualStackUdpReceiver;
pub use error::{ReceiverError, Result};
pub use receiver::Receiver;
pub use supervisor::{RestartPolicy, supervise};
pub use tcp::{TcpReceiver, TcpReceiverConfig};
pub use udp::{UdpReceiver, UdpReceiverConfig};

#[cfg(test)]
mod test_util;
