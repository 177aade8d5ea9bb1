//! UDP Receiver
//!
//! Datagram receiver: one bound socket, one channel per remote endpoint.
//!
//! # Design
//!
//! UDP has no connection teardown, so channels are keyed by the remote
//! `address:port`, created lazily on the first datagram from a new remote
//! and closed by a periodic sweep once they have been idle for
//! `idle_timeout`.
//!
//! Each datagram is pushed into its channel unchanged; datagrams larger than
//! `buffer_size` are truncated by the socket.
//!
//! # Example
//!
//! ```ignore
//! let config = UdpReceiverConfig::with_port(6514);
//! let mut receiver = UdpReceiver::new(config, factory);
//! receiver.start().await?;
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelFactory, IngressChannel};
use crate::common::{ConnectionInfo, ReceiverMetrics, Transport};
use crate::error::{ReceiverError, Result, is_connection_reset};
use crate::receiver::{Receiver, Running, wait_fatal};
use crate::tcp::DEFAULT_PORT;

// =============================================================================
// Constants
// =============================================================================

/// Default datagram buffer size (64KB, the UDP maximum)
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default socket receive buffer (1MB for bursts)
const DEFAULT_SOCKET_BUFFER_SIZE: usize = 1024 * 1024;

/// Default remote idle timeout
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default idle sweep period
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

// =============================================================================
// Configuration
// =============================================================================

/// UDP receiver configuration
#[derive(Debug, Clone)]
pub struct UdpReceiverConfig {
    /// Receiver name for logs
    pub id: String,

    /// Bind address (e.g., "0.0.0.0" or "::")
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Largest datagram accepted without truncation
    pub buffer_size: usize,

    /// SO_RCVBUF
    pub socket_buffer_size: usize,

    /// Close a remote's channel after this long without datagrams
    pub idle_timeout: Duration,

    /// How often idle channels are swept
    pub sweep_interval: Duration,

    /// Restrict an IPv6 socket to IPv6 traffic (IPV6_V6ONLY)
    pub only_v6: bool,
}

impl Default for UdpReceiverConfig {
    fn default() -> Self {
        Self {
            id: "udp".into(),
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            socket_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            only_v6: false,
        }
    }
}

impl UdpReceiverConfig {
    /// Create config with custom port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address to bind to
    pub fn bind_address(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

// =============================================================================
// Receiver Implementation
// =============================================================================

type Channels<C> = Rc<RefCell<HashMap<SocketAddr, C>>>;

/// UDP datagram receiver
pub struct UdpReceiver<F: ChannelFactory> {
    config: UdpReceiverConfig,
    factory: F,
    metrics: Arc<ReceiverMetrics>,
    channels: Channels<F::Channel>,
    local_addr: Option<SocketAddr>,
    running: Option<Running>,
}

impl<F: ChannelFactory> UdpReceiver<F> {
    pub fn new(config: UdpReceiverConfig, factory: F) -> Self {
        Self::with_metrics(config, factory, Arc::new(ReceiverMetrics::new()))
    }

    /// Create a receiver reporting into existing metrics
    pub fn with_metrics(
        config: UdpReceiverConfig,
        factory: F,
        metrics: Arc<ReceiverMetrics>,
    ) -> Self {
        Self {
            config,
            factory,
            metrics,
            channels: Rc::new(RefCell::new(HashMap::new())),
            local_addr: None,
            running: None,
        }
    }

    /// Bound address once started (resolves port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Remotes with a live channel
    pub fn channel_count(&self) -> usize {
        self.channels.borrow().len()
    }

    /// Create the socket with socket2 and hand it to tokio
    fn bind_socket(&self) -> Result<UdpSocket> {
        let bind_addr = self.config.bind_address();
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|_| ReceiverError::InvalidAddress {
                address: bind_addr.clone(),
            })?;

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        if addr.is_ipv6() {
            socket.set_only_v6(self.config.only_v6)?;
        }

        if let Err(e) = socket.set_recv_buffer_size(self.config.socket_buffer_size) {
            tracing::warn!(
                error = %e,
                requested_size = self.config.socket_buffer_size,
                "Failed to set UDP SO_RCVBUF"
            );
        }

        socket
            .bind(&addr.into())
            .map_err(|e| ReceiverError::Bind {
                address: bind_addr,
                source: e,
            })?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        Ok(UdpSocket::from_std(std_socket)?)
    }

    fn close_all(&self) {
        let drained: Vec<_> = self.channels.borrow_mut().drain().collect();
        for (peer, channel) in drained {
            self.metrics.connection_closed();
            if let Err(e) = channel.close() {
                tracing::debug!(peer = %peer, error = %e, "failed to close channel");
            }
        }
    }
}

#[async_trait(?Send)]
impl<F: ChannelFactory> Receiver for UdpReceiver<F> {
    fn name(&self) -> &str {
        &self.config.id
    }

    async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(ReceiverError::AlreadyRunning);
        }

        let socket = self.bind_socket()?;
        let local_addr = socket.local_addr()?;

        let (mut running, fatal_tx) = Running::new();
        let worker = DatagramWorker {
            config: self.config.clone(),
            factory: self.factory.clone(),
            metrics: Arc::clone(&self.metrics),
            channels: Rc::clone(&self.channels),
            local_port: local_addr.port(),
            cancel: running.cancel.clone(),
            fatal_tx,
        };
        running
            .tasks
            .push(tokio::task::spawn_local(worker.run(socket)));

        self.local_addr = Some(local_addr);
        self.running = Some(running);

        tracing::info!(
            receiver = %self.config.id,
            address = %local_addr,
            idle_timeout = ?self.config.idle_timeout,
            "UDP receiver listening"
        );
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.shutdown();
        self.close_all();
        self.local_addr = None;

        tracing::info!(receiver = %self.config.id, "UDP receiver stopped");
    }

    async fn fatal(&mut self) -> ReceiverError {
        wait_fatal(&mut self.running).await
    }

    fn metrics(&self) -> &Arc<ReceiverMetrics> {
        &self.metrics
    }
}

impl<F: ChannelFactory> Drop for UdpReceiver<F> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown();
        }
    }
}

// =============================================================================
// Datagram Worker
// =============================================================================

struct DatagramWorker<F: ChannelFactory> {
    config: UdpReceiverConfig,
    factory: F,
    metrics: Arc<ReceiverMetrics>,
    channels: Channels<F::Channel>,
    local_port: u16,
    cancel: CancellationToken,
    fatal_tx: mpsc::UnboundedSender<ReceiverError>,
}

impl<F: ChannelFactory> DatagramWorker<F> {
    async fn run(self, socket: UdpSocket) {
        let mut buf = BytesMut::with_capacity(self.config.buffer_size);

        let period = self.config.sweep_interval;
        let mut sweep = interval_at(tokio::time::Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            buf.reserve(self.config.buffer_size);
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = sweep.tick() => self.sweep_idle(),

                received = socket.recv_buf_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        self.metrics.chunk_received(len as u64);
                        let datagram = buf.split().freeze();
                        self.deliver(datagram, peer);
                    }
                    // ICMP errors from earlier sends surface here on some platforms
                    Err(e) if is_connection_reset(&e) => {
                        tracing::debug!(receiver = %self.config.id, error = %e, "UDP recv reset");
                    }
                    Err(e) => {
                        self.metrics.error();
                        tracing::warn!(receiver = %self.config.id, error = %e, "UDP recv error");
                        let _ = self.fatal_tx.send(ReceiverError::Recv(e));
                        break;
                    }
                }
            }
        }
    }

    fn deliver(&self, datagram: bytes::Bytes, peer: SocketAddr) {
        let mut channels = self.channels.borrow_mut();
        let channel = channels.entry(peer).or_insert_with(|| {
            self.metrics.connection_opened();
            tracing::debug!(receiver = %self.config.id, peer = %peer, "new UDP remote");
            self.factory.open(&ConnectionInfo::new(
                Transport::Udp,
                peer,
                self.local_port,
            ))
        });

        if let Err(e) = channel.push(datagram) {
            // Owner let go of the channel; the next datagram opens a fresh one
            tracing::debug!(peer = %peer, error = %e, "channel refused datagram");
            channels.remove(&peer);
            self.metrics.connection_closed();
        }
    }

    /// Close channels whose remote has gone quiet
    fn sweep_idle(&self) {
        let idle_timeout = self.config.idle_timeout;
        let mut evicted = 0u64;

        self.channels.borrow_mut().retain(|peer, channel| {
            if channel.last_push_elapsed() < idle_timeout {
                return true;
            }
            evicted += 1;
            if let Err(e) = channel.close() {
                tracing::debug!(peer = %peer, error = %e, "failed to close idle channel");
            }
            false
        });

        if evicted > 0 {
            self.metrics.channels_evicted(evicted);
            tracing::debug!(
                receiver = %self.config.id,
                evicted,
                "closed idle UDP channels"
            );
        }
    }
}

#[cfg(test)]
#[path = "udp_test.rs"]
mod udp_test;
