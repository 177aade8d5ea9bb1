//! TCP Receiver
//!
//! Stream receiver: one listening socket, one channel per accepted
//! connection.
//!
//! # Design
//!
//! - **Raw reads** - each read is frozen into a `Bytes` chunk and pushed into
//!   the connection's channel as-is; framing happens downstream
//! - **Connection records** - `(connection id, channel)` pairs live in a map
//!   owned by the receiver; a connection's reader removes its record and
//!   closes the channel on EOF or error
//! - **Fatal path** - accept errors after startup are reported through
//!   [`Receiver::fatal`] for the supervisor to restart the receiver
//!
//! # Example
//!
//! ```ignore
//! let config = TcpReceiverConfig::with_port(6514);
//! let mut receiver = TcpReceiver::new(config, factory);
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
use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelFactory, IngressChannel};
use crate::common::{ConnectionInfo, ReceiverMetrics, Transport};
use crate::error::{ReceiverError, Result, is_connection_reset};
use crate::receiver::{Receiver, Running, wait_fatal};

// =============================================================================
// Constants
// =============================================================================

/// Default listen port
pub const DEFAULT_PORT: u16 = 6514;

/// Default read buffer size per connection (64KB)
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default socket buffer size (256KB)
const DEFAULT_SOCKET_BUFFER_SIZE: usize = 256 * 1024;

/// Default keepalive interval (30s)
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Configuration
// =============================================================================

/// TCP receiver configuration
#[derive(Debug, Clone)]
pub struct TcpReceiverConfig {
    /// Receiver name for logs
    pub id: String,

    /// Bind address (e.g., "0.0.0.0" or "::")
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Read buffer size per connection
    pub buffer_size: usize,

    /// SO_RCVBUF / SO_SNDBUF
    pub socket_buffer_size: usize,

    /// TCP nodelay (disable Nagle's algorithm)
    pub nodelay: bool,

    /// TCP keepalive idle time (`None` disables)
    pub keepalive: Option<Duration>,
}

impl Default for TcpReceiverConfig {
    fn default() -> Self {
        Self {
            id: "tcp".into(),
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            socket_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            nodelay: true,
            keepalive: Some(DEFAULT_KEEPALIVE_INTERVAL),
        }
    }
}

impl TcpReceiverConfig {
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

type Connections<C> = Rc<RefCell<HashMap<u64, C>>>;

/// TCP stream receiver
pub struct TcpReceiver<F: ChannelFactory> {
    config: TcpReceiverConfig,
    factory: F,
    metrics: Arc<ReceiverMetrics>,
    connections: Connections<F::Channel>,
    local_addr: Option<SocketAddr>,
    running: Option<Running>,
}

impl<F: ChannelFactory> TcpReceiver<F> {
    pub fn new(config: TcpReceiverConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            metrics: Arc::new(ReceiverMetrics::new()),
            connections: Rc::new(RefCell::new(HashMap::new())),
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

    /// Open connections
    pub fn connection_count(&self) -> usize {
        self.connections.borrow().len()
    }

    /// Close every connection's channel and forget the records
    fn close_all(&self) {
        let drained: Vec<_> = self.connections.borrow_mut().drain().collect();
        for (id, channel) in drained {
            self.metrics.connection_closed();
            if let Err(e) = channel.close() {
                tracing::debug!(connection_id = id, error = %e, "failed to close channel");
            }
        }
    }
}

#[async_trait(?Send)]
impl<F: ChannelFactory> Receiver for TcpReceiver<F> {
    fn name(&self) -> &str {
        &self.config.id
    }

    async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(ReceiverError::AlreadyRunning);
        }

        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ReceiverError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;

        let (mut running, fatal_tx) = Running::new();
        let acceptor = Acceptor {
            config: self.config.clone(),
            factory: self.factory.clone(),
            metrics: Arc::clone(&self.metrics),
            connections: Rc::clone(&self.connections),
            local_port: local_addr.port(),
            cancel: running.cancel.clone(),
            fatal_tx,
        };
        running
            .tasks
            .push(tokio::task::spawn_local(acceptor.run(listener)));

        self.local_addr = Some(local_addr);
        self.running = Some(running);

        tracing::info!(
            receiver = %self.config.id,
            address = %local_addr,
            "TCP receiver listening"
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

        tracing::info!(receiver = %self.config.id, "TCP receiver stopped");
    }

    async fn fatal(&mut self) -> ReceiverError {
        wait_fatal(&mut self.running).await
    }

    fn metrics(&self) -> &Arc<ReceiverMetrics> {
        &self.metrics
    }
}

impl<F: ChannelFactory> Drop for TcpReceiver<F> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown();
        }
    }
}

// =============================================================================
// Accept Loop
// =============================================================================

struct Acceptor<F: ChannelFactory> {
    config: TcpReceiverConfig,
    factory: F,
    metrics: Arc<ReceiverMetrics>,
    connections: Connections<F::Channel>,
    local_port: u16,
    cancel: CancellationToken,
    fatal_tx: mpsc::UnboundedSender<ReceiverError>,
}

impl<F: ChannelFactory> Acceptor<F> {
    async fn run(self, listener: TcpListener) {
        let mut next_id: u64 = 0;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        configure_socket(&stream, &self.config);
                        next_id += 1;
                        self.open_connection(next_id, stream, peer);
                    }
                    Err(e) => {
                        self.metrics.error();
                        tracing::warn!(receiver = %self.config.id, error = %e, "TCP accept error");
                        let _ = self.fatal_tx.send(ReceiverError::Accept(e));
                        break;
                    }
                }
            }
        }
    }

    fn open_connection(&self, id: u64, stream: TcpStream, peer: SocketAddr) {
        let info = ConnectionInfo::new(Transport::Tcp, peer, self.local_port);
        let channel = self.factory.open(&info);
        self.connections.borrow_mut().insert(id, channel);
        self.metrics.connection_opened();

        tracing::debug!(
            receiver = %self.config.id,
            connection_id = id,
            peer = %peer,
            "connection accepted"
        );

        let reader = ConnectionReader {
            id,
            peer,
            buffer_size: self.config.buffer_size,
            metrics: Arc::clone(&self.metrics),
            connections: Rc::clone(&self.connections),
            cancel: self.cancel.clone(),
        };
        tokio::task::spawn_local(reader.run(stream));
    }
}

/// Configure socket options using socket2
fn configure_socket(stream: &TcpStream, config: &TcpReceiverConfig) {
    let socket = SockRef::from(stream);

    if config.nodelay
        && let Err(e) = socket.set_tcp_nodelay(true)
    {
        tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
    }
    if let Err(e) = socket.set_recv_buffer_size(config.socket_buffer_size) {
        tracing::warn!(error = %e, "Failed to set SO_RCVBUF");
    }
    if let Err(e) = socket.set_send_buffer_size(config.socket_buffer_size) {
        tracing::warn!(error = %e, "Failed to set SO_SNDBUF");
    }
    if let Some(idle) = config.keepalive
        && let Err(e) = socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))
    {
        tracing::warn!(error = %e, "Failed to set TCP keepalive");
    }
}

// =============================================================================
// Connection Reader
// =============================================================================

struct ConnectionReader<C> {
    id: u64,
    peer: SocketAddr,
    buffer_size: usize,
    metrics: Arc<ReceiverMetrics>,
    connections: Connections<C>,
    cancel: CancellationToken,
}

impl<C: IngressChannel> ConnectionReader<C> {
    async fn run(self, mut stream: TcpStream) {
        let mut buf = BytesMut::with_capacity(self.buffer_size);

        loop {
            buf.reserve(self.buffer_size);
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                read = stream.read_buf(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => {
                        self.metrics.chunk_received(n as u64);
                        let chunk = buf.split().freeze();
                        let pushed = match self.connections.borrow().get(&self.id) {
                            Some(channel) => channel.push(chunk),
                            // Record removed by stop()
                            None => return,
                        };
                        if let Err(e) = pushed {
                            tracing::debug!(
                                peer = %self.peer,
                                error = %e,
                                "channel refused data, dropping connection"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        if !is_connection_reset(&e) {
                            self.metrics.error();
                            tracing::debug!(peer = %self.peer, error = %e, "TCP read error");
                        }
                        break;
                    }
                }
            }
        }

        let record = self.connections.borrow_mut().remove(&self.id);
        if let Some(channel) = record {
            self.metrics.connection_closed();
            if let Err(e) = channel.close() {
                tracing::debug!(peer = %self.peer, error = %e, "failed to close channel");
            }
        }
        tracing::debug!(connection_id = self.id, peer = %self.peer, "connection closed");
    }
}

#[cfg(test)]
#[path = "tcp_test.rs"]
mod tcp_test;
