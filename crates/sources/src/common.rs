//! Common types shared by all receivers

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

/// Transport a channel's data arrived over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics shared by all receiver types
///
/// For UDP, a "connection" is a remote endpoint with a live channel.
#[derive(Debug, Default)]
pub struct ReceiverMetrics {
    /// Currently open channels
    pub connections_active: AtomicU64,

    /// Channels opened since start
    pub connections_total: AtomicU64,

    /// Payload bytes read from the network
    pub bytes_received: AtomicU64,

    /// Reads (TCP) or datagrams (UDP) handed to channels
    pub chunks_received: AtomicU64,

    /// UDP channels closed by the idle sweep
    pub channels_evicted: AtomicU64,

    /// Transport errors
    pub errors: AtomicU64,

    /// Restarts performed by the supervisor
    pub restarts: AtomicU64,
}

impl ReceiverMetrics {
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            chunks_received: AtomicU64::new(0),
            channels_evicted: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn chunk_received(&self, bytes: u64) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn channels_evicted(&self, count: u64) {
        self.channels_evicted.fetch_add(count, Ordering::Relaxed);
        self.connections_active.fetch_sub(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn restarted(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            channels_evicted: self.channels_evicted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of receiver metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub bytes_received: u64,
    pub chunks_received: u64,
    pub channels_evicted: u64,
    pub errors: u64,
    pub restarts: u64,
}

/// Who a channel belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    pub transport: Transport,

    /// Remote IP address
    pub remote_ip: IpAddr,

    /// Remote port
    pub remote_port: u16,

    /// Local port the data came in on
    pub local_port: u16,
}

impl ConnectionInfo {
    pub fn new(transport: Transport, remote: SocketAddr, local_port: u16) -> Self {
        Self {
            transport,
            remote_ip: remote.ip(),
            remote_port: remote.port(),
            local_port,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        SocketAddr::new(self.remote_ip, self.remote_port)
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport, self.remote_addr())
    }
}
