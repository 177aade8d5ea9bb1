//! Receiver configuration
//!
//! One `[[receivers]]` entry per listening endpoint. Unset sizes fall back
//! to the per-protocol defaults of the receiver crate.

use std::time::Duration;

use serde::Deserialize;
use strand_sources::dual_stack::{IPV4_ANY, IPV6_ANY};
use strand_sources::supervisor::{DEFAULT_RESTART_ATTEMPTS, DEFAULT_RESTART_DELAY};
use strand_sources::tcp::DEFAULT_PORT;
use strand_sources::{RestartPolicy, TcpReceiverConfig, UdpReceiverConfig};

/// Transport protocol
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// Address family to listen on
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    #[default]
    Ipv4,
    Ipv6,
    /// IPv4 and IPv6-only sockets on the same port (udp only)
    Dual,
}

/// One listening endpoint
///
/// # Example
///
/// ```toml
/// [[receivers]]
/// protocol = "udp"
/// family = "dual"
/// port = 6514
/// idle_timeout = "30s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Name used in logs
    /// Default: "<protocol>-<port>"
    pub name: Option<String>,

    /// Default: tcp
    pub protocol: Protocol,

    /// Default: ipv4
    pub family: Family,

    /// Bind address
    /// Default: the family's wildcard address
    pub address: Option<String>,

    /// Default: 6514
    pub port: u16,

    /// Read buffer per connection, or largest datagram
    /// Default: 64KB
    pub buffer_size: Option<usize>,

    /// Kernel socket buffer size
    /// Default: 256KB for tcp, 1MB for udp
    pub socket_buffer_size: Option<usize>,

    /// TCP_NODELAY (tcp only)
    /// Default: true
    pub nodelay: bool,

    /// TCP keepalive idle time (tcp only)
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub keepalive: Option<Duration>,

    /// Close a remote's channel after this much silence (udp only)
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,

    /// How often idle remotes are swept (udp only)
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,

    /// Restarts after fatal errors before giving up
    /// Default: 10
    pub restart_attempts: u32,

    /// Delay between restarts
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub restart_delay: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            name: None,
            protocol: Protocol::Tcp,
            family: Family::Ipv4,
            address: None,
            port: DEFAULT_PORT,
            buffer_size: None,
            socket_buffer_size: None,
            nodelay: true,
            keepalive: TcpReceiverConfig::default().keepalive,
            idle_timeout: None,
            sweep_interval: None,
            restart_attempts: DEFAULT_RESTART_ATTEMPTS,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

impl ReceiverConfig {
    /// Name for logs and errors
    pub fn id(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.protocol.as_str(), self.port))
    }

    /// Bind address, defaulting to the family's wildcard
    pub fn bind_address(&self) -> String {
        match (&self.address, self.family) {
            (Some(address), _) => address.clone(),
            (None, Family::Ipv6) => IPV6_ANY.into(),
            (None, _) => IPV4_ANY.into(),
        }
    }

    pub fn to_tcp_config(&self) -> TcpReceiverConfig {
        let defaults = TcpReceiverConfig::default();
        TcpReceiverConfig {
            id: self.id(),
            address: self.bind_address(),
            port: self.port,
            buffer_size: self.buffer_size.unwrap_or(defaults.buffer_size),
            socket_buffer_size: self
                .socket_buffer_size
                .unwrap_or(defaults.socket_buffer_size),
            nodelay: self.nodelay,
            keepalive: self.keepalive,
        }
    }

    /// UDP settings; for `dual` the address is replaced per family
    pub fn to_udp_config(&self) -> UdpReceiverConfig {
        let defaults = UdpReceiverConfig::default();
        UdpReceiverConfig {
            id: self.id(),
            address: self.bind_address(),
            port: self.port,
            buffer_size: self.buffer_size.unwrap_or(defaults.buffer_size),
            socket_buffer_size: self
                .socket_buffer_size
                .unwrap_or(defaults.socket_buffer_size),
            idle_timeout: self.idle_timeout.unwrap_or(defaults.idle_timeout),
            sweep_interval: self.sweep_interval.unwrap_or(defaults.sweep_interval),
            only_v6: self.family == Family::Ipv6,
        }
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            max_attempts: self.restart_attempts,
            delay: self.restart_delay,
        }
    }
}
