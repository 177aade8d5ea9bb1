//! Dual-stack UDP receiver
//!
//! Runs an IPv4 and an IPv6-only [`UdpReceiver`] on the same port so one
//! configured endpoint accepts both families regardless of the platform's
//! `IPV6_V6ONLY` default.
//!
//! Both members must start; if the second fails the first is stopped again.
//! A fatal error from either member is reported by the pair, and stopping
//! the pair stops both. Metrics are shared.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::ChannelFactory;
use crate::common::ReceiverMetrics;
use crate::error::{ReceiverError, Result};
use crate::receiver::Receiver;
use crate::udp::{UdpReceiver, UdpReceiverConfig};

/// IPv4 wildcard used for the v4 member
pub const IPV4_ANY: &str = "0.0.0.0";

/// IPv6 wildcard used for the v6 member
pub const IPV6_ANY: &str = "::";

/// Pair of family-specific UDP receivers behaving as one
pub struct DualStackUdpReceiver<F: ChannelFactory> {
    id: String,
    v4: UdpReceiver<F>,
    v6: UdpReceiver<F>,
    metrics: Arc<ReceiverMetrics>,
}

impl<F: ChannelFactory> DualStackUdpReceiver<F> {
    /// Listen on the IPv4 and IPv6 wildcards at `config.port`
    pub fn new(config: UdpReceiverConfig, factory: F) -> Self {
        Self::with_addresses(config, IPV4_ANY, IPV6_ANY, factory)
    }

    /// Listen on explicit per-family addresses
    pub fn with_addresses(
        config: UdpReceiverConfig,
        v4_address: &str,
        v6_address: &str,
        factory: F,
    ) -> Self {
        let metrics = Arc::new(ReceiverMetrics::new());
        let v4 = UdpReceiverConfig {
            id: format!("{}/ipv4", config.id),
            address: v4_address.into(),
            only_v6: false,
            ..config.clone()
        };
        let v6 = UdpReceiverConfig {
            id: format!("{}/ipv6", config.id),
            address: v6_address.into(),
            only_v6: true,
            ..config.clone()
        };
        Self {
            id: config.id,
            v4: UdpReceiver::with_metrics(v4, factory.clone(), Arc::clone(&metrics)),
            v6: UdpReceiver::with_metrics(v6, factory, Arc::clone(&metrics)),
            metrics,
        }
    }

    pub fn local_addrs(&self) -> (Option<SocketAddr>, Option<SocketAddr>) {
        (self.v4.local_addr(), self.v6.local_addr())
    }

    pub fn is_running(&self) -> bool {
        self.v4.is_running() && self.v6.is_running()
    }

    pub fn channel_count(&self) -> usize {
        self.v4.channel_count() + self.v6.channel_count()
    }
}

#[async_trait(?Send)]
impl<F: ChannelFactory> Receiver for DualStackUdpReceiver<F> {
    fn name(&self) -> &str {
        &self.id
    }

    async fn start(&mut self) -> Result<()> {
        self.v4
            .start()
            .await
            .map_err(|e| ReceiverError::DualStack {
                family: "ipv4",
                source: Box::new(e),
            })?;

        if let Err(e) = self.v6.start().await {
            self.v4.stop().await;
            return Err(ReceiverError::DualStack {
                family: "ipv6",
                source: Box::new(e),
            });
        }
        Ok(())
    }

    async fn stop(&mut self) {
        self.v4.stop().await;
        self.v6.stop().await;
    }

    async fn fatal(&mut self) -> ReceiverError {
        let (family, error) = tokio::select! {
            e = self.v4.fatal() => ("ipv4", e),
            e = self.v6.fatal() => ("ipv6", e),
        };
        ReceiverError::DualStack {
            family,
            source: Box::new(error),
        }
    }

    fn metrics(&self) -> &Arc<ReceiverMetrics> {
        &self.metrics
    }
}
