//! Server wiring
//!
//! Everything runs on one `LocalSet`: the scheduler task plus one
//! supervised task per configured receiver. A receiver that cannot start,
//! or exhausts its restarts, shuts the whole server down.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use strand_config::{Config, Family, Protocol, ReceiverConfig};
use strand_pipeline::{Scheduler, SchedulerHandle};
use strand_sources::{
    DualStackUdpReceiver, Receiver, ReceiverMetrics, TcpReceiver, UdpReceiver, supervise,
};
use tokio::signal;
use tokio::task::{self, LocalSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::output::LineConsumer;

/// Run until SIGINT/SIGTERM or a receiver failure
pub async fn run(config: Config) -> Result<()> {
    LocalSet::new().run_until(serve(config)).await
}

async fn serve(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    let scheduler = Scheduler::new(config.scheduler_config(), LineConsumer::stdout());
    let handle = scheduler.handle();
    let scheduler_metrics = Arc::clone(scheduler.metrics());
    let scheduler_task = task::spawn_local(scheduler.run(cancel.clone()));

    let mut receivers = Vec::with_capacity(config.receivers.len());
    for receiver_config in &config.receivers {
        let mut receiver = build_receiver(receiver_config, handle.clone());
        let metrics = Arc::clone(receiver.metrics());
        let policy = receiver_config.restart_policy();
        let id = receiver_config.id();
        let cancel = cancel.clone();

        info!(
            receiver = %id,
            protocol = receiver_config.protocol.as_str(),
            port = receiver_config.port,
            "starting receiver"
        );
        let task = task::spawn_local(async move {
            let result = supervise(receiver.as_mut(), policy, cancel.clone()).await;
            if let Err(e) = &result {
                error!(receiver = %id, error = %e, "receiver failed, shutting down");
                cancel.cancel();
            }
            result.map_err(|e| anyhow!("receiver {id}: {e}"))
        });
        receivers.push((receiver_config.id(), metrics, task));
    }

    tokio::select! {
        _ = wait_for_shutdown() => info!("shutdown signal received"),
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();

    let mut first_error = None;
    for (id, metrics, task) in receivers {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(anyhow!("receiver {id} task failed: {e}"));
            }
        }
        log_receiver_metrics(&id, &metrics);
    }

    scheduler_task
        .await
        .map_err(|e| anyhow!("scheduler task failed: {e}"))?;
    let s = scheduler_metrics.snapshot();
    info!(
        messages = s.messages_dispatched,
        dropped_messages = s.messages_dropped,
        channels = s.channels_opened,
        bytes_shed = s.bytes_shed,
        gaps = s.gaps,
        "server stopped"
    );

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn build_receiver(config: &ReceiverConfig, handle: SchedulerHandle) -> Box<dyn Receiver> {
    match (config.protocol, config.family) {
        (Protocol::Tcp, _) => Box::new(TcpReceiver::new(config.to_tcp_config(), handle)),
        (Protocol::Udp, Family::Dual) => {
            Box::new(DualStackUdpReceiver::new(config.to_udp_config(), handle))
        }
        (Protocol::Udp, _) => Box::new(UdpReceiver::new(config.to_udp_config(), handle)),
    }
}

fn log_receiver_metrics(id: &str, metrics: &ReceiverMetrics) {
    let s = metrics.snapshot();
    info!(
        receiver = %id,
        connections = s.connections_total,
        bytes = s.bytes_received,
        chunks = s.chunks_received,
        evicted = s.channels_evicted,
        errors = s.errors,
        restarts = s.restarts,
        "receiver stopped"
    );
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
