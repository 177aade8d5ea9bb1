//! Receiver lifecycle contract

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::ReceiverMetrics;
use crate::error::{ReceiverError, Result};

/// A network endpoint producing channels
///
/// Receivers run on a `LocalSet`: `start` spawns local tasks and returns
/// once the socket is bound. Errors after that point are reported through
/// [`fatal`](Receiver::fatal).
#[async_trait(?Send)]
pub trait Receiver {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Bind and start receiving; a bind failure rejects startup
    async fn start(&mut self) -> Result<()>;

    /// Stop receiving, drop connections and close every channel
    async fn stop(&mut self);

    /// Resolves with the first fatal error after a successful start
    ///
    /// Never resolves while the receiver is stopped.
    async fn fatal(&mut self) -> ReceiverError;

    fn metrics(&self) -> &Arc<ReceiverMetrics>;
}

/// Background tasks of a started receiver
#[derive(Debug)]
pub(crate) struct Running {
    pub cancel: CancellationToken,
    pub fatal_rx: mpsc::UnboundedReceiver<ReceiverError>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Running {
    pub fn new() -> (Self, mpsc::UnboundedSender<ReceiverError>) {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let running = Self {
            cancel: CancellationToken::new(),
            fatal_rx,
            tasks: Vec::new(),
        };
        (running, fatal_tx)
    }

    /// Cancel and abort every task
    pub fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Shared `fatal` implementation for receivers holding an `Option<Running>`
pub(crate) async fn wait_fatal(running: &mut Option<Running>) -> ReceiverError {
    match running {
        Some(r) => r.fatal_rx.recv().await.unwrap_or(ReceiverError::Stopped),
        None => std::future::pending().await,
    }
}
