//! Receiver supervision
//!
//! Keeps a receiver running across fatal transport errors: stop it, wait a
//! fixed delay, start it again. Gives up after `max_attempts` restarts in
//! total. A failure of the very first start is returned immediately.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ReceiverError, Result};
use crate::receiver::Receiver;

/// Default number of restart attempts
pub const DEFAULT_RESTART_ATTEMPTS: u32 = 10;

/// Default delay between restart attempts
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Fixed-delay restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RESTART_ATTEMPTS,
            delay: DEFAULT_RESTART_DELAY,
        }
    }
}

/// Run `receiver` until `cancel` fires, restarting it on fatal errors
///
/// Returns `Ok(())` on cancellation (the receiver is stopped), or the last
/// error once the policy is exhausted.
pub async fn supervise<R>(
    receiver: &mut R,
    policy: RestartPolicy,
    cancel: CancellationToken,
) -> Result<()>
where
    R: Receiver + ?Sized,
{
    receiver.start().await?;
    let mut attempts = 0u32;

    loop {
        let error = tokio::select! {
            _ = cancel.cancelled() => {
                receiver.stop().await;
                return Ok(());
            }
            error = receiver.fatal() => error,
        };
        receiver.stop().await;
        let mut last = error;

        loop {
            if attempts >= policy.max_attempts {
                tracing::error!(
                    receiver = %receiver.name(),
                    attempts,
                    error = %last,
                    "receiver restart attempts exhausted"
                );
                return Err(ReceiverError::RestartsExhausted {
                    attempts,
                    source: Box::new(last),
                });
            }
            attempts += 1;

            tracing::warn!(
                receiver = %receiver.name(),
                attempt = attempts,
                max_attempts = policy.max_attempts,
                delay = ?policy.delay,
                error = %last,
                "restarting receiver"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(policy.delay) => {}
            }

            match receiver.start().await {
                Ok(()) => {
                    receiver.metrics().restarted();
                    break;
                }
                Err(e) => last = e,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::common::ReceiverMetrics;

    /// Receiver whose start results and fatal errors are scripted
    struct ScriptedReceiver {
        starts: VecDeque<Result<()>>,
        fatal_rx: mpsc::UnboundedReceiver<ReceiverError>,
        running: bool,
        start_calls: u32,
        stop_calls: u32,
        metrics: Arc<ReceiverMetrics>,
    }

    impl ScriptedReceiver {
        fn new(starts: Vec<Result<()>>) -> (Self, mpsc::UnboundedSender<ReceiverError>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let receiver = Self {
                starts: starts.into(),
                fatal_rx: rx,
                running: false,
                start_calls: 0,
                stop_calls: 0,
                metrics: Arc::new(ReceiverMetrics::new()),
            };
            (receiver, tx)
        }
    }

    #[async_trait(?Send)]
    impl Receiver for ScriptedReceiver {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn start(&mut self) -> Result<()> {
            self.start_calls += 1;
            let result = self.starts.pop_front().unwrap_or(Ok(()));
            self.running = result.is_ok();
            result
        }

        async fn stop(&mut self) {
            self.stop_calls += 1;
            self.running = false;
        }

        async fn fatal(&mut self) -> ReceiverError {
            if !self.running {
                return std::future::pending().await;
            }
            self.fatal_rx.recv().await.unwrap_or(ReceiverError::Stopped)
        }

        fn metrics(&self) -> &Arc<ReceiverMetrics> {
            &self.metrics
        }
    }

    fn recv_error() -> ReceiverError {
        ReceiverError::Recv(io::Error::other("socket gone"))
    }

    fn fast(max_attempts: u32) -> RestartPolicy {
        RestartPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_initial_start_failure_is_returned() {
        let bind = ReceiverError::Bind {
            address: "0.0.0.0:1".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let (mut receiver, _tx) = ScriptedReceiver::new(vec![Err(bind)]);

        let result = supervise(&mut receiver, fast(3), CancellationToken::new()).await;
        assert!(matches!(result, Err(ReceiverError::Bind { .. })));
        assert_eq!(receiver.start_calls, 1);
    }

    #[tokio::test]
    async fn test_restart_after_fatal_then_cancel() {
        let (mut receiver, tx) = ScriptedReceiver::new(vec![]);
        let cancel = CancellationToken::new();

        tx.send(recv_error()).unwrap();
        let canceller = cancel.clone();
        let stopper = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        };

        let (result, ()) = tokio::join!(supervise(&mut receiver, fast(3), cancel), stopper);
        assert!(result.is_ok());
        assert_eq!(receiver.start_calls, 2);
        assert_eq!(receiver.stop_calls, 2);
        assert_eq!(receiver.metrics.snapshot().restarts, 1);
        assert!(!receiver.running);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (mut receiver, tx) = ScriptedReceiver::new(vec![
            Ok(()),
            Err(recv_error()),
            Err(recv_error()),
        ]);
        tx.send(recv_error()).unwrap();

        let result = supervise(&mut receiver, fast(2), CancellationToken::new()).await;
        match result {
            Err(ReceiverError::RestartsExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(receiver.start_calls, 3);
    }
}
