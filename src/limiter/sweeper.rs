use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::RateLimiter;

/// Background task evicting stale rate-limit entries on a fixed interval
#[derive(Debug)]
pub struct RateLimitSweeper {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RateLimitSweeper {
    /// Start sweeping `limiter` every `period`
    pub fn spawn(limiter: Arc<RateLimiter>, period: Duration) -> Self {
        let (shutdown, mut stop) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let dropped = limiter.sweep();
                        tracing::debug!(
                            dropped,
                            tracked = limiter.tracked_clients(),
                            "Swept rate limiter entries"
                        );
                    }
                    _ = &mut stop => break,
                }
            }
        });

        Self { shutdown, task }
    }

    /// Stop the sweep task and wait for it to finish
    pub async fn shutdown(self) {
        if self.shutdown.send(()).is_err() {
            tracing::warn!("Rate limiter sweep task already stopped");
        }
        if let Err(error) = self.task.await {
            tracing::error!(error.cause_chain = ?error, "Rate limiter sweep task failed");
        }
    }
}
