use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::error::Result;
use crate::store::Store;
use crate::transport::{self, Transport};
use crate::types::DeliveryStatus;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Periodic re-delivery of failed webhook attempts.
///
/// One worker per process. Each tick selects a bounded batch of pending
/// delivery records (oldest first) and re-attempts them sequentially,
/// bounding outbound concurrency. The batch is awaited inline between
/// timer ticks, so a tick can never overlap a still-running predecessor
/// and no record is ever claimed by two in-flight attempts.
pub struct RetryWorker {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: WebhookConfig,
}

impl RetryWorker {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            config,
        }
    }

    /// Start the periodic loop and hand back its lifecycle handle.
    pub fn spawn(self) -> RetryWorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.retry_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?self.config.retry_interval, "retry worker started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // A tick failure is logged and isolated; the loop
                        // always reaches the next tick.
                        if let Err(e) = self.tick().await {
                            error!(error = %e, "retry tick failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("retry worker stopping");
                        break;
                    }
                }
            }
        });
        RetryWorkerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// One retry pass. Public so tests can drive the worker with a fake
    /// clock instead of the timer.
    pub async fn tick(&self) -> Result<()> {
        let batch = self
            .store
            .select_retryable(self.config.max_retry_attempts, self.config.batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(());
        }
        debug!(batch = batch.len(), "re-attempting pending deliveries");

        for record in batch {
            // Join against whatever subscriptions match (user, event) right
            // now, not a dispatch-time snapshot: a subscription created
            // since dispatch picks up the backlog, a deleted one leaves its
            // record inert without consuming attempts.
            let subs = match self.store.list_active(record.user_id, record.event).await {
                Ok(subs) => subs,
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "failed to resolve subscription for retry");
                    continue;
                }
            };
            let Some(sub) = subs.into_iter().next() else {
                continue;
            };

            let outcome = transport::attempt(
                self.transport.as_ref(),
                self.clock.as_ref(),
                &sub,
                record.event,
                record.payload.as_bytes(),
            )
            .await;
            let delivered = outcome.is_ok();
            if let Err(e) = outcome {
                warn!(record_id = %record.id, url = %sub.url, error = %e, "retry attempt failed");
            }

            match self
                .store
                .record_attempt(
                    record.id,
                    delivered,
                    self.config.max_retry_attempts,
                    self.clock.now(),
                )
                .await
            {
                Ok(updated) => match updated.status {
                    DeliveryStatus::Delivered if delivered => {
                        info!(record_id = %updated.id, attempts = updated.attempts, "delivery succeeded on retry");
                    }
                    DeliveryStatus::Exhausted => {
                        warn!(record_id = %updated.id, attempts = updated.attempts, "delivery attempts exhausted");
                    }
                    _ => {}
                },
                Err(e) => {
                    error!(record_id = %record.id, error = %e, "failed to update delivery record");
                }
            }
        }
        Ok(())
    }
}

/// Handle to a spawned [`RetryWorker`] loop.
pub struct RetryWorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RetryWorkerHandle {
    /// Signal shutdown and wait for the loop to exit. A batch already in
    /// flight finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
