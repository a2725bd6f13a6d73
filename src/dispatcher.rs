use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::events::EventKind;
use crate::store::Store;
use crate::transport::{self, Transport};
use crate::types::{DeliveryRecord, DeliveryStatus};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Fans a domain event out to the owner's active subscriptions.
///
/// This is the whole surface application code calls at event time. It is
/// infallible by signature: downstream failures are logged and recorded,
/// never surfaced to the request that produced the event.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: WebhookConfig,
}

impl Dispatcher {
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

    /// Attempt one immediate delivery per active matching subscription.
    ///
    /// The payload is serialized exactly once; the same bytes are signed,
    /// sent, and persisted so retries resend byte-identical content.
    /// Returns as soon as the per-subscription attempts are spawned — the
    /// caller never waits on a network round-trip, and each attempt
    /// completes independently in the background.
    ///
    /// With no active subscriber for the event this is a silent no-op and
    /// no ledger row is written.
    pub async fn dispatch(&self, user_id: Uuid, event: EventKind, payload: &Value) {
        let body = match serde_json::to_string(&serde_json::json!({
            "event": event.as_str(),
            "data": payload,
        })) {
            Ok(body) => body,
            Err(e) => {
                error!(user_id = %user_id, event = %event, error = %e, "failed to serialize webhook payload");
                return;
            }
        };

        let subs = match self.store.list_active(user_id, event).await {
            Ok(subs) => subs,
            Err(e) => {
                error!(user_id = %user_id, event = %event, error = %e, "failed to resolve subscriptions");
                return;
            }
        };
        if subs.is_empty() {
            return;
        }
        debug!(user_id = %user_id, event = %event, subscribers = subs.len(), "dispatching event");

        for sub in subs {
            let store = Arc::clone(&self.store);
            let transport = Arc::clone(&self.transport);
            let clock = Arc::clone(&self.clock);
            let max_attempts = self.config.max_retry_attempts;
            let body = body.clone();

            tokio::spawn(async move {
                let outcome =
                    transport::attempt(transport.as_ref(), clock.as_ref(), &sub, event, body.as_bytes())
                        .await;
                let delivered = outcome.is_ok();
                if let Err(e) = outcome {
                    warn!(subscription_id = %sub.id, url = %sub.url, event = %event, error = %e, "delivery attempt failed");
                }

                let now = clock.now();
                let record = DeliveryRecord {
                    id: Uuid::new_v4(),
                    user_id,
                    event,
                    payload: body,
                    created_at: now,
                    delivered_at: delivered.then_some(now),
                    attempts: 1,
                    status: DeliveryStatus::derive(delivered, 1, max_attempts),
                };
                if let Err(e) = store.insert_record(record).await {
                    error!(user_id = %user_id, event = %event, error = %e, "failed to record delivery outcome");
                }
            });
        }
    }
}
