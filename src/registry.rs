use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::store::Store;
use crate::types::Subscription;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Validated CRUD over webhook subscriptions.
///
/// Validation failures stay here; nothing malformed ever reaches the
/// delivery ledger.
pub struct SubscriptionRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    require_https: bool,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, require_https: bool) -> Self {
        Self {
            store,
            clock,
            require_https,
        }
    }

    /// Register a subscription for `user_id`. The URL must be absolute and
    /// http/https (https only when the deployment requires it); the event
    /// set must be non-empty.
    pub async fn create(
        &self,
        user_id: uuid::Uuid,
        url: &str,
        secret: impl Into<String>,
        events: BTreeSet<EventKind>,
    ) -> Result<Subscription> {
        if events.is_empty() {
            return Err(Error::EmptyEventSet);
        }
        let parsed = Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))?;
        match parsed.scheme() {
            "https" => {}
            "http" if !self.require_https => {}
            "http" => return Err(Error::HttpsRequired(url.to_string())),
            other => {
                return Err(Error::UnsupportedScheme {
                    url: url.to_string(),
                    scheme: other.to_string(),
                })
            }
        }

        let sub = Subscription {
            id: uuid::Uuid::new_v4(),
            user_id,
            url: url.to_string(),
            secret: secret.into(),
            events,
            active: true,
            created_at: self.clock.now(),
        };
        self.store.insert_subscription(sub.clone()).await?;
        info!(subscription_id = %sub.id, user_id = %user_id, url = %sub.url, "subscription created");
        Ok(sub)
    }

    pub async fn get(&self, id: uuid::Uuid) -> Result<Option<Subscription>> {
        self.store.get_subscription(id).await
    }

    pub async fn list(&self, user_id: uuid::Uuid) -> Result<Vec<Subscription>> {
        self.store.list_subscriptions(user_id).await
    }

    pub async fn list_active(
        &self,
        user_id: uuid::Uuid,
        event: EventKind,
    ) -> Result<Vec<Subscription>> {
        self.store.list_active(user_id, event).await
    }

    /// Idempotent; deactivating an unknown id is a no-op.
    pub async fn deactivate(&self, id: uuid::Uuid) -> Result<()> {
        self.store.set_subscription_active(id, false).await
    }

    /// Idempotent; deleting an unknown id is a no-op.
    pub async fn delete(&self, id: uuid::Uuid) -> Result<()> {
        self.store.delete_subscription(id).await
    }

    /// Cascade used when the identity system removes a user.
    pub async fn purge_user(&self, user_id: uuid::Uuid) -> Result<()> {
        self.store.purge_user(user_id).await
    }
}
