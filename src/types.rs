use crate::events::EventKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// A user's registration of a target URL and secret for a subset of the
/// event taxonomy.
///
/// URL, secret and event set are immutable after creation; the only
/// in-place mutation is flipping `active`. Replace by delete + recreate.
#[derive(Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    /// Shared HMAC secret. Never transmitted; kept out of Debug output.
    pub secret: String,
    pub events: BTreeSet<EventKind>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("url", &self.url)
            .field("secret", &"<redacted>")
            .field("events", &self.events)
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Where a delivery record sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Not yet acknowledged, retry budget remaining.
    Pending,
    /// A delivery attempt succeeded. Terminal.
    Delivered,
    /// Attempt cap reached without success. Terminal.
    Exhausted,
}

impl DeliveryStatus {
    pub fn derive(delivered: bool, attempts: u32, max_attempts: u32) -> Self {
        if delivered {
            DeliveryStatus::Delivered
        } else if attempts >= max_attempts {
            DeliveryStatus::Exhausted
        } else {
            DeliveryStatus::Pending
        }
    }
}

/// One attempted delivery of one event to one subscriber, tracked through
/// success or exhaustion.
///
/// The record points at its subscription indirectly through
/// `(user_id, event)` rather than a stored id, so a subscription created
/// after the original dispatch can pick up still-pending deliveries on
/// retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event: EventKind,
    /// Canonical serialized body. Written once at dispatch time; retries
    /// resend these exact bytes.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    /// Set on the first successful attempt, never reset afterwards.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Monotonically non-decreasing; the sole input to the retry cutoff.
    pub attempts: u32,
    pub status: DeliveryStatus,
}
