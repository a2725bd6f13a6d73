//! Outbound webhook delivery and retry engine.
//!
//! The rest of the application fires domain events; this crate turns them
//! into signed HTTP POSTs to subscriber-supplied URLs and keeps retrying
//! failed deliveries in the background.
//!
//! ## Guarantees
//! - At-least-once delivery while a matching subscription stays active
//! - Fire-and-forget dispatch: the triggering request never waits on a
//!   subscriber endpoint
//! - Byte-identical payloads across retries, each attempt signed fresh
//! - Bounded retry budget per delivery record
//!
//! ## Non-guarantees
//! - Exactly-once delivery
//! - Ordering across events
//! - Inspection tooling for exhausted deliveries
//!
//! The only entry point application code needs is [`Dispatcher::dispatch`];
//! subscriptions are managed through [`SubscriptionRegistry`] and the
//! background loop is owned by [`RetryWorker`].

mod clock;
mod config;
mod dispatcher;
mod error;
mod events;
mod registry;
mod retry;
mod signer;
mod store;
mod transport;
mod types;

pub use clock::{Clock, SystemClock};
pub use config::WebhookConfig;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use events::EventKind;
pub use registry::SubscriptionRegistry;
pub use retry::{RetryWorker, RetryWorkerHandle};
pub use signer::{is_timestamp_fresh, sign, verify};
pub use store::{FileStore, MemoryStore, Store};
pub use transport::{
    HttpTransport, Transport, TransportError, HEADER_EVENT, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};
pub use types::{DeliveryRecord, DeliveryStatus, Subscription};
