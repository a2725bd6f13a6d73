use crate::clock::Clock;
use crate::events::EventKind;
use crate::signer;
use crate::types::Subscription;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub const HEADER_TIMESTAMP: &str = "x-webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "x-webhook-signature";
pub const HEADER_EVENT: &str = "x-webhook-event";

/// A failure to move bytes to the subscriber: DNS, connect, TLS or
/// timeout. HTTP status codes are not inspected and never end up here.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// The outbound HTTP seam. One call is one delivery attempt; `Ok` means
/// the request reached the endpoint, whatever status it answered with.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(
        &self,
        url: &str,
        event: EventKind,
        timestamp_millis: i64,
        signature: &str,
        body: &[u8],
    ) -> Result<(), TransportError>;
}

/// reqwest-backed transport with a fixed per-request timeout.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(
        &self,
        url: &str,
        event: EventKind,
        timestamp_millis: i64,
        signature: &str,
        body: &[u8],
    ) -> Result<(), TransportError> {
        self.client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(HEADER_TIMESTAMP, timestamp_millis.to_string())
            .header(HEADER_SIGNATURE, signature)
            .header(HEADER_EVENT, event.as_str())
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(())
    }
}

/// One signed attempt against one subscription. Shared by the dispatcher
/// and the retry worker; every attempt gets a fresh timestamp.
pub(crate) async fn attempt(
    transport: &dyn Transport,
    clock: &dyn Clock,
    sub: &Subscription,
    event: EventKind,
    body: &[u8],
) -> Result<(), TransportError> {
    let timestamp = clock.now_millis();
    let signature = signer::sign(&sub.secret, timestamp, body);
    transport
        .deliver(&sub.url, event, timestamp, &signature, body)
        .await
}
