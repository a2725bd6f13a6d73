use std::time::Duration;

/// Tunables for dispatch, retry and subscription validation.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Reject `http` target URLs at registration time. Enabled for
    /// production deployments; local setups may keep plain http.
    pub require_https: bool,
    /// Per-attempt HTTP timeout. Every attempt carries its own timeout
    /// independent of the caller.
    pub request_timeout: Duration,
    /// Pause between retry worker ticks.
    pub retry_interval: Duration,
    /// Attempt cap per delivery record. Once reached the record is
    /// exhausted and never selected again.
    pub max_retry_attempts: u32,
    /// Maximum delivery records re-attempted per tick.
    pub batch_size: usize,
    /// Freshness window receivers should apply to the signed timestamp.
    pub signature_tolerance: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            require_https: false,
            request_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_secs(15),
            max_retry_attempts: 5,
            batch_size: 10,
            signature_tolerance: Duration::from_secs(300),
        }
    }
}
