use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry and the store.
///
/// Transport-level failures are deliberately not part of this taxonomy;
/// they are recorded as failed attempts (see [`crate::TransportError`])
/// and never propagate to the code that triggered the event.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid target url `{0}`")]
    InvalidUrl(String),

    #[error("unsupported scheme `{scheme}` in target url `{url}`")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("https is required for webhook targets in this deployment: `{0}`")]
    HttpsRequired(String),

    #[error("unknown event name `{0}`")]
    UnknownEvent(String),

    #[error("a subscription must listen for at least one event")]
    EmptyEventSet,

    #[error("delivery record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization: {0}")]
    Json(#[from] serde_json::Error),
}
