use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed taxonomy of domain events a subscription can listen for.
///
/// Subscriptions store a set of these; anything outside the taxonomy is
/// rejected at registration time and never reaches the delivery ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "favorite.added")]
    FavoriteAdded,
    #[serde(rename = "favorite.removed")]
    FavoriteRemoved,
    #[serde(rename = "note.updated")]
    NoteUpdated,
    #[serde(rename = "snippets.updated")]
    SnippetsUpdated,
    #[serde(rename = "reading.started")]
    ReadingStarted,
    #[serde(rename = "reading.stopped")]
    ReadingStopped,
    #[serde(rename = "site.started")]
    SiteStarted,
    #[serde(rename = "site.stopped")]
    SiteStopped,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::FavoriteAdded,
        EventKind::FavoriteRemoved,
        EventKind::NoteUpdated,
        EventKind::SnippetsUpdated,
        EventKind::ReadingStarted,
        EventKind::ReadingStopped,
        EventKind::SiteStarted,
        EventKind::SiteStopped,
    ];

    /// The wire name, as sent in the `X-Webhook-Event` header and the
    /// serialized payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FavoriteAdded => "favorite.added",
            EventKind::FavoriteRemoved => "favorite.removed",
            EventKind::NoteUpdated => "note.updated",
            EventKind::SnippetsUpdated => "snippets.updated",
            EventKind::ReadingStarted => "reading.started",
            EventKind::ReadingStopped => "reading.stopped",
            EventKind::SiteStarted => "site.started",
            EventKind::SiteStopped => "site.stopped",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownEvent(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(matches!(
            "note.deleted".parse::<EventKind>(),
            Err(Error::UnknownEvent(_))
        ));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&EventKind::ReadingStarted).unwrap();
        assert_eq!(json, "\"reading.started\"");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::ReadingStarted);
    }
}
