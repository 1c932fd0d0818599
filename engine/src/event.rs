//! Change events delivered by the remote document store.

use crate::RoomId;
use serde::{Deserialize, Serialize};

/// Kind of change a document went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// Where a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    /// Speculative local echo, not yet confirmed
    FromCache,
    /// Confirmed by a server round-trip
    FromServer,
}

/// A single document change.
///
/// `snapshot` is the raw document body for added/modified documents and is
/// absent for removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
}

impl ChangeEvent {
    pub fn added(room_id: impl Into<RoomId>, snapshot: serde_json::Value) -> Self {
        Self {
            kind: ChangeKind::Added,
            room_id: room_id.into(),
            snapshot: Some(snapshot),
        }
    }

    pub fn modified(room_id: impl Into<RoomId>, snapshot: serde_json::Value) -> Self {
        Self {
            kind: ChangeKind::Modified,
            room_id: room_id.into(),
            snapshot: Some(snapshot),
        }
    }

    pub fn removed(room_id: impl Into<RoomId>) -> Self {
        Self {
            kind: ChangeKind::Removed,
            room_id: room_id.into(),
            snapshot: None,
        }
    }
}

/// Events delivered together by one notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBatch {
    pub events: Vec<ChangeEvent>,
    pub origin: Origin,
}

impl ChangeBatch {
    pub fn from_server(events: Vec<ChangeEvent>) -> Self {
        Self {
            events,
            origin: Origin::FromServer,
        }
    }

    pub fn from_cache(events: Vec<ChangeEvent>) -> Self {
        Self {
            events,
            origin: Origin::FromCache,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        self.origin == Origin::FromCache
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn removed_event_omits_snapshot() {
        let json = serde_json::to_value(ChangeEvent::removed("r-1")).unwrap();
        assert_eq!(json, json!({"kind": "removed", "roomId": "r-1"}));
    }

    #[test]
    fn event_deserialization() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "kind": "modified",
            "roomId": "r-2",
            "snapshot": {"number": "202", "status": "blue"}
        }))
        .unwrap();
        assert_eq!(event.kind, ChangeKind::Modified);
        assert_eq!(event.snapshot.unwrap()["status"], "blue");
    }

    #[test]
    fn batch_origin() {
        assert!(ChangeBatch::from_cache(vec![]).is_from_cache());
        assert!(!ChangeBatch::from_server(vec![]).is_from_cache());
    }
}
