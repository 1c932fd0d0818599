//! Local writes awaiting confirmation from the remote store.

use crate::{Room, RoomId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A local mutation not yet confirmed by a remote event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    /// The room as written locally
    pub room: Room,
    /// When the write was submitted (milliseconds since epoch)
    pub submitted_at: Timestamp,
}

/// Pending writes keyed by room id. At most one entry per room; a newer
/// local write replaces the older one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingWrites {
    writes: HashMap<RoomId, PendingWrite>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local write.
    pub fn insert(&mut self, room: Room, submitted_at: Timestamp) {
        self.writes
            .insert(room.id.clone(), PendingWrite { room, submitted_at });
    }

    pub fn get(&self, id: &str) -> Option<&PendingWrite> {
        self.writes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.writes.contains_key(id)
    }

    /// Clear the entry for a room, returning it.
    pub fn take(&mut self, id: &str) -> Option<PendingWrite> {
        self.writes.remove(id)
    }

    /// Drop writes submitted more than `ttl` ago. Returns the expired ids.
    pub fn expire(&mut self, now: Timestamp, ttl: Timestamp) -> Vec<RoomId> {
        let mut expired: Vec<RoomId> = self
            .writes
            .iter()
            .filter(|(_, w)| now.saturating_sub(w.submitted_at) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();
        for id in &expired {
            self.writes.remove(id);
        }
        expired
    }

    pub fn clear(&mut self) {
        self.writes.clear();
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}
