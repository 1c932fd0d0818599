//! Reconciliation of remote change batches into the local room list.
//!
//! This is the core of determinism. Given the current ordered list, one
//! batch of change events and the pending local writes, this module
//! produces the next ordered list.
//!
//! # Algorithm
//!
//! 1. Discard the batch entirely if it came from the local cache
//! 2. Fold events in arrival order:
//!    - added/modified: decode, then resolve against a pending local write
//!      for the same room or replace-or-insert by id
//!    - removed: drop by id, unconditionally; unknown ids are ignored
//! 3. Re-sort the list once, after the whole batch
//!
//! A malformed event is skipped and reported; it never aborts the batch.

use crate::{
    resolve::{resolve, ConflictResolution, MergeStrategy},
    wire, ChangeBatch, ChangeEvent, ChangeKind, Error, PendingWrites, Room, RoomId, RoomList,
};

/// A conflict between a pending local write and incoming remote data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The pending local version
    pub local: Room,
    /// The incoming remote version
    pub remote: Room,
    /// The merged room that was stored
    pub merged: Room,
    /// Which side won
    pub resolution: ConflictResolution,
}

/// An event that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEvent {
    pub room_id: RoomId,
    pub error: Error,
}

/// Result of reconciling one batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileResult {
    /// The new ordered list
    pub rooms: RoomList,
    /// Rooms inserted or replaced by remote data, in arrival order
    pub applied: Vec<RoomId>,
    /// Rooms removed by this batch
    pub removed: Vec<RoomId>,
    /// Removal events for rooms that were not present
    pub missing_removals: Vec<RoomId>,
    /// Remote updates older than what is already held
    pub stale: Vec<RoomId>,
    /// Malformed events
    pub skipped: Vec<SkippedEvent>,
    /// Conflicts resolved against pending local writes
    pub conflicts: Vec<Conflict>,
    /// Whether the batch was a cache echo and therefore ignored
    pub discarded: bool,
}

impl ReconcileResult {
    fn unchanged(rooms: &RoomList) -> Self {
        Self {
            rooms: rooms.clone(),
            discarded: true,
            ..Self::default()
        }
    }

    /// Conflicts the local side won; the remote store still holds the loser.
    pub fn local_wins(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts
            .iter()
            .filter(|c| c.resolution == ConflictResolution::LocalWins)
    }
}

/// Folds change batches into room lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    strategy: MergeStrategy,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(strategy: MergeStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Apply one batch to `current`.
    ///
    /// Pending entries consulted during resolution are cleared from `pending`.
    pub fn apply(
        &self,
        current: &RoomList,
        batch: &ChangeBatch,
        pending: &mut PendingWrites,
    ) -> ReconcileResult {
        if batch.is_from_cache() {
            tracing::trace!(events = batch.len(), "discarding cache batch");
            return ReconcileResult::unchanged(current);
        }

        let mut result = ReconcileResult {
            rooms: current.clone(),
            ..ReconcileResult::default()
        };

        for event in &batch.events {
            match event.kind {
                ChangeKind::Added | ChangeKind::Modified => {
                    self.apply_upsert(event, pending, &mut result)
                }
                ChangeKind::Removed => Self::apply_remove(event, pending, &mut result),
            }
        }

        result.rooms.sort();

        tracing::debug!(
            applied = result.applied.len(),
            removed = result.removed.len(),
            conflicts = result.conflicts.len(),
            skipped = result.skipped.len(),
            "reconciled batch"
        );

        result
    }

    fn apply_upsert(
        &self,
        event: &ChangeEvent,
        pending: &mut PendingWrites,
        result: &mut ReconcileResult,
    ) {
        let remote = match decode_event(event) {
            Ok(room) => room,
            Err(error) => {
                tracing::warn!(room_id = %event.room_id, %error, "skipping malformed change event");
                result.skipped.push(SkippedEvent {
                    room_id: event.room_id.clone(),
                    error,
                });
                return;
            }
        };

        if let Some(write) = pending.take(&remote.id) {
            let resolved = resolve(&write.room, &remote, self.strategy);
            tracing::debug!(
                room_id = %remote.id,
                local = %write.room.status,
                remote = %remote.status,
                resolution = ?resolved.resolution,
                "resolved conflict with pending local write"
            );
            result.rooms.upsert_unsorted(resolved.room.clone());
            result.applied.push(remote.id.clone());
            result.conflicts.push(Conflict {
                local: write.room,
                remote,
                merged: resolved.room,
                resolution: resolved.resolution,
            });
            return;
        }

        if let Some(existing) = result.rooms.get(&remote.id) {
            if is_stale(existing, &remote) {
                tracing::debug!(
                    room_id = %remote.id,
                    held = existing.last_modified,
                    incoming = remote.last_modified,
                    "ignoring stale remote update"
                );
                result.stale.push(remote.id);
                return;
            }
        }

        result.applied.push(remote.id.clone());
        result.rooms.upsert_unsorted(remote);
    }

    fn apply_remove(event: &ChangeEvent, pending: &mut PendingWrites, result: &mut ReconcileResult) {
        // A deleted room has nothing left to merge against.
        pending.take(&event.room_id);

        if result.rooms.remove(&event.room_id).is_some() {
            result.removed.push(event.room_id.clone());
        } else {
            tracing::debug!(room_id = %event.room_id, "removal for unknown room ignored");
            result.missing_removals.push(event.room_id.clone());
        }
    }
}

/// Decode the snapshot of an added/modified event.
///
/// The event's room id names the document and is the key removals use, so
/// it overrides any id stored in the body. The body id only applies to
/// events without a document id.
pub fn decode_event(event: &ChangeEvent) -> Result<Room, Error> {
    let snapshot = event
        .snapshot
        .as_ref()
        .ok_or_else(|| Error::MissingSnapshot(event.room_id.clone()))?;
    let mut wire = wire::decode_snapshot(snapshot)?;
    if !event.room_id.is_empty() {
        if wire.id.as_deref().is_some_and(|id| id != event.room_id) {
            tracing::debug!(room_id = %event.room_id, body_id = ?wire.id, "document id overrides body id");
        }
        wire.id = Some(event.room_id.clone());
    }
    Ok(wire::from_wire(wire))
}

/// An update is stale when both sides carry a write time and the incoming
/// one is strictly older.
fn is_stale(held: &Room, incoming: &Room) -> bool {
    held.last_modified != 0 && incoming.last_modified != 0 && incoming.last_modified < held.last_modified
}
