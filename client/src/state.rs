//! Local state store.
//!
//! Holds the current room list, the pending local writes and the sync
//! status behind one mutex. Every mutation is a single read-modify-write
//! followed by at most one publish per observable.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use roomsync_engine::{
    ChangeBatch, Error, PendingWrites, ReconcileResult, Reconciler, Room, RoomCounts, RoomList,
    RoomPatch, Timestamp,
};
use serde::Serialize;
use tokio::sync::watch;

/// Sync status exposed to consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether a subscription is active
    pub is_syncing: bool,
    /// When the last server batch was applied
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last user-visible error, until cleared
    pub error: Option<String>,
}

struct StateInner {
    rooms: Arc<RoomList>,
    pending: PendingWrites,
}

/// The single mutable cell behind the public observables.
pub struct LocalStateStore {
    inner: Mutex<StateInner>,
    rooms_tx: watch::Sender<Arc<RoomList>>,
    counts_tx: watch::Sender<RoomCounts>,
    status_tx: watch::Sender<SyncStatus>,
    reconciler: Reconciler,
    pending_ttl: Duration,
}

impl LocalStateStore {
    pub fn new(reconciler: Reconciler, pending_ttl: Duration) -> Self {
        let rooms = Arc::new(RoomList::new());
        let (counts_tx, _) = watch::channel(rooms.counts());
        let (rooms_tx, _) = watch::channel(rooms.clone());
        let (status_tx, _) = watch::channel(SyncStatus::default());
        Self {
            inner: Mutex::new(StateInner {
                rooms,
                pending: PendingWrites::new(),
            }),
            rooms_tx,
            counts_tx,
            status_tx,
            reconciler,
            pending_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe_rooms(&self) -> watch::Receiver<Arc<RoomList>> {
        self.rooms_tx.subscribe()
    }

    /// Status counts, republished whenever they change.
    pub fn subscribe_counts(&self) -> watch::Receiver<RoomCounts> {
        self.counts_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// The current room list.
    pub fn rooms(&self) -> Arc<RoomList> {
        self.lock().rooms.clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    pub fn counts(&self) -> RoomCounts {
        self.lock().rooms.counts()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Fold a remote batch into the list.
    ///
    /// Cache batches leave the state untouched and publish nothing. Server
    /// batches first expire stale pending writes, then publish the new list
    /// once and stamp `last_sync_time`.
    pub fn apply_batch(&self, batch: &ChangeBatch, now: Timestamp) -> ReconcileResult {
        let mut inner = self.lock();

        if !batch.is_from_cache() {
            let ttl = u64::try_from(self.pending_ttl.as_millis()).unwrap_or(u64::MAX);
            let expired = inner.pending.expire(now, ttl);
            if !expired.is_empty() {
                tracing::debug!(?expired, "expired unconfirmed local writes");
            }
        }

        let StateInner { rooms, pending } = &mut *inner;
        let result = self.reconciler.apply(rooms.as_ref(), batch, pending);
        if result.discarded {
            return result;
        }

        *rooms = Arc::new(result.rooms.clone());
        self.publish(rooms);
        self.status_tx.send_modify(|status| {
            status.last_sync_time = Some(datetime_from_ms(now));
        });
        result
    }

    /// Apply a local edit optimistically and remember it as pending.
    pub fn apply_local(
        &self,
        id: &str,
        patch: &RoomPatch,
        now: Timestamp,
    ) -> Result<Room, Error> {
        let mut inner = self.lock();
        let current = inner
            .rooms
            .get(id)
            .ok_or_else(|| Error::RoomNotFound(id.to_string()))?;
        let updated = patch.apply_to(current, now);
        self.commit_local(&mut inner, updated.clone(), now);
        Ok(updated)
    }

    /// Insert a locally created room and remember it as pending.
    pub fn insert_local(&self, room: Room, now: Timestamp) -> Result<Room, Error> {
        let mut inner = self.lock();
        if inner.rooms.contains(&room.id) {
            return Err(Error::RoomAlreadyExists(room.id));
        }
        self.commit_local(&mut inner, room.clone(), now);
        Ok(room)
    }

    fn commit_local(&self, inner: &mut StateInner, room: Room, now: Timestamp) {
        inner.pending.insert(room.clone(), now);
        let mut rooms = (*inner.rooms).clone();
        rooms.upsert(room);
        inner.rooms = Arc::new(rooms);
        self.publish(&inner.rooms);
    }

    fn publish(&self, rooms: &Arc<RoomList>) {
        self.rooms_tx.send_replace(rooms.clone());
        let counts = rooms.counts();
        self.counts_tx.send_if_modified(|current| {
            if *current == counts {
                return false;
            }
            *current = counts;
            true
        });
    }

    /// A remote write was rejected: surface it and stop shadowing remote data.
    pub fn write_failed(&self, id: &str, message: impl Into<String>) {
        let mut inner = self.lock();
        inner.pending.take(id);
        let message = message.into();
        self.status_tx
            .send_modify(|status| status.error = Some(message));
    }

    /// Empty the room list and forget pending writes.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.pending.clear();
        if inner.rooms.is_empty() {
            return;
        }
        inner.rooms = Arc::new(RoomList::new());
        self.publish(&inner.rooms);
    }

    pub fn set_syncing(&self, is_syncing: bool) {
        self.status_tx.send_if_modified(|status| {
            let changed = status.is_syncing != is_syncing;
            status.is_syncing = is_syncing;
            changed
        });
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.status_tx
            .send_modify(|status| status.error = Some(message));
    }

    pub fn clear_error(&self) {
        self.status_tx.send_if_modified(|status| status.error.take().is_some());
    }
}

fn datetime_from_ms(ms: Timestamp) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}
