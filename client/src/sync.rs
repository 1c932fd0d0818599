//! The sync engine.
//!
//! Wires the subscription machine to a [`RemoteStore`] and the local state
//! store. Every subscription runs on its own task tagged with the epoch it
//! was created for; deliveries are checked against the machine under the
//! manager lock, the same lock that guards cancellation.
//!
//! Remote writes go through one queue drained by a single writer task, so
//! they reach the store in the order they were made.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::StreamExt;
use roomsync_engine::{
    wire, ChangeBatch, Command, Epoch, MergeStrategy, Reconciler, Room, RoomCounts, RoomList,
    RoomPatch, SubscriptionInput, SubscriptionMachine, SyncMetadata, Tier, Timestamp, UserId,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::remote::RemoteStore;
use crate::state::{LocalStateStore, SyncStatus};

/// Real-time sync of the room list for one device.
///
/// Must be created and driven from within a Tokio runtime. Dropping the
/// engine cancels every task it spawned.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    remote: Arc<dyn RemoteStore>,
    store: LocalStateStore,
    device_id: String,
    device_name: String,
    metadata_collection: String,
    writes: mpsc::UnboundedSender<WriteRequest>,
    manager: Mutex<Manager>,
}

struct Manager {
    machine: SubscriptionMachine,
    tasks: HashMap<Epoch, JoinHandle<()>>,
    identity: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

/// A queued remote write.
enum WriteRequest {
    /// A room document; a failure is surfaced.
    Room {
        path: String,
        room_id: String,
        document: serde_json::Value,
    },
    /// Best-effort device bookkeeping.
    Metadata {
        path: String,
        metadata: SyncMetadata,
    },
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteStore>, config: &ClientConfig) -> Self {
        let reconciler = Reconciler::new(MergeStrategy::Merge);
        let (writes, queue) = mpsc::unbounded_channel();
        let inner = Arc::new(EngineInner {
            remote: remote.clone(),
            store: LocalStateStore::new(reconciler, config.pending_ttl),
            device_id: config.device_id.clone(),
            device_name: config.device_name.clone(),
            metadata_collection: config.metadata_collection.clone(),
            writes,
            manager: Mutex::new(Manager {
                machine: SubscriptionMachine::new(config.paths.clone()),
                tasks: HashMap::new(),
                identity: None,
                writer: None,
            }),
        });

        let writer = tokio::spawn(run_writer(Arc::downgrade(&inner), remote, queue));
        inner.manager().writer = Some(writer);
        Self { inner }
    }

    /// Start (or keep) syncing for `user`.
    ///
    /// A different user than the current one starts a new session at the
    /// root collection.
    pub fn start_sync(&self, user: impl Into<UserId>) {
        self.inner
            .dispatch(SubscriptionInput::IdentityAvailable(user.into()), None);
    }

    /// Stop syncing and clear local state. Idempotent.
    pub fn stop_sync(&self) {
        self.inner.dispatch(SubscriptionInput::IdentityRevoked, None);
    }

    /// Drive sessions from an identity signal: `Some` starts, `None` stops.
    ///
    /// Replaces any previously followed signal.
    pub fn follow_identity(&self, mut identity: watch::Receiver<Option<UserId>>) {
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                let current = identity.borrow_and_update().clone();
                let Some(inner) = weak.upgrade() else { break };
                let input = match current {
                    Some(user) => SubscriptionInput::IdentityAvailable(user),
                    None => SubscriptionInput::IdentityRevoked,
                };
                inner.dispatch(input, None);
                drop(inner);

                if identity.changed().await.is_err() {
                    tracing::debug!("identity signal closed");
                    break;
                }
            }
        });

        if let Some(previous) = self.inner.manager().identity.replace(task) {
            previous.abort();
        }
    }

    pub fn observe_rooms(&self) -> watch::Receiver<Arc<RoomList>> {
        self.inner.store.subscribe_rooms()
    }

    pub fn observe_sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.store.subscribe_status()
    }

    /// Snapshot of the current room list.
    pub fn rooms(&self) -> Arc<RoomList> {
        self.inner.store.rooms()
    }

    /// Rooms per status, every status present.
    pub fn room_counts(&self) -> RoomCounts {
        self.inner.store.counts()
    }

    /// Rooms per status, republished on every state change that moves them.
    pub fn observe_room_counts(&self) -> watch::Receiver<RoomCounts> {
        self.inner.store.subscribe_counts()
    }

    pub fn clear_error(&self) {
        self.inner.store.clear_error();
    }

    /// Which tier is being listened to, if any.
    pub fn active_tier(&self) -> Option<Tier> {
        self.inner.manager().machine.tier()
    }

    /// Collection currently listened to, if any.
    pub fn active_path(&self) -> Option<String> {
        self.inner.manager().machine.active_path()
    }

    /// Apply a local edit and write it to the active collection.
    ///
    /// The edit shows up immediately; a failed remote write is reported
    /// through the sync status.
    pub fn update_room(&self, id: &str, patch: RoomPatch) -> Result<Room> {
        let path = self.inner.write_path()?;
        let room = self.inner.store.apply_local(id, &patch, now_ms())?;
        tracing::debug!(room_id = %room.id, status = %room.status, "local edit");
        self.inner.queue_write(path, &room);
        Ok(room)
    }

    /// Create a room with a fresh id in the active collection.
    pub fn create_room(&self, number: impl Into<String>) -> Result<Room> {
        let path = self.inner.write_path()?;
        let now = now_ms();
        let mut room = Room::new(uuid::Uuid::new_v4().to_string(), number);
        room.enter_status(room.status, now);
        let room = self.inner.store.insert_local(room, now)?;
        tracing::debug!(room_id = %room.id, number = %room.number, "local create");
        self.inner.queue_write(path, &room);
        Ok(room)
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        let mut manager = self.inner.manager();
        for (_, task) in manager.tasks.drain() {
            task.abort();
        }
        if let Some(task) = manager.identity.take() {
            task.abort();
        }
        if let Some(task) = manager.writer.take() {
            task.abort();
        }
    }
}

impl EngineInner {
    fn manager(&self) -> MutexGuard<'_, Manager> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_path(&self) -> Result<String> {
        self.manager()
            .machine
            .active_path()
            .ok_or(ClientError::NotSyncing)
    }

    /// Feed one input to the machine and carry out its commands.
    fn dispatch(self: &Arc<Self>, input: SubscriptionInput, batch: Option<&ChangeBatch>) {
        let mut manager = self.manager();
        let commands = manager.machine.handle(input);

        for command in commands {
            match command {
                Command::Cancel { epoch } => {
                    if let Some(task) = manager.tasks.remove(&epoch) {
                        tracing::debug!(epoch, "cancelling subscription");
                        task.abort();
                    }
                }
                Command::ClearState => self.store.clear(),
                Command::Subscribe { epoch, tier, path } => {
                    tracing::info!(epoch, ?tier, %path, "subscribing");
                    let task = tokio::spawn(run_subscription(Arc::downgrade(self), epoch, path));
                    manager.tasks.insert(epoch, task);
                }
                Command::Deliver { epoch } => {
                    if let Some(batch) = batch {
                        self.deliver(epoch, batch, manager.machine.active_path());
                    }
                }
                Command::ReportError { message } => {
                    tracing::warn!(%message, "sync error");
                    self.store.set_error(message);
                }
            }
        }

        self.store.set_syncing(manager.machine.is_listening());
    }

    fn deliver(self: &Arc<Self>, epoch: Epoch, batch: &ChangeBatch, path: Option<String>) {
        let now = now_ms();
        let result = self.store.apply_batch(batch, now);
        if result.discarded {
            return;
        }

        tracing::debug!(
            epoch,
            events = batch.len(),
            rooms = result.rooms.len(),
            "applied server batch"
        );

        // The remote side still holds the losing version of these rooms.
        if let Some(path) = path {
            for conflict in result.local_wins() {
                tracing::debug!(room_id = %conflict.merged.id, "re-writing locally won conflict");
                self.queue_write(path.clone(), &conflict.merged);
            }
        }

        self.queue_metadata_write(now);
    }

    fn queue_write(&self, path: String, room: &Room) {
        let request = WriteRequest::Room {
            path,
            room_id: room.id.clone(),
            document: wire::to_wire(room, &self.device_id).to_value(),
        };
        if self.writes.send(request).is_err() {
            tracing::warn!(room_id = %room.id, "write queue closed, dropping write");
        }
    }

    fn queue_metadata_write(&self, now: Timestamp) {
        let request = WriteRequest::Metadata {
            path: self.metadata_collection.clone(),
            metadata: SyncMetadata {
                device_id: self.device_id.clone(),
                device_name: self.device_name.clone(),
                last_sync_timestamp: now,
            },
        };
        if self.writes.send(request).is_err() {
            tracing::debug!("write queue closed, dropping sync metadata");
        }
    }
}

/// Drain the write queue one request at a time.
async fn run_writer(
    inner: Weak<EngineInner>,
    remote: Arc<dyn RemoteStore>,
    mut queue: mpsc::UnboundedReceiver<WriteRequest>,
) {
    while let Some(request) = queue.recv().await {
        match request {
            WriteRequest::Room {
                path,
                room_id,
                document,
            } => {
                if let Err(e) = remote.write(&path, &room_id, document).await {
                    tracing::warn!(room_id = %room_id, %path, error = %e, "remote write failed");
                    if let Some(inner) = inner.upgrade() {
                        inner.store.write_failed(&room_id, e.to_string());
                    }
                }
            }
            WriteRequest::Metadata { path, metadata } => {
                if let Err(e) = remote
                    .write(&path, &metadata.device_id, metadata.to_value())
                    .await
                {
                    tracing::debug!(error = %e, "sync metadata write failed");
                }
            }
        }
    }

    tracing::debug!("write queue closed");
}

async fn run_subscription(inner: Weak<EngineInner>, epoch: Epoch, path: String) {
    let Some(remote) = inner.upgrade().map(|inner| inner.remote.clone()) else {
        return;
    };

    let mut stream = match remote.subscribe(&path).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(epoch, %path, error = %e, "subscription failed");
            if let Some(inner) = inner.upgrade() {
                inner.dispatch(
                    SubscriptionInput::SubscriptionFailed {
                        epoch,
                        message: e.to_string(),
                    },
                    None,
                );
            }
            return;
        }
    };

    while let Some(item) = stream.next().await {
        let Some(inner) = inner.upgrade() else { break };
        match item {
            Ok(batch) => {
                tracing::trace!(epoch, events = batch.len(), origin = ?batch.origin, "batch received");
                inner.dispatch(
                    SubscriptionInput::BatchReceived {
                        epoch,
                        origin: batch.origin,
                        is_empty: batch.is_empty(),
                    },
                    Some(&batch),
                );
            }
            Err(e) => {
                tracing::warn!(epoch, %path, error = %e, "subscription error");
                inner.dispatch(
                    SubscriptionInput::SubscriptionFailed {
                        epoch,
                        message: e.to_string(),
                    },
                    None,
                );
            }
        }
    }

    tracing::debug!(epoch, %path, "subscription stream ended");
}

fn now_ms() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
