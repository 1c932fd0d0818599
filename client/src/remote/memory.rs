//! In-process document store.
//!
//! Behaves like the hosted store the client is written against: writes are
//! echoed immediately as a [`Origin::FromCache`] batch, then confirmed with a
//! server-assigned `lastModified`. Faults can be injected per collection.
//!
//! [`Origin::FromCache`]: roomsync_engine::Origin::FromCache

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use roomsync_engine::{ChangeBatch, ChangeEvent, Timestamp};
use serde_json::Value;

use super::{ChangeStream, RemoteStore};
use crate::error::RemoteError;

type Subscriber = mpsc::UnboundedSender<Result<ChangeBatch, RemoteError>>;

/// Shared in-memory document store. Clones share state.
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<MemoryState>>,
}

struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Value>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    clock: Timestamp,
    failing_paths: HashSet<String>,
    fail_writes: bool,
    cache_echo: bool,
}

impl MemoryState {
    /// Monotonic write time: wall clock, bumped past the previous write.
    fn next_modified(&mut self) -> Timestamp {
        self.clock = now_ms().max(self.clock + 1);
        self.clock
    }

    fn broadcast(&mut self, path: &str, item: Result<ChangeBatch, RemoteError>) {
        if let Some(subscribers) = self.subscribers.get_mut(path) {
            subscribers.retain(|tx| tx.unbounded_send(item.clone()).is_ok());
        }
    }

    fn store(&mut self, path: &str, doc_id: &str, mut document: Value) -> ChangeEvent {
        let modified = self.next_modified();
        if let Some(object) = document.as_object_mut() {
            object.insert("lastModified".to_string(), Value::from(modified));
        }

        let docs = self.collections.entry(path.to_string()).or_default();
        let existed = docs.insert(doc_id.to_string(), document.clone()).is_some();
        if existed {
            ChangeEvent::modified(doc_id, document)
        } else {
            ChangeEvent::added(doc_id, document)
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Create an empty store with cache echoes enabled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                collections: HashMap::new(),
                subscribers: HashMap::new(),
                clock: 0,
                failing_paths: HashSet::new(),
                fail_writes: false,
                cache_echo: true,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a document as if another client wrote it.
    ///
    /// Ignores injected write failures and produces no cache echo.
    pub fn insert_document(&self, path: &str, doc_id: &str, document: Value) {
        let mut state = self.state();
        let event = state.store(path, doc_id, document);
        state.broadcast(path, Ok(ChangeBatch::from_server(vec![event])));
    }

    /// Delete a document. Returns whether it existed.
    pub fn delete_document(&self, path: &str, doc_id: &str) -> bool {
        let mut state = self.state();
        let existed = state
            .collections
            .get_mut(path)
            .and_then(|docs| docs.remove(doc_id))
            .is_some();
        if existed {
            state.broadcast(
                path,
                Ok(ChangeBatch::from_server(vec![ChangeEvent::removed(doc_id)])),
            );
        }
        existed
    }

    /// Get a stored document.
    pub fn document(&self, path: &str, doc_id: &str) -> Option<Value> {
        self.state()
            .collections
            .get(path)
            .and_then(|docs| docs.get(doc_id))
            .cloned()
    }

    /// All documents of a collection, ordered by id.
    pub fn documents(&self, path: &str) -> Vec<(String, Value)> {
        self.state()
            .collections
            .get(path)
            .map(|docs| docs.iter().map(|(id, doc)| (id.clone(), doc.clone())).collect())
            .unwrap_or_default()
    }

    /// Reject future subscriptions to `path`.
    pub fn fail_subscriptions(&self, path: &str) {
        self.state().failing_paths.insert(path.to_string());
    }

    /// Accept subscriptions to `path` again.
    pub fn restore_subscriptions(&self, path: &str) {
        self.state().failing_paths.remove(path);
    }

    /// Make every client write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Toggle the immediate cache echo of client writes.
    pub fn set_cache_echo(&self, enabled: bool) {
        self.state().cache_echo = enabled;
    }

    /// Push an error to every live subscriber of `path`.
    pub fn inject_error(&self, path: &str, message: &str) {
        let error = RemoteError::Subscription {
            path: path.to_string(),
            message: message.to_string(),
        };
        self.state().broadcast(path, Err(error));
    }

    /// Number of open subscriptions to `path`.
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.state()
            .subscribers
            .get(path)
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn subscribe(&self, path: &str) -> Result<ChangeStream, RemoteError> {
        let mut state = self.state();
        if state.failing_paths.contains(path) {
            tracing::debug!(%path, "rejecting subscription");
            return Err(RemoteError::Subscription {
                path: path.to_string(),
                message: "permission denied".to_string(),
            });
        }

        let initial: Vec<ChangeEvent> = state
            .collections
            .get(path)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| ChangeEvent::added(id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let (tx, rx) = mpsc::unbounded();
        // The receiver is still in hand, so the initial snapshot cannot be lost.
        let _ = tx.unbounded_send(Ok(ChangeBatch::from_server(initial)));
        state
            .subscribers
            .entry(path.to_string())
            .or_default()
            .push(tx);

        tracing::debug!(%path, "subscription opened");
        Ok(rx.boxed())
    }

    async fn write(&self, path: &str, doc_id: &str, document: Value) -> Result<(), RemoteError> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(RemoteError::Write {
                path: path.to_string(),
                message: "write rejected".to_string(),
            });
        }
        if !document.is_object() {
            return Err(RemoteError::Write {
                path: path.to_string(),
                message: "document must be a JSON object".to_string(),
            });
        }

        if state.cache_echo {
            let existed = state
                .collections
                .get(path)
                .is_some_and(|docs| docs.contains_key(doc_id));
            let echo = if existed {
                ChangeEvent::modified(doc_id, document.clone())
            } else {
                ChangeEvent::added(doc_id, document.clone())
            };
            state.broadcast(path, Ok(ChangeBatch::from_cache(vec![echo])));
        }

        let event = state.store(path, doc_id, document);
        state.broadcast(path, Ok(ChangeBatch::from_server(vec![event])));
        Ok(())
    }
}

fn now_ms() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
