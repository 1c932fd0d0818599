//! WebSocket connection manager.
//!
//! Tracks active WebSocket connections and which collection paths each one
//! is subscribed to, and fans document changes out to subscribers.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::ServerMessage;
use crate::auth::ANONYMOUS;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    /// Whether the connection was admitted without a bearer token
    pub anonymous: bool,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
    /// Collection paths this connection listens to
    pub paths: HashSet<String>,
}

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    connections: DashMap<String, Connection>,
    /// Index of connection IDs by subscribed collection path.
    by_path: DashMap<String, HashSet<String>>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection.
    ///
    /// Returns the connection ID.
    pub fn register(&self, token: String, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();
        let anonymous = token == ANONYMOUS;

        self.connections.insert(
            conn_id.clone(),
            Connection {
                anonymous,
                sender,
                paths: HashSet::new(),
            },
        );

        tracing::info!(
            conn_id = %conn_id,
            anonymous,
            "WebSocket connection registered"
        );

        conn_id
    }

    /// Unregister a connection and drop all of its subscriptions.
    pub fn unregister(&self, conn_id: &str) {
        if let Some((_, conn)) = self.connections.remove(conn_id) {
            for path in &conn.paths {
                self.remove_from_path(path, conn_id);
            }

            tracing::info!(
                conn_id = %conn_id,
                anonymous = conn.anonymous,
                subscriptions = conn.paths.len(),
                "WebSocket connection unregistered"
            );
        }
    }

    /// Subscribe a connection to a collection path.
    ///
    /// Returns `false` if the connection is unknown.
    pub fn subscribe(&self, conn_id: &str, path: &str) -> bool {
        let Some(mut conn) = self.connections.get_mut(conn_id) else {
            return false;
        };
        conn.paths.insert(path.to_string());
        drop(conn);

        self.by_path
            .entry(path.to_string())
            .or_default()
            .insert(conn_id.to_string());

        tracing::debug!(conn_id = %conn_id, %path, "subscribed to collection");
        true
    }

    fn remove_from_path(&self, path: &str, conn_id: &str) {
        if let Some(mut conn_ids) = self.by_path.get_mut(path) {
            conn_ids.remove(conn_id);
            // Clean up empty entries
            if conn_ids.is_empty() {
                drop(conn_ids);
                self.by_path.remove(path);
            }
        }
    }

    /// Send a message to every subscriber of `path`.
    ///
    /// Returns the number of connections that received the message.
    pub fn broadcast(&self, path: &str, message: ServerMessage) -> usize {
        let recipients: Vec<String> = match self.by_path.get(path) {
            Some(conn_ids) => conn_ids.iter().cloned().collect(),
            None => return 0,
        };

        let sent_count = recipients
            .iter()
            .filter(|conn_id| self.send_to(conn_id, message.clone()))
            .count();

        tracing::debug!(%path, recipients = sent_count, "Broadcast changes to subscribers");

        sent_count
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        if let Some(conn) = self.connections.get(conn_id) {
            conn.sender.send(message).is_ok()
        } else {
            false
        }
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of connections admitted without a bearer token.
    pub fn anonymous_count(&self) -> usize {
        self.connections.iter().filter(|conn| conn.anonymous).count()
    }

    /// Number of collections with at least one subscriber.
    pub fn watched_collections(&self) -> usize {
        self.by_path.len()
    }

    /// Get the number of connections subscribed to `path`.
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.by_path.get(path).map_or(0, |conn_ids| conn_ids.len())
    }
}
