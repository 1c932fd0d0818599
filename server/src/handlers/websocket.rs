//! WebSocket handler for live collection subscriptions.
//!
//! Handles WebSocket connections, registers collection subscriptions with
//! the connection manager and sends each new subscriber the current
//! contents of the collection.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use roomsync_engine::ChangeEvent;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::db;
use crate::websocket::{parse_client_message, ClientMessage, ConnectionManager, ServerMessage};

use super::normalize_collection_path;

/// Handle an established WebSocket connection.
///
/// This function:
/// 1. Registers the connection with the manager
/// 2. Spawns a task to forward outgoing messages
/// 3. Processes incoming messages in a loop
/// 4. Cleans up on disconnect
pub async fn handle_websocket_connection(
    socket: WebSocket,
    pool: PgPool,
    conn_manager: Arc<ConnectionManager>,
    token: String,
) {
    // Split the socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Register with connection manager
    let conn_id = conn_manager.register(token, tx);

    tracing::info!(conn_id = %conn_id, "WebSocket client connected");

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    // Process incoming messages
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                process_message(&text, &pool, &conn_manager, &conn_id).await;
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(data)) => {
                // Axum answers pings automatically
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    // Clean up
    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        active_connections = conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

/// Process a client message, replying through the connection's channel.
async fn process_message(
    text: &str,
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    conn_id: &str,
) {
    let client_msg = match parse_client_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            conn_manager.send_to(
                conn_id,
                ServerMessage::error(format!("Invalid message format: {}", e), None),
            );
            return;
        }
    };

    match client_msg {
        ClientMessage::Subscribe { path, request_id } => {
            for message in subscribe(pool, conn_manager, conn_id, &path, request_id).await {
                conn_manager.send_to(conn_id, message);
            }
        }
        ClientMessage::Ping => {
            conn_manager.send_to(conn_id, ServerMessage::Pong);
        }
    }
}

/// Register a subscription and build the acknowledgement plus initial snapshot.
///
/// The subscription is registered before the collection is read, so a
/// concurrent write is delivered at least once.
async fn subscribe(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    conn_id: &str,
    path: &str,
    request_id: Option<String>,
) -> Vec<ServerMessage> {
    let path = match normalize_collection_path(path) {
        Ok(path) => path,
        Err(e) => return vec![ServerMessage::error(e.to_string(), Some(path.to_string()))],
    };

    conn_manager.subscribe(conn_id, &path);

    match db::list_documents(pool, &path).await {
        Ok(documents) => {
            let changes = documents
                .iter()
                .map(|doc| ChangeEvent::added(doc.doc_id.clone(), doc.snapshot()))
                .collect::<Vec<_>>();

            tracing::debug!(
                conn_id = %conn_id,
                %path,
                documents = changes.len(),
                "Sending initial snapshot"
            );

            vec![
                ServerMessage::Subscribed {
                    path: path.clone(),
                    request_id,
                },
                ServerMessage::changes(path, changes),
            ]
        }
        Err(e) => {
            tracing::error!(conn_id = %conn_id, %path, "Failed to load collection: {:?}", e);
            vec![ServerMessage::error("Database error", Some(path))]
        }
    }
}
