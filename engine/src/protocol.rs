//! WebSocket message protocol between clients and the document store.
//!
//! All messages are JSON-encoded, tagged by `type`, and use snake_case for
//! envelope field names. Change events inside use the camelCase record shape.

use crate::{ChangeBatch, ChangeEvent, Error, Origin};
use serde::{Deserialize, Serialize};

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start streaming changes of a collection.
    Subscribe {
        /// Collection path, e.g. `rooms` or `users/u1/rooms`
        path: String,
        /// Request ID for correlating responses
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Keep-alive ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription accepted; the initial snapshot follows.
    Subscribed {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// A batch of changes for a subscribed collection.
    Changes {
        path: String,
        changes: Vec<ChangeEvent>,
        #[serde(default)]
        from_cache: bool,
    },

    /// Response to ping.
    Pong,

    /// Error message.
    Error {
        /// Error description
        message: String,
        /// Collection the error relates to (if applicable)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(message: impl Into<String>, path: Option<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            path,
        }
    }

    /// Create a server-confirmed change notification.
    pub fn changes(path: impl Into<String>, changes: Vec<ChangeEvent>) -> Self {
        ServerMessage::Changes {
            path: path.into(),
            changes,
            from_cache: false,
        }
    }

    /// The change batch carried by this message, if any.
    pub fn into_batch(self) -> Option<ChangeBatch> {
        match self {
            ServerMessage::Changes {
                changes,
                from_cache,
                ..
            } => Some(ChangeBatch {
                events: changes,
                origin: if from_cache {
                    Origin::FromCache
                } else {
                    Origin::FromServer
                },
            }),
            _ => None,
        }
    }
}

/// Parse a server message from text.
pub fn parse_server_message(text: &str) -> Result<ServerMessage, Error> {
    serde_json::from_str(text).map_err(|e| Error::Protocol(e.to_string()))
}

/// Parse a client message from text.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, Error> {
    serde_json::from_str(text).map_err(|e| Error::Protocol(e.to_string()))
}
