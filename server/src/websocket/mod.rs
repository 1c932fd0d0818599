//! WebSocket support for live collection subscriptions.
//!
//! Clients connect to `/ws`, subscribe to collection paths and receive a
//! `changes` message whenever a document of a subscribed collection is
//! written or deleted.

mod manager;

pub use manager::{ConnectionManager, MessageSender};
pub use roomsync_engine::protocol::{parse_client_message, ClientMessage, ServerMessage};
