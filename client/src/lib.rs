//! # roomsync client
//!
//! Keeps a device's view of the room list in sync with a remote document
//! store. The [`SyncEngine`] listens to the shared `rooms` collection, falls
//! back to a per-user collection when the shared one is empty or refused,
//! and publishes the reconciled list through `tokio::sync::watch`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use roomsync_client::{ClientConfig, MemoryRemote, SyncEngine};
//!
//! # async fn run() {
//! let engine = SyncEngine::new(Arc::new(MemoryRemote::new()), &ClientConfig::default());
//! engine.start_sync("user-1");
//!
//! let mut rooms = engine.observe_rooms();
//! while rooms.changed().await.is_ok() {
//!     println!("{} rooms", rooms.borrow().len());
//! }
//! # }
//! ```

pub mod config;
pub mod error;
pub mod remote;
pub mod state;
pub mod sync;

pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, RemoteError, Result};
pub use remote::{ChangeStream, MemoryRemote, RemoteStore, WsRemote};
pub use state::{LocalStateStore, SyncStatus};
pub use sync::SyncEngine;
