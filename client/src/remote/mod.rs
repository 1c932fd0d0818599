//! Remote document store backends.
//!
//! The sync engine talks to the remote store only through [`RemoteStore`].
//! [`MemoryRemote`] keeps everything in process; [`WsRemote`] talks to a
//! `roomsync-server` over WebSocket and HTTP.

mod memory;
mod ws;

pub use memory::MemoryRemote;
pub use ws::WsRemote;

use async_trait::async_trait;
use futures::stream::BoxStream;
use roomsync_engine::ChangeBatch;

use crate::error::RemoteError;

/// Change batches of one subscribed collection, in delivery order.
///
/// An `Err` item reports a failure without ending the stream; the stream
/// ends when the subscription is closed by either side.
pub type ChangeStream = BoxStream<'static, Result<ChangeBatch, RemoteError>>;

/// A remote document store.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Start listening to a collection.
    ///
    /// The first server batch is the full current collection, possibly empty.
    async fn subscribe(&self, path: &str) -> Result<ChangeStream, RemoteError>;

    /// Write a whole document; the last writer wins.
    async fn write(
        &self,
        path: &str,
        doc_id: &str,
        document: serde_json::Value,
    ) -> Result<(), RemoteError>;
}
