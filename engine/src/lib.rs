//! # roomsync engine
//!
//! A deterministic reconciliation engine for room cleaning-status records
//! shared between devices through a remote document store.
//!
//! This crate holds the pure part of synchronization: the record model and
//! its wire codec, conflict resolution, folding of change batches into an
//! ordered room list, and the decision logic of the two-tier subscription.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches the network, clocks or threads
//! - **Deterministic**: the same batch on the same state yields the same list
//! - **Fail-soft**: malformed remote documents are skipped, never fatal
//!
//! ## Core Concepts
//!
//! ### Rooms
//!
//! A [`Room`] carries a [`RoomStatus`], per-status entry timestamps and a
//! few independent flags. [`wire::to_wire`] and [`wire::from_wire`] convert
//! to and from the remote document shape.
//!
//! ### Change batches
//!
//! The remote store delivers [`ChangeBatch`]es of [`ChangeEvent`]s. Batches
//! marked [`Origin::FromCache`] are speculative echoes and are ignored.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] folds one batch into a [`RoomList`]. When a room has a
//! pending local write, [`resolve`] merges the two versions using
//! [`MergeStrategy::Merge`].
//!
//! ### Subscriptions
//!
//! The [`SubscriptionMachine`] decides which collection to listen to and
//! when to fall back from the shared collection to the per-user one.
//!
//! ## Quick Start
//!
//! ```rust
//! use roomsync_engine::{
//!     ChangeBatch, ChangeEvent, MergeStrategy, PendingWrites, Reconciler, RoomList, RoomStatus,
//! };
//! use serde_json::json;
//!
//! let reconciler = Reconciler::new(MergeStrategy::Merge);
//! let batch = ChangeBatch::from_server(vec![
//!     ChangeEvent::added("2", json!({"number": "205", "status": "green"})),
//!     ChangeEvent::added("1", json!({"number": "101", "status": "red"})),
//! ]);
//!
//! let result = reconciler.apply(&RoomList::new(), &batch, &mut PendingWrites::new());
//! let first = result.rooms.iter().next().unwrap();
//! assert_eq!(first.number, "101");
//! assert_eq!(first.status, RoomStatus::Red);
//! ```

pub mod error;
pub mod event;
pub mod list;
pub mod pending;
pub mod protocol;
pub mod reconcile;
pub mod resolve;
pub mod room;
pub mod subscription;
pub mod wire;

// Re-export main types at crate root
pub use error::Error;
pub use event::{ChangeBatch, ChangeEvent, ChangeKind, Origin};
pub use list::{compare_rooms, RoomCounts, RoomList};
pub use pending::{PendingWrite, PendingWrites};
pub use protocol::{ClientMessage, ServerMessage};
pub use reconcile::{Conflict, ReconcileResult, Reconciler, SkippedEvent};
pub use resolve::{resolve, ConflictResolution, MergeStrategy, Resolution};
pub use room::{Room, RoomPatch, RoomStatus, StatusTimestamps};
pub use subscription::{
    CollectionPaths, Command, Epoch, SubscriptionInput, SubscriptionMachine, SubscriptionState,
    Tier,
};
pub use wire::{SyncMetadata, WireRoom};

/// Type aliases for clarity
pub type RoomId = String;
pub type DeviceId = String;
pub type UserId = String;
pub type Timestamp = u64;
