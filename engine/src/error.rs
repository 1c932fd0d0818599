//! Error types for the roomsync engine.

use crate::RoomId;
use thiserror::Error;

/// All possible errors from the roomsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Decoding errors
    #[error("malformed room document: {0}")]
    Decode(String),

    #[error("change event for {0} carries no snapshot")]
    MissingSnapshot(RoomId),

    // State errors
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("room already exists: {0}")]
    RoomAlreadyExists(RoomId),

    #[error("invalid protocol message: {0}")]
    Protocol(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
