//! Conflict resolution between a pending local write and incoming remote data.
//!
//! # Merge rules
//!
//! 1. Different statuses: the higher-priority status wins
//!    (`blue > green > red > purple > none > white`) and the winning side
//!    supplies the flags, label, availability note and owner.
//! 2. Same status: the side with the newer `last_modified` wins entirely;
//!    an exact tie goes to the remote side.
//!
//! Status-entry timestamps the winner does not own are merged by keeping
//! the most recent value seen on either side.

use crate::{Room, RoomStatus, StatusTimestamps};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Merge strategy for conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    /// Status priority decides, `last_modified` breaks same-status ties
    #[default]
    Merge,
}

/// Which side won a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    /// The pending local write won
    LocalWins,
    /// The incoming remote snapshot won
    RemoteWins,
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub room: Room,
    pub resolution: ConflictResolution,
}

/// Compare two statuses by merge priority.
pub fn compare_status(a: RoomStatus, b: RoomStatus) -> Ordering {
    a.priority().cmp(&b.priority())
}

/// Resolve two versions of the same room.
pub fn resolve(local: &Room, remote: &Room, strategy: MergeStrategy) -> Resolution {
    match strategy {
        MergeStrategy::Merge => merge(local, remote),
    }
}

fn merge(local: &Room, remote: &Room) -> Resolution {
    let resolution = match compare_status(local.status, remote.status) {
        Ordering::Greater => ConflictResolution::LocalWins,
        Ordering::Less => ConflictResolution::RemoteWins,
        Ordering::Equal if local.last_modified > remote.last_modified => {
            ConflictResolution::LocalWins
        }
        Ordering::Equal => ConflictResolution::RemoteWins,
    };

    if local.status == remote.status {
        // Same status means one side wins entirely.
        let room = match resolution {
            ConflictResolution::LocalWins => local.clone(),
            ConflictResolution::RemoteWins => remote.clone(),
        };
        return Resolution { room, resolution };
    }

    let (winner, loser) = match resolution {
        ConflictResolution::LocalWins => (local, remote),
        ConflictResolution::RemoteWins => (remote, local),
    };

    let mut room = winner.clone();
    room.timestamps = merge_timestamps(winner, loser);
    room.last_modified = winner.last_modified.max(loser.last_modified);

    Resolution { room, resolution }
}

/// Keep the winner's timestamp for its own status, newest-of-both elsewhere.
fn merge_timestamps(winner: &Room, loser: &Room) -> StatusTimestamps {
    let mut merged = StatusTimestamps::default();
    for status in RoomStatus::ALL.into_iter().filter(|s| s.is_timestamped()) {
        let value = if status == winner.status {
            winner.timestamps.get(status)
        } else {
            winner.timestamps.get(status).max(loser.timestamps.get(status))
        };
        merged.set(status, value);
    }
    merged
}
