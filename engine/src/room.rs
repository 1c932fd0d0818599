//! Room records and their cleaning status.

use crate::{DeviceId, RoomId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cleaning status of a room.
///
/// The declaration order is not the merge priority; see
/// [`RoomStatus::priority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    #[default]
    None,
    Red,
    Green,
    Purple,
    Blue,
    White,
}

impl RoomStatus {
    /// Every status, in declaration order.
    pub const ALL: [RoomStatus; 6] = [
        RoomStatus::None,
        RoomStatus::Red,
        RoomStatus::Green,
        RoomStatus::Purple,
        RoomStatus::Blue,
        RoomStatus::White,
    ];

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::None => "none",
            RoomStatus::Red => "red",
            RoomStatus::Green => "green",
            RoomStatus::Purple => "purple",
            RoomStatus::Blue => "blue",
            RoomStatus::White => "white",
        }
    }

    /// Parse a wire name. Unknown names fall back to [`RoomStatus::None`].
    pub fn from_wire_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "red" => RoomStatus::Red,
            "green" => RoomStatus::Green,
            "purple" => RoomStatus::Purple,
            "blue" => RoomStatus::Blue,
            "white" => RoomStatus::White,
            _ => RoomStatus::None,
        }
    }

    /// Merge priority. Higher wins: blue > green > red > purple > none > white.
    pub fn priority(self) -> u8 {
        match self {
            RoomStatus::Blue => 5,
            RoomStatus::Green => 4,
            RoomStatus::Red => 3,
            RoomStatus::Purple => 2,
            RoomStatus::None => 1,
            RoomStatus::White => 0,
        }
    }

    /// Whether entering this status records a timestamp.
    pub fn is_timestamped(self) -> bool {
        !matches!(self, RoomStatus::Purple | RoomStatus::White)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When each timestamped status was last entered (milliseconds since epoch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTimestamps {
    pub none: Option<Timestamp>,
    pub red: Option<Timestamp>,
    pub green: Option<Timestamp>,
    pub blue: Option<Timestamp>,
}

impl StatusTimestamps {
    /// Timestamp slot for a status. Purple and white have none.
    pub fn get(&self, status: RoomStatus) -> Option<Timestamp> {
        match status {
            RoomStatus::None => self.none,
            RoomStatus::Red => self.red,
            RoomStatus::Green => self.green,
            RoomStatus::Blue => self.blue,
            RoomStatus::Purple | RoomStatus::White => None,
        }
    }

    /// Set the slot for a status. No-op for purple and white.
    pub fn set(&mut self, status: RoomStatus, value: Option<Timestamp>) {
        match status {
            RoomStatus::None => self.none = value,
            RoomStatus::Red => self.red = value,
            RoomStatus::Green => self.green = value,
            RoomStatus::Blue => self.blue = value,
            RoomStatus::Purple | RoomStatus::White => {}
        }
    }
}

/// A room record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Stable identifier, never reassigned
    pub id: RoomId,
    /// Display label, e.g. "101"
    pub number: String,
    pub status: RoomStatus,
    pub timestamps: StatusTimestamps,
    /// Free-form availability note, used with [`RoomStatus::Purple`]
    pub available_time: Option<String>,
    pub is_marked: bool,
    pub is_deep_cleaned: bool,
    pub is_completed_before_930: bool,
    /// Server-assigned write time, 0 when never written
    pub last_modified: Timestamp,
    /// Device that produced the last write (diagnostics only)
    pub owner_device: Option<DeviceId>,
}

impl Room {
    /// Create a room with status `none` and no history.
    pub fn new(id: impl Into<RoomId>, number: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            number: number.into(),
            status: RoomStatus::None,
            timestamps: StatusTimestamps::default(),
            available_time: None,
            is_marked: false,
            is_deep_cleaned: false,
            is_completed_before_930: false,
            last_modified: 0,
            owner_device: None,
        }
    }

    /// Builder-style status setter, mainly for fixtures.
    pub fn with_status(mut self, status: RoomStatus) -> Self {
        self.status = status;
        self
    }

    /// Floor derived from the first character of `number`.
    pub fn floor(&self) -> Option<u32> {
        self.number.chars().next().and_then(|c| c.to_digit(10))
    }

    /// Whether the before-9:30 indicator should be displayed.
    pub fn shows_before_930(&self) -> bool {
        self.is_completed_before_930 && self.status != RoomStatus::White
    }

    /// Move to a new status at `now`, recording the entry timestamp.
    ///
    /// Re-entering the current status refreshes its timestamp.
    pub fn enter_status(&mut self, status: RoomStatus, now: Timestamp) {
        self.status = status;
        if status.is_timestamped() {
            self.timestamps.set(status, Some(now));
        }
    }

    /// Timestamp of the current status, if it has one.
    pub fn status_entered_at(&self) -> Option<Timestamp> {
        self.timestamps.get(self.status)
    }
}

/// Field-level changes requested by a local user action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub number: Option<String>,
    pub status: Option<RoomStatus>,
    /// `Some(None)` clears the note
    pub available_time: Option<Option<String>>,
    pub is_marked: Option<bool>,
    pub is_deep_cleaned: Option<bool>,
    pub is_completed_before_930: Option<bool>,
}

impl RoomPatch {
    pub fn status(status: RoomStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to a copy of `room` at time `now`.
    pub fn apply_to(&self, room: &Room, now: Timestamp) -> Room {
        let mut next = room.clone();
        if let Some(number) = &self.number {
            next.number = number.clone();
        }
        if let Some(status) = self.status {
            next.enter_status(status, now);
        }
        if let Some(available_time) = &self.available_time {
            next.available_time = available_time.clone();
        }
        if let Some(flag) = self.is_marked {
            next.is_marked = flag;
        }
        if let Some(flag) = self.is_deep_cleaned {
            next.is_deep_cleaned = flag;
        }
        if let Some(flag) = self.is_completed_before_930 {
            next.is_completed_before_930 = flag;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_none() {
        assert_eq!(RoomStatus::from_wire_name("orange"), RoomStatus::None);
        assert_eq!(RoomStatus::from_wire_name(""), RoomStatus::None);
        assert_eq!(RoomStatus::from_wire_name(" Green "), RoomStatus::Green);
    }

    #[test]
    fn status_names_round_trip() {
        for status in RoomStatus::ALL {
            assert_eq!(RoomStatus::from_wire_name(status.as_str()), status);
        }
    }

    #[test]
    fn floor_from_first_digit() {
        assert_eq!(Room::new("a", "101").floor(), Some(1));
        assert_eq!(Room::new("b", "705B").floor(), Some(7));
        assert_eq!(Room::new("c", "Lobby").floor(), None);
        assert_eq!(Room::new("d", "").floor(), None);
    }

    #[test]
    fn before_930_hidden_for_white() {
        let mut room = Room::new("a", "101").with_status(RoomStatus::Green);
        room.is_completed_before_930 = true;
        assert!(room.shows_before_930());

        room.status = RoomStatus::White;
        assert!(!room.shows_before_930());
    }

    #[test]
    fn enter_status_records_timestamp() {
        let mut room = Room::new("a", "101");
        room.enter_status(RoomStatus::Red, 1000);
        assert_eq!(room.timestamps.red, Some(1000));
        assert_eq!(room.status_entered_at(), Some(1000));

        room.enter_status(RoomStatus::Purple, 2000);
        assert_eq!(room.status, RoomStatus::Purple);
        assert_eq!(room.status_entered_at(), None);
        // Earlier history is kept
        assert_eq!(room.timestamps.red, Some(1000));
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let mut room = Room::new("a", "101").with_status(RoomStatus::Red);
        room.is_deep_cleaned = true;

        let patch = RoomPatch {
            is_marked: Some(true),
            ..RoomPatch::default()
        };
        let next = patch.apply_to(&room, 5000);

        assert!(next.is_marked);
        assert!(next.is_deep_cleaned);
        assert_eq!(next.status, RoomStatus::Red);
        assert_eq!(next.timestamps, room.timestamps);
    }

    #[test]
    fn patch_clears_available_time() {
        let mut room = Room::new("a", "101").with_status(RoomStatus::Purple);
        room.available_time = Some("14:00".into());

        let patch = RoomPatch {
            available_time: Some(None),
            ..RoomPatch::default()
        };
        assert_eq!(patch.apply_to(&room, 0).available_time, None);
        assert!(RoomPatch::default().is_empty());
        assert!(!patch.is_empty());
    }
}
