//! The ordered room collection consumers observe.

use crate::{Room, RoomStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Compare room labels the same way on every platform.
///
/// Labels compare case-insensitively first, then by their raw text, then by
/// id so that the order is total.
pub fn compare_rooms(a: &Room, b: &Room) -> Ordering {
    fold_case(&a.number)
        .cmp(&fold_case(&b.number))
        .then_with(|| a.number.cmp(&b.number))
        .then_with(|| a.id.cmp(&b.id))
}

fn fold_case(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Rooms with unique ids, kept sorted by [`compare_rooms`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomList {
    rooms: Vec<Room>,
}

impl RoomList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self { rooms: Vec::new() }
    }

    /// Build a list from arbitrary rooms. Later duplicates replace earlier ones.
    pub fn from_rooms(rooms: impl IntoIterator<Item = Room>) -> Self {
        let mut list = Self::new();
        for room in rooms {
            list.upsert_unsorted(room);
        }
        list.sort();
        list
    }

    /// Get a room by id.
    pub fn get(&self, id: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    /// Check if a room exists.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert or replace a room by id, keeping the order.
    pub fn upsert(&mut self, room: Room) {
        self.upsert_unsorted(room);
        self.sort();
    }

    /// Remove a room by id. Returns the removed room, if any.
    pub fn remove(&mut self, id: &str) -> Option<Room> {
        let index = self.rooms.iter().position(|r| r.id == id)?;
        Some(self.rooms.remove(index))
    }

    /// Insert or replace without re-sorting. Callers must [`RoomList::sort`] afterwards.
    pub(crate) fn upsert_unsorted(&mut self, room: Room) {
        match self.rooms.iter_mut().find(|r| r.id == room.id) {
            Some(existing) => *existing = room,
            None => self.rooms.push(room),
        }
    }

    pub(crate) fn sort(&mut self) {
        self.rooms.sort_by(compare_rooms);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter()
    }

    pub fn as_slice(&self) -> &[Room] {
        &self.rooms
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Whether the list is ordered by [`compare_rooms`].
    pub fn is_sorted(&self) -> bool {
        self.rooms
            .windows(2)
            .all(|w| compare_rooms(&w[0], &w[1]) != Ordering::Greater)
    }

    /// Rooms grouped by floor; rooms without a floor go under `None`.
    pub fn by_floor(&self) -> BTreeMap<Option<u32>, Vec<&Room>> {
        let mut floors: BTreeMap<Option<u32>, Vec<&Room>> = BTreeMap::new();
        for room in &self.rooms {
            floors.entry(room.floor()).or_default().push(room);
        }
        floors
    }

    /// Count rooms per status.
    pub fn counts(&self) -> RoomCounts {
        RoomCounts::from_rooms(self.rooms.iter())
    }
}

impl<'a> IntoIterator for &'a RoomList {
    type Item = &'a Room;
    type IntoIter = std::slice::Iter<'a, Room>;

    fn into_iter(self) -> Self::IntoIter {
        self.rooms.iter()
    }
}

/// Number of rooms in each status. Every status is present, possibly at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCounts(BTreeMap<String, usize>);

impl RoomCounts {
    pub fn from_rooms<'a>(rooms: impl Iterator<Item = &'a Room>) -> Self {
        let mut counts: BTreeMap<String, usize> = RoomStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for room in rooms {
            *counts.entry(room.status.as_str().to_string()).or_default() += 1;
        }
        Self(counts)
    }

    /// Count for one status.
    pub fn get(&self, status: RoomStatus) -> usize {
        self.0.get(status.as_str()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(name, count)| (name.as_str(), *count))
    }
}

impl Default for RoomCounts {
    fn default() -> Self {
        Self::from_rooms(std::iter::empty())
    }
}
