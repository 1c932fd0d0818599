//! Remote wire representation of rooms.
//!
//! Documents in the remote store are not schema-enforced, so decoding is
//! lenient: every key is optional and unknown status names map to `none`.
//! The only failing step is turning a raw JSON snapshot into a [`WireRoom`].

use crate::{error::Result, DeviceId, Error, Room, RoomId, RoomStatus, StatusTimestamps, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};

/// A room document as stored remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRoom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RoomId>,
    #[serde(default, deserialize_with = "label_or_integer")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none_timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red_timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub green_timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blue_timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_time: Option<String>,
    #[serde(default)]
    pub is_marked: Option<bool>,
    #[serde(default)]
    pub is_deep_cleaned: Option<bool>,
    #[serde(default)]
    pub is_completed_before930: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_device: Option<DeviceId>,
}

/// Accept `"101"` as well as `101` for room labels.
fn label_or_integer<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Text(String),
        Integer(i64),
    }

    Ok(Option::<Label>::deserialize(deserializer)?.map(|label| match label {
        Label::Text(text) => text,
        Label::Integer(n) => n.to_string(),
    }))
}

impl WireRoom {
    /// Encode as a JSON document body.
    pub fn to_value(&self) -> serde_json::Value {
        // Every field is a string, integer or bool, so this cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Decode a raw document snapshot.
pub fn decode_snapshot(snapshot: &serde_json::Value) -> Result<WireRoom> {
    if !snapshot.is_object() {
        return Err(Error::Decode(format!(
            "expected an object, got {}",
            json_kind(snapshot)
        )));
    }
    WireRoom::deserialize(snapshot).map_err(|e| Error::Decode(e.to_string()))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Encode a room for writing, stamping the writing device.
pub fn to_wire(room: &Room, device_id: &str) -> WireRoom {
    WireRoom {
        id: Some(room.id.clone()),
        number: Some(room.number.clone()),
        status: Some(room.status.as_str().to_string()),
        none_timestamp: room.timestamps.none,
        red_timestamp: room.timestamps.red,
        green_timestamp: room.timestamps.green,
        blue_timestamp: room.timestamps.blue,
        available_time: room.available_time.clone(),
        is_marked: Some(room.is_marked),
        is_deep_cleaned: Some(room.is_deep_cleaned),
        is_completed_before930: Some(room.is_completed_before_930),
        last_modified: Some(room.last_modified),
        owner_device: Some(device_id.to_string()),
    }
}

/// Decode a wire record. Never fails; a missing id is replaced by a fresh one.
pub fn from_wire(wire: WireRoom) -> Room {
    let id = match wire.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            let generated = uuid::Uuid::new_v4().to_string();
            tracing::debug!(room_id = %generated, "wire room carried no id, generated one");
            generated
        }
    };

    Room {
        id,
        number: wire.number.unwrap_or_default(),
        status: wire
            .status
            .as_deref()
            .map(RoomStatus::from_wire_name)
            .unwrap_or_default(),
        timestamps: StatusTimestamps {
            none: wire.none_timestamp,
            red: wire.red_timestamp,
            green: wire.green_timestamp,
            blue: wire.blue_timestamp,
        },
        available_time: wire.available_time,
        is_marked: wire.is_marked.unwrap_or(false),
        is_deep_cleaned: wire.is_deep_cleaned.unwrap_or(false),
        is_completed_before_930: wire.is_completed_before930.unwrap_or(false),
        last_modified: wire.last_modified.unwrap_or(0),
        owner_device: wire.owner_device,
    }
}

/// Per-device sync telemetry. Written opportunistically, never reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub device_id: DeviceId,
    pub device_name: String,
    /// Milliseconds since epoch
    pub last_sync_timestamp: Timestamp,
}

impl SyncMetadata {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
