//! Wire format tests for the WebSocket protocol.

use roomsync_engine::protocol::{parse_client_message, parse_server_message};
use roomsync_engine::{ChangeEvent, ClientMessage, Origin, ServerMessage};
use serde_json::json;

#[test]
fn test_subscribe_deserialization() {
    let msg = parse_client_message(
        r#"{"type": "subscribe", "path": "users/u1/rooms", "request_id": "req-001"}"#,
    )
    .unwrap();

    assert_eq!(
        msg,
        ClientMessage::Subscribe {
            path: "users/u1/rooms".to_string(),
            request_id: Some("req-001".to_string()),
        }
    );
}

#[test]
fn test_subscribe_without_request_id() {
    let msg = parse_client_message(r#"{"type": "subscribe", "path": "rooms"}"#).unwrap();
    assert!(matches!(
        msg,
        ClientMessage::Subscribe { request_id: None, .. }
    ));
}

#[test]
fn test_ping_deserialization() {
    let msg = parse_client_message(r#"{"type": "ping"}"#).unwrap();
    assert_eq!(msg, ClientMessage::Ping);
}

#[test]
fn test_unknown_message_is_rejected() {
    assert!(parse_client_message(r#"{"type": "pull", "since": null}"#).is_err());
    assert!(parse_client_message("not json").is_err());
}

#[test]
fn test_subscribed_serialization() {
    let msg = ServerMessage::Subscribed {
        path: "rooms".to_string(),
        request_id: Some("req-001".to_string()),
    };

    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(
        value,
        json!({"type": "subscribed", "path": "rooms", "request_id": "req-001"})
    );
}

#[test]
fn test_changes_serialization() {
    let msg = ServerMessage::changes(
        "rooms",
        vec![
            ChangeEvent::added("a", json!({"number": "101", "lastModified": 7})),
            ChangeEvent::removed("b"),
        ],
    );

    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "changes");
    assert_eq!(value["path"], "rooms");
    assert_eq!(value["from_cache"], false);
    assert_eq!(value["changes"][0]["kind"], "added");
    assert_eq!(value["changes"][0]["roomId"], "a");
    assert_eq!(value["changes"][1]["kind"], "removed");
    assert!(value["changes"][1].get("snapshot").is_none());
}

#[test]
fn test_changes_become_server_batches() {
    let text = serde_json::to_string(&ServerMessage::changes(
        "rooms",
        vec![ChangeEvent::added("a", json!({"number": "101"}))],
    ))
    .unwrap();

    let batch = parse_server_message(&text).unwrap().into_batch().unwrap();
    assert_eq!(batch.origin, Origin::FromServer);
    assert_eq!(batch.len(), 1);
}

#[test]
fn test_error_serialization() {
    let msg = ServerMessage::error("Invalid collection path", Some("rooms/a".to_string()));
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(
        value,
        json!({"type": "error", "message": "Invalid collection path", "path": "rooms/a"})
    );

    let bare = serde_json::to_value(ServerMessage::error("Database error", None)).unwrap();
    assert!(bare.get("path").is_none());
}

#[test]
fn test_pong_serialization() {
    let value = serde_json::to_value(&ServerMessage::Pong).unwrap();
    assert_eq!(value, json!({"type": "pong"}));
    assert!(ServerMessage::Pong.into_batch().is_none());
}
