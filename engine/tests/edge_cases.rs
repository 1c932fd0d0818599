//! Edge case tests for roomsync-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use proptest::prelude::*;
use roomsync_engine::{
    protocol, resolve, wire, ChangeBatch, ChangeEvent, CollectionPaths, Command, MergeStrategy,
    Origin, PendingWrites, Reconciler, Room, RoomList, RoomPatch, RoomStatus, ServerMessage,
    SubscriptionInput, SubscriptionMachine, Tier,
};
use serde_json::json;

fn reconciler() -> Reconciler {
    Reconciler::new(MergeStrategy::Merge)
}

fn apply(rooms: &RoomList, events: Vec<ChangeEvent>) -> RoomList {
    reconciler()
        .apply(rooms, &ChangeBatch::from_server(events), &mut PendingWrites::new())
        .rooms
}

fn numbers(rooms: &RoomList) -> Vec<&str> {
    rooms.iter().map(|r| r.number.as_str()).collect()
}

// ============================================================================
// Label Edge Cases
// ============================================================================

#[test]
fn empty_label_sorts_first() {
    let rooms = apply(
        &RoomList::new(),
        vec![
            ChangeEvent::added("a", json!({"number": "101"})),
            ChangeEvent::added("b", json!({"number": ""})),
        ],
    );
    assert_eq!(numbers(&rooms), vec!["", "101"]);
    assert_eq!(rooms.get("b").unwrap().floor(), None);
}

#[test]
fn labels_compare_textually() {
    let rooms = apply(
        &RoomList::new(),
        vec![
            ChangeEvent::added("a", json!({"number": "1001"})),
            ChangeEvent::added("b", json!({"number": "201"})),
            ChangeEvent::added("c", json!({"number": "1000"})),
        ],
    );
    assert_eq!(numbers(&rooms), vec!["1000", "1001", "201"]);
}

#[test]
fn labels_ignore_case_then_fall_back_to_id() {
    let rooms = apply(
        &RoomList::new(),
        vec![
            ChangeEvent::added("z", json!({"number": "10B"})),
            ChangeEvent::added("y", json!({"number": "10a"})),
            ChangeEvent::added("x", json!({"number": "10b"})),
            ChangeEvent::added("w", json!({"number": "10b"})),
        ],
    );
    assert_eq!(numbers(&rooms), vec!["10a", "10B", "10b", "10b"]);
    let ids: Vec<_> = rooms.iter().skip(2).map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["w", "x"]);
}

#[test]
fn unicode_labels() {
    let labels = ["Suite Ärzte", "Люкс 1", "スイート", "🛏️ 12"];
    let events = labels
        .iter()
        .enumerate()
        .map(|(i, label)| ChangeEvent::added(format!("r{i}"), json!({"number": label})))
        .collect();

    let rooms = apply(&RoomList::new(), events);
    assert_eq!(rooms.len(), labels.len());
    assert!(rooms.is_sorted());
    assert_eq!(rooms.get("r1").unwrap().number, "Люкс 1");
}

#[test]
fn integer_labels_are_accepted() {
    let rooms = apply(
        &RoomList::new(),
        vec![ChangeEvent::added("a", json!({"number": 412}))],
    );
    assert_eq!(rooms.get("a").unwrap().number, "412");
    assert_eq!(rooms.get("a").unwrap().floor(), Some(4));
}

// ============================================================================
// Malformed Document Edge Cases
// ============================================================================

#[test]
fn wrongly_typed_fields_skip_only_that_event() {
    let result = reconciler().apply(
        &RoomList::new(),
        &ChangeBatch::from_server(vec![
            ChangeEvent::added("ok", json!({"number": "101"})),
            ChangeEvent::added("bad-flag", json!({"number": "102", "isMarked": "yes"})),
            ChangeEvent::added("bad-shape", json!("not an object")),
            ChangeEvent::added("bad-ts", json!({"number": "103", "redTimestamp": "noon"})),
        ]),
        &mut PendingWrites::new(),
    );
    assert_eq!(numbers(&result.rooms), vec!["101"]);
    let skipped: Vec<_> = result.skipped.iter().map(|s| s.room_id.as_str()).collect();
    assert_eq!(skipped, vec!["bad-flag", "bad-shape", "bad-ts"]);
}

#[test]
fn status_names_are_lenient() {
    let rooms = apply(
        &RoomList::new(),
        vec![
            ChangeEvent::added("a", json!({"number": "1", "status": " GREEN "})),
            ChangeEvent::added("b", json!({"number": "2", "status": "teal"})),
            ChangeEvent::added("c", json!({"number": "3", "status": null})),
            ChangeEvent::added("d", json!({"number": "4", "status": ""})),
        ],
    );
    assert_eq!(rooms.get("a").unwrap().status, RoomStatus::Green);
    assert_eq!(rooms.get("b").unwrap().status, RoomStatus::None);
    assert_eq!(rooms.get("c").unwrap().status, RoomStatus::None);
    assert_eq!(rooms.get("d").unwrap().status, RoomStatus::None);
}

#[test]
fn unknown_keys_are_ignored() {
    let rooms = apply(
        &RoomList::new(),
        vec![ChangeEvent::added(
            "a",
            json!({"number": "101", "status": "red", "housekeeper": "Ana", "floorPlan": [1, 2]}),
        )],
    );
    assert_eq!(rooms.get("a").unwrap().status, RoomStatus::Red);
}

#[test]
fn empty_object_decodes_to_default_room() {
    let rooms = apply(&RoomList::new(), vec![ChangeEvent::added("blank", json!({}))]);
    let room = rooms.get("blank").unwrap();
    assert_eq!(room.number, "");
    assert_eq!(room.status, RoomStatus::None);
    assert!(!room.is_marked && !room.is_deep_cleaned && !room.is_completed_before_930);
}

// ============================================================================
// Deletion Edge Cases
// ============================================================================

#[test]
fn remove_then_add_in_same_batch() {
    let rooms = apply(
        &RoomList::new(),
        vec![ChangeEvent::added("a", json!({"number": "101", "status": "red"}))],
    );
    let rooms = apply(
        &rooms,
        vec![
            ChangeEvent::removed("a"),
            ChangeEvent::added("a", json!({"number": "101", "status": "blue"})),
        ],
    );
    assert_eq!(rooms.get("a").unwrap().status, RoomStatus::Blue);
}

#[test]
fn add_then_remove_in_same_batch() {
    let rooms = apply(
        &RoomList::new(),
        vec![
            ChangeEvent::added("a", json!({"number": "101"})),
            ChangeEvent::removed("a"),
        ],
    );
    assert!(rooms.is_empty());
}

#[test]
fn removal_beats_pending_write() {
    let reconciler = reconciler();
    let rooms = apply(
        &RoomList::new(),
        vec![ChangeEvent::added("a", json!({"number": "101"}))],
    );

    let mut pending = PendingWrites::new();
    pending.insert(Room::new("a", "101").with_status(RoomStatus::Blue), 10);

    let result = reconciler.apply(
        &rooms,
        &ChangeBatch::from_server(vec![ChangeEvent::removed("a")]),
        &mut pending,
    );
    assert!(result.rooms.is_empty());
    assert!(pending.is_empty());
}

#[test]
fn duplicate_removals_are_harmless() {
    let rooms = apply(
        &RoomList::new(),
        vec![ChangeEvent::added("a", json!({"number": "101"}))],
    );
    let result = reconciler().apply(
        &rooms,
        &ChangeBatch::from_server(vec![ChangeEvent::removed("a"), ChangeEvent::removed("a")]),
        &mut PendingWrites::new(),
    );
    assert_eq!(result.removed, vec!["a".to_string()]);
    assert_eq!(result.missing_removals, vec!["a".to_string()]);
}

// ============================================================================
// Cache Isolation
// ============================================================================

#[test]
fn cache_batch_keeps_pending_entries() {
    let mut pending = PendingWrites::new();
    pending.insert(Room::new("a", "101").with_status(RoomStatus::Green), 10);

    let result = reconciler().apply(
        &RoomList::new(),
        &ChangeBatch::from_cache(vec![ChangeEvent::added(
            "a",
            json!({"number": "101", "status": "green"}),
        )]),
        &mut pending,
    );
    assert!(result.discarded);
    assert!(result.rooms.is_empty());
    assert!(pending.contains("a"));
}

#[test]
fn cache_flag_on_the_wire_is_honoured() {
    let text = json!({
        "type": "changes",
        "path": "rooms",
        "from_cache": true,
        "changes": [{"kind": "added", "roomId": "a", "snapshot": {"number": "101"}}],
    })
    .to_string();
    let batch = protocol::parse_server_message(&text)
        .unwrap()
        .into_batch()
        .unwrap();
    assert_eq!(batch.origin, Origin::FromCache);

    let result = reconciler().apply(&RoomList::new(), &batch, &mut PendingWrites::new());
    assert!(result.rooms.is_empty());
}

// ============================================================================
// Conflict Scenarios
// ============================================================================

#[test]
fn local_blue_survives_remote_red() {
    let rooms = apply(
        &RoomList::new(),
        vec![ChangeEvent::added("a", json!({"number": "101", "status": "red"}))],
    );

    let local = RoomPatch::status(RoomStatus::Blue).apply_to(rooms.get("a").unwrap(), 5_000);
    let mut pending = PendingWrites::new();
    pending.insert(local, 5_000);

    let result = reconciler().apply(
        &rooms,
        &ChangeBatch::from_server(vec![ChangeEvent::modified(
            "a",
            json!({"number": "101", "status": "red", "redTimestamp": 6_000, "lastModified": 6_000}),
        )]),
        &mut pending,
    );

    let room = result.rooms.get("a").unwrap();
    assert_eq!(room.status, RoomStatus::Blue);
    assert_eq!(room.timestamps.blue, Some(5_000));
    assert_eq!(room.timestamps.red, Some(6_000));
    assert_eq!(result.local_wins().count(), 1);
}

#[test]
fn own_echo_confirms_pending_write() {
    let base = Room::new("a", "101");
    let local = RoomPatch::status(RoomStatus::Green).apply_to(&base, 5_000);
    let mut echoed = local.clone();
    echoed.last_modified = 5_010;

    let mut pending = PendingWrites::new();
    pending.insert(local, 5_000);

    let result = reconciler().apply(
        &RoomList::from_rooms(vec![base]),
        &ChangeBatch::from_server(vec![ChangeEvent::modified(
            "a",
            wire::to_wire(&echoed, "tablet-a").to_value(),
        )]),
        &mut pending,
    );

    echoed.owner_device = Some("tablet-a".into());
    assert_eq!(result.rooms.get("a"), Some(&echoed));
    assert_eq!(result.local_wins().count(), 0);
    assert!(pending.is_empty());
}

#[test]
fn white_loses_to_everything() {
    for status in RoomStatus::ALL {
        if status == RoomStatus::White {
            continue;
        }
        let local = Room::new("a", "101").with_status(RoomStatus::White);
        let remote = Room::new("a", "101").with_status(status);
        assert_eq!(resolve(&local, &remote, MergeStrategy::Merge).room.status, status);
        assert_eq!(resolve(&remote, &local, MergeStrategy::Merge).room.status, status);
    }
}

// ============================================================================
// Subscription Scenarios
// ============================================================================

#[test]
fn fallback_then_revoke_then_identity_restarts_at_root() {
    let mut machine = SubscriptionMachine::new(CollectionPaths::default());

    let commands = machine.handle(SubscriptionInput::IdentityAvailable("u1".into()));
    let root_epoch = match commands.last() {
        Some(Command::Subscribe { epoch, tier, path }) => {
            assert_eq!(*tier, Tier::Root);
            assert_eq!(path, "rooms");
            *epoch
        }
        other => panic!("unexpected command {other:?}"),
    };

    let commands = machine.handle(SubscriptionInput::BatchReceived {
        epoch: root_epoch,
        origin: Origin::FromServer,
        is_empty: true,
    });
    assert!(commands.iter().any(|c| matches!(
        c,
        Command::Subscribe { tier: Tier::User, path, .. } if path == "users/u1/rooms"
    )));

    machine.handle(SubscriptionInput::IdentityRevoked);
    assert!(!machine.is_listening());

    let commands = machine.handle(SubscriptionInput::IdentityAvailable("u1".into()));
    assert!(matches!(
        commands.last(),
        Some(Command::Subscribe { tier: Tier::Root, .. })
    ));
}

#[test]
fn cache_batch_before_server_snapshot_does_not_trigger_fallback() {
    let mut machine = SubscriptionMachine::new(CollectionPaths::default());
    machine.handle(SubscriptionInput::IdentityAvailable("u1".into()));
    let epoch = machine.current_epoch().unwrap();

    let commands = machine.handle(SubscriptionInput::BatchReceived {
        epoch,
        origin: Origin::FromCache,
        is_empty: true,
    });
    assert_eq!(commands, vec![Command::Deliver { epoch }]);
    assert_eq!(machine.tier(), Some(Tier::Root));
}

#[test]
fn custom_collection_paths() {
    let mut machine = SubscriptionMachine::new(CollectionPaths::new("hotel/rooms", "staff/{uid}"));
    machine.handle(SubscriptionInput::IdentityAvailable("maria".into()));
    assert_eq!(machine.active_path().as_deref(), Some("hotel/rooms"));

    let epoch = machine.current_epoch().unwrap();
    machine.handle(SubscriptionInput::SubscriptionFailed {
        epoch,
        message: "permission denied".into(),
    });
    assert_eq!(machine.active_path().as_deref(), Some("staff/maria"));
}

// ============================================================================
// Large Data
// ============================================================================

#[test]
fn many_rooms_single_batch() {
    let events = (0..2_000u32)
        .rev()
        .map(|i| ChangeEvent::added(format!("r{i}"), json!({"number": format!("{:04}", i)})))
        .collect();
    let rooms = apply(&RoomList::new(), events);

    assert_eq!(rooms.len(), 2_000);
    assert!(rooms.is_sorted());
    assert_eq!(rooms.iter().next().unwrap().number, "0000");
    assert_eq!(rooms.counts().get(RoomStatus::None), 2_000);
}

#[test]
fn server_message_with_many_changes() {
    let changes = (0..500)
        .map(|i| ChangeEvent::added(format!("r{i}"), json!({"number": i.to_string()})))
        .collect();
    let text = serde_json::to_string(&ServerMessage::changes("rooms", changes)).unwrap();
    let batch = protocol::parse_server_message(&text)
        .unwrap()
        .into_batch()
        .unwrap();
    assert_eq!(batch.len(), 500);
}

// ============================================================================
// Property Tests
// ============================================================================

fn arb_status() -> impl Strategy<Value = RoomStatus> {
    prop::sample::select(RoomStatus::ALL.to_vec())
}

fn arb_room() -> impl Strategy<Value = Room> {
    (
        "[a-z0-9-]{1,12}",
        "[0-9A-Za-z ]{0,6}",
        arb_status(),
        prop::option::of(1u64..1_000_000),
        prop::option::of(1u64..1_000_000),
        prop::option::of("[a-z0-9: ]{0,10}"),
        any::<(bool, bool, bool)>(),
        0u64..1_000_000,
    )
        .prop_map(
            |(id, number, status, red, blue, available_time, flags, last_modified)| {
                let mut room = Room::new(id, number).with_status(status);
                room.timestamps.red = red;
                room.timestamps.blue = blue;
                room.available_time = available_time;
                room.is_marked = flags.0;
                room.is_deep_cleaned = flags.1;
                room.is_completed_before_930 = flags.2;
                room.last_modified = last_modified;
                room.owner_device = Some("device-1".into());
                room
            },
        )
}

proptest! {
    #[test]
    fn prop_wire_roundtrip(room in arb_room()) {
        let value = wire::to_wire(&room, "device-1").to_value();
        let decoded = wire::from_wire(wire::decode_snapshot(&value).unwrap());
        prop_assert_eq!(decoded, room);
    }

    #[test]
    fn prop_resolution_picks_higher_priority(local in arb_room(), remote in arb_room()) {
        let merged = resolve(&local, &remote, MergeStrategy::Merge).room;
        let expected = if local.status.priority() >= remote.status.priority() {
            local.status.priority()
        } else {
            remote.status.priority()
        };
        prop_assert_eq!(merged.status.priority(), expected);
        if local.status != remote.status {
            prop_assert_eq!(merged.last_modified, local.last_modified.max(remote.last_modified));
        }
    }

    #[test]
    fn prop_resolution_is_idempotent(room in arb_room()) {
        let merged = resolve(&room, &room, MergeStrategy::Merge).room;
        prop_assert_eq!(merged, room);
    }

    #[test]
    fn prop_from_rooms_is_sorted(rooms in prop::collection::vec(arb_room(), 0..40)) {
        let list = RoomList::from_rooms(rooms);
        prop_assert!(list.is_sorted());
    }
}
