//! Models of several participants sharing one in-process authority.

use std::sync::{Arc, Mutex};

use convergent::{
    model::ObjectEvent,
    ot::{ObjectType, Value},
    sync::LocalSync,
    SyncConfig,
};

use crate::helpers::*;

fn authority() -> LocalSync {
    LocalSync::new(titled_document("Hello World"), SyncConfig::default())
}

#[test]
fn test_objects_created_remotely_are_materialized_on_demand() {
    let authority = authority();
    let (_alice_session, alice) = connect_model(&authority, "alice");
    let (_bob_session, bob) = connect_model(&authority, "bob");

    let list = alice.new_list().unwrap();
    let entry = alice.new_map().unwrap();
    let _ = entry.set("name", "first").unwrap();
    let _ = list.push(&entry).unwrap();
    let _ = alice.set("items", &list).unwrap();
    assert!(!bob.contains_key("items"));

    settle(&authority);

    let items = bob.root().get_object("items").unwrap();
    let items = items.as_list().unwrap();
    assert_eq!(items.id(), list.id());
    assert_eq!(items.len(), 1);
    let first = items.get_object(0).unwrap();
    assert_eq!(first.kind(), ObjectType::Map);
    assert_eq!(first.as_map().unwrap().get("name"), Some(Value::from("first")));
}

#[test]
fn test_concurrent_text_edits_converge() {
    let authority = authority();
    let (_alice_session, alice) = connect_model(&authority, "alice");
    let (_bob_session, bob) = connect_model(&authority, "bob");

    let alice_text = alice.root().get_object("title").unwrap();
    let bob_text = bob.root().get_object("title").unwrap();
    let _ = alice_text.as_string().unwrap().set("Hello Cookies").unwrap();
    let _ = bob_text.as_string().unwrap().insert(11, "!").unwrap();

    settle(&authority);

    assert_eq!(alice_text.as_string().unwrap().get(), "Hello Cookies!");
    assert_eq!(bob_text.as_string().unwrap().get(), "Hello Cookies!");
    assert_eq!(alice.editor().current(), bob.editor().current());
}

#[test]
fn test_conflicting_map_writes_converge_on_first_stored() {
    let authority = authority();
    let (_alice_session, alice) = connect_model(&authority, "alice");
    let (_bob_session, bob) = connect_model(&authority, "bob");

    let _ = alice.set("color", "blue").unwrap();
    let _ = bob.set("color", "green").unwrap();
    settle(&authority);

    assert_eq!(alice.get("color"), Some(Value::from("blue")));
    assert_eq!(bob.get("color"), Some(Value::from("blue")));
}

#[test]
fn test_remote_changes_reach_object_listeners_with_author() {
    let authority = authority();
    let (_alice_session, alice) = connect_model(&authority, "alice");
    let (_bob_session, bob) = connect_model(&authority, "bob");

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let bob_text = bob.root().get_object("title").unwrap();
    let _subscription = bob_text
        .as_string()
        .unwrap()
        .subscribe(move |event| sink.lock().unwrap().push(event.clone()))
        .unwrap();

    let alice_text = alice.root().get_object("title").unwrap();
    let _ = alice_text.as_string().unwrap().append("!").unwrap();
    settle(&authority);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ObjectEvent::Changed { local, user, .. } => {
            assert!(!local);
            assert_eq!(user.as_deref(), Some("alice"));
        }
        other => panic!("Unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_confirmations_resolve_after_flush() {
    let authority = authority();
    let (_session, alice) = connect_model(&authority, "alice");

    let first = alice.set("a", 1).unwrap();
    let second = alice.set("b", 2).unwrap();
    settle(&authority);

    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(authority.control().latest_version().unwrap(), 3);
}

#[test]
fn test_late_joiner_sees_current_state() {
    let authority = authority();
    let (_alice_session, alice) = connect_model(&authority, "alice");
    let list = alice.new_list().unwrap();
    let _ = list.push_all([1, 2, 3]).unwrap();
    let _ = alice.set("numbers", &list).unwrap();
    settle(&authority);

    let (_carol_session, carol) = connect_model(&authority, "carol");
    let numbers = carol.root().get_object("numbers").unwrap();
    assert_eq!(numbers.as_list().unwrap().to_vec(), [1, 2, 3].map(Value::from));
    assert_eq!(carol.editor().parent_history_id(), authority.control().latest_version().unwrap());
}
