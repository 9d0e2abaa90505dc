use convergent::{
    editor::{EditorEvent, EditorStatus},
    ot::StringOp,
};

use crate::helpers::*;

#[test]
fn test_edit_confirmed_by_authority() {
    let (outbox, editor) = recording_editor(1, "alice", "Hello World");
    let edit = StringOp::new().retain(6).delete("World").insert("Cookies");
    let mut confirmation = editor.apply(doc_edit(edit.clone())).unwrap();

    assert_eq!(text_of(&editor.current(), "doc"), "Hello Cookies");
    assert_eq!(editor.status(), EditorStatus::AwaitingConfirm);
    let sent = outbox.last();
    assert_eq!(sent.token, "alice-0");
    assert_eq!(sent.history_id, 1);
    assert!(!confirmation.try_confirmed().unwrap());

    assert_eq!(editor.receive(&remote(2, "alice-0", edit)).unwrap(), None);
    assert!(confirmation.try_confirmed().unwrap());
    assert_eq!(editor.status(), EditorStatus::Synchronized);
    assert_eq!(editor.parent_history_id(), 2);
    assert_eq!(text_of(&editor.current(), "doc"), "Hello Cookies");
}

#[test]
fn test_edits_during_flight_are_buffered_then_sent() {
    let (outbox, editor) = recording_editor(1, "alice", "Hello World");
    let cookies = StringOp::new().retain(6).delete("World").insert("Cookies");
    let _ = editor.apply(doc_edit(cookies.clone())).unwrap();
    let _ = editor.apply(doc_edit(StringOp::new().retain(13).insert("!"))).unwrap();
    assert_eq!(text_of(&editor.current(), "doc"), "Hello Cookies!");
    let _ = editor.apply(doc_edit(StringOp::new().retain(14).insert("!"))).unwrap();
    assert_eq!(text_of(&editor.current(), "doc"), "Hello Cookies!!");

    assert_eq!(outbox.sent().len(), 1);
    assert_eq!(editor.status(), EditorStatus::AwaitingConfirmWithBuffer);
    assert_eq!(editor.buffered(), Some(doc_edit(StringOp::new().retain(13).insert("!!"))));

    editor.receive(&remote(2, "alice-0", cookies)).unwrap();
    let sent = outbox.last();
    assert_eq!(sent.token, "alice-1");
    assert_eq!(sent.history_id, 2);
    assert_eq!(sent.operation, doc_edit(StringOp::new().retain(13).insert("!!")));
    assert_eq!(editor.status(), EditorStatus::AwaitingConfirm);

    let _ = editor
        .apply(doc_edit(StringOp::new().retain(12).delete("s").retain(2)))
        .unwrap();
    assert_eq!(text_of(&editor.current(), "doc"), "Hello Cookie!!");
    assert_eq!(editor.status(), EditorStatus::AwaitingConfirmWithBuffer);
}

#[test]
fn test_remote_edit_while_synchronized_is_applied() {
    let (outbox, editor) = recording_editor(1, "alice", "Hello World");

    let delta = editor
        .receive(&remote(2, "bob-0", StringOp::new().insert("ab").retain(11)))
        .unwrap();

    assert_eq!(delta, Some(doc_edit(StringOp::new().insert("ab").retain(11))));
    assert_eq!(text_of(&editor.current(), "doc"), "abHello World");
    assert_eq!(editor.parent_history_id(), 2);
    assert!(outbox.sent().is_empty());
}

#[test]
fn test_remote_edit_transformed_over_in_flight_and_buffer() {
    let (outbox, editor) = recording_editor(1, "alice", "Hello World");
    let _ = editor.apply(doc_edit(StringOp::new().insert("ab").retain(11))).unwrap();
    let _ = editor.apply(doc_edit(StringOp::new().retain(2).insert("c").retain(11))).unwrap();
    assert_eq!(text_of(&editor.current(), "doc"), "abcHello World");

    // Bob inserted at the start of the same base version
    editor
        .receive(&remote(2, "bob-0", StringOp::new().insert("d").retain(11)))
        .unwrap();
    assert_eq!(text_of(&editor.current(), "doc"), "dabcHello World");

    let last_sent = editor.last_sent().unwrap();
    assert_eq!(last_sent.history_id, 2);
    assert_eq!(last_sent.operation, doc_edit(StringOp::new().retain(1).insert("ab").retain(11)));

    // The authority confirms the in-flight edit as rebased above
    editor
        .receive(&remote(3, "alice-0", StringOp::new().retain(1).insert("ab").retain(11)))
        .unwrap();
    let sent = outbox.last();
    assert_eq!(sent.token, "alice-1");
    assert_eq!(sent.history_id, 3);
    assert_eq!(sent.operation, doc_edit(StringOp::new().retain(3).insert("c").retain(11)));
    assert_eq!(text_of(&editor.current(), "doc"), "dabcHello World");
}

#[test]
fn test_merged_operation_confirms_edit() {
    let (_outbox, editor) = recording_editor(1, "alice", "abc");
    let mut confirmation = editor.apply(doc_edit(StringOp::new().retain(3).insert("d"))).unwrap();

    let merged = remote(2, "relay-7", StringOp::new().retain(3).insert("d"))
        .with_merged_ids(vec!["bob-3".to_string(), "alice-0".to_string()]);
    assert_eq!(editor.receive(&merged).unwrap(), None);
    assert!(confirmation.try_confirmed().unwrap());
}

#[test]
fn test_whole_state_reset_abandons_unconfirmed_edits() {
    let (_outbox, editor) = recording_editor(1, "alice", "Hello World");
    let mut first = editor.apply(doc_edit(StringOp::new().retain(11).insert("!"))).unwrap();
    let mut second = editor.apply(doc_edit(StringOp::new().retain(12).insert("?"))).unwrap();

    let whole = convergent::tagged::TaggedUserOperation::new(9, "auth", text_document("doc", "Fresh"), None);
    editor.reset_to_operation(&whole);

    assert!(first.try_confirmed().unwrap_err().is_abandoned());
    assert!(second.try_confirmed().unwrap_err().is_abandoned());
    assert_eq!(editor.status(), EditorStatus::Synchronized);
    assert_eq!(text_of(&editor.current(), "doc"), "Fresh");
}

#[tokio::test]
async fn test_confirmation_future_resolves() {
    let (_outbox, editor) = recording_editor(1, "alice", "abc");
    let confirmation = editor.apply(doc_edit(StringOp::new().retain(3).insert("d"))).unwrap();

    editor
        .receive(&remote(2, "alice-0", StringOp::new().retain(3).insert("d")))
        .unwrap();
    confirmation.await.unwrap();
}

#[test]
fn test_listeners_see_local_and_remote_changes() {
    use std::sync::{Arc, Mutex};

    let (_outbox, editor) = recording_editor(1, "alice", "abc");
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let subscription = editor.subscribe(move |event: &EditorEvent| sink.lock().unwrap().push(event.clone()));

    let _ = editor.apply(doc_edit(StringOp::new().retain(3).insert("d"))).unwrap();
    editor
        .receive(&remote(2, "bob-0", StringOp::new().insert("z").retain(3)))
        .unwrap();
    drop(subscription);
    editor
        .receive(&remote(3, "bob-1", StringOp::new().insert("y").retain(4)))
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], EditorEvent::Changed { local: true, .. }));
    match &events[1] {
        EditorEvent::Changed { local, user, .. } => {
            assert!(!local);
            assert_eq!(user.as_deref(), Some("remote"));
        }
        other => panic!("Unexpected event {other:?}"),
    }
}
