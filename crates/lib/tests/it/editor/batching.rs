use convergent::{editor::EditorStatus, ot::StringOp};

use crate::helpers::*;

#[test]
fn test_batch_sends_one_rebased_operation() {
    let (outbox, editor) = recording_editor(1, "alice", "Hello World");
    let batch = editor.lock();
    let mut first = editor.apply(doc_edit(StringOp::new().insert("ab").retain(11))).unwrap();

    // Bob appends while the batch is still open
    editor
        .receive(&remote(2, "bob-0", StringOp::new().retain(11).insert("X")))
        .unwrap();
    assert_eq!(text_of(&editor.current(), "doc"), "abHello WorldX");
    assert!(outbox.sent().is_empty());

    let mut second = editor.apply(doc_edit(StringOp::new().retain(2).insert("c").retain(12))).unwrap();
    batch.finish().unwrap();

    let sent = outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].history_id, 2);
    assert_eq!(sent[0].token, "alice-0");
    assert_eq!(sent[0].operation, doc_edit(StringOp::new().insert("abc").retain(12)));
    assert_eq!(editor.status(), EditorStatus::AwaitingConfirm);

    editor
        .receive(&remote(3, "alice-0", StringOp::new().insert("abc").retain(12)))
        .unwrap();
    assert!(first.try_confirmed().unwrap());
    assert!(second.try_confirmed().unwrap());
}

#[test]
fn test_nested_batches_submit_at_outermost_end() {
    let (outbox, editor) = recording_editor(1, "alice", "abc");
    {
        let _outer = editor.lock();
        let _ = editor.apply(doc_edit(StringOp::new().retain(3).insert("d"))).unwrap();
        {
            let inner = editor.lock();
            let _ = inner.editor().apply(doc_edit(StringOp::new().retain(4).insert("e"))).unwrap();
        }
        assert!(editor.in_batch());
        assert!(outbox.sent().is_empty());
    }

    assert!(!editor.in_batch());
    assert_eq!(outbox.last().operation, doc_edit(StringOp::new().retain(3).insert("de")));
}

#[test]
fn test_empty_batch_resolves_immediately() {
    let (outbox, editor) = recording_editor(1, "alice", "abc");
    let batch = editor.lock();
    let mut nothing = editor.apply(convergent::ot::Operation::new()).unwrap();
    batch.finish().unwrap();

    assert!(nothing.try_confirmed().unwrap());
    assert!(outbox.sent().is_empty());
    assert_eq!(editor.status(), EditorStatus::Synchronized);
}

#[test]
fn test_batch_while_awaiting_confirm_is_buffered() {
    let (outbox, editor) = recording_editor(1, "alice", "abc");
    let _ = editor.apply(doc_edit(StringOp::new().retain(3).insert("d"))).unwrap();
    {
        let _batch = editor.lock();
        let _ = editor.apply(doc_edit(StringOp::new().retain(4).insert("e"))).unwrap();
        let _ = editor.apply(doc_edit(StringOp::new().retain(5).insert("f"))).unwrap();
    }

    assert_eq!(outbox.sent().len(), 1);
    assert_eq!(editor.status(), EditorStatus::AwaitingConfirmWithBuffer);
    assert_eq!(editor.buffered(), Some(doc_edit(StringOp::new().retain(4).insert("ef"))));
}
