use std::sync::{Arc, Mutex};

use convergent::{
    Error, Model, SyncConfig,
    ot::StringOp,
    sync::{
        IncompatibleModelArbiter, JsonChannelTransport, ReceiveOutcome, Resolution, SyncSession,
    },
    tagged::{self, TaggedUserOperation},
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::helpers::*;

fn session_with(arbiter: Option<Arc<dyn IncompatibleModelArbiter>>) -> (Arc<SyncSession>, UnboundedReceiver<String>) {
    let (transport, receiver) = JsonChannelTransport::new();
    let initial = TaggedUserOperation::new(1, "catch-up", text_document("doc", "abc"), None);
    let mut session = SyncSession::new(initial, Arc::new(transport), SyncConfig::client());
    if let Some(arbiter) = arbiter {
        session = session.with_arbiter(arbiter);
    }
    (Arc::new(session), receiver)
}

fn doc_text(model: &Model) -> String {
    model.find_object("doc").unwrap().as_string().unwrap().get()
}

struct RecordingArbiter {
    answer: Resolution,
    seen: Mutex<Vec<u64>>,
}

impl IncompatibleModelArbiter for RecordingArbiter {
    fn resolve(&self, remote: &TaggedUserOperation, error: &Error) -> Resolution {
        assert!(error.is_sync_conflict());
        self.seen.lock().unwrap().push(remote.history_id());
        self.answer
    }
}

#[test]
fn test_operations_round_trip_as_json() {
    let (session, mut receiver) = session_with(None);
    let model = Model::new(&session).unwrap();

    let mut confirmation = model.set("answer", 42).unwrap();
    let message = receiver.try_recv().unwrap();
    let sent = tagged::from_json(&message).unwrap();
    assert_eq!(sent.history_id(), 1);
    assert_eq!(sent.token(), format!("{}-0", model.editor().id()));

    let stored = tagged::to_json(&sent.with_history_id(2)).unwrap();
    assert_eq!(session.receive_json(&stored, false).unwrap(), ReceiveOutcome::Delivered);
    assert!(confirmation.try_confirmed().unwrap());
    assert_eq!(session.control().latest_version().unwrap(), 2);
}

#[test]
fn test_garbage_message_is_a_serialization_error() {
    let (session, _receiver) = session_with(None);
    let err = session.receive_json("{not json", false).unwrap_err();
    assert!(err.is_serialization_error());
}

#[test]
fn test_unfit_delta_requests_latest_and_holds_sends() {
    let (session, mut receiver) = session_with(None);
    let model = Model::new(&session).unwrap();

    let unfit = TaggedUserOperation::new(2, "other-0", doc_edit(StringOp::new().retain(10).insert("z")), None);
    let outcome = session.on_tagged_operation_received(unfit, false).unwrap();
    assert_eq!(outcome, ReceiveOutcome::RequestLatest);
    assert!(session.is_bad_sync());

    let text = model.find_object("doc").unwrap();
    let mut pending = text.as_string().unwrap().append("!").unwrap();
    assert!(receiver.try_recv().is_err());

    let latest = TaggedUserOperation::new(2, "snapshot", text_document("doc", "abcd"), None);
    let outcome = session.on_tagged_operation_received(latest, true).unwrap();
    assert_eq!(outcome, ReceiveOutcome::Delivered);
    assert!(!session.is_bad_sync());
    assert_eq!(doc_text(&model), "abcd");
    assert!(pending.try_confirmed().unwrap_err().is_abandoned());
}

#[test]
fn test_incompatible_whole_state_can_be_ignored() {
    let arbiter = Arc::new(RecordingArbiter {
        answer: Resolution::Ignore,
        seen: Mutex::new(Vec::new()),
    });
    let (session, _receiver) = session_with(Some(arbiter.clone()));
    let model = Model::new(&session).unwrap();

    // A delta is not a valid whole state
    let partial = TaggedUserOperation::new(5, "snap", doc_edit(StringOp::new().retain(3).insert("x")), None);
    let outcome = session.on_tagged_operation_received(partial, true).unwrap();

    assert_eq!(outcome, ReceiveOutcome::Ignored);
    assert_eq!(*arbiter.seen.lock().unwrap(), [5]);
    assert!(session.is_bad_sync());
    assert_eq!(doc_text(&model), "abc");
}

#[test]
fn test_overwrite_remote_is_reported() {
    let arbiter = Arc::new(RecordingArbiter {
        answer: Resolution::OverwriteRemote,
        seen: Mutex::new(Vec::new()),
    });
    let (session, _receiver) = session_with(Some(arbiter));
    let _model = Model::new(&session).unwrap();

    let partial = TaggedUserOperation::new(5, "snap", doc_edit(StringOp::new().retain(3).insert("x")), None);
    let err = session.on_tagged_operation_received(partial, true).unwrap_err();
    assert!(err.is_sync_error());
}

#[test]
fn test_dropped_model_stops_listening() {
    let (session, _receiver) = session_with(None);
    let model = Model::new(&session).unwrap();
    drop(model);

    let delta = TaggedUserOperation::new(2, "other-0", doc_edit(StringOp::new().retain(3).insert("d")), None);
    let outcome = session.on_tagged_operation_received(delta, false).unwrap();
    assert_eq!(outcome, ReceiveOutcome::Delivered);
    assert_eq!(session.control().latest_version().unwrap(), 2);
}
