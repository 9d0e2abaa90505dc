use convergent::{
    SyncConfig,
    control::StaleBasePolicy,
    sync::LocalSync,
};

use crate::helpers::*;

fn title(model: &convergent::Model) -> String {
    model
        .root()
        .get_object("title")
        .unwrap()
        .as_string()
        .unwrap()
        .get()
}

#[test]
fn test_three_participants_converge() {
    let authority = LocalSync::new(titled_document("abc"), SyncConfig::default());
    let participants: Vec<_> = ["alice", "bob", "carol"]
        .into_iter()
        .map(|user| connect_model(&authority, user))
        .collect();
    assert_eq!(authority.session_count(), 3);

    for (i, (_, model)) in participants.iter().enumerate() {
        let text = model.root().get_object("title").unwrap();
        let text = text.as_string().unwrap();
        let _ = text.insert(i, &i.to_string()).unwrap();
        let _ = text.append("!").unwrap();
        let _ = model.set(format!("seen-{i}"), true).unwrap();
    }
    settle(&authority);

    let expected = title(&participants[0].1);
    assert_eq!(expected.chars().filter(|c| *c == '!').count(), 3);
    for (_, model) in &participants {
        assert_eq!(title(model), expected);
        assert_eq!(model.root().len(), 4);
        assert_eq!(model.editor().parent_history_id(), authority.control().latest_version().unwrap());
    }
}

#[test]
fn test_suspended_authority_holds_operations() {
    let authority = LocalSync::new(titled_document("abc"), SyncConfig::default());
    let (_alice_session, alice) = connect_model(&authority, "alice");
    let (_bob_session, bob) = connect_model(&authority, "bob");

    authority.suspend();
    let _ = alice.set("draft", "yes").unwrap();
    assert_eq!(settle(&authority), 0);
    assert_eq!(authority.pending(), 1);
    assert!(!bob.contains_key("draft"));

    assert_eq!(authority.resume().unwrap(), 1);
    assert!(!authority.is_suspended());
    assert!(bob.contains_key("draft"));
}

#[test]
fn test_disconnected_session_stops_receiving() {
    let authority = LocalSync::new(titled_document("abc"), SyncConfig::default());
    let (_alice_session, alice) = connect_model(&authority, "alice");
    let (bob_session, bob) = connect_model(&authority, "bob");

    authority.disconnect(&bob_session);
    assert_eq!(authority.session_count(), 1);
    let _ = alice.set("after", 1).unwrap();
    settle(&authority);

    assert!(alice.contains_key("after"));
    assert!(!bob.contains_key("after"));
}

#[test]
fn test_rejected_stale_edit_resyncs_sender() {
    let config = SyncConfig::default().with_stale_base(StaleBasePolicy::Reject);
    let authority = LocalSync::new(titled_document("abc"), config);
    let (_alice_session, alice) = connect_model(&authority, "alice");
    let (_bob_session, bob) = connect_model(&authority, "bob");

    let _ = alice.set("winner", "alice").unwrap();
    let mut bob_edit = bob.set("loser", "bob").unwrap();
    assert_eq!(settle(&authority), 1);

    assert!(bob_edit.try_confirmed().unwrap_err().is_abandoned());
    assert!(bob.contains_key("winner"));
    assert!(!bob.contains_key("loser"));
    assert_eq!(bob.editor().current(), alice.editor().current());
}
