//! Two editors editing one text through an authority driven by hand.

use std::collections::VecDeque;
use std::sync::Arc;

use convergent::{
    SyncConfig,
    control::EditorControl,
    editor::{Editor, EditorStatus},
    tagged::{TaggedOperation, TaggedUserOperation},
};
use rand::Rng;

use crate::helpers::*;
use crate::ot::helpers::{SEEDS, random_base, random_string_op, rng};

struct Participant {
    outbox: Arc<Outbox>,
    editor: Editor,
    /// Number of sends already stored by the authority.
    stored: usize,
    inbox: VecDeque<TaggedUserOperation>,
}

impl Participant {
    fn new(name: &str, text: &str) -> Self {
        let (outbox, editor) = recording_editor(1, name, text);
        Self {
            outbox,
            editor,
            stored: 0,
            inbox: VecDeque::new(),
        }
    }

    fn text(&self) -> String {
        text_of(&self.editor.current(), "doc")
    }

    fn next_send(&mut self) -> Option<TaggedOperation> {
        let next = self.outbox.sent().get(self.stored).cloned();
        if next.is_some() {
            self.stored += 1;
        }
        next
    }
}

/// Store the next send of `participants[from]` and queue the stored form for everyone.
fn store_next(control: &EditorControl, participants: &mut [Participant], from: usize) -> bool {
    let Some(sent) = participants[from].next_send() else {
        return false;
    };
    let stored = control
        .store(TaggedUserOperation::from(sent), false)
        .expect("Failed to store operation");
    for participant in participants.iter_mut() {
        participant.inbox.push_back(stored.clone());
    }
    true
}

fn deliver_next(participant: &mut Participant) -> bool {
    let Some(op) = participant.inbox.pop_front() else {
        return false;
    };
    participant.editor.receive(&op).expect("Failed to receive operation");
    true
}

/// Store and deliver until nothing is in flight.
fn drain(control: &EditorControl, participants: &mut [Participant]) {
    loop {
        let mut progressed = false;
        for who in 0..participants.len() {
            progressed |= store_next(control, participants, who);
            while deliver_next(&mut participants[who]) {
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}

#[test]
fn test_random_interleavings_converge() {
    for seed in 0..SEEDS {
        let mut rng = rng(seed);
        let base = random_base(&mut rng);
        let control = EditorControl::in_memory(text_document("doc", &base), &SyncConfig::default());
        let mut participants = [Participant::new("alice", &base), Participant::new("bob", &base)];

        for _ in 0..40 {
            let who = rng.gen_range(0..participants.len());
            match rng.gen_range(0..3) {
                0 => {
                    let text = participants[who].text();
                    let op = random_string_op(&mut rng, &text);
                    let _ = participants[who].editor.apply(doc_edit(op)).unwrap();
                }
                1 => {
                    store_next(&control, &mut participants, who);
                }
                _ => {
                    deliver_next(&mut participants[who]);
                }
            }
        }
        drain(&control, &mut participants);

        let authority = text_of(control.latest_user_operation().unwrap().operation(), "doc");
        for participant in &participants {
            assert_eq!(participant.editor.status(), EditorStatus::Synchronized, "seed {seed}");
            assert_eq!(participant.text(), authority, "seed {seed}");
        }
    }
}

#[test]
fn test_edits_racing_the_same_position_keep_authority_order() {
    let control = EditorControl::in_memory(text_document("doc", "ab"), &SyncConfig::default());
    let mut participants = [Participant::new("alice", "ab"), Participant::new("bob", "ab")];

    let _ = participants[0]
        .editor
        .apply(doc_edit(convergent::ot::StringOp::new().retain(1).insert("X").retain(1)))
        .unwrap();
    let _ = participants[1]
        .editor
        .apply(doc_edit(convergent::ot::StringOp::new().retain(1).insert("Y").retain(1)))
        .unwrap();

    // Bob's edit reaches the authority first
    assert!(store_next(&control, &mut participants, 1));
    assert!(store_next(&control, &mut participants, 0));
    drain(&control, &mut participants);

    assert_eq!(participants[0].text(), "aYXb");
    assert_eq!(participants[1].text(), "aYXb");
}
