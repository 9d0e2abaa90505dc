//! Client-side editing state machine.
//!
//! An [`Editor`] lets local edits take effect immediately while at most one
//! operation is in flight to the authority. It moves between three states:
//!
//! * `Synchronized`: nothing in flight. A local edit is sent and the editor
//!   starts awaiting its confirmation.
//! * `AwaitingConfirm`: one edit sent. Further local edits are buffered.
//! * `AwaitingConfirmWithBuffer`: one edit sent and more buffered. Further
//!   local edits are composed into the buffer.
//!
//! Remote operations arriving while an edit is in flight are transformed over
//! it (and over the buffer), so `current` always equals the authority's state
//! followed by the local edits it has not seen yet. When the authority echoes
//! the sent edit back, the buffer (if any) is sent next.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::Result;
use crate::ot::Operation;
use crate::subscription::{Listeners, Subscription};
use crate::sync::{OperationSync, TaggedUserOperationListener};
use crate::tagged::{TaggedOperation, TaggedUserOperation};

mod batch;
mod confirmation;
pub mod errors;

pub use batch::EditorBatch;
pub use confirmation::Confirmation;
pub use errors::EditorError;

/// Observable synchronization state of an editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorStatus {
    Synchronized,
    AwaitingConfirm,
    AwaitingConfirmWithBuffer,
}

/// Change notifications emitted by an editor.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// An operation was composed into the document.
    Changed {
        op: Operation,
        local: bool,
        user: Option<String>,
    },
    /// The document was replaced by a whole state.
    Reset { op: Operation, user: Option<String> },
}

/// Callback type for editor listeners.
pub type EditorListener = dyn Fn(&EditorEvent) + Send + Sync;

#[derive(Debug)]
enum SyncState {
    Synchronized,
    AwaitingConfirm {
        last_sent: TaggedOperation,
    },
    AwaitingConfirmWithBuffer {
        last_sent: TaggedOperation,
        buffer: TaggedOperation,
    },
}

#[derive(Debug, Default)]
struct PendingBatch {
    op: Option<Operation>,
    waiters: Vec<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct EditorState {
    sync: SyncState,
    parent_history_id: u64,
    current: Operation,
    last_id: u64,
    futures: HashMap<String, Vec<oneshot::Sender<()>>>,
    batch_depth: usize,
    batch: PendingBatch,
}

impl EditorState {
    fn next_token(&mut self, editor_id: &str) -> String {
        let token = format!("{editor_id}-{}", self.last_id);
        self.last_id += 1;
        token
    }

    fn resolve(&mut self, token: &str) {
        if let Some(waiters) = self.futures.remove(token) {
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
    }
}

/// Local replica of a document that keeps edits flowing to an authority.
pub struct Editor {
    id: String,
    outbound: Arc<dyn OperationSync>,
    state: Mutex<EditorState>,
    listeners: Listeners<EditorListener>,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl Editor {
    /// Create an editor starting from the catch-up operation `initial`.
    ///
    /// The editor takes its id from the operation's token; the authority
    /// hands out a unique token with every catch-up.
    pub fn new(initial: &TaggedUserOperation, outbound: Arc<dyn OperationSync>) -> Self {
        Self {
            id: initial.token().to_string(),
            outbound,
            state: Mutex::new(EditorState {
                sync: SyncState::Synchronized,
                parent_history_id: initial.history_id(),
                current: initial.operation().clone(),
                last_id: 0,
                futures: HashMap::new(),
                batch_depth: 0,
                batch: PendingBatch::default(),
            }),
            listeners: Listeners::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The document including every local edit.
    pub fn current(&self) -> Operation {
        self.state().current.clone()
    }

    /// History id of the last remote operation this editor has seen.
    pub fn parent_history_id(&self) -> u64 {
        self.state().parent_history_id
    }

    pub fn status(&self) -> EditorStatus {
        match self.state().sync {
            SyncState::Synchronized => EditorStatus::Synchronized,
            SyncState::AwaitingConfirm { .. } => EditorStatus::AwaitingConfirm,
            SyncState::AwaitingConfirmWithBuffer { .. } => EditorStatus::AwaitingConfirmWithBuffer,
        }
    }

    /// The operation currently in flight.
    pub fn last_sent(&self) -> Option<TaggedOperation> {
        match &self.state().sync {
            SyncState::Synchronized => None,
            SyncState::AwaitingConfirm { last_sent }
            | SyncState::AwaitingConfirmWithBuffer { last_sent, .. } => Some(last_sent.clone()),
        }
    }

    /// The local edits waiting for the in-flight operation to be confirmed.
    pub fn buffered(&self) -> Option<Operation> {
        match &self.state().sync {
            SyncState::AwaitingConfirmWithBuffer { buffer, .. } => Some(buffer.operation.clone()),
            _ => None,
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&EditorEvent) + Send + Sync + 'static) -> Subscription {
        self.listeners.subscribe(Arc::new(listener))
    }

    fn notify(&self, events: Vec<EditorEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.snapshot();
        for event in &events {
            for listener in &listeners {
                listener(event);
            }
        }
    }

    /// Apply a local edit.
    ///
    /// The edit is composed into `current` right away. Outside a batch it is
    /// sent or buffered depending on the state; inside a batch it is held
    /// until the outermost batch ends.
    pub fn apply(&self, op: Operation) -> Result<Confirmation> {
        if op.is_noop() {
            return Ok(Confirmation::resolved());
        }
        let mut state = self.state();
        let current = state.current.compose(&op)?;

        let confirmation = if state.batch_depth > 0 {
            let batched = match &state.batch.op {
                Some(pending) => pending.compose(&op)?,
                None => op.clone(),
            };
            let (sender, confirmation) = Confirmation::pending();
            state.batch.op = Some(batched);
            state.batch.waiters.push(sender);
            confirmation
        } else {
            let (sender, confirmation) = Confirmation::pending();
            self.submit(&mut state, op.clone(), vec![sender])?;
            confirmation
        };
        state.current = current;
        drop(state);

        self.notify(vec![EditorEvent::Changed {
            op,
            local: true,
            user: None,
        }]);
        Ok(confirmation)
    }

    /// Run a local edit through the state machine. `current` already contains it.
    fn submit(
        &self,
        state: &mut EditorState,
        op: Operation,
        waiters: Vec<oneshot::Sender<()>>,
    ) -> Result<()> {
        let parent = state.parent_history_id;
        let (next, token, send) = match &state.sync {
            SyncState::Synchronized => {
                let token = state.next_token(&self.id);
                let tagged = TaggedOperation::new(parent, token.clone(), op);
                let next = SyncState::AwaitingConfirm {
                    last_sent: tagged.clone(),
                };
                (next, token, Some(tagged))
            }
            SyncState::AwaitingConfirm { last_sent } => {
                let last_sent = last_sent.clone();
                let token = state.next_token(&self.id);
                let buffer = TaggedOperation::new(parent, token.clone(), op);
                (
                    SyncState::AwaitingConfirmWithBuffer { last_sent, buffer },
                    token,
                    None,
                )
            }
            SyncState::AwaitingConfirmWithBuffer { last_sent, buffer } => {
                let composed = buffer.operation.compose(&op)?;
                let token = buffer.token.clone();
                let buffer = TaggedOperation::new(buffer.history_id, token.clone(), composed);
                (
                    SyncState::AwaitingConfirmWithBuffer {
                        last_sent: last_sent.clone(),
                        buffer,
                    },
                    token,
                    None,
                )
            }
        };

        state.sync = next;
        state.futures.entry(token).or_default().extend(waiters);
        if let Some(tagged) = send {
            debug!(editor = %self.id, token = %tagged.token, base = tagged.history_id, "Sending operation");
            self.outbound.send(tagged);
        }
        Ok(())
    }

    /// Process an operation stored by the authority.
    ///
    /// Returns the operation that was composed into `current`, or `None` when
    /// `remote` confirmed the edit in flight.
    pub fn receive(&self, remote: &TaggedUserOperation) -> Result<Option<Operation>> {
        let mut guard = self.state();
        let state = &mut *guard;
        let remote_id = remote.history_id();

        let (next, incoming) = match &state.sync {
            SyncState::Synchronized => (None, remote.operation().clone()),
            SyncState::AwaitingConfirm { last_sent } => {
                if remote.includes(&last_sent.token) {
                    let token = last_sent.token.clone();
                    debug!(editor = %self.id, %token, history_id = remote_id, "Edit confirmed");
                    state.parent_history_id = remote_id;
                    state.sync = SyncState::Synchronized;
                    state.resolve(&token);
                    return Ok(None);
                }
                let (left, right) = remote.operation().transform(&last_sent.operation)?;
                let last_sent = TaggedOperation::new(remote_id, last_sent.token.clone(), right);
                (Some(SyncState::AwaitingConfirm { last_sent }), left)
            }
            SyncState::AwaitingConfirmWithBuffer { last_sent, buffer } => {
                if remote.includes(&last_sent.token) {
                    let confirmed = last_sent.token.clone();
                    let next_sent = buffer.with_history_id(remote_id);
                    debug!(editor = %self.id, token = %confirmed, history_id = remote_id, "Edit confirmed, sending buffer");
                    state.parent_history_id = remote_id;
                    state.sync = SyncState::AwaitingConfirm {
                        last_sent: next_sent.clone(),
                    };
                    state.resolve(&confirmed);
                    self.outbound.send(next_sent);
                    return Ok(None);
                }
                let (left, right) = remote.operation().transform(&last_sent.operation)?;
                let (buffered, incoming) = buffer.operation.transform(&left)?;
                let last_sent = TaggedOperation::new(remote_id, last_sent.token.clone(), right);
                let buffer = TaggedOperation::new(remote_id, buffer.token.clone(), buffered);
                (
                    Some(SyncState::AwaitingConfirmWithBuffer { last_sent, buffer }),
                    incoming,
                )
            }
        };

        let (batch, incoming) = match &state.batch.op {
            Some(pending) => {
                let (pending, incoming) = pending.transform(&incoming)?;
                (Some(pending), incoming)
            }
            None => (None, incoming),
        };
        let current = state.current.compose(&incoming)?;

        if let Some(next) = next {
            state.sync = next;
        }
        if batch.is_some() {
            state.batch.op = batch;
        }
        state.parent_history_id = remote_id;
        state.current = current;
        drop(guard);

        self.notify(vec![EditorEvent::Changed {
            op: incoming.clone(),
            local: false,
            user: remote.user.clone(),
        }]);
        Ok(Some(incoming))
    }

    /// Replace the document with the whole state `op`.
    ///
    /// Drops every unconfirmed edit; their confirmations fail with
    /// [`EditorError::Abandoned`].
    pub fn reset_to_operation(&self, op: &TaggedUserOperation) {
        let mut state = self.state();
        if !state.futures.is_empty() || !matches!(state.sync, SyncState::Synchronized) {
            warn!(editor = %self.id, history_id = op.history_id(), "Discarding unconfirmed edits on reset");
        }
        state.sync = SyncState::Synchronized;
        state.parent_history_id = op.history_id();
        state.current = op.operation().clone();
        state.futures.clear();
        state.batch = PendingBatch::default();
        drop(state);

        self.notify(vec![EditorEvent::Reset {
            op: op.operation().clone(),
            user: op.user.clone(),
        }]);
    }

    /// Open a batch scope. See [`EditorBatch`].
    pub fn lock(&self) -> EditorBatch<'_> {
        self.state().batch_depth += 1;
        EditorBatch::new(self)
    }

    pub fn in_batch(&self) -> bool {
        self.state().batch_depth > 0
    }

    fn end_batch(&self) -> Result<()> {
        let mut state = self.state();
        state.batch_depth = state.batch_depth.saturating_sub(1);
        if state.batch_depth > 0 {
            return Ok(());
        }

        let PendingBatch { op, waiters } = std::mem::take(&mut state.batch);
        match op {
            Some(op) if !op.is_empty() => self.submit(&mut state, op, waiters),
            _ => {
                for waiter in waiters {
                    let _ = waiter.send(());
                }
                Ok(())
            }
        }
    }
}

impl TaggedUserOperationListener for Editor {
    fn on_tagged_user_operation_received(
        &self,
        op: &TaggedUserOperation,
        whole_state: bool,
    ) -> Result<()> {
        if whole_state {
            self.reset_to_operation(op);
        } else {
            self.receive(op)?;
        }
        Ok(())
    }
}
