//! Replicated object model.
//!
//! A [`Model`] materializes the shared objects of a document from the
//! operations its [`Editor`] sees. Objects are maps, lists and strings,
//! addressed by id; maps and lists link to other objects through
//! [`Value::Reference`](crate::ot::Value::Reference). The map with id
//! `"root"` always exists and is the entry point of the document.
//!
//! Handles ([`SharedMap`], [`SharedList`], [`SharedString`]) never mutate
//! their object directly. Each mutation builds an operation from the current
//! value, applies it locally and hands it to the editor, which sends it on.
//! Remote operations arrive through the model's session subscription and are
//! applied to the objects they address.
//!
//! Object listeners are called after the model lock is released, and at the
//! end of the outermost [`ModelBatch`] when one is open.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error, info, warn};

use crate::Result;
use crate::config::SyncConfig;
use crate::editor::{Confirmation, Editor, EditorBatch};
use crate::ot::{ObjectOp, ObjectRef, ObjectType, Operation, Value};
use crate::subscription::Subscription;
use crate::sync::{SyncSession, TaggedUserOperationListener};
use crate::tagged::TaggedUserOperation;

pub mod errors;
mod objects;
mod state;

pub use errors::ModelError;
pub use objects::{SharedList, SharedMap, SharedObject, SharedString};

use state::{ModelState, ObjectValue, ROOT};

/// Notifications about a single shared object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent {
    /// A map key was set.
    ValueChanged {
        key: String,
        old: Option<Value>,
        new: Value,
        local: bool,
    },
    /// A map key was removed.
    ValueRemoved { key: String, old: Value, local: bool },
    /// A list or string changed by `op`.
    Changed {
        op: ObjectOp,
        local: bool,
        user: Option<String>,
    },
    /// The object was rebuilt from its whole state.
    Reset { user: Option<String> },
}

/// Callback type for object listeners.
pub type ObjectListener = dyn Fn(&ObjectEvent) + Send + Sync;

pub(crate) struct ModelShared {
    editor: Editor,
    state: Mutex<ModelState>,
    config: SyncConfig,
}

impl ModelShared {
    fn state(&self) -> MutexGuard<'_, ModelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire queued object events unless a batch is open.
    fn dispatch(&self) {
        let events = {
            let mut state = self.state();
            if state.batch_depth > 0 {
                return;
            }
            std::mem::take(&mut state.queued)
        };
        for (listeners, event) in events {
            for listener in listeners {
                listener(&event);
            }
        }
    }

    /// Read an object's value, materializing it if needed.
    ///
    /// A handle whose object was replaced by one of another type reads as empty.
    pub(crate) fn read<T>(&self, id: &str, kind: ObjectType, f: impl FnOnce(&ObjectValue) -> T) -> T {
        let mut state = self.state();
        match state.materialize(id, kind) {
            Ok(object) => f(&object.value),
            Err(_) => f(&ObjectValue::empty(kind)),
        }
    }

    /// Build an operation from the current value, apply it and submit it.
    ///
    /// `build` returns `None` when the mutation would not change anything.
    pub(crate) fn mutate(
        &self,
        id: &str,
        kind: ObjectType,
        build: impl FnOnce(&ObjectValue) -> Result<Option<ObjectOp>>,
    ) -> Result<Confirmation> {
        let confirmation = {
            let mut state = self.state();
            let object = state.materialize(id, kind)?;
            let Some(op) = build(&object.value)? else {
                return Ok(Confirmation::resolved());
            };
            state.apply_local(id, &op)?;
            self.editor.apply(Operation::single(id, op))?
        };
        self.dispatch();
        Ok(confirmation)
    }

    pub(crate) fn subscribe(
        &self,
        id: &str,
        kind: ObjectType,
        listener: Arc<ObjectListener>,
    ) -> Result<Subscription> {
        let mut state = self.state();
        let object = state.materialize(id, kind)?;
        Ok(object.listeners.subscribe(listener))
    }

    pub(crate) fn handle(self: &Arc<Self>, reference: &ObjectRef) -> SharedObject {
        SharedObject::new(Arc::clone(self), reference)
    }

    fn receive(&self, op: &TaggedUserOperation) -> Result<()> {
        {
            let mut state = self.state();
            let Some(delta) = self.editor.receive(op)? else {
                return Ok(());
            };
            for update in delta.updates() {
                match state.apply_remote(&update.id, &update.op, op.user()) {
                    Ok(()) => {}
                    Err(err) if err.is_structural_mismatch() && self.config.reset_on_mismatch => {
                        warn!(id = %update.id, "Operation does not fit the object, rebuilding it: {err}");
                        // The editor's document is the latest whole state composed
                        // with every operation since, local ones included
                        let document = self.editor.current();
                        let whole = document.update(&update.id).map(|u| &u.op);
                        state.rebuild_object(&update.id, update.op.kind(), whole, op.user())?;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        self.dispatch();
        Ok(())
    }

    /// Replace every object with the content of the whole-state `op`.
    ///
    /// Objects the snapshot does not mention are dropped; the root is emptied.
    fn reset(&self, op: &TaggedUserOperation) -> Result<()> {
        self.load(op, true)
    }

    fn load(&self, op: &TaggedUserOperation, reset_editor: bool) -> Result<()> {
        {
            let mut state = self.state();
            let mut contents = Vec::with_capacity(op.operation().updates().len());
            for update in op.operation().updates() {
                contents.push((update, ObjectValue::from_whole(&update.op)?));
            }

            if reset_editor {
                self.editor.reset_to_operation(op);
            }
            info!(history_id = op.history_id(), objects = contents.len(), "Resetting model");

            let mentioned: BTreeSet<String> = contents.iter().map(|(u, _)| u.id.clone()).collect();
            for (update, value) in contents {
                state.reset_object(&update.id, &update.op, value, op.user());
            }
            if !mentioned.contains(ROOT) {
                let empty = ObjectOp::empty(ObjectType::Map);
                state.reset_object(ROOT, &empty, ObjectValue::empty(ObjectType::Map), op.user());
            }

            state.objects.retain(|id, _| {
                let keep = id == ROOT || mentioned.contains(id);
                if !keep {
                    debug!(id, "Dropping object missing from whole state");
                }
                keep
            });
            let references: Vec<ObjectRef> = state
                .objects
                .values()
                .flat_map(|object| object.value.references())
                .collect();
            state.materialize_all(&references)?;
        }
        self.dispatch();
        Ok(())
    }
}

struct ModelListener {
    shared: Weak<ModelShared>,
}

impl TaggedUserOperationListener for ModelListener {
    fn on_tagged_user_operation_received(
        &self,
        op: &TaggedUserOperation,
        whole_state: bool,
    ) -> Result<()> {
        let Some(shared) = self.shared.upgrade() else {
            return Ok(());
        };
        if whole_state {
            shared.reset(op)
        } else {
            shared.receive(op)
        }
    }
}

/// A document of shared objects kept in sync through an editor.
pub struct Model {
    shared: Arc<ModelShared>,
    _subscription: Option<Subscription>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("editor", &self.shared.editor)
            .field("objects", &self.shared.state().objects.len())
            .finish()
    }
}

impl Model {
    /// Attach a model to `session`, starting from its current state.
    pub fn new(session: &SyncSession) -> Result<Self> {
        let initial = session.connect_editor()?;
        let editor = Editor::new(&initial, session.outbound());
        let mut model = Self::with_editor(editor, session.config().clone())?;
        let listener = ModelListener {
            shared: Arc::downgrade(&model.shared),
        };
        model._subscription = Some(session.subscribe(Arc::new(listener)));
        Ok(model)
    }

    /// Build a model over an editor that is driven by the caller.
    ///
    /// The editor's current operation must be a whole state.
    pub fn with_editor(editor: Editor, config: SyncConfig) -> Result<Self> {
        let initial = TaggedUserOperation::new(
            editor.parent_history_id(),
            editor.id(),
            editor.current(),
            None,
        );
        let shared = Arc::new(ModelShared {
            editor,
            state: Mutex::new(ModelState::new()),
            config,
        });
        shared.load(&initial, false)?;
        Ok(Self {
            shared,
            _subscription: None,
        })
    }

    pub fn editor(&self) -> &Editor {
        &self.shared.editor
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Feed an operation directly, as a session would.
    pub fn receive(&self, op: &TaggedUserOperation, whole_state: bool) -> Result<()> {
        if whole_state {
            self.shared.reset(op)
        } else {
            self.shared.receive(op)
        }
    }

    pub fn root(&self) -> SharedMap {
        SharedMap::new(Arc::clone(&self.shared), ROOT.to_string())
    }

    /// Handle to the object `reference` names, materializing it if needed.
    pub fn object(&self, reference: &ObjectRef) -> Result<SharedObject> {
        self.shared.state().materialize(&reference.id, reference.kind)?;
        Ok(self.shared.handle(reference))
    }

    /// Handle to an object the model already holds.
    pub fn find_object(&self, id: &str) -> Result<SharedObject> {
        let kind = self
            .shared
            .state()
            .objects
            .get(id)
            .map(|object| object.kind())
            .ok_or_else(|| ModelError::UnknownObject { id: id.to_string() })?;
        Ok(self.shared.handle(&ObjectRef::new(id, kind)))
    }

    fn new_object(&self, kind: ObjectType) -> Result<String> {
        let mut state = self.shared.state();
        let id = state.next_id(self.shared.editor.id());
        state.materialize(&id, kind)?;
        Ok(id)
    }

    pub fn new_map(&self) -> Result<SharedMap> {
        Ok(SharedMap::new(Arc::clone(&self.shared), self.new_object(ObjectType::Map)?))
    }

    pub fn new_list(&self) -> Result<SharedList> {
        Ok(SharedList::new(Arc::clone(&self.shared), self.new_object(ObjectType::List)?))
    }

    pub fn new_string(&self) -> Result<SharedString> {
        Ok(SharedString::new(Arc::clone(&self.shared), self.new_object(ObjectType::String)?))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.root().get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.root().contains_key(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<Confirmation> {
        self.root().set(key, value)
    }

    pub fn remove(&self, key: &str) -> Result<Confirmation> {
        self.root().remove(key)
    }

    /// Ids of every materialized object.
    pub fn object_ids(&self) -> Vec<String> {
        self.shared.state().objects.keys().cloned().collect()
    }

    /// Ids reachable from the root.
    pub fn reachable_ids(&self) -> BTreeSet<String> {
        self.shared.state().reachable_ids()
    }

    /// Drop every object not reachable from the root and return their ids.
    ///
    /// Removing a reference from its parent detaches the whole subtree below
    /// it, unless another reachable object still refers to part of it.
    pub fn detach_unreachable(&self) -> Vec<String> {
        let mut state = self.shared.state();
        let reachable = state.reachable_ids();
        let detached: Vec<String> = state
            .objects
            .keys()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect();
        for id in &detached {
            state.objects.remove(id);
        }
        if !detached.is_empty() {
            debug!(count = detached.len(), "Detached unreachable objects");
        }
        detached
    }

    /// Open a batch: edits are sent together and events fire when it ends.
    pub fn lock(&self) -> ModelBatch<'_> {
        self.shared.state().batch_depth += 1;
        ModelBatch {
            shared: &self.shared,
            editor: Some(self.shared.editor.lock()),
        }
    }
}

/// Batch scope over a model. See [`Model::lock`].
#[must_use = "the batch ends as soon as it is dropped"]
pub struct ModelBatch<'a> {
    shared: &'a ModelShared,
    editor: Option<EditorBatch<'a>>,
}

impl ModelBatch<'_> {
    /// End the scope and report a failure to submit the batched edits.
    pub fn finish(mut self) -> Result<()> {
        self.end()
    }

    fn end(&mut self) -> Result<()> {
        let Some(editor) = self.editor.take() else {
            return Ok(());
        };
        let result = editor.finish();
        {
            let mut state = self.shared.state();
            state.batch_depth = state.batch_depth.saturating_sub(1);
        }
        self.shared.dispatch();
        result
    }
}

impl Drop for ModelBatch<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.end() {
            error!("Failed to submit batched model edits: {err}");
        }
    }
}
