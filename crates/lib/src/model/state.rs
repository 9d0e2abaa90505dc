//! Materialized object values and the registry holding them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ObjectEvent, ObjectListener};
use crate::ot::{Component, ObjectOp, ObjectRef, ObjectType, OtError, Value};
use crate::subscription::Listeners;
use crate::Result;

pub(crate) const ROOT: &str = "root";

/// The current value of one shared object.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ObjectValue {
    Map(BTreeMap<String, Value>),
    List(Vec<Value>),
    String(String),
}

impl ObjectValue {
    pub(crate) fn empty(kind: ObjectType) -> Self {
        match kind {
            ObjectType::Map => ObjectValue::Map(BTreeMap::new()),
            ObjectType::List => ObjectValue::List(Vec::new()),
            ObjectType::String => ObjectValue::String(String::new()),
        }
    }

    pub(crate) fn kind(&self) -> ObjectType {
        match self {
            ObjectValue::Map(_) => ObjectType::Map,
            ObjectValue::List(_) => ObjectType::List,
            ObjectValue::String(_) => ObjectType::String,
        }
    }

    /// Build a value from an operation that only inserts.
    pub(crate) fn from_whole(op: &ObjectOp) -> std::result::Result<Self, OtError> {
        Ok(match op {
            ObjectOp::Map(op) => ObjectValue::Map(op.whole_content()?),
            ObjectOp::List(op) => ObjectValue::List(op.whole_content()?),
            ObjectOp::String(op) => ObjectValue::String(op.whole_content()?),
        })
    }

    pub(crate) fn apply(&self, id: &str, op: &ObjectOp) -> std::result::Result<Self, OtError> {
        Ok(match (self, op) {
            (ObjectValue::Map(value), ObjectOp::Map(op)) => ObjectValue::Map(op.apply(value)?),
            (ObjectValue::List(value), ObjectOp::List(op)) => ObjectValue::List(op.apply(value)?),
            (ObjectValue::String(value), ObjectOp::String(op)) => ObjectValue::String(op.apply(value)?),
            _ => {
                return Err(OtError::TypeMismatch {
                    id: id.to_string(),
                    expected: self.kind(),
                    actual: op.kind(),
                });
            }
        })
    }

    /// Objects referenced from this value.
    pub(crate) fn references(&self) -> Vec<ObjectRef> {
        let values: Box<dyn Iterator<Item = &Value>> = match self {
            ObjectValue::Map(map) => Box::new(map.values()),
            ObjectValue::List(list) => Box::new(list.iter()),
            ObjectValue::String(_) => return Vec::new(),
        };
        values.filter_map(Value::as_reference).cloned().collect()
    }
}

/// Objects referenced by values an operation inserts.
pub(crate) fn inserted_references(op: &ObjectOp) -> Vec<ObjectRef> {
    match op {
        ObjectOp::Map(op) => op
            .changes()
            .values()
            .filter_map(|change| change.new.as_ref().and_then(Value::as_reference))
            .cloned()
            .collect(),
        ObjectOp::List(op) => op
            .components()
            .iter()
            .filter_map(|component| match component {
                Component::Insert(values) => Some(values),
                _ => None,
            })
            .flatten()
            .filter_map(Value::as_reference)
            .cloned()
            .collect(),
        ObjectOp::String(_) => Vec::new(),
    }
}

/// One materialized shared object.
pub(crate) struct ModelObject {
    pub(crate) value: ObjectValue,
    /// Every operation ever applied, composed; rebuilds the value on reset.
    pub(crate) whole: ObjectOp,
    pub(crate) listeners: Listeners<ObjectListener>,
}

impl ModelObject {
    fn empty(kind: ObjectType) -> Self {
        Self {
            value: ObjectValue::empty(kind),
            whole: ObjectOp::empty(kind),
            listeners: Listeners::new(),
        }
    }

    pub(crate) fn kind(&self) -> ObjectType {
        self.value.kind()
    }
}

/// Events waiting for the model lock to be released.
pub(crate) type QueuedEvent = (Vec<Arc<ObjectListener>>, ObjectEvent);

/// Everything guarded by the model lock.
pub(crate) struct ModelState {
    pub(crate) objects: BTreeMap<String, ModelObject>,
    pub(crate) latest_id: u64,
    pub(crate) batch_depth: usize,
    pub(crate) queued: Vec<QueuedEvent>,
}

impl ModelState {
    pub(crate) fn new() -> Self {
        let mut objects = BTreeMap::new();
        objects.insert(ROOT.to_string(), ModelObject::empty(ObjectType::Map));
        Self {
            objects,
            latest_id: 0,
            batch_depth: 0,
            queued: Vec::new(),
        }
    }

    /// Look up an object, creating an empty one if it is unknown.
    pub(crate) fn materialize(&mut self, id: &str, kind: ObjectType) -> Result<&mut ModelObject> {
        let object = self.objects.entry(id.to_string()).or_insert_with(|| {
            debug!(id, %kind, "Materializing object");
            ModelObject::empty(kind)
        });
        if object.kind() != kind {
            return Err(super::ModelError::KindMismatch {
                id: id.to_string(),
                expected: kind,
                actual: object.kind(),
            }
            .into());
        }
        Ok(object)
    }

    pub(crate) fn materialize_all(&mut self, refs: &[ObjectRef]) -> Result<()> {
        for reference in refs {
            self.materialize(&reference.id, reference.kind)?;
        }
        Ok(())
    }

    fn queue(&mut self, id: &str, event: ObjectEvent) {
        if let Some(object) = self.objects.get(id) {
            let listeners = object.listeners.snapshot();
            if !listeners.is_empty() {
                self.queued.push((listeners, event));
            }
        }
    }

    /// Apply an operation made by this participant.
    pub(crate) fn apply_local(&mut self, id: &str, op: &ObjectOp) -> Result<()> {
        self.apply(id, op, true, None)
    }

    /// Apply an operation that arrived from the authority.
    ///
    /// An operation that does not fit the object leaves it untouched and fails
    /// with a structural mismatch; see [`ModelState::rebuild_object`].
    pub(crate) fn apply_remote(&mut self, id: &str, op: &ObjectOp, user: Option<&str>) -> Result<()> {
        self.apply(id, op, false, user)
    }

    fn apply(&mut self, id: &str, op: &ObjectOp, local: bool, user: Option<&str>) -> Result<()> {
        let object = self.materialize(id, op.kind())?;
        let value = object.value.apply(id, op)?;
        let whole = object.whole.compose(id, op)?;
        let events = change_events(&object.value, op, local, user);
        object.value = value;
        object.whole = whole;
        for event in events {
            self.queue(id, event);
        }
        self.materialize_all(&inserted_references(op))
    }

    /// Rebuild the object `id` from `whole`, the composition of everything
    /// applied to it since the latest whole state. `None` empties it.
    pub(crate) fn rebuild_object(
        &mut self,
        id: &str,
        kind: ObjectType,
        whole: Option<&ObjectOp>,
        user: Option<&str>,
    ) -> Result<()> {
        let op = whole.cloned().unwrap_or_else(|| ObjectOp::empty(kind));
        let value = ObjectValue::from_whole(&op)?;
        let references = value.references();
        self.reset_object(id, &op, value, user);
        self.materialize_all(&references)
    }

    /// Replace the object `id` with the whole state `op`.
    pub(crate) fn reset_object(&mut self, id: &str, op: &ObjectOp, value: ObjectValue, user: Option<&str>) {
        let object = self
            .objects
            .entry(id.to_string())
            .or_insert_with(|| ModelObject::empty(op.kind()));
        if object.kind() != op.kind() {
            warn!(id, "Object changed type on reset");
            object.value = ObjectValue::empty(op.kind());
        }
        let mut events = reset_events(&object.value, &value);
        events.push(ObjectEvent::Reset {
            user: user.map(str::to_string),
        });
        object.value = value;
        object.whole = op.clone();
        for event in events {
            self.queue(id, event);
        }
    }

    /// Ids reachable from the root through references.
    pub(crate) fn reachable_ids(&self) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut pending = VecDeque::from([ROOT.to_string()]);
        while let Some(id) = pending.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(object) = self.objects.get(&id) {
                pending.extend(object.value.references().into_iter().map(|r| r.id));
            }
        }
        seen.retain(|id| self.objects.contains_key(id));
        seen
    }

    pub(crate) fn next_id(&mut self, editor_id: &str) -> String {
        let id = format!("{editor_id}-{}", self.latest_id);
        self.latest_id += 1;
        id
    }
}

/// Events describing `op` applied to `before`.
fn change_events(before: &ObjectValue, op: &ObjectOp, local: bool, user: Option<&str>) -> Vec<ObjectEvent> {
    match (before, op) {
        (ObjectValue::Map(map), ObjectOp::Map(op)) => op
            .changes()
            .iter()
            .filter(|(_, change)| !change.is_noop())
            .map(|(key, change)| match &change.new {
                Some(new) => ObjectEvent::ValueChanged {
                    key: key.clone(),
                    old: map.get(key).cloned(),
                    new: new.clone(),
                    local,
                },
                None => ObjectEvent::ValueRemoved {
                    key: key.clone(),
                    old: map.get(key).cloned().unwrap_or(Value::Null),
                    local,
                },
            })
            .collect(),
        _ => vec![ObjectEvent::Changed {
            op: op.clone(),
            local,
            user: user.map(str::to_string),
        }],
    }
}

/// Per-key events for a map whose value was replaced wholesale.
fn reset_events(before: &ObjectValue, after: &ObjectValue) -> Vec<ObjectEvent> {
    let (ObjectValue::Map(before), ObjectValue::Map(after)) = (before, after) else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for (key, new) in after {
        if before.get(key) != Some(new) {
            events.push(ObjectEvent::ValueChanged {
                key: key.clone(),
                old: before.get(key).cloned(),
                new: new.clone(),
                local: false,
            });
        }
    }
    for (key, old) in before {
        if !after.contains_key(key) {
            events.push(ObjectEvent::ValueRemoved {
                key: key.clone(),
                old: old.clone(),
                local: false,
            });
        }
    }
    events
}
