//! Operations spanning several shared objects.

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::OtError;
use super::map::MapOp;
use super::sequence::{ListOp, StringOp};
use super::ObjectType;

/// An operation on a single object of a known type.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectOp {
    Map(MapOp),
    List(ListOp),
    String(StringOp),
}

impl ObjectOp {
    /// An operation that leaves an object of `kind` unchanged.
    pub fn empty(kind: ObjectType) -> Self {
        match kind {
            ObjectType::Map => ObjectOp::Map(MapOp::new()),
            ObjectType::List => ObjectOp::List(ListOp::new()),
            ObjectType::String => ObjectOp::String(StringOp::new()),
        }
    }

    pub fn kind(&self) -> ObjectType {
        match self {
            ObjectOp::Map(_) => ObjectType::Map,
            ObjectOp::List(_) => ObjectType::List,
            ObjectOp::String(_) => ObjectType::String,
        }
    }

    pub fn is_noop(&self) -> bool {
        match self {
            ObjectOp::Map(op) => op.is_noop(),
            ObjectOp::List(op) => op.is_noop(),
            ObjectOp::String(op) => op.is_noop(),
        }
    }

    /// True if the operation can only describe a whole value.
    pub fn is_inserts_only(&self) -> bool {
        match self {
            ObjectOp::Map(op) => op.is_inserts_only(),
            ObjectOp::List(op) => op.is_inserts_only(),
            ObjectOp::String(op) => op.is_inserts_only(),
        }
    }

    pub fn compose(&self, id: &str, other: &Self) -> Result<Self, OtError> {
        match (self, other) {
            (ObjectOp::Map(a), ObjectOp::Map(b)) => Ok(ObjectOp::Map(a.compose(b)?)),
            (ObjectOp::List(a), ObjectOp::List(b)) => Ok(ObjectOp::List(a.compose(b)?)),
            (ObjectOp::String(a), ObjectOp::String(b)) => Ok(ObjectOp::String(a.compose(b)?)),
            _ => Err(type_mismatch(id, self, other)),
        }
    }

    pub fn transform(&self, id: &str, other: &Self) -> Result<(Self, Self), OtError> {
        match (self, other) {
            (ObjectOp::Map(a), ObjectOp::Map(b)) => {
                let (a, b) = a.transform(b)?;
                Ok((ObjectOp::Map(a), ObjectOp::Map(b)))
            }
            (ObjectOp::List(a), ObjectOp::List(b)) => {
                let (a, b) = a.transform(b)?;
                Ok((ObjectOp::List(a), ObjectOp::List(b)))
            }
            (ObjectOp::String(a), ObjectOp::String(b)) => {
                let (a, b) = a.transform(b)?;
                Ok((ObjectOp::String(a), ObjectOp::String(b)))
            }
            _ => Err(type_mismatch(id, self, other)),
        }
    }
}

fn type_mismatch(id: &str, expected: &ObjectOp, actual: &ObjectOp) -> OtError {
    OtError::TypeMismatch {
        id: id.to_string(),
        expected: expected.kind(),
        actual: actual.kind(),
    }
}

/// The edit of one object inside an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub id: String,
    pub op: ObjectOp,
}

impl Update {
    pub fn new(id: impl Into<String>, op: ObjectOp) -> Self {
        Self { id: id.into(), op }
    }
}

// Wire form: {"id": ..., "type": "map" | "list" | "string", "op": ...}
impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Update", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", &self.op.kind())?;
        match &self.op {
            ObjectOp::Map(op) => state.serialize_field("op", op)?,
            ObjectOp::List(op) => state.serialize_field("op", op)?,
            ObjectOp::String(op) => state.serialize_field("op", op)?,
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct RawUpdate {
    id: String,
    #[serde(rename = "type")]
    kind: ObjectType,
    op: serde_json::Value,
}

impl<'de> Deserialize<'de> for Update {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawUpdate::deserialize(deserializer)?;
        let op = match raw.kind {
            ObjectType::Map => serde_json::from_value(raw.op).map(ObjectOp::Map),
            ObjectType::List => serde_json::from_value(raw.op).map(ObjectOp::List),
            ObjectType::String => serde_json::from_value(raw.op).map(ObjectOp::String),
        }
        .map_err(D::Error::custom)?;
        Ok(Update { id: raw.id, op })
    }
}

/// A set of updates to distinct objects, applied together.
///
/// Updates keep the order in which their objects first appeared. Composing and
/// transforming operate per object id; updates for objects only one side
/// touches pass through unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation {
    updates: Vec<Update>,
}

impl Operation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-object operation.
    pub fn single(id: impl Into<String>, op: ObjectOp) -> Self {
        Self {
            updates: vec![Update::new(id, op)],
        }
    }

    /// Add an update, composing it with an existing update for the same id.
    pub fn push(&mut self, update: Update) -> Result<(), OtError> {
        match self.updates.iter_mut().find(|u| u.id == update.id) {
            Some(existing) => {
                existing.op = existing.op.compose(&update.id, &update.op)?;
            }
            None => self.updates.push(update),
        }
        Ok(())
    }

    pub fn with(mut self, id: impl Into<String>, op: ObjectOp) -> Result<Self, OtError> {
        self.push(Update::new(id, op))?;
        Ok(self)
    }

    pub fn updates(&self) -> &[Update] {
        &self.updates
    }

    pub fn into_updates(self) -> Vec<Update> {
        self.updates
    }

    pub fn update(&self, id: &str) -> Option<&Update> {
        self.updates.iter().find(|u| u.id == id)
    }

    pub fn object_ids(&self) -> impl Iterator<Item = &str> {
        self.updates.iter().map(|u| u.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.updates.iter().all(|u| u.op.is_noop())
    }

    /// True if every update only inserts, so the operation can stand for the
    /// complete state of the objects it mentions.
    pub fn is_whole_state_compatible(&self) -> bool {
        self.updates.iter().all(|u| u.op.is_inserts_only())
    }

    /// Compose `self` followed by `other`.
    pub fn compose(&self, other: &Self) -> Result<Self, OtError> {
        let mut result = self.clone();
        for update in &other.updates {
            result.push(update.clone())?;
        }
        Ok(result)
    }

    /// Transform two concurrent operations, returning `(self', other')`.
    pub fn transform(&self, other: &Self) -> Result<(Self, Self), OtError> {
        let mut left = Vec::with_capacity(self.updates.len());
        let mut right = Vec::with_capacity(other.updates.len());

        for mine in &self.updates {
            match other.update(&mine.id) {
                Some(theirs) => {
                    let (l, _) = mine.op.transform(&mine.id, &theirs.op)?;
                    left.push(Update::new(mine.id.clone(), l));
                }
                None => left.push(mine.clone()),
            }
        }
        for theirs in &other.updates {
            match self.update(&theirs.id) {
                Some(mine) => {
                    let (_, r) = mine.op.transform(&theirs.id, &theirs.op)?;
                    right.push(Update::new(theirs.id.clone(), r));
                }
                None => right.push(theirs.clone()),
            }
        }

        Ok((Self { updates: left }, Self { updates: right }))
    }
}

impl From<Update> for Operation {
    fn from(update: Update) -> Self {
        Self {
            updates: vec![update],
        }
    }
}
