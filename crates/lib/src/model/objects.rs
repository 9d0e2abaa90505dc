//! Handles to the shared objects of a model.
//!
//! Handles are cheap to clone and only carry the object id. Reads go to the
//! model's current value; mutations return a [`Confirmation`] that resolves
//! once the authority has acknowledged the edit.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use similar::{ChangeTag, TextDiff};

use super::state::ObjectValue;
use super::{ModelError, ModelShared, ObjectEvent};
use crate::Result;
use crate::editor::Confirmation;
use crate::ot::{ListOp, MapOp, ObjectOp, ObjectRef, ObjectType, StringOp, Value};
use crate::subscription::Subscription;

fn out_of_bounds(index: usize, len: usize) -> crate::Error {
    ModelError::IndexOutOfBounds { index, len }.into()
}

/// Handle to any shared object.
#[derive(Clone, Debug, PartialEq)]
pub enum SharedObject {
    Map(SharedMap),
    List(SharedList),
    String(SharedString),
}

impl SharedObject {
    pub(crate) fn new(model: Arc<ModelShared>, reference: &ObjectRef) -> Self {
        let id = reference.id.clone();
        match reference.kind {
            ObjectType::Map => SharedObject::Map(SharedMap::new(model, id)),
            ObjectType::List => SharedObject::List(SharedList::new(model, id)),
            ObjectType::String => SharedObject::String(SharedString::new(model, id)),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SharedObject::Map(map) => map.id(),
            SharedObject::List(list) => list.id(),
            SharedObject::String(string) => string.id(),
        }
    }

    pub fn kind(&self) -> ObjectType {
        match self {
            SharedObject::Map(_) => ObjectType::Map,
            SharedObject::List(_) => ObjectType::List,
            SharedObject::String(_) => ObjectType::String,
        }
    }

    pub fn reference(&self) -> ObjectRef {
        ObjectRef::new(self.id(), self.kind())
    }

    pub fn as_map(&self) -> Option<&SharedMap> {
        match self {
            SharedObject::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&SharedList> {
        match self {
            SharedObject::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&SharedString> {
        match self {
            SharedObject::String(string) => Some(string),
            _ => None,
        }
    }
}

impl From<&SharedObject> for Value {
    fn from(object: &SharedObject) -> Self {
        Value::Reference(object.reference())
    }
}

macro_rules! handle {
    ($name:ident, $kind:expr) => {
        #[derive(Clone)]
        pub struct $name {
            model: Arc<ModelShared>,
            id: String,
        }

        impl $name {
            pub(crate) fn new(model: Arc<ModelShared>, id: String) -> Self {
                Self { model, id }
            }

            pub fn id(&self) -> &str {
                &self.id
            }

            pub fn reference(&self) -> ObjectRef {
                ObjectRef::new(self.id.clone(), $kind)
            }

            /// Register a listener for changes to this object.
            pub fn subscribe(
                &self,
                listener: impl Fn(&ObjectEvent) + Send + Sync + 'static,
            ) -> Result<Subscription> {
                self.model.subscribe(&self.id, $kind, Arc::new(listener))
            }

            fn mutate(
                &self,
                build: impl FnOnce(&ObjectValue) -> Result<Option<ObjectOp>>,
            ) -> Result<Confirmation> {
                self.model.mutate(&self.id, $kind, build)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name)).field("id", &self.id).finish()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id && Arc::ptr_eq(&self.model, &other.model)
            }
        }

        impl From<&$name> for Value {
            fn from(handle: &$name) -> Self {
                Value::Reference(handle.reference())
            }
        }
    };
}

handle!(SharedMap, ObjectType::Map);
handle!(SharedList, ObjectType::List);
handle!(SharedString, ObjectType::String);

impl SharedMap {
    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, Value>) -> T) -> T {
        self.model.read(&self.id, ObjectType::Map, |value| match value {
            ObjectValue::Map(map) => f(map),
            _ => f(&BTreeMap::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.read(BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(BTreeMap::is_empty)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read(|map| map.get(key).cloned())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read(|map| map.contains_key(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.read(|map| map.keys().cloned().collect())
    }

    /// Snapshot of every entry.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.read(|map| map.clone())
    }

    /// The object referenced under `key`, if the value is a reference.
    pub fn get_object(&self, key: &str) -> Option<SharedObject> {
        let reference = self.get(key)?.as_reference()?.clone();
        Some(SharedObject::new(Arc::clone(&self.model), &reference))
    }

    /// Set `key` to `value`. Setting the value a key already holds is a no-op.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<Confirmation> {
        let key = key.into();
        let value = value.into();
        if value.is_null() {
            return Err(ModelError::NullValue { key }.into());
        }
        self.mutate(|current| {
            let ObjectValue::Map(map) = current else {
                return Ok(None);
            };
            let old = map.get(&key).cloned();
            if old.as_ref() == Some(&value) {
                return Ok(None);
            }
            Ok(Some(ObjectOp::Map(MapOp::new().put(key, old, value))))
        })
    }

    /// Set several keys in one operation.
    pub fn put_all<K: Into<String>, V: Into<Value>>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Confirmation> {
        let entries: Vec<(String, Value)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if let Some((key, _)) = entries.iter().find(|(_, v)| v.is_null()) {
            return Err(ModelError::NullValue { key: key.clone() }.into());
        }
        self.mutate(|current| {
            let ObjectValue::Map(map) = current else {
                return Ok(None);
            };
            let mut op = MapOp::new();
            for (key, value) in entries {
                let old = map.get(&key).cloned();
                if old.as_ref() != Some(&value) {
                    op = op.put(key, old, value);
                }
            }
            Ok((!op.is_empty()).then_some(ObjectOp::Map(op)))
        })
    }

    /// Remove `key`. Removing a missing key resolves immediately.
    pub fn remove(&self, key: &str) -> Result<Confirmation> {
        self.mutate(|current| {
            let ObjectValue::Map(map) = current else {
                return Ok(None);
            };
            Ok(map
                .get(key)
                .map(|old| ObjectOp::Map(MapOp::new().remove(key, old.clone()))))
        })
    }

    /// Remove every key holding `value`.
    pub fn remove_value(&self, value: &Value) -> Result<Confirmation> {
        self.mutate(|current| {
            let ObjectValue::Map(map) = current else {
                return Ok(None);
            };
            let op = map
                .iter()
                .filter(|(_, v)| *v == value)
                .fold(MapOp::new(), |op, (key, old)| op.remove(key.clone(), old.clone()));
            Ok((!op.is_empty()).then_some(ObjectOp::Map(op)))
        })
    }

    pub fn clear(&self) -> Result<Confirmation> {
        self.mutate(|current| {
            let ObjectValue::Map(map) = current else {
                return Ok(None);
            };
            let op = map
                .iter()
                .fold(MapOp::new(), |op, (key, old)| op.remove(key.clone(), old.clone()));
            Ok((!op.is_empty()).then_some(ObjectOp::Map(op)))
        })
    }
}

impl SharedList {
    fn read<T>(&self, f: impl FnOnce(&[Value]) -> T) -> T {
        self.model.read(&self.id, ObjectType::List, |value| match value {
            ObjectValue::List(list) => f(list),
            _ => f(&[]),
        })
    }

    fn edit(
        &self,
        build: impl FnOnce(&[Value]) -> Result<Option<ListOp>>,
    ) -> Result<Confirmation> {
        self.mutate(|current| match current {
            ObjectValue::List(list) => Ok(build(list)?.map(ObjectOp::List)),
            _ => Ok(None),
        })
    }

    pub fn len(&self) -> usize {
        self.read(<[Value]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(<[Value]>::is_empty)
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.read(|list| list.get(index).cloned())
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.read(<[Value]>::to_vec)
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.read(|list| list.contains(value))
    }

    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.read(|list| list.iter().position(|v| v == value))
    }

    /// The object referenced at `index`, if the value is a reference.
    pub fn get_object(&self, index: usize) -> Option<SharedObject> {
        let reference = self.get(index)?.as_reference()?.clone();
        Some(SharedObject::new(Arc::clone(&self.model), &reference))
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<Confirmation> {
        let value = value.into();
        self.edit(|list| Ok(Some(ListOp::new().retain(list.len()).insert(vec![value]))))
    }

    pub fn push_all(&self, values: impl IntoIterator<Item = impl Into<Value>>) -> Result<Confirmation> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.edit(|list| {
            if values.is_empty() {
                return Ok(None);
            }
            Ok(Some(ListOp::new().retain(list.len()).insert(values)))
        })
    }

    /// Insert `value` before `index`; `index == len` appends.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<Confirmation> {
        self.insert_all(index, [value.into()])
    }

    pub fn insert_all(
        &self,
        index: usize,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<Confirmation> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.edit(|list| {
            if index > list.len() {
                return Err(out_of_bounds(index, list.len()));
            }
            if values.is_empty() {
                return Ok(None);
            }
            Ok(Some(
                ListOp::new()
                    .retain(index)
                    .insert(values)
                    .retain(list.len() - index),
            ))
        })
    }

    /// Replace the value at `index`.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<Confirmation> {
        let value = value.into();
        self.edit(|list| {
            let old = list.get(index).ok_or_else(|| out_of_bounds(index, list.len()))?;
            if *old == value {
                return Ok(None);
            }
            Ok(Some(
                ListOp::new()
                    .retain(index)
                    .insert(vec![value])
                    .delete(vec![old.clone()])
                    .retain(list.len() - index - 1),
            ))
        })
    }

    pub fn remove(&self, index: usize) -> Result<Confirmation> {
        self.remove_range(index, index + 1)
    }

    /// Remove the values in `from..to`.
    pub fn remove_range(&self, from: usize, to: usize) -> Result<Confirmation> {
        self.edit(|list| {
            if to > list.len() {
                return Err(out_of_bounds(to.saturating_sub(1), list.len()));
            }
            if from > to {
                return Err(out_of_bounds(from, list.len()));
            }
            if from == to {
                return Ok(None);
            }
            Ok(Some(
                ListOp::new()
                    .retain(from)
                    .delete(list[from..to].to_vec())
                    .retain(list.len() - to),
            ))
        })
    }

    /// Remove the first occurrence of `value`. Resolves immediately when the
    /// list does not contain it.
    pub fn remove_value(&self, value: &Value) -> Result<Confirmation> {
        self.edit(|list| {
            Ok(list.iter().position(|v| v == value).map(|index| {
                ListOp::new()
                    .retain(index)
                    .delete(vec![value.clone()])
                    .retain(list.len() - index - 1)
            }))
        })
    }

    pub fn clear(&self) -> Result<Confirmation> {
        self.edit(|list| Ok((!list.is_empty()).then(|| ListOp::new().delete(list.to_vec()))))
    }
}

impl SharedString {
    fn read<T>(&self, f: impl FnOnce(&str) -> T) -> T {
        self.model.read(&self.id, ObjectType::String, |value| match value {
            ObjectValue::String(text) => f(text),
            _ => f(""),
        })
    }

    fn edit(&self, build: impl FnOnce(&str) -> Result<Option<StringOp>>) -> Result<Confirmation> {
        self.mutate(|current| match current {
            ObjectValue::String(text) => Ok(build(text)?.map(ObjectOp::String)),
            _ => Ok(None),
        })
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.read(|text| text.chars().count())
    }

    pub fn is_empty(&self) -> bool {
        self.read(str::is_empty)
    }

    pub fn get(&self) -> String {
        self.read(str::to_string)
    }

    /// Replace the whole text, sending only the characters that differ.
    pub fn set(&self, text: &str) -> Result<Confirmation> {
        self.edit(|current| {
            if current == text {
                return Ok(None);
            }
            let diff = TextDiff::from_chars(current, text);
            let mut op = StringOp::new();
            for change in diff.iter_all_changes() {
                let value = change.value();
                op = match change.tag() {
                    ChangeTag::Equal => op.retain(value.chars().count()),
                    ChangeTag::Delete => op.delete(value),
                    ChangeTag::Insert => op.insert(value),
                };
            }
            Ok(Some(op))
        })
    }

    /// Insert `text` before the character at `index`.
    pub fn insert(&self, index: usize, text: &str) -> Result<Confirmation> {
        self.edit(|current| {
            let len = current.chars().count();
            if index > len {
                return Err(out_of_bounds(index, len));
            }
            if text.is_empty() {
                return Ok(None);
            }
            Ok(Some(StringOp::new().retain(index).insert(text).retain(len - index)))
        })
    }

    pub fn append(&self, text: &str) -> Result<Confirmation> {
        self.edit(|current| {
            if text.is_empty() {
                return Ok(None);
            }
            Ok(Some(StringOp::new().retain(current.chars().count()).insert(text)))
        })
    }

    /// Remove the characters in `from..to`.
    pub fn remove(&self, from: usize, to: usize) -> Result<Confirmation> {
        self.edit(|current| {
            let len = current.chars().count();
            if to > len {
                return Err(out_of_bounds(to, len));
            }
            if from > to {
                return Err(out_of_bounds(from, len));
            }
            if from == to {
                return Ok(None);
            }
            let removed: String = current.chars().skip(from).take(to - from).collect();
            Ok(Some(StringOp::new().retain(from).delete(removed).retain(len - to)))
        })
    }

    pub fn clear(&self) -> Result<Confirmation> {
        self.edit(|current| Ok((!current.is_empty()).then(|| StringOp::new().delete(current))))
    }
}

impl fmt::Display for SharedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|text| f.write_str(text))
    }
}
