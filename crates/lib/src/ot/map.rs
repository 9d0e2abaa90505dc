//! Map operations.
//!
//! A [`MapOp`] records, per key, the value before and after the edit. Keeping
//! the previous value lets [`MapOp::apply`] detect a diverged base and lets
//! [`MapOp::transform`] rewrite the losing side of a concurrent write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::errors::OtError;
use super::value::Value;
use super::{Side, TIE_BREAK};

/// The change of a single key. `None` means the key is absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

impl MapChange {
    pub fn new(old: Option<Value>, new: Option<Value>) -> Self {
        Self { old, new }
    }

    pub fn is_noop(&self) -> bool {
        self.old == self.new
    }

    pub fn is_removal(&self) -> bool {
        self.new.is_none()
    }
}

/// An edit of a shared map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapOp {
    changes: BTreeMap<String, MapChange>,
}

impl MapOp {
    pub fn new() -> Self {
        Self::default()
    }

    /// An operation that populates an empty map with `entries`.
    pub fn whole<'a>(entries: impl IntoIterator<Item = (&'a String, &'a Value)>) -> Self {
        let mut op = Self::new();
        for (key, value) in entries {
            op.changes
                .insert(key.clone(), MapChange::new(None, Some(value.clone())));
        }
        op
    }

    /// Set `key` from `old` to `new`.
    pub fn put(mut self, key: impl Into<String>, old: Option<Value>, new: impl Into<Value>) -> Self {
        self.changes
            .insert(key.into(), MapChange::new(old, Some(new.into())));
        self
    }

    /// Remove `key`, whose current value is `old`.
    pub fn remove(mut self, key: impl Into<String>, old: Value) -> Self {
        self.changes
            .insert(key.into(), MapChange::new(Some(old), None));
        self
    }

    pub fn changes(&self) -> &BTreeMap<String, MapChange> {
        &self.changes
    }

    pub fn change(&self, key: &str) -> Option<&MapChange> {
        self.changes.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.changes.values().all(MapChange::is_noop)
    }

    /// True if every change adds a key that was absent.
    pub fn is_inserts_only(&self) -> bool {
        self.changes
            .values()
            .all(|c| c.old.is_none() && c.new.is_some())
    }

    /// The entries of a whole-state operation.
    pub fn whole_content(&self) -> Result<BTreeMap<String, Value>, OtError> {
        self.changes
            .iter()
            .map(|(key, change)| match change {
                MapChange {
                    old: None,
                    new: Some(value),
                } => Ok((key.clone(), value.clone())),
                _ => Err(OtError::InvalidWholeState {
                    reason: format!("key {key} is not a plain insert"),
                }),
            })
            .collect()
    }

    /// Apply to `base`, checking that every key currently holds its `old` value.
    pub fn apply(&self, base: &BTreeMap<String, Value>) -> Result<BTreeMap<String, Value>, OtError> {
        let mut result = base.clone();
        for (key, change) in &self.changes {
            if result.get(key) != change.old.as_ref() {
                return Err(OtError::mismatch(format!(
                    "key {key} expected {:?}, found {:?}",
                    change.old,
                    result.get(key)
                )));
            }
            match &change.new {
                Some(value) => result.insert(key.clone(), value.clone()),
                None => result.remove(key),
            };
        }
        Ok(result)
    }

    /// Compose `self` followed by `other`.
    pub fn compose(&self, other: &Self) -> Result<Self, OtError> {
        let mut changes = self.changes.clone();
        for (key, second) in &other.changes {
            match changes.remove(key) {
                Some(first) => {
                    if first.new != second.old {
                        return Err(OtError::compose(format!(
                            "key {key} was set to {:?} but the next edit expects {:?}",
                            first.new, second.old
                        )));
                    }
                    let merged = MapChange::new(first.old, second.new.clone());
                    if !merged.is_noop() {
                        changes.insert(key.clone(), merged);
                    }
                }
                None => {
                    changes.insert(key.clone(), second.clone());
                }
            }
        }
        Ok(Self { changes })
    }

    /// Transform two concurrent edits of the same map.
    ///
    /// When both sides write the same key, the side chosen by [`TIE_BREAK`]
    /// keeps its value and the other side's write is dropped.
    pub fn transform(&self, other: &Self) -> Result<(Self, Self), OtError> {
        let mut left = Self::new();
        let mut right = Self::new();

        for (key, change) in &self.changes {
            if !other.changes.contains_key(key) {
                left.changes.insert(key.clone(), change.clone());
            }
        }
        for (key, change) in &other.changes {
            let Some(mine) = self.changes.get(key) else {
                right.changes.insert(key.clone(), change.clone());
                continue;
            };
            if mine.old != change.old {
                return Err(OtError::transform(format!(
                    "key {key} edited from {:?} and {:?}",
                    mine.old, change.old
                )));
            }
            if mine.new == change.new {
                continue;
            }
            match TIE_BREAK {
                Side::Left => {
                    left.changes.insert(
                        key.clone(),
                        MapChange::new(change.new.clone(), mine.new.clone()),
                    );
                }
                Side::Right => {
                    right.changes.insert(
                        key.clone(),
                        MapChange::new(mine.new.clone(), change.new.clone()),
                    );
                }
            }
        }
        Ok((left, right))
    }
}
