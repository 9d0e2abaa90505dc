//! Sequence operations for strings and ordered lists.
//!
//! A [`SequenceOp`] is an ordered list of [`Component`]s that walks the base
//! sequence from start to end:
//! - `Retain(n)` keeps the next `n` items
//! - `Insert(s)` inserts `s` at the cursor
//! - `Delete(s)` removes the next items, which must equal `s`
//!
//! Operations are strict: the retained and deleted lengths of an operation
//! must add up to the length of the sequence it is applied to. Deletes carry
//! their content so that applying, composing and transforming can detect a
//! diverged base instead of silently deleting the wrong items.
//!
//! The same algebra serves strings ([`StringOp`], lengths counted in chars)
//! and lists of values ([`ListOp`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::OtError;
use super::value::Value;
use super::{Side, TIE_BREAK};

/// A sequence of items that sequence operations can address by index.
pub trait Sequence: Clone + PartialEq + Default + fmt::Debug {
    /// Number of addressable items.
    fn seq_len(&self) -> usize;

    /// Split into the first `n` items and the remainder.
    fn split(&self, n: usize) -> (Self, Self);

    /// Offset just past `n` items starting at offset `from`. Offsets are in
    /// the sequence's own units (bytes for strings) and saturate at the end.
    fn advance(&self, from: usize, n: usize) -> usize;

    /// Items between two offsets returned by [`Sequence::advance`].
    fn slice(&self, from: usize, to: usize) -> Self;

    /// Append all items of `other`.
    fn extend_with(&mut self, other: Self);

    fn is_seq_empty(&self) -> bool {
        self.seq_len() == 0
    }
}

impl Sequence for String {
    fn seq_len(&self) -> usize {
        self.chars().count()
    }

    fn split(&self, n: usize) -> (Self, Self) {
        let at = self
            .char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(self.len());
        (self[..at].to_string(), self[at..].to_string())
    }

    fn advance(&self, from: usize, n: usize) -> usize {
        self[from..]
            .char_indices()
            .nth(n)
            .map_or(self.len(), |(i, _)| from + i)
    }

    fn slice(&self, from: usize, to: usize) -> Self {
        self[from..to].to_string()
    }

    fn extend_with(&mut self, other: Self) {
        self.push_str(&other);
    }
}

impl Sequence for Vec<Value> {
    fn seq_len(&self) -> usize {
        self.len()
    }

    fn split(&self, n: usize) -> (Self, Self) {
        let at = n.min(self.len());
        (self[..at].to_vec(), self[at..].to_vec())
    }

    fn advance(&self, from: usize, n: usize) -> usize {
        from.saturating_add(n).min(self.len())
    }

    fn slice(&self, from: usize, to: usize) -> Self {
        self[from..to].to_vec()
    }

    fn extend_with(&mut self, other: Self) {
        self.extend(other);
    }
}

/// One step of a sequence operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component<S> {
    Retain(usize),
    Insert(S),
    Delete(S),
}

impl<S: Sequence> Component<S> {
    /// Items of the base sequence consumed by this step.
    pub fn base_len(&self) -> usize {
        match self {
            Component::Retain(n) => *n,
            Component::Insert(_) => 0,
            Component::Delete(s) => s.seq_len(),
        }
    }

    /// Items of the resulting sequence produced by this step.
    pub fn target_len(&self) -> usize {
        match self {
            Component::Retain(n) => *n,
            Component::Insert(s) => s.seq_len(),
            Component::Delete(_) => 0,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Component::Retain(n) => *n == 0,
            Component::Insert(s) | Component::Delete(s) => s.is_seq_empty(),
        }
    }
}

/// An edit of a string or list.
///
/// ```
/// # use convergent::ot::StringOp;
/// let op = StringOp::new().retain(6).delete("World").insert("Cookies");
/// assert_eq!(op.apply(&"Hello World".to_string()).unwrap(), "Hello Cookies");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceOp<S> {
    components: Vec<Component<S>>,
}

/// Operation on a shared string.
pub type StringOp = SequenceOp<String>;

/// Operation on a shared list.
pub type ListOp = SequenceOp<Vec<Value>>;

impl<S: Sequence> Default for SequenceOp<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sequence> SequenceOp<S> {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Build an operation from raw components, normalizing them.
    pub fn from_components(components: impl IntoIterator<Item = Component<S>>) -> Self {
        let mut op = Self::new();
        for component in components {
            op.push(component);
        }
        op
    }

    /// An operation that inserts `content` into an empty sequence.
    pub fn whole(content: S) -> Self {
        Self::new().insert(content)
    }

    pub fn retain(mut self, n: usize) -> Self {
        self.push(Component::Retain(n));
        self
    }

    pub fn insert(mut self, content: impl Into<S>) -> Self {
        self.push(Component::Insert(content.into()));
        self
    }

    pub fn delete(mut self, content: impl Into<S>) -> Self {
        self.push(Component::Delete(content.into()));
        self
    }

    /// Append a component, keeping the operation in canonical form.
    ///
    /// Empty steps are dropped, adjacent steps of the same kind are merged and
    /// an insert directly following a delete is moved in front of it.
    pub fn push(&mut self, component: Component<S>) {
        if component.is_empty() {
            return;
        }
        match component {
            Component::Retain(n) => {
                if let Some(Component::Retain(last)) = self.components.last_mut() {
                    *last += n;
                } else {
                    self.components.push(Component::Retain(n));
                }
            }
            Component::Delete(s) => {
                if let Some(Component::Delete(last)) = self.components.last_mut() {
                    last.extend_with(s);
                } else {
                    self.components.push(Component::Delete(s));
                }
            }
            Component::Insert(s) => {
                let len = self.components.len();
                match self.components.last_mut() {
                    Some(Component::Insert(last)) => last.extend_with(s),
                    Some(Component::Delete(_)) => {
                        if len >= 2
                            && let Component::Insert(prev) = &mut self.components[len - 2]
                        {
                            prev.extend_with(s);
                        } else {
                            self.components.insert(len - 1, Component::Insert(s));
                        }
                    }
                    _ => self.components.push(Component::Insert(s)),
                }
            }
        }
    }

    pub fn components(&self) -> &[Component<S>] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Length of the sequence this operation applies to.
    pub fn base_len(&self) -> usize {
        self.components.iter().map(Component::base_len).sum()
    }

    /// Length of the sequence this operation produces.
    pub fn target_len(&self) -> usize {
        self.components.iter().map(Component::target_len).sum()
    }

    /// True if applying the operation leaves every sequence unchanged.
    pub fn is_noop(&self) -> bool {
        self.components
            .iter()
            .all(|c| matches!(c, Component::Retain(_)))
    }

    /// True if the operation only inserts, i.e. describes a whole value.
    pub fn is_inserts_only(&self) -> bool {
        self.components
            .iter()
            .all(|c| matches!(c, Component::Insert(_)))
    }

    /// The content of a whole-state operation.
    pub fn whole_content(&self) -> Result<S, OtError> {
        let mut content = S::default();
        for component in &self.components {
            match component {
                Component::Insert(s) => content.extend_with(s.clone()),
                other => {
                    return Err(OtError::InvalidWholeState {
                        reason: format!("expected only inserts, found {other:?}"),
                    });
                }
            }
        }
        Ok(content)
    }

    /// Apply this operation to `base`, validating every retain and delete.
    pub fn apply(&self, base: &S) -> Result<S, OtError> {
        let base_len = base.seq_len();
        if self.base_len() != base_len {
            return Err(OtError::mismatch(format!(
                "operation spans {} items but the value has {base_len}",
                self.base_len()
            )));
        }

        let mut result = S::default();
        let mut offset = 0;
        let mut cursor = 0;
        for component in &self.components {
            match component {
                Component::Retain(n) => {
                    let end = base.advance(offset, *n);
                    result.extend_with(base.slice(offset, end));
                    offset = end;
                    cursor += n;
                }
                Component::Insert(s) => result.extend_with(s.clone()),
                Component::Delete(s) => {
                    let len = s.seq_len();
                    let end = base.advance(offset, len);
                    let removed = base.slice(offset, end);
                    if &removed != s {
                        return Err(OtError::mismatch(format!(
                            "expected to delete {s:?} at index {cursor}, found {removed:?}"
                        )));
                    }
                    offset = end;
                    cursor += len;
                }
            }
        }
        Ok(result)
    }

    /// Compose `self` followed by `other` into a single operation.
    pub fn compose(&self, other: &Self) -> Result<Self, OtError> {
        if self.target_len() != other.base_len() {
            return Err(OtError::compose(format!(
                "first operation produces {} items but the second expects {}",
                self.target_len(),
                other.base_len()
            )));
        }

        let mut result = Self::new();
        let mut first = self.components.iter().cloned();
        let mut second = other.components.iter().cloned();
        let mut a = first.next();
        let mut b = second.next();

        loop {
            match (a.take(), b.take()) {
                (None, None) => break,
                // Deletes of the first operation are untouched by the second
                (Some(Component::Delete(d)), rest) => {
                    result.push(Component::Delete(d));
                    a = first.next();
                    b = rest;
                }
                // Inserts of the second operation do not consume anything
                (rest, Some(Component::Insert(s))) => {
                    result.push(Component::Insert(s));
                    a = rest;
                    b = second.next();
                }
                (Some(_), None) | (None, Some(_)) => {
                    return Err(OtError::compose("operations have different lengths"));
                }
                (Some(Component::Retain(n)), Some(Component::Retain(m))) => {
                    let k = n.min(m);
                    result.push(Component::Retain(k));
                    a = remaining_retain(n, k).or_else(|| first.next());
                    b = remaining_retain(m, k).or_else(|| second.next());
                }
                (Some(Component::Retain(n)), Some(Component::Delete(d))) => {
                    let k = n.min(d.seq_len());
                    let (head, tail) = d.split(k);
                    result.push(Component::Delete(head));
                    a = remaining_retain(n, k).or_else(|| first.next());
                    b = remaining(tail, Component::Delete).or_else(|| second.next());
                }
                (Some(Component::Insert(s)), Some(Component::Retain(m))) => {
                    let k = s.seq_len().min(m);
                    let (head, tail) = s.split(k);
                    result.push(Component::Insert(head));
                    a = remaining(tail, Component::Insert).or_else(|| first.next());
                    b = remaining_retain(m, k).or_else(|| second.next());
                }
                (Some(Component::Insert(s)), Some(Component::Delete(d))) => {
                    let k = s.seq_len().min(d.seq_len());
                    let (inserted, s_tail) = s.split(k);
                    let (deleted, d_tail) = d.split(k);
                    if inserted != deleted {
                        return Err(OtError::compose(format!(
                            "deleted {deleted:?} where {inserted:?} was inserted"
                        )));
                    }
                    a = remaining(s_tail, Component::Insert).or_else(|| first.next());
                    b = remaining(d_tail, Component::Delete).or_else(|| second.next());
                }
            }
        }
        Ok(result)
    }

    /// Transform two concurrent operations based on the same sequence.
    ///
    /// Returns `(self', other')` such that applying `other'` after `self`
    /// yields the same sequence as applying `self'` after `other`. Inserts at
    /// the same position are ordered according to [`TIE_BREAK`].
    pub fn transform(&self, other: &Self) -> Result<(Self, Self), OtError> {
        if self.base_len() != other.base_len() {
            return Err(OtError::transform(format!(
                "operations are based on sequences of length {} and {}",
                self.base_len(),
                other.base_len()
            )));
        }

        let mut left = Self::new();
        let mut right = Self::new();
        let mut first = self.components.iter().cloned();
        let mut second = other.components.iter().cloned();
        let mut a = first.next();
        let mut b = second.next();

        loop {
            match (a.take(), b.take()) {
                (None, None) => break,
                (Some(Component::Insert(s)), rest) if TIE_BREAK == Side::Left => {
                    insert_across(s, &mut left, &mut right);
                    a = first.next();
                    b = rest;
                }
                (rest, Some(Component::Insert(s))) => {
                    insert_across(s, &mut right, &mut left);
                    a = rest;
                    b = second.next();
                }
                (Some(Component::Insert(s)), rest) => {
                    insert_across(s, &mut left, &mut right);
                    a = first.next();
                    b = rest;
                }
                (Some(_), None) | (None, Some(_)) => {
                    return Err(OtError::transform("operations have different lengths"));
                }
                (Some(Component::Retain(n)), Some(Component::Retain(m))) => {
                    let k = n.min(m);
                    left.push(Component::Retain(k));
                    right.push(Component::Retain(k));
                    a = remaining_retain(n, k).or_else(|| first.next());
                    b = remaining_retain(m, k).or_else(|| second.next());
                }
                (Some(Component::Delete(d)), Some(Component::Delete(e))) => {
                    let k = d.seq_len().min(e.seq_len());
                    let (d_head, d_tail) = d.split(k);
                    let (e_head, e_tail) = e.split(k);
                    if d_head != e_head {
                        return Err(OtError::transform(format!(
                            "concurrent deletes of {d_head:?} and {e_head:?} at the same position"
                        )));
                    }
                    a = remaining(d_tail, Component::Delete).or_else(|| first.next());
                    b = remaining(e_tail, Component::Delete).or_else(|| second.next());
                }
                (Some(Component::Delete(d)), Some(Component::Retain(m))) => {
                    let k = d.seq_len().min(m);
                    let (head, tail) = d.split(k);
                    left.push(Component::Delete(head));
                    a = remaining(tail, Component::Delete).or_else(|| first.next());
                    b = remaining_retain(m, k).or_else(|| second.next());
                }
                (Some(Component::Retain(n)), Some(Component::Delete(e))) => {
                    let k = e.seq_len().min(n);
                    let (head, tail) = e.split(k);
                    right.push(Component::Delete(head));
                    a = remaining_retain(n, k).or_else(|| first.next());
                    b = remaining(tail, Component::Delete).or_else(|| second.next());
                }
            }
        }
        Ok((left, right))
    }
}

fn insert_across<S: Sequence>(
    content: S,
    inserting: &mut SequenceOp<S>,
    other: &mut SequenceOp<S>,
) {
    other.push(Component::Retain(content.seq_len()));
    inserting.push(Component::Insert(content));
}

fn remaining_retain<S>(n: usize, used: usize) -> Option<Component<S>> {
    (n > used).then(|| Component::Retain(n - used))
}

fn remaining<S: Sequence>(rest: S, wrap: fn(S) -> Component<S>) -> Option<Component<S>> {
    (!rest.is_seq_empty()).then(|| wrap(rest))
}
