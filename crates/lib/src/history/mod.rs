//! Versioned operation logs.
//!
//! A history maps strictly increasing history ids to the operations stored
//! under them. Some entries are flagged as whole-state snapshots: operations
//! that rebuild the complete document on their own. Snapshots bound how far
//! back a catch-up needs to reach.
//!
//! Two roles exist. An [`HistoryRole::Authoritative`] history (the server side)
//! assigns ids itself, while a [`HistoryRole::PassThrough`] history (a client
//! mirror) stores the id it is given because the authority already chose it.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::tagged::TaggedUserOperation;

pub mod errors;
mod in_memory;

pub use errors::HistoryError;
pub use in_memory::InMemoryHistory;

/// Who assigns history ids on store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryRole {
    /// Stores get the next free id.
    #[default]
    Authoritative,
    /// Stores keep the id carried by the operation.
    PassThrough,
}

/// Forward iterator over a snapshot of a history range.
///
/// The range is copied when the iterator is created, so later stores or
/// resets never show up half-applied.
#[derive(Debug)]
pub struct HistoryIter {
    inner: std::vec::IntoIter<TaggedUserOperation>,
}

impl HistoryIter {
    pub(crate) fn new(ops: Vec<TaggedUserOperation>) -> Self {
        Self {
            inner: ops.into_iter(),
        }
    }
}

impl Iterator for HistoryIter {
    type Item = TaggedUserOperation;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for HistoryIter {}

/// Storage for the operations of one document.
///
/// Implementations must serialize mutations internally; the trait is shared
/// across threads behind an `Arc`.
pub trait History: Send + Sync + std::fmt::Debug {
    fn role(&self) -> HistoryRole;

    /// Store an operation and return it as stored.
    ///
    /// An authoritative history re-stamps the operation with `latest() + 1`;
    /// a pass-through history keeps its id. Whole-state operations are flagged
    /// as snapshots, and in pass-through role also drop every later entry.
    fn store(&self, op: TaggedUserOperation, whole_state: bool) -> Result<TaggedUserOperation>;

    /// Replace the whole log with `op` as a single whole-state snapshot.
    fn reset_operations_to(&self, op: TaggedUserOperation) -> Result<()>;

    /// Highest stored id.
    fn latest(&self) -> Result<u64>;

    /// Highest id flagged as a whole-state snapshot.
    fn latest_whole_state_version(&self) -> Result<u64>;

    /// The operation stored under the highest id.
    fn latest_user_operation(&self) -> Result<TaggedUserOperation>;

    fn get(&self, history_id: u64) -> Result<TaggedUserOperation>;

    fn is_whole_state(&self, history_id: u64) -> Result<bool>;

    /// Operations with ids in `[start, end)`.
    fn between(&self, start: u64, end: u64) -> Result<HistoryIter>;

    /// Operations with ids `>= history_id`.
    fn from(&self, history_id: u64) -> Result<HistoryIter>;

    /// Operations with ids `< history_id`.
    fn until(&self, history_id: u64) -> Result<HistoryIter>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
