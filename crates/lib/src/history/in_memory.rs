//! In-memory history implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeBounds;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::{History, HistoryError, HistoryIter, HistoryRole};
use crate::Result;
use crate::ot::Operation;
use crate::tagged::TaggedUserOperation;

#[derive(Debug, Default)]
struct Log {
    operations: BTreeMap<u64, TaggedUserOperation>,
    whole_state_ids: BTreeSet<u64>,
}

impl Log {
    fn put(&mut self, op: TaggedUserOperation, whole_state: bool) {
        let id = op.history_id();
        self.operations.insert(id, op);
        if whole_state {
            self.whole_state_ids.insert(id);
        } else {
            self.whole_state_ids.remove(&id);
        }
    }

    fn truncate_after(&mut self, id: u64) {
        let _ = self.operations.split_off(&(id + 1));
        let _ = self.whole_state_ids.split_off(&(id + 1));
    }

    fn range(&self, range: impl RangeBounds<u64>) -> HistoryIter {
        HistoryIter::new(self.operations.range(range).map(|(_, op)| op.clone()).collect())
    }
}

/// A history kept in a `BTreeMap` behind a `RwLock`.
///
/// Suitable for servers that do not need durability and for every client
/// mirror. The log always holds at least its initial snapshot.
#[derive(Debug)]
pub struct InMemoryHistory {
    role: HistoryRole,
    log: RwLock<Log>,
}

impl InMemoryHistory {
    /// Create a history whose first entry is the whole-state `initial`.
    pub fn new(initial: TaggedUserOperation, role: HistoryRole) -> Self {
        let mut log = Log::default();
        log.put(initial, true);
        Self {
            role,
            log: RwLock::new(log),
        }
    }

    /// Create a history starting at id 1 with `initial` as its snapshot.
    pub fn with_initial(initial: Operation, role: HistoryRole) -> Self {
        Self::new(TaggedUserOperation::new(1, "", initial, None), role)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Log>> {
        Ok(self.log.read().map_err(|_| HistoryError::Poisoned)?)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Log>> {
        Ok(self.log.write().map_err(|_| HistoryError::Poisoned)?)
    }
}

impl History for InMemoryHistory {
    fn role(&self) -> HistoryRole {
        self.role
    }

    fn store(&self, op: TaggedUserOperation, whole_state: bool) -> Result<TaggedUserOperation> {
        let mut log = self.write()?;
        let stored = match self.role {
            HistoryRole::Authoritative => {
                let next = log.operations.keys().next_back().map_or(1, |id| id + 1);
                op.with_history_id(next)
            }
            HistoryRole::PassThrough => {
                if whole_state {
                    log.truncate_after(op.history_id());
                }
                op
            }
        };
        debug!(
            history_id = stored.history_id(),
            token = stored.token(),
            whole_state,
            "Stored operation"
        );
        log.put(stored.clone(), whole_state);
        Ok(stored)
    }

    fn reset_operations_to(&self, op: TaggedUserOperation) -> Result<()> {
        let mut log = self.write()?;
        debug!(history_id = op.history_id(), "Resetting history");
        *log = Log::default();
        log.put(op, true);
        Ok(())
    }

    fn latest(&self) -> Result<u64> {
        let log = self.read()?;
        Ok(*log.operations.keys().next_back().ok_or(HistoryError::Empty)?)
    }

    fn latest_whole_state_version(&self) -> Result<u64> {
        let log = self.read()?;
        Ok(*log.whole_state_ids.iter().next_back().ok_or(HistoryError::Empty)?)
    }

    fn latest_user_operation(&self) -> Result<TaggedUserOperation> {
        let log = self.read()?;
        let (_, op) = log
            .operations
            .iter()
            .next_back()
            .ok_or(HistoryError::Empty)?;
        Ok(op.clone())
    }

    fn get(&self, history_id: u64) -> Result<TaggedUserOperation> {
        let log = self.read()?;
        let op = log
            .operations
            .get(&history_id)
            .ok_or(HistoryError::VersionNotFound { id: history_id })?;
        Ok(op.clone())
    }

    fn is_whole_state(&self, history_id: u64) -> Result<bool> {
        let log = self.read()?;
        if !log.operations.contains_key(&history_id) {
            return Err(HistoryError::VersionNotFound { id: history_id }.into());
        }
        Ok(log.whole_state_ids.contains(&history_id))
    }

    fn between(&self, start: u64, end: u64) -> Result<HistoryIter> {
        if start >= end {
            return Ok(HistoryIter::new(Vec::new()));
        }
        Ok(self.read()?.range(start..end))
    }

    fn from(&self, history_id: u64) -> Result<HistoryIter> {
        Ok(self.read()?.range(history_id..))
    }

    fn until(&self, history_id: u64) -> Result<HistoryIter> {
        Ok(self.read()?.range(..history_id))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.operations.len())
    }
}
