//! Serialized access to a history.
//!
//! [`EditorControl`] is the single writer of a [`History`]. Incoming
//! operations may be based on an older version than the current head; the
//! control composes everything stored since that base and transforms the
//! incoming operation over it before storing, so the log only ever contains
//! operations that apply to the version directly before them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Result;
use crate::config::SyncConfig;
use crate::history::{History, InMemoryHistory};
use crate::ot::Operation;
use crate::tagged::TaggedUserOperation;

/// What to do with an operation based on an outdated version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StaleBasePolicy {
    /// Transform the operation over everything stored since its base.
    #[default]
    Transform,
    /// Refuse the operation.
    Reject,
}

/// Errors raised by [`EditorControl`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("Operation based on version {base} but head is {head}")]
    StaleBase { base: u64, head: u64 },
}

impl From<ControlError> for crate::Error {
    fn from(err: ControlError) -> Self {
        crate::Error::Control(err)
    }
}

/// Single writer for a [`History`].
#[derive(Debug)]
pub struct EditorControl {
    history: Arc<dyn History>,
    stale_base: StaleBasePolicy,
    lock: Mutex<()>,
}

/// Holds the control lock; stores made through it are part of one critical
/// section.
pub struct ControlGuard<'a> {
    control: &'a EditorControl,
    _guard: MutexGuard<'a, ()>,
}

impl EditorControl {
    pub fn new(history: Arc<dyn History>, stale_base: StaleBasePolicy) -> Self {
        Self {
            history,
            stale_base,
            lock: Mutex::new(()),
        }
    }

    /// Control over a fresh in-memory history seeded with `initial`.
    pub fn in_memory(initial: Operation, config: &SyncConfig) -> Self {
        let history = InMemoryHistory::with_initial(initial, config.role);
        Self::new(Arc::new(history), config.stale_base)
    }

    pub fn history(&self) -> &Arc<dyn History> {
        &self.history
    }

    /// Acquire the control lock.
    pub fn lock(&self) -> ControlGuard<'_> {
        ControlGuard {
            control: self,
            _guard: self.lock.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Store `op`, transforming it over every operation stored after its base.
    pub fn store(&self, op: TaggedUserOperation, whole_state: bool) -> Result<TaggedUserOperation> {
        self.lock().store(op, whole_state)
    }

    /// The state from the latest snapshot up to the head as one operation.
    pub fn latest_user_operation(&self) -> Result<TaggedUserOperation> {
        self.lock().latest_user_operation()
    }

    pub fn latest_version(&self) -> Result<u64> {
        self.history.latest()
    }

    /// Discard the history and restart it from `op`.
    pub fn set_base_operation(&self, op: TaggedUserOperation) -> Result<()> {
        self.lock().set_base_operation(op)
    }

    fn set_base_operation_locked(&self, op: TaggedUserOperation) -> Result<()> {
        warn!(history_id = op.history_id(), "Replacing history base");
        self.history.reset_operations_to(op)
    }

    fn store_locked(&self, op: TaggedUserOperation, whole_state: bool) -> Result<TaggedUserOperation> {
        if whole_state {
            return self.history.store(op, true);
        }

        let base = op.history_id();
        let mut concurrent: Option<Operation> = None;
        for stored in self.history.from(base.saturating_add(1))? {
            concurrent = Some(match concurrent {
                Some(composed) => composed.compose(stored.operation())?,
                None => stored.operation().clone(),
            });
        }

        let Some(concurrent) = concurrent else {
            return self.history.store(op, false);
        };

        if self.stale_base == StaleBasePolicy::Reject {
            let head = self.history.latest()?;
            return Err(ControlError::StaleBase { base, head }.into());
        }

        let (_, transformed) = concurrent.transform(op.operation())?;
        debug!(base, token = op.token(), "Transformed operation over newer versions");
        self.history.store(op.with_operation(transformed), false)
    }

    fn latest_user_operation_locked(&self) -> Result<TaggedUserOperation> {
        let snapshot = self.history.latest_whole_state_version()?;
        let head = self.history.latest_user_operation()?;

        let mut composed = Operation::new();
        for op in self.history.from(snapshot)? {
            composed = composed.compose(op.operation())?;
        }

        Ok(TaggedUserOperation::new(
            head.history_id(),
            Uuid::new_v4().to_string(),
            composed,
            head.user.clone(),
        ))
    }
}

impl ControlGuard<'_> {
    pub fn store(&self, op: TaggedUserOperation, whole_state: bool) -> Result<TaggedUserOperation> {
        self.control.store_locked(op, whole_state)
    }

    pub fn latest_user_operation(&self) -> Result<TaggedUserOperation> {
        self.control.latest_user_operation_locked()
    }

    pub fn latest_version(&self) -> Result<u64> {
        self.control.history.latest()
    }

    /// Discard the history and restart it from `op`.
    pub fn set_base_operation(&self, op: TaggedUserOperation) -> Result<()> {
        self.control.set_base_operation_locked(op)
    }
}
