//! Queue of operations waiting for the authority.
//!
//! Sessions hand their outgoing operations to the queue and return
//! immediately; the authority drains it when it flushes. Each entry remembers
//! which connection sent it so a rejected operation can be answered with a
//! fresh whole state.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::tagged::{TaggedOperation, TaggedUserOperation};

/// An operation together with the connection and user it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOperation {
    pub origin: u64,
    pub user: Option<String>,
    pub op: TaggedOperation,
}

impl QueuedOperation {
    /// The operation as it will be stored, attributed to its user.
    pub fn into_user_operation(self) -> TaggedUserOperation {
        TaggedUserOperation {
            user: self.user,
            ..TaggedUserOperation::from(self.op)
        }
    }
}

/// Thread-safe FIFO of operations pending storage.
#[derive(Debug, Default)]
pub struct OperationQueue {
    entries: Mutex<VecDeque<QueuedOperation>>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, entry: QueuedOperation) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(entry);
    }

    /// Take every queued operation in arrival order.
    pub fn drain(&self) -> Vec<QueuedOperation> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
