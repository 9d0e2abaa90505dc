//! Error types for operation histories.

use thiserror::Error;

/// Errors returned by [`History`](super::History) implementations.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    /// No operation is stored under the requested id.
    #[error("History version not found: {id}")]
    VersionNotFound { id: u64 },

    /// The history holds no operations at all.
    #[error("History is empty")]
    Empty,

    /// A previous writer panicked while holding the history lock.
    #[error("History lock poisoned")]
    Poisoned,
}

impl HistoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HistoryError::VersionNotFound { .. } | HistoryError::Empty)
    }
}

impl From<HistoryError> for crate::Error {
    fn from(err: HistoryError) -> Self {
        crate::Error::History(err)
    }
}
