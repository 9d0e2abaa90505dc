//! Error types for editors.

use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    /// The editor was reset before the edit was confirmed.
    #[error("Edit abandoned before it was confirmed")]
    Abandoned,
}

impl From<EditorError> for crate::Error {
    fn from(err: EditorError) -> Self {
        crate::Error::Editor(err)
    }
}
