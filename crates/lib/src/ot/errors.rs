//! Error types for the operation algebra.
//!
//! Compose and transform conflicts mean two operations cannot be reconciled
//! algebraically and must be surfaced to the synchronization layer. Structural
//! mismatches mean an operation does not fit the value or the object type it
//! is applied to and are normally recovered by resetting the affected object.

use thiserror::Error;

use super::ObjectType;

/// Structured error types for operation algebra failures.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OtError {
    /// Two sequential operations could not be composed.
    #[error("Cannot compose operations: {reason}")]
    ComposeConflict { reason: String },

    /// Two concurrent operations could not be transformed against each other.
    #[error("Cannot transform operations: {reason}")]
    TransformConflict { reason: String },

    /// An operation does not match the content it is applied to.
    #[error("Operation does not match the current value: {reason}")]
    StructuralMismatch { reason: String },

    /// Two updates for the same object disagree about its type.
    #[error("Object type mismatch for '{id}': expected {expected}, found {actual}")]
    TypeMismatch {
        id: String,
        expected: ObjectType,
        actual: ObjectType,
    },

    /// A whole-state operation contained something other than inserts.
    #[error("Invalid whole-state operation: {reason}")]
    InvalidWholeState { reason: String },
}

impl OtError {
    pub(crate) fn compose(reason: impl Into<String>) -> Self {
        OtError::ComposeConflict {
            reason: reason.into(),
        }
    }

    pub(crate) fn transform(reason: impl Into<String>) -> Self {
        OtError::TransformConflict {
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(reason: impl Into<String>) -> Self {
        OtError::StructuralMismatch {
            reason: reason.into(),
        }
    }

    /// Check if this error is a compose conflict
    pub fn is_compose_conflict(&self) -> bool {
        matches!(self, OtError::ComposeConflict { .. })
    }

    /// Check if this error is a transform conflict
    pub fn is_transform_conflict(&self) -> bool {
        matches!(self, OtError::TransformConflict { .. })
    }

    /// Check if this error is an operation that does not fit the value or the
    /// object type it meets, whether applying, composing or transforming
    pub fn is_structural_mismatch(&self) -> bool {
        matches!(
            self,
            OtError::StructuralMismatch { .. }
                | OtError::TypeMismatch { .. }
                | OtError::InvalidWholeState { .. }
        )
    }

    /// Check if this error is two operations disagreeing about an object's type
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, OtError::TypeMismatch { .. })
    }

    /// Check if the error means the history cannot absorb the operation and
    /// fresh state is required.
    pub fn is_conflict(&self) -> bool {
        self.is_compose_conflict() || self.is_transform_conflict()
    }
}

// Conversion from OtError to the main Error type
impl From<OtError> for crate::Error {
    fn from(err: OtError) -> Self {
        crate::Error::Ot(err)
    }
}
