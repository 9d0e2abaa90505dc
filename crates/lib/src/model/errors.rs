//! Error types for the shared object model.

use thiserror::Error;

use crate::ot::ObjectType;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// An index was outside the object.
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// No object with this id is known to the model.
    #[error("Unknown object: {id}")]
    UnknownObject { id: String },

    /// The object exists with another type.
    #[error("Object {id} is a {actual}, not a {expected}")]
    KindMismatch {
        id: String,
        expected: ObjectType,
        actual: ObjectType,
    },

    /// Maps cannot hold null values; remove the key instead.
    #[error("Null values cannot be stored in a map (key '{key}')")]
    NullValue { key: String },
}

impl ModelError {
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, ModelError::IndexOutOfBounds { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::UnknownObject { .. })
    }
}

impl From<ModelError> for crate::Error {
    fn from(err: ModelError) -> Self {
        crate::Error::Model(err)
    }
}
