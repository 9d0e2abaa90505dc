//!
//! Convergent: operational-transformation sync for shared documents.
//! This library keeps replicas of a document consistent while every participant edits it locally.
//!
//! ## Core Concepts
//!
//! * **Operations (`ot::Operation`)**: Edits to maps, lists and strings that can be composed and transformed against concurrent edits.
//! * **Tagged operations (`tagged::TaggedUserOperation`)**: Operations carrying the history version they apply to, a unique token and the author.
//! * **History (`history::History`)**: The ordered log of operations the authority has accepted, with whole-state snapshots.
//! * **Editor control (`control::EditorControl`)**: Rebases incoming operations onto the history head and hands catch-up state to new editors.
//! * **Editors (`editor::Editor`)**: The client state machine that keeps at most one operation in flight and buffers the rest.
//! * **Models (`model::Model`)**: Materialized shared objects (`SharedMap`, `SharedList`, `SharedString`) backed by an editor.
//! * **Sync (`sync::SyncSession`, `sync::LocalSync`)**: Plumbing that moves tagged operations between editors and their authority.

pub mod config;
pub mod control;
pub mod editor;
pub mod history;
pub mod model;
pub mod ot;
pub mod subscription;
pub mod sync;
pub mod tagged;

pub use config::SyncConfig;
pub use model::Model;

/// Result type used throughout the Convergent library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Convergent library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured errors from the operation algebra
    #[error(transparent)]
    Ot(ot::OtError),

    /// Structured errors from the history module
    #[error(transparent)]
    History(history::HistoryError),

    /// Structured errors from editor control
    #[error(transparent)]
    Control(control::ControlError),

    /// Structured errors from the editor module
    #[error(transparent)]
    Editor(editor::EditorError),

    /// Structured errors from the model module
    #[error(transparent)]
    Model(model::ModelError),

    /// Structured errors from the sync module
    #[error(transparent)]
    Sync(sync::SyncError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Serialize(_) => "serialize",
            Error::Ot(_) => "ot",
            Error::History(_) => "history",
            Error::Control(_) => "control",
            Error::Editor(_) => "editor",
            Error::Model(_) => "model",
            Error::Sync(_) => "sync",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::History(history_err) => history_err.is_not_found(),
            Error::Model(model_err) => model_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is a (de)serialization failure.
    pub fn is_serialization_error(&self) -> bool {
        matches!(
            self,
            Error::Serialize(_) | Error::Sync(sync::SyncError::Serialization(_))
        )
    }

    /// Check if an edit was dropped before the authority confirmed it.
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Error::Editor(editor::EditorError::Abandoned))
    }

    /// Check if this error is an operation that does not fit a materialized value.
    pub fn is_structural_mismatch(&self) -> bool {
        match self {
            Error::Ot(ot_err) => ot_err.is_structural_mismatch(),
            _ => false,
        }
    }

    pub fn is_compose_conflict(&self) -> bool {
        match self {
            Error::Ot(ot_err) => ot_err.is_compose_conflict(),
            _ => false,
        }
    }

    pub fn is_transform_conflict(&self) -> bool {
        match self {
            Error::Ot(ot_err) => ot_err.is_transform_conflict(),
            _ => false,
        }
    }

    pub fn is_out_of_bounds(&self) -> bool {
        match self {
            Error::Model(model_err) => model_err.is_out_of_bounds(),
            _ => false,
        }
    }

    /// Check if this error means local and remote state have diverged, so
    /// the participant needs a fresh whole state.
    pub fn is_sync_conflict(&self) -> bool {
        match self {
            Error::Ot(ot_err) => ot_err.is_conflict() || ot_err.is_structural_mismatch(),
            Error::Control(control::ControlError::StaleBase { .. }) => true,
            Error::Model(model::ModelError::KindMismatch { .. }) => true,
            _ => false,
        }
    }

    /// Check if this error is sync transport or arbitration related.
    pub fn is_sync_error(&self) -> bool {
        matches!(self, Error::Sync(_))
    }
}
