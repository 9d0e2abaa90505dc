//! Error types for the synchronization module.

use thiserror::Error;

/// Errors that can occur while synchronizing a document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// The arbiter asked to overwrite the remote state, which a session
    /// cannot do on its own.
    #[error("Overwriting the remote state is not supported")]
    OverwriteRemoteUnsupported,

    /// An operation could not be encoded or decoded for the wire.
    #[error("Failed to encode operation: {0}")]
    Serialization(String),

    /// The other end of the transport is gone.
    #[error("Transport is not connected")]
    NotConnected,

    /// The session is not registered with the authority.
    #[error("Unknown session {origin}")]
    UnknownSession { origin: u64 },
}

impl SyncError {
    /// Check if this error means the connection is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, SyncError::NotConnected | SyncError::UnknownSession { .. })
    }

    /// Check if this error came from arbitration.
    pub fn is_arbitration_error(&self) -> bool {
        matches!(self, SyncError::OverwriteRemoteUnsupported)
    }
}

impl From<SyncError> for crate::Error {
    fn from(err: SyncError) -> Self {
        crate::Error::Sync(err)
    }
}
