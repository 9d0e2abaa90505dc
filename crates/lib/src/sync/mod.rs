//! Synchronization between editors and an authority.
//!
//! A [`SyncSession`] is one participant's end of a document connection. It
//! owns the participant's [`EditorControl`](crate::control::EditorControl),
//! stores every operation that arrives, and fans the stored form out to its
//! listeners (usually a [`Model`](crate::model::Model)). Outgoing operations
//! leave through the session's outbound handle and a [`Transport`].
//!
//! [`LocalSync`] is an in-process authority for tests and single-process
//! setups: it queues what sessions send and delivers the stored operations to
//! every connected session on [`LocalSync::flush`].

use crate::Result;
use crate::tagged::{TaggedOperation, TaggedUserOperation};

pub mod error;
mod local;
mod queue;
mod session;
mod transport;

pub use error::SyncError;
pub use local::LocalSync;
pub use queue::{OperationQueue, QueuedOperation};
pub use session::{
    FixedArbiter, IncompatibleModelArbiter, Outbound, ReceiveOutcome, Resolution, SyncSession,
};
pub use transport::{JsonChannelTransport, Transport};

/// Destination for operations produced by an editor.
///
/// `send` is called while the editor holds its lock and must only hand the
/// operation over, never wait for the network or call back into the editor.
pub trait OperationSync: Send + Sync {
    fn send(&self, op: TaggedOperation);
}

/// Receives operations after they were stored in a session's history.
pub trait TaggedUserOperationListener: Send + Sync {
    fn on_tagged_user_operation_received(
        &self,
        op: &TaggedUserOperation,
        whole_state: bool,
    ) -> Result<()>;
}
