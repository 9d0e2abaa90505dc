//! Outgoing transports.
//!
//! A [`Transport`] carries operations from a session to its authority. It
//! must not block: sending happens while the editor holds its lock, so
//! implementations only queue.

use tokio::sync::mpsc;
use tracing::debug;

use super::SyncError;
use crate::Result;
use crate::tagged::{self, TaggedOperation, TaggedUserOperation};

pub trait Transport: Send + Sync {
    fn send(&self, op: TaggedOperation) -> Result<()>;
}

/// Transport that encodes operations as JSON onto an unbounded channel.
///
/// The receiving half is typically drained by a task writing to a socket.
#[derive(Debug, Clone)]
pub struct JsonChannelTransport {
    sender: mpsc::UnboundedSender<String>,
}

impl JsonChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Transport for JsonChannelTransport {
    fn send(&self, op: TaggedOperation) -> Result<()> {
        let message = tagged::to_json(&TaggedUserOperation::from(op))
            .map_err(|e| SyncError::Serialization(e.to_string()))?;
        debug!(bytes = message.len(), "Queueing encoded operation");
        self.sender
            .send(message)
            .map_err(|_| SyncError::NotConnected)?;
        Ok(())
    }
}
