//! One participant's end of a document connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use super::{OperationSync, SyncError, TaggedUserOperationListener, Transport};
use crate::config::SyncConfig;
use crate::control::EditorControl;
use crate::history::InMemoryHistory;
use crate::subscription::{Listeners, Subscription};
use crate::tagged::{self, TaggedOperation, TaggedUserOperation};
use crate::{Error, Result};

/// How to settle a whole state that cannot be reconciled with local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Replace the local history with the received state.
    OverwriteLocal,
    /// Push the local state to the authority instead.
    OverwriteRemote,
    /// Keep the local state and stay out of sync.
    Ignore,
}

/// Decides what happens when a received whole state conflicts with local state.
pub trait IncompatibleModelArbiter: Send + Sync {
    fn resolve(&self, remote: &TaggedUserOperation, error: &Error) -> Resolution;
}

/// Arbiter that always answers the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedArbiter(pub Resolution);

impl IncompatibleModelArbiter for FixedArbiter {
    fn resolve(&self, _remote: &TaggedUserOperation, _error: &Error) -> Resolution {
        self.0
    }
}

/// Result of delivering an operation to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Stored and delivered to every listener.
    Delivered,
    /// The delta did not fit; the caller should send the latest whole state.
    RequestLatest,
    /// The whole state conflicted and replaced the local state.
    OverwroteLocal,
    /// The whole state conflicted and was ignored.
    Ignored,
}

/// Editor-facing send handle of a session.
///
/// Forwards to the transport unless the session is out of sync, in which case
/// sends are dropped until a whole state restores synchronization.
pub struct Outbound {
    transport: Arc<dyn Transport>,
    bad_sync: AtomicBool,
}

impl Outbound {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            bad_sync: AtomicBool::new(false),
        }
    }

    pub fn is_bad_sync(&self) -> bool {
        self.bad_sync.load(Ordering::SeqCst)
    }

    fn set_bad_sync(&self, bad: bool) {
        let was = self.bad_sync.swap(bad, Ordering::SeqCst);
        if bad && !was {
            warn!("Synchronization lost, holding back outgoing operations");
        } else if !bad && was {
            info!("Synchronization restored");
        }
    }
}

impl OperationSync for Outbound {
    fn send(&self, op: TaggedOperation) {
        if self.is_bad_sync() {
            warn!(token = %op.token, "Dropping operation while out of sync");
            return;
        }
        if let Err(err) = self.transport.send(op) {
            error!("Failed to send operation: {err}");
        }
    }
}

/// Stores incoming operations and notifies listeners with the stored form.
pub struct SyncSession {
    control: EditorControl,
    listeners: Listeners<dyn TaggedUserOperationListener>,
    outbound: Arc<Outbound>,
    arbiter: Arc<dyn IncompatibleModelArbiter>,
    config: SyncConfig,
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("control", &self.control)
            .field("listeners", &self.listeners)
            .field("bad_sync", &self.is_bad_sync())
            .field("config", &self.config)
            .finish()
    }
}

impl SyncSession {
    /// Create a session whose history starts with the catch-up `initial`.
    pub fn new(initial: TaggedUserOperation, transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        let history = InMemoryHistory::new(initial, config.role);
        Self {
            control: EditorControl::new(Arc::new(history), config.stale_base),
            listeners: Listeners::new(),
            outbound: Arc::new(Outbound::new(transport)),
            arbiter: Arc::new(FixedArbiter(Resolution::OverwriteLocal)),
            config,
        }
    }

    pub fn with_arbiter(mut self, arbiter: Arc<dyn IncompatibleModelArbiter>) -> Self {
        self.arbiter = arbiter;
        self
    }

    pub fn control(&self) -> &EditorControl {
        &self.control
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Send handle for editors attached to this session.
    pub fn outbound(&self) -> Arc<dyn OperationSync> {
        self.outbound.clone()
    }

    pub fn is_bad_sync(&self) -> bool {
        self.outbound.is_bad_sync()
    }

    pub fn subscribe(&self, listener: Arc<dyn TaggedUserOperationListener>) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Catch-up operation for a new editor, carrying a fresh unique token.
    pub fn connect_editor(&self) -> Result<TaggedUserOperation> {
        self.control.latest_user_operation()
    }

    /// Decode a JSON message and deliver it.
    pub fn receive_json(&self, json: &str, whole_state: bool) -> Result<ReceiveOutcome> {
        let op = tagged::from_json(json).map_err(|e| SyncError::Serialization(e.to_string()))?;
        self.on_tagged_operation_received(op, whole_state)
    }

    /// Store `op` and deliver the stored form to every listener.
    pub fn on_tagged_operation_received(
        &self,
        op: TaggedUserOperation,
        whole_state: bool,
    ) -> Result<ReceiveOutcome> {
        let guard = self.control.lock();
        debug!(history_id = op.history_id(), token = op.token(), whole_state, "Received operation");

        let delivered = guard
            .store(op.clone(), whole_state)
            .and_then(|stored| self.notify(&stored, whole_state));

        let err = match delivered {
            Ok(()) => {
                if whole_state {
                    self.outbound.set_bad_sync(false);
                }
                return Ok(ReceiveOutcome::Delivered);
            }
            Err(err) if err.is_sync_conflict() => err,
            Err(err) => return Err(err),
        };

        self.outbound.set_bad_sync(true);
        if !whole_state {
            warn!(history_id = op.history_id(), "Operation does not fit local state: {err}");
            return Ok(ReceiveOutcome::RequestLatest);
        }

        warn!(history_id = op.history_id(), "Whole state incompatible with local state: {err}");
        match self.arbiter.resolve(&op, &err) {
            Resolution::OverwriteLocal => {
                guard.set_base_operation(op.clone())?;
                self.notify(&op, true)?;
                self.outbound.set_bad_sync(false);
                Ok(ReceiveOutcome::OverwroteLocal)
            }
            Resolution::OverwriteRemote => Err(SyncError::OverwriteRemoteUnsupported.into()),
            Resolution::Ignore => Ok(ReceiveOutcome::Ignored),
        }
    }

    /// Call every listener, returning the first failure after all ran.
    fn notify(&self, op: &TaggedUserOperation, whole_state: bool) -> Result<()> {
        let mut first_error = None;
        for listener in self.listeners.snapshot() {
            if let Err(err) = listener.on_tagged_user_operation_received(op, whole_state) {
                if first_error.is_none() {
                    first_error = Some(err);
                } else {
                    error!("Listener failed: {err}");
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
