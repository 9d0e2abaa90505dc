//! In-process authority.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use super::{OperationQueue, QueuedOperation, ReceiveOutcome, SyncError, SyncSession, Transport};
use crate::Result;
use crate::config::SyncConfig;
use crate::control::EditorControl;
use crate::history::HistoryRole;
use crate::ot::Operation;
use crate::tagged::{TaggedOperation, TaggedUserOperation};

/// Transport handed to sessions connected to a [`LocalSync`].
struct LocalTransport {
    queue: Arc<OperationQueue>,
    origin: u64,
    user: Option<String>,
}

impl Transport for LocalTransport {
    fn send(&self, op: TaggedOperation) -> Result<()> {
        self.queue.enqueue(QueuedOperation {
            origin: self.origin,
            user: self.user.clone(),
            op,
        });
        Ok(())
    }
}

/// Authority living in the same process as its sessions.
///
/// Sessions created by [`LocalSync::connect`] send into a shared queue.
/// [`LocalSync::flush`] stores each queued operation in the authoritative
/// history and delivers the stored form to every connected session, the
/// sender included, which is how senders learn their edit was confirmed.
pub struct LocalSync {
    control: EditorControl,
    queue: Arc<OperationQueue>,
    sessions: Mutex<Vec<(u64, Arc<SyncSession>)>>,
    next_origin: AtomicU64,
    suspended: AtomicBool,
}

impl std::fmt::Debug for LocalSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSync")
            .field("control", &self.control)
            .field("queued", &self.queue.len())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}

impl LocalSync {
    /// Create an authority whose document starts as `initial`.
    ///
    /// The history is always authoritative, whatever role `config` names.
    pub fn new(initial: Operation, config: SyncConfig) -> Self {
        let config = config.with_role(HistoryRole::Authoritative);
        Self {
            control: EditorControl::in_memory(initial, &config),
            queue: Arc::new(OperationQueue::new()),
            sessions: Mutex::new(Vec::new()),
            next_origin: AtomicU64::new(0),
            suspended: AtomicBool::new(false),
        }
    }

    pub fn control(&self) -> &EditorControl {
        &self.control
    }

    fn sessions(&self) -> MutexGuard<'_, Vec<(u64, Arc<SyncSession>)>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The state a newly connecting participant starts from.
    pub fn catch_up(&self) -> Result<TaggedUserOperation> {
        self.control.latest_user_operation()
    }

    /// Connect a new session seeded with the current catch-up state.
    pub fn connect(&self, config: SyncConfig) -> Result<Arc<SyncSession>> {
        let initial = self.catch_up()?;
        let origin = self.next_origin.fetch_add(1, Ordering::SeqCst);
        let transport = LocalTransport {
            queue: Arc::clone(&self.queue),
            origin,
            user: config.user.clone(),
        };
        let session = Arc::new(SyncSession::new(initial, Arc::new(transport), config));
        self.sessions().push((origin, Arc::clone(&session)));
        info!(origin, "Session connected");
        Ok(session)
    }

    /// Stop delivering to `session`. Its queued operations are still stored.
    pub fn disconnect(&self, session: &Arc<SyncSession>) {
        self.sessions().retain(|(_, s)| !Arc::ptr_eq(s, session));
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Hold queued operations until [`LocalSync::resume`].
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    /// Resume delivery and flush everything queued meanwhile.
    pub fn resume(&self) -> Result<usize> {
        self.suspended.store(false, Ordering::SeqCst);
        self.flush()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Operations waiting to be stored.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Store and deliver queued operations until the queue stays empty.
    ///
    /// Returns the number of operations stored. Delivery may make sessions
    /// send their buffered edits, which are processed in the same call.
    pub fn flush(&self) -> Result<usize> {
        if self.is_suspended() {
            return Ok(0);
        }

        let mut stored_count = 0;
        let mut first_error = None;
        loop {
            let batch = self.queue.drain();
            if batch.is_empty() {
                break;
            }
            for queued in batch {
                let origin = queued.origin;
                match self.control.store(queued.into_user_operation(), false) {
                    Ok(stored) => {
                        stored_count += 1;
                        debug!(history_id = stored.history_id(), origin, "Broadcasting operation");
                        if let Err(err) = self.broadcast(&stored) {
                            first_error.get_or_insert(err);
                        }
                    }
                    Err(err) => {
                        warn!(origin, "Rejected operation: {err}");
                        if let Err(err) = self.resync(origin) {
                            first_error.get_or_insert(err);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(stored_count),
        }
    }

    fn broadcast(&self, stored: &TaggedUserOperation) -> Result<()> {
        let sessions = self.sessions().clone();
        let mut first_error = None;
        for (origin, session) in sessions {
            let outcome = session.on_tagged_operation_received(stored.clone(), false);
            let result = match outcome {
                Ok(ReceiveOutcome::RequestLatest) => self.send_latest(&session),
                Ok(_) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                error!(origin, "Delivery failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Send the latest whole state to the session with `origin`.
    fn resync(&self, origin: u64) -> Result<()> {
        let session = self
            .sessions()
            .iter()
            .find(|(o, _)| *o == origin)
            .map(|(_, s)| Arc::clone(s))
            .ok_or(SyncError::UnknownSession { origin })?;
        self.send_latest(&session)
    }

    fn send_latest(&self, session: &SyncSession) -> Result<()> {
        let latest = self.catch_up()?;
        session.on_tagged_operation_received(latest, true)?;
        Ok(())
    }
}
