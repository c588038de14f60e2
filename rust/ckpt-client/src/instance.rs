// rust/ckpt-client/src/instance.rs

//! Client-side instance blocks and the registries that own them.
//!
//! Ownership runs one way: a [`LibraryInstance`] owns both channels and a
//! list of the checkpoint handles opened through it; a
//! [`CheckpointInstance`] and a [`SectionIterationInstance`] borrow the
//! response channel and refer back to their owner by handle value only.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::dispatch::{Callbacks, DispatchFlags, DispatchState};
use crate::error::{CkptError, Result};
use crate::handle::{lock, CheckpointHandle, HandleRef, HandleTable, LibraryHandle};
use crate::transport::Channel;
use crate::types::{CheckpointName, OpenFlags, Version};

/// Response-path bookkeeping of a library instance.
#[derive(Debug, Default)]
struct Membership {
    finalized: bool,
    checkpoints: Vec<CheckpointHandle>,
    pending_opens: Vec<CheckpointHandle>,
}

/// State the dispatch loop reads under the dispatch mutex.
///
/// Finalize never takes this mutex, so a dispatcher blocked mid-frame
/// cannot keep the channels from being shut down.
#[derive(Debug)]
pub(crate) struct DispatchShared {
    pub callbacks: Callbacks,
}

/// Everything released by the one successful finalize.
#[derive(Debug, Default)]
pub(crate) struct FinalizeSet {
    pub checkpoints: Vec<CheckpointHandle>,
    pub pending_opens: Vec<CheckpointHandle>,
}

/// One initialized client library.
#[derive(Debug)]
pub struct LibraryInstance {
    pub(crate) response: Arc<Channel>,
    pub(crate) dispatch: Arc<Channel>,
    pub(crate) version: Version,
    membership: Mutex<Membership>,
    dispatch_shared: Mutex<DispatchShared>,
    /// Modes of the dispatch calls currently running, oldest first.
    dispatchers: Mutex<Vec<DispatchFlags>>,
}

impl LibraryInstance {
    pub(crate) fn new(
        response: Channel,
        dispatch: Channel,
        version: Version,
        callbacks: Callbacks,
    ) -> Self {
        Self {
            response: Arc::new(response),
            dispatch: Arc::new(dispatch),
            version,
            membership: Mutex::new(Membership::default()),
            dispatch_shared: Mutex::new(DispatchShared { callbacks }),
            dispatchers: Mutex::new(Vec::new()),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn is_finalized(&self) -> bool {
        lock(&self.membership).finalized
    }

    /// Flips the finalize flag. Only the first caller gets the set to release.
    pub(crate) fn begin_finalize(&self) -> Option<FinalizeSet> {
        let released = {
            let mut membership = lock(&self.membership);
            if membership.finalized {
                return None;
            }
            membership.finalized = true;
            FinalizeSet {
                checkpoints: std::mem::take(&mut membership.checkpoints),
                pending_opens: std::mem::take(&mut membership.pending_opens),
            }
        };
        Some(released)
    }

    /// Adds an opened checkpoint. Refused once finalize has started.
    pub(crate) fn link_checkpoint(&self, handle: CheckpointHandle) -> bool {
        let mut membership = lock(&self.membership);
        if membership.finalized {
            return false;
        }
        membership.pending_opens.retain(|pending| *pending != handle);
        membership.checkpoints.push(handle);
        true
    }

    pub(crate) fn unlink_checkpoint(&self, handle: CheckpointHandle) {
        lock(&self.membership)
            .checkpoints
            .retain(|linked| *linked != handle);
    }

    /// Records an async open still waiting for its completion.
    pub(crate) fn track_pending(&self, handle: CheckpointHandle) -> bool {
        let mut membership = lock(&self.membership);
        if membership.finalized {
            return false;
        }
        membership.pending_opens.push(handle);
        true
    }

    pub(crate) fn forget_pending(&self, handle: CheckpointHandle) {
        lock(&self.membership)
            .pending_opens
            .retain(|pending| *pending != handle);
    }

    /// Checkpoints currently linked to this library.
    pub fn checkpoints(&self) -> Vec<CheckpointHandle> {
        lock(&self.membership).checkpoints.clone()
    }

    pub fn pending_opens(&self) -> Vec<CheckpointHandle> {
        lock(&self.membership).pending_opens.clone()
    }

    pub(crate) fn dispatch_shared(&self) -> MutexGuard<'_, DispatchShared> {
        lock(&self.dispatch_shared)
    }

    pub(crate) fn enter_dispatch(&self, flags: DispatchFlags) {
        lock(&self.dispatchers).push(flags);
    }

    pub(crate) fn leave_dispatch(&self, flags: DispatchFlags) {
        let mut dispatchers = lock(&self.dispatchers);
        if let Some(position) = dispatchers.iter().rposition(|running| *running == flags) {
            dispatchers.remove(position);
        }
    }

    /// `Running` while any dispatch call is active, with the mode of the
    /// most recently started one.
    pub fn dispatch_state(&self) -> DispatchState {
        lock(&self.dispatchers)
            .last()
            .map_or(DispatchState::Idle, |flags| DispatchState::Running(*flags))
    }
}

/// One open checkpoint.
#[derive(Debug)]
pub struct CheckpointInstance {
    pub(crate) response: Arc<Channel>,
    pub(crate) name: CheckpointName,
    pub(crate) open_flags: OpenFlags,
    pub(crate) library: LibraryHandle,
    requests: Mutex<()>,
}

impl CheckpointInstance {
    pub(crate) fn new(
        response: Arc<Channel>,
        name: CheckpointName,
        open_flags: OpenFlags,
        library: LibraryHandle,
    ) -> Self {
        Self {
            response,
            name,
            open_flags,
            library,
            requests: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &CheckpointName {
        &self.name
    }

    pub fn open_flags(&self) -> OpenFlags {
        self.open_flags
    }

    pub fn library(&self) -> LibraryHandle {
        self.library
    }

    /// Serializes requests on this checkpoint.
    pub(crate) fn lock_requests(&self) -> MutexGuard<'_, ()> {
        lock(&self.requests)
    }

    pub(crate) fn require_write(&self, operation: &'static str) -> Result<()> {
        if self.open_flags.contains(OpenFlags::WRITE) {
            Ok(())
        } else {
            Err(CkptError::access_denied(operation, "write"))
        }
    }

    pub(crate) fn require_read(&self, operation: &'static str) -> Result<()> {
        if self.open_flags.contains(OpenFlags::READ) {
            Ok(())
        } else {
            Err(CkptError::access_denied(operation, "read"))
        }
    }
}

#[derive(Debug)]
pub(crate) struct IterationState {
    /// Keeps the owning checkpoint alive until finalize.
    pub hold: Option<HandleRef<CheckpointInstance>>,
    /// Section ids handed out by `next`.
    pub retained: Vec<Bytes>,
}

/// One section iteration cursor.
#[derive(Debug)]
pub struct SectionIterationInstance {
    pub(crate) response: Arc<Channel>,
    pub(crate) checkpoint: CheckpointHandle,
    pub(crate) name: CheckpointName,
    state: Mutex<IterationState>,
}

impl SectionIterationInstance {
    pub(crate) fn new(hold: HandleRef<CheckpointInstance>, checkpoint: CheckpointHandle) -> Self {
        Self {
            response: Arc::clone(&hold.response),
            checkpoint,
            name: hold.name.clone(),
            state: Mutex::new(IterationState {
                hold: Some(hold),
                retained: Vec::new(),
            }),
        }
    }

    pub fn checkpoint(&self) -> CheckpointHandle {
        self.checkpoint
    }

    /// Held for a whole request/response exchange on this cursor.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, IterationState> {
        lock(&self.state)
    }

    pub fn retained_ids(&self) -> usize {
        lock(&self.state).retained.len()
    }
}

/// The three handle namespaces of one client context.
#[derive(Debug, Clone)]
pub struct Registries {
    pub libraries: HandleTable<LibraryInstance>,
    pub checkpoints: HandleTable<CheckpointInstance>,
    pub iterations: HandleTable<SectionIterationInstance>,
}

impl Registries {
    pub fn new() -> Self {
        Self {
            libraries: HandleTable::new("library"),
            checkpoints: HandleTable::new("checkpoint"),
            iterations: HandleTable::new("iteration"),
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}
