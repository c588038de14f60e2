// rust/ckpt-client/src/dispatch.rs

//! Delivery of server-pushed notifications to user callbacks.
//!
//! [`CkptClient::dispatch`] pumps the notification channel of one library
//! instance. Each frame is read while the dispatch mutex is held; the
//! callback table is snapshotted and the mutex released before any callback
//! runs, so callbacks may call back into the client without deadlocking.
//! Finalize never waits for the dispatch mutex; shutting the channel down
//! also ends a read stalled on a partial frame. Callbacks run on the
//! dispatching thread, exactly once per notification, in arrival order.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};

use crate::client::CkptClient;
use crate::error::{CkptError, Result, Status};
use crate::handle::{CheckpointHandle, LibraryHandle};
use crate::instance::LibraryInstance;
use crate::protocol::{
    NotificationKind, OpenCompletedNotification, ResponseHeader, WireBody, RESPONSE_HEADER_SIZE,
};
use crate::transport::Readiness;
use crate::types::Invocation;

/// How long a dispatch call keeps pumping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchFlags {
    /// Deliver exactly one notification, waiting for it if none is queued.
    One,
    /// Deliver everything already queued, then return without blocking.
    All,
    /// Deliver until the library is finalized.
    Blocking,
}

impl DispatchFlags {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::One => 1,
            Self::All => 2,
            Self::Blocking => 3,
        }
    }

    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::All),
            3 => Ok(Self::Blocking),
            other => Err(CkptError::invalid_param(format!(
                "unknown dispatch flags {other}"
            ))),
        }
    }
}

/// Dispatch state of a library instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    Idle,
    Running(DispatchFlags),
}

/// Outcome of an asynchronous open, as delivered to the open callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenCompletion {
    pub invocation: Invocation,
    /// The opened checkpoint, or [`CheckpointHandle::INVALID`] on failure.
    pub checkpoint: CheckpointHandle,
    pub status: Status,
}

impl OpenCompletion {
    pub fn result(&self) -> Result<CheckpointHandle> {
        self.status.into_result("checkpoint open")?;
        Ok(self.checkpoint)
    }
}

pub type OpenCallback = Arc<dyn Fn(OpenCompletion) + Send + Sync>;
pub type SynchronizeCallback = Arc<dyn Fn(Invocation, Status) + Send + Sync>;

/// Callback table registered at initialize. Missing entries are skipped.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub open: Option<OpenCallback>,
    /// Reserved for a synchronize-completed notification. The service
    /// defines none yet and `checkpoint_synchronize_async` completes
    /// locally, so this is currently never invoked.
    pub synchronize: Option<SynchronizeCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_open(mut self, callback: impl Fn(OpenCompletion) + Send + Sync + 'static) -> Self {
        self.open = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_synchronize(
        mut self,
        callback: impl Fn(Invocation, Status) + Send + Sync + 'static,
    ) -> Self {
        self.synchronize = Some(Arc::new(callback));
        self
    }

    /// A table whose open callback forwards completions into a channel.
    pub fn open_channel() -> (Self, Receiver<OpenCompletion>) {
        let (tx, rx) = channel::unbounded();
        let callbacks = Self::new().on_open(move |completion| {
            // Receiver gone means nobody is waiting for completions
            let _ = tx.send(completion);
        });
        (callbacks, rx)
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("open", &self.open.is_some())
            .field("synchronize", &self.synchronize.is_some())
            .finish()
    }
}

struct Notification {
    header: ResponseHeader,
    body: Vec<u8>,
}

/// Counts this call among the library's active dispatchers until dropped.
struct RunningGuard<'a> {
    library: &'a LibraryInstance,
    flags: DispatchFlags,
}

impl<'a> RunningGuard<'a> {
    fn enter(library: &'a LibraryInstance, flags: DispatchFlags) -> Self {
        library.enter_dispatch(flags);
        Self { library, flags }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.library.leave_dispatch(self.flags);
    }
}

impl CkptClient {
    /// Pumps the notification channel of `library` according to `flags`.
    ///
    /// Returns `Ok` once the mode's stop condition is met or finalize has
    /// been observed, and `BadHandle` if the service hung up.
    pub fn dispatch(&self, library: LibraryHandle, flags: DispatchFlags) -> Result<()> {
        let instance = self.registries().libraries.get(library)?;
        let timeout = match flags {
            DispatchFlags::One => Some(Duration::from_millis(
                self.config().dispatch.poll_interval_ms,
            )),
            DispatchFlags::All => Some(Duration::ZERO),
            DispatchFlags::Blocking => None,
        };

        let _running = RunningGuard::enter(&instance, flags);
        loop {
            let readiness = instance.dispatch.poll_readable(timeout)?;

            let shared = instance.dispatch_shared();
            if instance.is_finalized() {
                return Ok(());
            }
            match readiness {
                Readiness::HungUp => {
                    return Err(CkptError::bad_handle("library", library.as_raw()));
                }
                Readiness::Idle if flags == DispatchFlags::All => return Ok(()),
                Readiness::Idle => continue,
                Readiness::Readable => {}
            }

            // Finalize shuts the channel down under a blocked read
            let notification = match self.read_notification(&instance) {
                Ok(notification) => notification,
                Err(_) if instance.is_finalized() => return Ok(()),
                Err(e) => return Err(e),
            };
            let callbacks = shared.callbacks.clone();
            drop(shared);

            if let Some(notification) = notification {
                self.deliver(&instance, &callbacks, notification);
                if flags == DispatchFlags::One {
                    return Ok(());
                }
            }
        }
    }

    /// Reads one frame. Oversized frames are skipped.
    fn read_notification(&self, library: &LibraryInstance) -> Result<Option<Notification>> {
        let mut raw = [0u8; RESPONSE_HEADER_SIZE];
        library.dispatch.recv_exact(&mut raw)?;
        let header = ResponseHeader::from_bytes(&raw);
        let body_len = header.body_len()?;

        let limit = self.config().dispatch.max_message_size;
        if header.size as usize > limit {
            tracing::warn!(
                kind = header.kind,
                size = header.size,
                limit,
                "skipping oversized notification"
            );
            library.dispatch.discard(body_len)?;
            return Ok(None);
        }

        let mut body = vec![0u8; body_len];
        library.dispatch.recv_exact(&mut body)?;
        Ok(Some(Notification { header, body }))
    }

    fn deliver(&self, library: &LibraryInstance, callbacks: &Callbacks, notification: Notification) {
        let Notification { header, body } = notification;
        match NotificationKind::from_u32(header.kind) {
            NotificationKind::OpenCompleted => {
                let completed = match OpenCompletedNotification::decode(&body) {
                    Ok(completed) => completed,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed open completion");
                        return;
                    }
                };
                let completion = self.complete_open(library, completed, header.status);
                if let Some(callback) = &callbacks.open {
                    callback(completion);
                }
            }
            NotificationKind::Unknown(kind) => {
                tracing::warn!(kind, size = header.size, "ignoring unknown notification");
            }
        }
    }

    /// Links or destroys the checkpoint of an async open before its callback runs.
    fn complete_open(
        &self,
        library: &LibraryInstance,
        completed: OpenCompletedNotification,
        status: Status,
    ) -> OpenCompletion {
        let checkpoints = &self.registries().checkpoints;
        let handle = CheckpointHandle::from_raw(completed.checkpoint_handle);
        let failed = |status| OpenCompletion {
            invocation: completed.invocation,
            checkpoint: CheckpointHandle::INVALID,
            status,
        };

        if !checkpoints.is_live(handle) {
            // Finalize releases pending opens; otherwise the handle must exist.
            if !library.is_finalized() {
                debug_assert!(false, "open completion for unknown checkpoint {handle}");
                tracing::error!(checkpoint = %handle, "open completion for unknown checkpoint");
            }
            return failed(Status::BadHandle);
        }

        if status.is_ok() {
            if library.link_checkpoint(handle) {
                tracing::debug!(checkpoint = %handle, invocation = completed.invocation, "async open completed");
                return OpenCompletion {
                    invocation: completed.invocation,
                    checkpoint: handle,
                    status,
                };
            }
            // Finalize won the race
            let _ = checkpoints.destroy(handle);
            return failed(Status::BadHandle);
        }

        library.forget_pending(handle);
        let _ = checkpoints.destroy(handle);
        tracing::debug!(checkpoint = %handle, %status, "async open failed");
        failed(status)
    }
}
