// rust/ckpt-client/src/iteration.rs

//! Section iteration cursors.
//!
//! An iteration handle keeps a reference on its checkpoint until finalize,
//! so the checkpoint instance outlives a concurrent close. Section ids
//! returned by `next` share storage with the cursor's retained list and stay
//! valid until the cursor is finalized.

use bytes::Bytes;

use crate::client::CkptClient;
use crate::error::{CkptError, Result};
use crate::gateway::{self, Exchange};
use crate::handle::{CheckpointHandle, IterationHandle};
use crate::instance::SectionIterationInstance;
use crate::protocol::{IterationInitializeRequest, IterationNextRequest};
use crate::types::{Nanos, SectionDescriptor, SectionId, SectionsChosen};

impl CkptClient {
    /// Opens a cursor over the sections of `checkpoint`.
    ///
    /// On any failure the new iteration handle is destroyed again and the
    /// checkpoint reference is released.
    pub fn section_iteration_initialize(
        &self,
        checkpoint: CheckpointHandle,
        sections_chosen: SectionsChosen,
        expiration_time: Nanos,
    ) -> Result<IterationHandle> {
        let iterations = &self.registries().iterations;
        let hold = self.registries().checkpoints.get(checkpoint)?;
        let iteration =
            IterationHandle::from(iterations.create(SectionIterationInstance::new(hold, checkpoint))?);

        let result = iterations.get(iteration).and_then(|instance| {
            let _state = instance.lock_state();
            let request = IterationInitializeRequest {
                name: instance.name.clone(),
                iteration_handle: iteration.as_raw(),
                sections_chosen,
                expiration_time,
            };
            gateway::call_status(
                &instance.response,
                &request,
                &[],
                "section iteration initialize",
            )
        });

        match result {
            Ok(()) => {
                tracing::debug!(%checkpoint, %iteration, ?sections_chosen, "section iteration opened");
                Ok(iteration)
            }
            Err(e) => {
                iterations.destroy(iteration)?;
                Err(e)
            }
        }
    }

    /// Fetches the next section descriptor.
    ///
    /// The end of the iteration is reported as a `NoSections` server status.
    pub fn section_iteration_next(&self, iteration: IterationHandle) -> Result<SectionDescriptor> {
        let instance = self.registries().iterations.get(iteration)?;
        let mut state = instance.lock_state();

        let exchange = Exchange::begin(&instance.response);
        exchange.send(
            &IterationNextRequest {
                iteration_handle: iteration.as_raw(),
            },
            &[],
        )?;
        let reply = exchange.receive::<IterationNextRequest>()?;

        let limit = self.config().limits.max_section_id_len;
        if reply.trailing > limit {
            exchange.discard(reply.trailing)?;
            return Err(CkptError::protocol(format!(
                "section id of {} bytes exceeds the {limit} byte limit",
                reply.trailing
            )));
        }

        let mut id = Vec::new();
        if id.try_reserve_exact(reply.trailing).is_err() {
            exchange.discard(reply.trailing)?;
            return Err(CkptError::no_memory(format!(
                "cannot allocate {} bytes for a section id",
                reply.trailing
            )));
        }
        id.resize(reply.trailing, 0);
        exchange.read_trailing(&mut id)?;
        drop(exchange);

        reply.status.into_result("section iteration next")?;

        let id = Bytes::from(id);
        state.retained.push(id.clone());

        let body = reply.body;
        Ok(SectionDescriptor {
            section_id: SectionId::new(id),
            expiration_time: body.expiration_time,
            section_size: body.section_size,
            section_state: body.section_state,
            last_update: body.last_update,
        })
    }

    /// Releases every retained section id, the checkpoint reference and the
    /// cursor handle.
    pub fn section_iteration_finalize(&self, iteration: IterationHandle) -> Result<()> {
        let instance = self.registries().iterations.get(iteration)?;
        {
            let mut state = instance.lock_state();
            let released = state.retained.len();
            state.retained.clear();
            state.hold = None;
            tracing::debug!(%iteration, released, "section iteration finalized");
        }
        drop(instance);
        self.registries().iterations.destroy(iteration)
    }

    /// Number of section ids the cursor currently retains.
    pub fn iteration_retained_ids(&self, iteration: IterationHandle) -> Result<usize> {
        Ok(self.registries().iterations.get(iteration)?.retained_ids())
    }
}
