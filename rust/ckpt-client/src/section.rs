// rust/ckpt-client/src/section.rs

//! Section operations on an open checkpoint.
//!
//! Access is checked against the checkpoint's open flags before anything is
//! sent. Vectorized reads and writes run one exchange per element with the
//! checkpoint mutex held across all of them, and stop at the first element
//! the service rejects.

use std::time::Duration;

use crate::client::CkptClient;
use crate::error::{CkptError, Result, Status};
use crate::gateway::{self, Exchange};
use crate::handle::CheckpointHandle;
use crate::protocol::{
    segment_len, SectionCreateRequest, SectionDeleteRequest, SectionExpirationTimeSetRequest,
    SectionOverwriteRequest, SectionReadRequest, SectionWriteRequest, SynchronizeRequest,
};
use crate::types::{Invocation, Nanos, ReadElement, SectionCreationAttributes, SectionId, WriteElement};

fn id_len(section_id: &SectionId) -> Result<u32> {
    segment_len(section_id.as_bytes(), "section id")
}

fn element_index(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

impl CkptClient {
    /// Creates a section holding `initial_data`.
    pub fn section_create(
        &self,
        checkpoint: CheckpointHandle,
        attributes: &SectionCreationAttributes,
        initial_data: &[u8],
    ) -> Result<()> {
        self.with_checkpoint(checkpoint, |instance| {
            instance.require_write("section create")?;
            let request = SectionCreateRequest {
                name: instance.name.clone(),
                id_len: id_len(&attributes.section_id)?,
                expiration_time: attributes.expiration_time,
                initial_data_size: initial_data.len() as u64,
            };
            gateway::call_status(
                &instance.response,
                &request,
                &[attributes.section_id.as_bytes(), initial_data],
                "section create",
            )
        })
    }

    pub fn section_delete(&self, checkpoint: CheckpointHandle, section_id: &SectionId) -> Result<()> {
        self.with_checkpoint(checkpoint, |instance| {
            instance.require_write("section delete")?;
            let request = SectionDeleteRequest {
                name: instance.name.clone(),
                id_len: id_len(section_id)?,
            };
            gateway::call_status(
                &instance.response,
                &request,
                &[section_id.as_bytes()],
                "section delete",
            )
        })
    }

    pub fn section_expiration_time_set(
        &self,
        checkpoint: CheckpointHandle,
        section_id: &SectionId,
        expiration_time: Nanos,
    ) -> Result<()> {
        self.with_checkpoint(checkpoint, |instance| {
            instance.require_write("section expiration time set")?;
            let request = SectionExpirationTimeSetRequest {
                name: instance.name.clone(),
                id_len: id_len(section_id)?,
                expiration_time,
            };
            gateway::call_status(
                &instance.response,
                &request,
                &[section_id.as_bytes()],
                "section expiration time set",
            )
        })
    }

    /// Replaces the whole content of a section.
    pub fn section_overwrite(
        &self,
        checkpoint: CheckpointHandle,
        section_id: &SectionId,
        data: &[u8],
    ) -> Result<()> {
        self.with_checkpoint(checkpoint, |instance| {
            instance.require_write("section overwrite")?;
            let request = SectionOverwriteRequest {
                name: instance.name.clone(),
                id_len: id_len(section_id)?,
                data_size: data.len() as u64,
            };
            gateway::call_status(
                &instance.response,
                &request,
                &[section_id.as_bytes(), data],
                "section overwrite",
            )
        })
    }

    /// Writes each element in order.
    ///
    /// A rejected element yields [`CkptError::Vector`] with its index and
    /// later elements are not sent. `TRY_AGAIN` is reported without an index.
    pub fn checkpoint_write(
        &self,
        checkpoint: CheckpointHandle,
        elements: &[WriteElement<'_>],
    ) -> Result<()> {
        self.with_checkpoint(checkpoint, |instance| {
            instance.require_write("checkpoint write")?;

            for (index, element) in elements.iter().enumerate() {
                let request = SectionWriteRequest {
                    name: instance.name.clone(),
                    id_len: id_len(element.section_id)?,
                    data_offset: element.data_offset,
                    data_size: element.data.len() as u64,
                };
                let reply = gateway::call(
                    &instance.response,
                    &request,
                    &[element.section_id.as_bytes(), element.data],
                )?;

                match reply.status {
                    Status::Ok => {}
                    Status::TryAgain => {
                        return Err(CkptError::Server {
                            operation: "checkpoint write",
                            status: Status::TryAgain,
                        })
                    }
                    status => {
                        return Err(CkptError::Vector {
                            index: element_index(index),
                            status,
                        })
                    }
                }
            }
            Ok(())
        })
    }

    /// Reads each element into its buffer and records `read_size`.
    ///
    /// Stops at the first element the service rejects, reporting its index.
    pub fn checkpoint_read(
        &self,
        checkpoint: CheckpointHandle,
        elements: &mut [ReadElement<'_>],
    ) -> Result<()> {
        self.with_checkpoint(checkpoint, |instance| {
            instance.require_read("checkpoint read")?;

            for (index, element) in elements.iter_mut().enumerate() {
                let request = SectionReadRequest {
                    name: instance.name.clone(),
                    id_len: id_len(element.section_id)?,
                    data_offset: element.data_offset,
                    data_size: element.buffer.len() as u64,
                };

                let exchange = Exchange::begin(&instance.response);
                exchange.send(&request, &[element.section_id.as_bytes()])?;
                let reply = exchange.receive::<SectionReadRequest>()?;
                if reply.trailing > element.buffer.len() {
                    exchange.discard(reply.trailing)?;
                    return Err(CkptError::protocol(format!(
                        "service returned {} bytes for a {} byte buffer",
                        reply.trailing,
                        element.buffer.len()
                    )));
                }
                exchange.read_trailing(&mut element.buffer[..reply.trailing])?;
                drop(exchange);

                if !reply.status.is_ok() {
                    return Err(CkptError::Vector {
                        index: element_index(index),
                        status: reply.status,
                    });
                }
                element.read_size = reply.body.data_read;
            }
            Ok(())
        })
    }

    /// Waits until every replica holds the active replica's content.
    ///
    /// The timeout is accepted for interface compatibility and not enforced.
    pub fn checkpoint_synchronize(&self, checkpoint: CheckpointHandle, _timeout: Duration) -> Result<()> {
        self.with_checkpoint(checkpoint, |instance| {
            let request = SynchronizeRequest {
                name: instance.name.clone(),
            };
            gateway::call_status(&instance.response, &request, &[], "checkpoint synchronize")
        })
    }

    /// Accepted and reported successful without contacting the service.
    pub fn checkpoint_synchronize_async(
        &self,
        _checkpoint: CheckpointHandle,
        _invocation: Invocation,
    ) -> Result<()> {
        Ok(())
    }
}
