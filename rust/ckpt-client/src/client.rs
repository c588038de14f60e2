// rust/ckpt-client/src/client.rs

//! Client context and library/checkpoint lifecycle operations.
//!
//! A [`CkptClient`] owns one set of handle registries and a connector.
//! Clones share both, so a clone can be moved to a dispatch thread or into
//! a callback.

use std::fmt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::dispatch::{Callbacks, DispatchState};
use crate::error::{CkptError, Result};
use crate::gateway;
use crate::handle::{CheckpointHandle, LibraryHandle};
use crate::instance::{CheckpointInstance, LibraryInstance, Registries};
use crate::protocol::{
    ActiveReplicaSetRequest, CloseRequest, OpenAsyncRequest, OpenRequest,
    RetentionDurationSetRequest, StatusGetRequest, UnlinkRequest,
};
use crate::retry::RetryConfig;
use crate::transport::{Channel, ServiceConnector, UnixSocketConnector};
use crate::types::{
    CheckpointDescriptor, CheckpointName, CreationAttributes, Invocation, OpenFlags, Version,
};

/// Interface versions this client speaks.
pub const SUPPORTED_VERSIONS: [Version; 1] = [Version::new(b'B', 1, 1)];

/// Picks the supported version for `requested`.
///
/// The release code must match and the requested major version must not be
/// newer than the supported one.
pub fn negotiate_version(requested: Version) -> Result<Version> {
    SUPPORTED_VERSIONS
        .iter()
        .find(|supported| {
            supported.release_code == requested.release_code && requested.major <= supported.major
        })
        .copied()
        .ok_or(CkptError::VersionMismatch {
            requested,
            supported: SUPPORTED_VERSIONS[SUPPORTED_VERSIONS.len() - 1],
        })
}

fn validate_open(attributes: Option<&CreationAttributes>, flags: OpenFlags) -> Result<()> {
    match (flags.contains(OpenFlags::CREATE), attributes.is_some()) {
        (true, false) => Err(CkptError::invalid_param(
            "creation attributes are required when opening with the create flag",
        )),
        (false, true) => Err(CkptError::invalid_param(
            "creation attributes are only accepted with the create flag",
        )),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct CkptClient {
    config: Arc<ClientConfig>,
    registries: Registries,
    connector: Arc<dyn ServiceConnector>,
}

impl fmt::Debug for CkptClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CkptClient")
            .field("config", &self.config)
            .field("registries", &self.registries)
            .finish_non_exhaustive()
    }
}

impl CkptClient {
    /// Creates a client connecting to the configured Unix socket.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let connector = Arc::new(UnixSocketConnector::from_config(&config.service));
        Self::with_connector(config, connector)
    }

    /// Creates a client that establishes channels through `connector`.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn ServiceConnector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            registries: Registries::new(),
            connector,
        })
    }

    /// Loads a TOML config file, applies `CKPT_*` overrides, and creates a client.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(ClientConfig::from_file(path)?.with_env_overrides())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.config.transport)
    }

    /// Creates a library instance and connects its two channels.
    ///
    /// Returns the handle and the negotiated interface version.
    pub fn initialize(
        &self,
        callbacks: Option<Callbacks>,
        version: Version,
    ) -> Result<(LibraryHandle, Version)> {
        let negotiated = negotiate_version(version)?;

        let service = &self.config.service.service_name;
        let pair = self.connector.connect(service).map_err(|e| {
            CkptError::transport_with_source(format!("failed to connect to service {service}"), e)
        })?;

        let retry = self.retry_config();
        let instance = LibraryInstance::new(
            Channel::new(pair.response, retry.clone()),
            Channel::new(pair.dispatch, retry),
            negotiated,
            callbacks.unwrap_or_default(),
        );
        let handle = LibraryHandle::from(self.registries.libraries.create(instance)?);

        tracing::info!(library = %handle, version = %negotiated, "checkpoint library initialized");
        Ok((handle, negotiated))
    }

    /// Descriptor that becomes readable when notifications are queued.
    pub fn selection_object_get(&self, library: LibraryHandle) -> Result<RawFd> {
        let instance = self.registries.libraries.get(library)?;
        Ok(instance.dispatch.as_raw_fd())
    }

    /// Tears down a library instance. Only the first call succeeds.
    ///
    /// Checkpoints opened through the library are released without close
    /// requests; both channels are shut down.
    pub fn finalize(&self, library: LibraryHandle) -> Result<()> {
        let instance = self.registries.libraries.get(library)?;
        let released = instance
            .begin_finalize()
            .ok_or_else(|| CkptError::bad_handle("library", library.as_raw()))?;

        for checkpoint in released
            .checkpoints
            .iter()
            .chain(released.pending_opens.iter())
        {
            // Already gone if closed concurrently
            if let Err(e) = self.registries.checkpoints.destroy(*checkpoint) {
                tracing::debug!(checkpoint = %checkpoint, error = %e, "checkpoint already released");
            }
        }

        self.registries.libraries.destroy(library)?;
        instance.response.close();
        instance.dispatch.close();

        tracing::info!(
            library = %library,
            checkpoints = released.checkpoints.len(),
            pending = released.pending_opens.len(),
            "checkpoint library finalized"
        );
        Ok(())
    }

    /// Checkpoints currently linked to `library`.
    pub fn library_checkpoints(&self, library: LibraryHandle) -> Result<Vec<CheckpointHandle>> {
        Ok(self.registries.libraries.get(library)?.checkpoints())
    }

    pub fn library_dispatch_state(&self, library: LibraryHandle) -> Result<DispatchState> {
        Ok(self.registries.libraries.get(library)?.dispatch_state())
    }

    /// Library a checkpoint was opened through.
    pub fn checkpoint_library(&self, checkpoint: CheckpointHandle) -> Result<LibraryHandle> {
        Ok(self.registries.checkpoints.get(checkpoint)?.library())
    }

    /// Opens (and with [`OpenFlags::CREATE`], creates) a checkpoint.
    ///
    /// `attributes` must be present exactly when the create flag is set.
    /// The timeout is accepted for interface compatibility and not enforced.
    pub fn checkpoint_open(
        &self,
        library: LibraryHandle,
        name: &CheckpointName,
        attributes: Option<&CreationAttributes>,
        flags: OpenFlags,
        _timeout: Duration,
    ) -> Result<CheckpointHandle> {
        validate_open(attributes, flags)?;
        let owner = self.registries.libraries.get(library)?;

        let handle = CheckpointHandle::from(self.registries.checkpoints.create(
            CheckpointInstance::new(Arc::clone(&owner.response), name.clone(), flags, library),
        )?);

        let request = OpenRequest {
            name: name.clone(),
            attributes: attributes.copied(),
            open_flags: flags,
        };
        let opened = self.with_checkpoint(handle, |checkpoint| {
            gateway::call_status(&checkpoint.response, &request, &[], "checkpoint open")
        });
        if let Err(e) = opened {
            let _ = self.registries.checkpoints.destroy(handle);
            return Err(e);
        }

        if !owner.link_checkpoint(handle) {
            let _ = self.registries.checkpoints.destroy(handle);
            return Err(CkptError::bad_handle("library", library.as_raw()));
        }

        tracing::debug!(checkpoint = %handle, name = %name, "checkpoint opened");
        Ok(handle)
    }

    /// Starts an open whose outcome is delivered to the open callback.
    ///
    /// Validation and transport failures are returned here; a failure
    /// reported by the service only reaches the callback.
    pub fn checkpoint_open_async(
        &self,
        library: LibraryHandle,
        invocation: Invocation,
        name: &CheckpointName,
        attributes: Option<&CreationAttributes>,
        flags: OpenFlags,
    ) -> Result<()> {
        validate_open(attributes, flags)?;
        let owner = self.registries.libraries.get(library)?;

        let handle = CheckpointHandle::from(self.registries.checkpoints.create(
            CheckpointInstance::new(Arc::clone(&owner.response), name.clone(), flags, library),
        )?);
        if !owner.track_pending(handle) {
            let _ = self.registries.checkpoints.destroy(handle);
            return Err(CkptError::bad_handle("library", library.as_raw()));
        }

        let request = OpenAsyncRequest {
            open: OpenRequest {
                name: name.clone(),
                attributes: attributes.copied(),
                open_flags: flags,
            },
            invocation,
            checkpoint_handle: handle.as_raw(),
        };
        let sent = self.with_checkpoint(handle, |checkpoint| {
            gateway::send_only(&checkpoint.response, &request)
        });
        if let Err(e) = sent {
            owner.forget_pending(handle);
            let _ = self.registries.checkpoints.destroy(handle);
            return Err(e);
        }
        Ok(())
    }

    /// Closes a checkpoint.
    ///
    /// Once the exchange completes the handle is released regardless of
    /// the status the service reported; a non-OK status is only logged.
    pub fn checkpoint_close(&self, checkpoint: CheckpointHandle) -> Result<()> {
        let library = self.with_checkpoint(checkpoint, |instance| {
            let request = CloseRequest {
                name: instance.name.clone(),
            };
            let reply = gateway::call(&instance.response, &request, &[])?;
            if !reply.status.is_ok() {
                tracing::warn!(
                    checkpoint = %checkpoint,
                    status = %reply.status,
                    "discarding close status reported by service"
                );
            }
            Ok(instance.library)
        })?;

        if let Ok(owner) = self.registries.libraries.get(library) {
            owner.unlink_checkpoint(checkpoint);
        }
        self.registries.checkpoints.destroy(checkpoint)
    }

    /// Removes a checkpoint name from the cluster. Open handles stay usable.
    pub fn checkpoint_unlink(&self, library: LibraryHandle, name: &CheckpointName) -> Result<()> {
        let owner = self.registries.libraries.get(library)?;
        let request = UnlinkRequest { name: name.clone() };
        gateway::call_status(&owner.response, &request, &[], "checkpoint unlink")
    }

    pub fn checkpoint_retention_duration_set(
        &self,
        checkpoint: CheckpointHandle,
        retention_duration: Duration,
    ) -> Result<()> {
        self.with_checkpoint(checkpoint, |instance| {
            let request = RetentionDurationSetRequest {
                name: instance.name.clone(),
                retention_duration,
            };
            gateway::call_status(&instance.response, &request, &[], "retention duration set")
        })
    }

    /// Makes the local replica the active one. Requires write access.
    pub fn active_replica_set(&self, checkpoint: CheckpointHandle) -> Result<()> {
        self.with_checkpoint(checkpoint, |instance| {
            instance.require_write("active replica set")?;
            let request = ActiveReplicaSetRequest {
                name: instance.name.clone(),
            };
            gateway::call_status(&instance.response, &request, &[], "active replica set")
        })
    }

    pub fn checkpoint_status_get(&self, checkpoint: CheckpointHandle) -> Result<CheckpointDescriptor> {
        self.with_checkpoint(checkpoint, |instance| {
            let request = StatusGetRequest {
                name: instance.name.clone(),
            };
            let reply = gateway::call(&instance.response, &request, &[])?;
            reply.status.into_result("checkpoint status get")?;
            Ok(reply.body)
        })
    }

    /// Runs `operation` on a checkpoint with its request mutex held.
    pub(crate) fn with_checkpoint<T>(
        &self,
        checkpoint: CheckpointHandle,
        operation: impl FnOnce(&CheckpointInstance) -> Result<T>,
    ) -> Result<T> {
        let instance = self.registries.checkpoints.get(checkpoint)?;
        let _requests = instance.lock_requests();
        operation(&instance)
    }
}
