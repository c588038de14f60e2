// rust/ckpt-client/src/lib.rs

//! Cluster Checkpoint Service - Client Runtime
//!
//! This crate lets application processes open named, replicated checkpoints
//! held by a cluster checkpoint service, read and write their sections,
//! iterate over sections, and receive asynchronous completions through a
//! dispatch loop. All communication runs over a pair of local stream
//! channels per initialized library.

pub mod config;
pub mod error;
pub mod retry;

// Re-export commonly used types for convenience
pub use config::ClientConfig;
pub use error::{CkptError, Result, Status};

pub mod handle;
pub mod protocol;
pub mod transport;
pub mod types;
pub use handle::{CheckpointHandle, IterationHandle, LibraryHandle};
pub use types::{
    CheckpointDescriptor, CheckpointName, CreationAttributes, Invocation, Nanos, OpenFlags,
    ReadElement, SectionCreationAttributes, SectionDescriptor, SectionId, SectionState,
    SectionsChosen, Version, WriteElement, TIME_END,
};

mod gateway;
pub mod instance;

pub mod client;
pub mod dispatch;
pub mod iteration;
pub mod section;
pub use client::{negotiate_version, CkptClient, SUPPORTED_VERSIONS};
pub use dispatch::{Callbacks, DispatchFlags, DispatchState, OpenCompletion};

#[cfg(test)]
mod testing;
