// rust/ckpt-client/src/types.rs

//! Value types exchanged with the checkpoint service.
//!
//! These are the caller-facing shapes of names, flags, attributes and
//! descriptors. Their wire encodings live in [`crate::protocol`].

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{CkptError, Result};

/// Absolute time or duration in nanoseconds, as the service counts time.
pub type Nanos = i64;

/// "Never expires" / "infinite" time value.
pub const TIME_END: Nanos = i64::MAX;

/// Opaque caller token echoed back with an asynchronous completion.
pub type Invocation = u64;

/// Interface version requested by, and negotiated for, a library instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub release_code: u8,
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const fn new(release_code: u8, major: u8, minor: u8) -> Self {
        Self {
            release_code,
            major,
            minor,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}.{:02}",
            char::from(self.release_code),
            self.major,
            self.minor
        )
    }
}

/// Name of a checkpoint, at most [`CheckpointName::MAX_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointName(Vec<u8>);

impl CheckpointName {
    /// Capacity of the name field on the wire.
    pub const MAX_LEN: usize = 256;

    pub fn new(name: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = name.as_ref();
        if bytes.len() > Self::MAX_LEN {
            return Err(CkptError::invalid_param(format!(
                "checkpoint name is {} bytes, limit is {}",
                bytes.len(),
                Self::MAX_LEN
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CheckpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Access mode requested when opening a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const READ: Self = Self(0x1);
    pub const WRITE: Self = Self(0x2);
    pub const CREATE: Self = Self(0x4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Attributes supplied when an open also creates the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreationAttributes {
    pub creation_flags: u32,
    pub checkpoint_size: u64,
    pub retention_duration: Duration,
    pub max_sections: u32,
    pub max_section_size: u64,
    pub max_section_id_size: u64,
}

/// Result of a checkpoint status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointDescriptor {
    pub creation_attributes: CreationAttributes,
    pub number_of_sections: u32,
    pub memory_used: u64,
}

/// Opaque section identifier. The empty id names the default section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SectionId(Bytes);

impl SectionId {
    pub fn new(id: impl Into<Bytes>) -> Self {
        Self(id.into())
    }

    /// The default section of a checkpoint.
    pub fn default_section() -> Self {
        Self(Bytes::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Buffer backing this id. For ids returned by iteration this aliases
    /// the buffer the iterator retains.
    pub fn bytes(&self) -> &Bytes {
        &self.0
    }
}

impl From<&'static str> for SectionId {
    fn from(id: &'static str) -> Self {
        Self(Bytes::from_static(id.as_bytes()))
    }
}

impl From<Vec<u8>> for SectionId {
    fn from(id: Vec<u8>) -> Self {
        Self(Bytes::from(id))
    }
}

/// Attributes of a section being created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCreationAttributes {
    pub section_id: SectionId,
    pub expiration_time: Nanos,
}

/// Which sections an iteration visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionsChosen {
    Forever,
    LeqExpirationTime,
    GeqExpirationTime,
    Corrupted,
    Any,
}

impl SectionsChosen {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Forever => 1,
            Self::LeqExpirationTime => 2,
            Self::GeqExpirationTime => 3,
            Self::Corrupted => 4,
            Self::Any => 5,
        }
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Forever),
            2 => Some(Self::LeqExpirationTime),
            3 => Some(Self::GeqExpirationTime),
            4 => Some(Self::Corrupted),
            5 => Some(Self::Any),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionState {
    #[default]
    Valid,
    Corrupted,
    Unknown(u32),
}

impl SectionState {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Valid => 1,
            Self::Corrupted => 2,
            Self::Unknown(v) => v,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Valid,
            2 => Self::Corrupted,
            other => Self::Unknown(other),
        }
    }
}

/// One section as reported by iteration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionDescriptor {
    pub section_id: SectionId,
    pub expiration_time: Nanos,
    pub section_size: u64,
    pub section_state: SectionState,
    pub last_update: Nanos,
}

/// One element of a vectorized write.
#[derive(Debug, Clone, Copy)]
pub struct WriteElement<'a> {
    pub section_id: &'a SectionId,
    pub data_offset: u64,
    pub data: &'a [u8],
}

/// One element of a vectorized read. `read_size` is filled in on success.
#[derive(Debug)]
pub struct ReadElement<'a> {
    pub section_id: &'a SectionId,
    pub data_offset: u64,
    pub buffer: &'a mut [u8],
    pub read_size: u64,
}

impl<'a> ReadElement<'a> {
    pub fn new(section_id: &'a SectionId, data_offset: u64, buffer: &'a mut [u8]) -> Self {
        Self {
            section_id,
            data_offset,
            buffer,
            read_size: 0,
        }
    }
}
