// rust/ckpt-client/src/protocol.rs

//! Wire format of the checkpoint service protocol.
//!
//! Every message is a fixed header followed by a kind-specific body. All
//! integers are little-endian.
//!
//! ## Frame Layout
//!
//! ```text
//! request                          response / notification
//! +----------------------+         +----------------------+
//! | size   u32           |         | size   u32           |
//! | kind   u32           |         | kind   u32           |
//! +----------------------+         | status u32           |
//! | fixed body           |         +----------------------+
//! +----------------------+         | fixed body           |
//! | identifier segment   |         +----------------------+
//! | data segment         |         | trailing segment     |
//! +----------------------+         +----------------------+
//! ```
//!
//! `size` counts the whole frame, header and trailing segments included.
//! Segment lengths are also carried as fields of the fixed body; on receive
//! the trailing length is `size - header - fixed body`.
//!
//! A checkpoint name occupies [`NAME_SIZE`] bytes: a `u16` length followed
//! by a zero-padded 256 byte field.

use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{CkptError, Result, Status};
use crate::types::{
    CheckpointDescriptor, CheckpointName, CreationAttributes, Invocation, Nanos, OpenFlags,
    SectionState, SectionsChosen,
};

/// Request header size in bytes (size + kind).
pub const REQUEST_HEADER_SIZE: usize = 8;

/// Response and notification header size in bytes (size + kind + status).
pub const RESPONSE_HEADER_SIZE: usize = 12;

/// Encoded size of a checkpoint name.
pub const NAME_SIZE: usize = 2 + CheckpointName::MAX_LEN;

/// Encoded size of [`CreationAttributes`].
pub const CREATION_ATTRIBUTES_SIZE: usize = 40;

/// Message kinds. Requests and their responses share a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Open,
    OpenAsync,
    Close,
    Unlink,
    RetentionDurationSet,
    ActiveReplicaSet,
    StatusGet,
    SectionCreate,
    SectionDelete,
    SectionExpirationTimeSet,
    SectionWrite,
    SectionOverwrite,
    SectionRead,
    Synchronize,
    /// Reserved. `checkpoint_synchronize_async` completes locally and never
    /// sends it; the slot keeps the numbering of the kinds after it.
    SynchronizeAsync,
    IterationInitialize,
    IterationNext,
}

impl MessageKind {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Open => 0,
            Self::OpenAsync => 1,
            Self::Close => 2,
            Self::Unlink => 3,
            Self::RetentionDurationSet => 4,
            Self::ActiveReplicaSet => 5,
            Self::StatusGet => 6,
            Self::SectionCreate => 7,
            Self::SectionDelete => 8,
            Self::SectionExpirationTimeSet => 9,
            Self::SectionWrite => 10,
            Self::SectionOverwrite => 11,
            Self::SectionRead => 12,
            Self::Synchronize => 13,
            Self::SynchronizeAsync => 14,
            Self::IterationInitialize => 15,
            Self::IterationNext => 16,
        }
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Open,
            1 => Self::OpenAsync,
            2 => Self::Close,
            3 => Self::Unlink,
            4 => Self::RetentionDurationSet,
            5 => Self::ActiveReplicaSet,
            6 => Self::StatusGet,
            7 => Self::SectionCreate,
            8 => Self::SectionDelete,
            9 => Self::SectionExpirationTimeSet,
            10 => Self::SectionWrite,
            11 => Self::SectionOverwrite,
            12 => Self::SectionRead,
            13 => Self::Synchronize,
            14 => Self::SynchronizeAsync,
            15 => Self::IterationInitialize,
            16 => Self::IterationNext,
            _ => return None,
        })
    }
}

/// Kinds pushed by the server on the dispatch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// An asynchronous open finished.
    OpenCompleted,
    Unknown(u32),
}

impl NotificationKind {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::OpenCompleted => MessageKind::OpenAsync.to_u32(),
            Self::Unknown(v) => v,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        if value == MessageKind::OpenAsync.to_u32() {
            Self::OpenCompleted
        } else {
            Self::Unknown(value)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub size: u32,
    pub kind: u32,
}

impl RequestHeader {
    pub fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.size);
        buf.put_u32_le(self.kind);
    }

    pub fn from_bytes(bytes: &[u8; REQUEST_HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            size: buf.get_u32_le(),
            kind: buf.get_u32_le(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub size: u32,
    pub kind: u32,
    pub status: Status,
}

impl ResponseHeader {
    pub fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.size);
        buf.put_u32_le(self.kind);
        buf.put_u32_le(self.status.to_u32());
    }

    pub fn from_bytes(bytes: &[u8; RESPONSE_HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            size: buf.get_u32_le(),
            kind: buf.get_u32_le(),
            status: Status::from_u32(buf.get_u32_le()),
        }
    }

    /// Bytes following the header.
    pub fn body_len(&self) -> Result<usize> {
        (self.size as usize)
            .checked_sub(RESPONSE_HEADER_SIZE)
            .ok_or_else(|| {
                CkptError::protocol(format!(
                    "frame size {} is smaller than the response header",
                    self.size
                ))
            })
    }
}

/// A fixed-size message body.
pub trait WireBody: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Appends exactly `SIZE` bytes.
    fn put(&self, buf: &mut BytesMut);

    /// Reads from a buffer holding at least `SIZE` bytes.
    fn get(buf: &mut &[u8]) -> Result<Self>;

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(CkptError::protocol(format!(
                "body is {} bytes, expected at least {}",
                bytes.len(),
                Self::SIZE
            )));
        }
        let mut buf = bytes;
        Self::get(&mut buf)
    }
}

/// A request body, tied to its kind and the fixed body of its reply.
pub trait Request: WireBody {
    const KIND: MessageKind;
    type Reply: WireBody;
}

/// Builds the header and fixed body of `request`.
///
/// `trailing_len` is the combined length of the segments sent after the
/// fixed body; it is counted in the header size.
pub fn encode_request<R: Request>(request: &R, trailing_len: usize) -> Result<BytesMut> {
    let size = REQUEST_HEADER_SIZE + R::SIZE + trailing_len;
    let size = u32::try_from(size).map_err(|_| {
        CkptError::invalid_param(format!("request of {size} bytes does not fit a frame"))
    })?;

    let mut buf = BytesMut::with_capacity(REQUEST_HEADER_SIZE + R::SIZE);
    RequestHeader {
        size,
        kind: R::KIND.to_u32(),
    }
    .put(&mut buf);
    request.put(&mut buf);
    debug_assert_eq!(buf.len(), REQUEST_HEADER_SIZE + R::SIZE);
    Ok(buf)
}

/// Builds a complete response or notification frame.
pub fn encode_response<B: WireBody>(kind: u32, status: Status, body: &B, trailing: &[u8]) -> BytesMut {
    let size = RESPONSE_HEADER_SIZE + B::SIZE + trailing.len();
    let mut buf = BytesMut::with_capacity(size);
    ResponseHeader {
        size: size as u32,
        kind,
        status,
    }
    .put(&mut buf);
    body.put(&mut buf);
    buf.put_slice(trailing);
    buf
}

/// Length of an identifier segment as carried in a fixed body.
pub fn segment_len(segment: &[u8], what: &str) -> Result<u32> {
    u32::try_from(segment.len())
        .map_err(|_| CkptError::invalid_param(format!("{what} of {} bytes is too large", segment.len())))
}

fn put_name(buf: &mut BytesMut, name: &CheckpointName) {
    buf.put_u16_le(name.len() as u16);
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, CheckpointName::MAX_LEN - name.len());
}

fn get_name(buf: &mut &[u8]) -> Result<CheckpointName> {
    let len = buf.get_u16_le() as usize;
    let field = &buf[..CheckpointName::MAX_LEN];
    let name = field
        .get(..len)
        .ok_or_else(|| CkptError::protocol(format!("name length {len} exceeds the name field")))
        .and_then(CheckpointName::new);
    buf.advance(CheckpointName::MAX_LEN);
    name
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn put_attributes(buf: &mut BytesMut, attributes: &CreationAttributes) {
    buf.put_u32_le(attributes.creation_flags);
    buf.put_u64_le(attributes.checkpoint_size);
    buf.put_u64_le(duration_to_nanos(attributes.retention_duration));
    buf.put_u32_le(attributes.max_sections);
    buf.put_u64_le(attributes.max_section_size);
    buf.put_u64_le(attributes.max_section_id_size);
}

fn get_attributes(buf: &mut &[u8]) -> CreationAttributes {
    CreationAttributes {
        creation_flags: buf.get_u32_le(),
        checkpoint_size: buf.get_u64_le(),
        retention_duration: Duration::from_nanos(buf.get_u64_le()),
        max_sections: buf.get_u32_le(),
        max_section_size: buf.get_u64_le(),
        max_section_id_size: buf.get_u64_le(),
    }
}

/// Body of a reply with no fields beyond the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack;

impl WireBody for Ack {
    const SIZE: usize = 0;

    fn put(&self, _buf: &mut BytesMut) {}

    fn get(_buf: &mut &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub name: CheckpointName,
    pub attributes: Option<CreationAttributes>,
    pub open_flags: OpenFlags,
}

impl WireBody for OpenRequest {
    const SIZE: usize = NAME_SIZE + 4 + CREATION_ATTRIBUTES_SIZE + 4;

    fn put(&self, buf: &mut BytesMut) {
        put_name(buf, &self.name);
        buf.put_u32_le(u32::from(self.attributes.is_some()));
        put_attributes(buf, &self.attributes.unwrap_or_default());
        buf.put_u32_le(self.open_flags.bits());
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        let name = get_name(buf)?;
        let attributes_set = buf.get_u32_le() != 0;
        let attributes = get_attributes(buf);
        Ok(Self {
            name,
            attributes: attributes_set.then_some(attributes),
            open_flags: OpenFlags::from_bits(buf.get_u32_le()),
        })
    }
}

impl Request for OpenRequest {
    const KIND: MessageKind = MessageKind::Open;
    type Reply = Ack;
}

/// Fire-and-forget open; completion arrives on the dispatch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAsyncRequest {
    pub open: OpenRequest,
    pub invocation: Invocation,
    pub checkpoint_handle: u64,
}

impl WireBody for OpenAsyncRequest {
    const SIZE: usize = OpenRequest::SIZE + 16;

    fn put(&self, buf: &mut BytesMut) {
        self.open.put(buf);
        buf.put_u64_le(self.invocation);
        buf.put_u64_le(self.checkpoint_handle);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            open: OpenRequest::get(buf)?,
            invocation: buf.get_u64_le(),
            checkpoint_handle: buf.get_u64_le(),
        })
    }
}

impl Request for OpenAsyncRequest {
    const KIND: MessageKind = MessageKind::OpenAsync;
    type Reply = Ack;
}

macro_rules! name_request {
    ($(#[$meta:meta])* $name:ident => $kind:ident, $reply:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub name: CheckpointName,
        }

        impl WireBody for $name {
            const SIZE: usize = NAME_SIZE;

            fn put(&self, buf: &mut BytesMut) {
                put_name(buf, &self.name);
            }

            fn get(buf: &mut &[u8]) -> Result<Self> {
                Ok(Self { name: get_name(buf)? })
            }
        }

        impl Request for $name {
            const KIND: MessageKind = MessageKind::$kind;
            type Reply = $reply;
        }
    };
}

name_request!(CloseRequest => Close, Ack);
name_request!(UnlinkRequest => Unlink, Ack);
name_request!(ActiveReplicaSetRequest => ActiveReplicaSet, Ack);
name_request!(
    /// Replied to with a [`CheckpointDescriptor`].
    StatusGetRequest => StatusGet, CheckpointDescriptor
);
name_request!(SynchronizeRequest => Synchronize, Ack);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionDurationSetRequest {
    pub name: CheckpointName,
    pub retention_duration: Duration,
}

impl WireBody for RetentionDurationSetRequest {
    const SIZE: usize = NAME_SIZE + 8;

    fn put(&self, buf: &mut BytesMut) {
        put_name(buf, &self.name);
        buf.put_u64_le(duration_to_nanos(self.retention_duration));
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            name: get_name(buf)?,
            retention_duration: Duration::from_nanos(buf.get_u64_le()),
        })
    }
}

impl Request for RetentionDurationSetRequest {
    const KIND: MessageKind = MessageKind::RetentionDurationSet;
    type Reply = Ack;
}

impl WireBody for CheckpointDescriptor {
    const SIZE: usize = CREATION_ATTRIBUTES_SIZE + 4 + 8;

    fn put(&self, buf: &mut BytesMut) {
        put_attributes(buf, &self.creation_attributes);
        buf.put_u32_le(self.number_of_sections);
        buf.put_u64_le(self.memory_used);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            creation_attributes: get_attributes(buf),
            number_of_sections: buf.get_u32_le(),
            memory_used: buf.get_u64_le(),
        })
    }
}

/// Followed by `[id][initial data]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCreateRequest {
    pub name: CheckpointName,
    pub id_len: u32,
    pub expiration_time: Nanos,
    pub initial_data_size: u64,
}

impl WireBody for SectionCreateRequest {
    const SIZE: usize = NAME_SIZE + 4 + 8 + 8;

    fn put(&self, buf: &mut BytesMut) {
        put_name(buf, &self.name);
        buf.put_u32_le(self.id_len);
        buf.put_i64_le(self.expiration_time);
        buf.put_u64_le(self.initial_data_size);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            name: get_name(buf)?,
            id_len: buf.get_u32_le(),
            expiration_time: buf.get_i64_le(),
            initial_data_size: buf.get_u64_le(),
        })
    }
}

impl Request for SectionCreateRequest {
    const KIND: MessageKind = MessageKind::SectionCreate;
    type Reply = Ack;
}

/// Followed by `[id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDeleteRequest {
    pub name: CheckpointName,
    pub id_len: u32,
}

impl WireBody for SectionDeleteRequest {
    const SIZE: usize = NAME_SIZE + 4;

    fn put(&self, buf: &mut BytesMut) {
        put_name(buf, &self.name);
        buf.put_u32_le(self.id_len);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            name: get_name(buf)?,
            id_len: buf.get_u32_le(),
        })
    }
}

impl Request for SectionDeleteRequest {
    const KIND: MessageKind = MessageKind::SectionDelete;
    type Reply = Ack;
}

/// Followed by `[id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionExpirationTimeSetRequest {
    pub name: CheckpointName,
    pub id_len: u32,
    pub expiration_time: Nanos,
}

impl WireBody for SectionExpirationTimeSetRequest {
    const SIZE: usize = NAME_SIZE + 4 + 8;

    fn put(&self, buf: &mut BytesMut) {
        put_name(buf, &self.name);
        buf.put_u32_le(self.id_len);
        buf.put_i64_le(self.expiration_time);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            name: get_name(buf)?,
            id_len: buf.get_u32_le(),
            expiration_time: buf.get_i64_le(),
        })
    }
}

impl Request for SectionExpirationTimeSetRequest {
    const KIND: MessageKind = MessageKind::SectionExpirationTimeSet;
    type Reply = Ack;
}

/// Followed by `[id][data]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionWriteRequest {
    pub name: CheckpointName,
    pub id_len: u32,
    pub data_offset: u64,
    pub data_size: u64,
}

impl WireBody for SectionWriteRequest {
    const SIZE: usize = NAME_SIZE + 4 + 8 + 8;

    fn put(&self, buf: &mut BytesMut) {
        put_name(buf, &self.name);
        buf.put_u32_le(self.id_len);
        buf.put_u64_le(self.data_offset);
        buf.put_u64_le(self.data_size);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            name: get_name(buf)?,
            id_len: buf.get_u32_le(),
            data_offset: buf.get_u64_le(),
            data_size: buf.get_u64_le(),
        })
    }
}

impl Request for SectionWriteRequest {
    const KIND: MessageKind = MessageKind::SectionWrite;
    type Reply = Ack;
}

/// Followed by `[id][data]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionOverwriteRequest {
    pub name: CheckpointName,
    pub id_len: u32,
    pub data_size: u64,
}

impl WireBody for SectionOverwriteRequest {
    const SIZE: usize = NAME_SIZE + 4 + 8;

    fn put(&self, buf: &mut BytesMut) {
        put_name(buf, &self.name);
        buf.put_u32_le(self.id_len);
        buf.put_u64_le(self.data_size);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            name: get_name(buf)?,
            id_len: buf.get_u32_le(),
            data_size: buf.get_u64_le(),
        })
    }
}

impl Request for SectionOverwriteRequest {
    const KIND: MessageKind = MessageKind::SectionOverwrite;
    type Reply = Ack;
}

/// Followed by `[id]`. Replied to with [`SectionReadReply`] plus the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionReadRequest {
    pub name: CheckpointName,
    pub id_len: u32,
    pub data_offset: u64,
    pub data_size: u64,
}

impl WireBody for SectionReadRequest {
    const SIZE: usize = NAME_SIZE + 4 + 8 + 8;

    fn put(&self, buf: &mut BytesMut) {
        put_name(buf, &self.name);
        buf.put_u32_le(self.id_len);
        buf.put_u64_le(self.data_offset);
        buf.put_u64_le(self.data_size);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            name: get_name(buf)?,
            id_len: buf.get_u32_le(),
            data_offset: buf.get_u64_le(),
            data_size: buf.get_u64_le(),
        })
    }
}

impl Request for SectionReadRequest {
    const KIND: MessageKind = MessageKind::SectionRead;
    type Reply = SectionReadReply;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionReadReply {
    pub data_read: u64,
}

impl WireBody for SectionReadReply {
    const SIZE: usize = 8;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.data_read);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            data_read: buf.get_u64_le(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationInitializeRequest {
    pub name: CheckpointName,
    pub iteration_handle: u64,
    pub sections_chosen: SectionsChosen,
    pub expiration_time: Nanos,
}

impl WireBody for IterationInitializeRequest {
    const SIZE: usize = NAME_SIZE + 8 + 4 + 8;

    fn put(&self, buf: &mut BytesMut) {
        put_name(buf, &self.name);
        buf.put_u64_le(self.iteration_handle);
        buf.put_u32_le(self.sections_chosen.to_u32());
        buf.put_i64_le(self.expiration_time);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        let name = get_name(buf)?;
        let iteration_handle = buf.get_u64_le();
        let chosen = buf.get_u32_le();
        let sections_chosen = SectionsChosen::from_u32(chosen)
            .ok_or_else(|| CkptError::protocol(format!("unknown sections-chosen value {chosen}")))?;
        Ok(Self {
            name,
            iteration_handle,
            sections_chosen,
            expiration_time: buf.get_i64_le(),
        })
    }
}

impl Request for IterationInitializeRequest {
    const KIND: MessageKind = MessageKind::IterationInitialize;
    type Reply = Ack;
}

/// Replied to with [`SectionDescriptorReply`] plus the section id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationNextRequest {
    pub iteration_handle: u64,
}

impl WireBody for IterationNextRequest {
    const SIZE: usize = 8;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.iteration_handle);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            iteration_handle: buf.get_u64_le(),
        })
    }
}

impl Request for IterationNextRequest {
    const KIND: MessageKind = MessageKind::IterationNext;
    type Reply = SectionDescriptorReply;
}

/// Fixed part of a section descriptor; the id follows as a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionDescriptorReply {
    pub id_len: u16,
    pub expiration_time: Nanos,
    pub section_size: u64,
    pub section_state: SectionState,
    pub last_update: Nanos,
}

impl WireBody for SectionDescriptorReply {
    const SIZE: usize = 2 + 8 + 8 + 4 + 8;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.id_len);
        buf.put_i64_le(self.expiration_time);
        buf.put_u64_le(self.section_size);
        buf.put_u32_le(self.section_state.to_u32());
        buf.put_i64_le(self.last_update);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            id_len: buf.get_u16_le(),
            expiration_time: buf.get_i64_le(),
            section_size: buf.get_u64_le(),
            section_state: SectionState::from_u32(buf.get_u32_le()),
            last_update: buf.get_i64_le(),
        })
    }
}

/// Body of an [`NotificationKind::OpenCompleted`] notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenCompletedNotification {
    pub invocation: Invocation,
    pub checkpoint_handle: u64,
}

impl WireBody for OpenCompletedNotification {
    const SIZE: usize = 16;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.invocation);
        buf.put_u64_le(self.checkpoint_handle);
    }

    fn get(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            invocation: buf.get_u64_le(),
            checkpoint_handle: buf.get_u64_le(),
        })
    }
}
