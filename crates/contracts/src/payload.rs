//! Message payloads carried by posted work
//!
//! Small payloads are copied inline into a fixed buffer so posting them never
//! touches the allocator. Larger payloads travel as reference-counted `Bytes`.

use std::fmt;

use bytes::Bytes;

use crate::ContractError;

/// Event code delivered alongside a payload
pub type EventCode = i32;

/// Capacity of the inline payload buffer in bytes
pub const INLINE_PAYLOAD_CAPACITY: usize = 64;

/// Fixed-size inline payload storage
#[derive(Clone, Copy)]
pub struct InlinePayload {
    len: u8,
    buf: [u8; INLINE_PAYLOAD_CAPACITY],
}

impl InlinePayload {
    /// Copy `data` into a new inline buffer
    pub fn new(data: &[u8]) -> Result<Self, ContractError> {
        if data.len() > INLINE_PAYLOAD_CAPACITY {
            return Err(ContractError::payload_too_large(
                data.len(),
                INLINE_PAYLOAD_CAPACITY,
            ));
        }
        let mut buf = [0u8; INLINE_PAYLOAD_CAPACITY];
        buf[..data.len()].copy_from_slice(data);
        Ok(Self {
            len: data.len() as u8,
            buf,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }
}

impl fmt::Debug for InlinePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlinePayload")
            .field("len", &self.len)
            .finish()
    }
}

/// Payload of a message or work item
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// No data, only the event code matters
    #[default]
    Empty,
    /// Bytes copied by value
    Inline(InlinePayload),
    /// Shared buffer passed by reference
    Shared(Bytes),
}

impl Payload {
    /// Copy `data` inline. Fails when it exceeds [`INLINE_PAYLOAD_CAPACITY`].
    pub fn inline(data: &[u8]) -> Result<Self, ContractError> {
        InlinePayload::new(data).map(Payload::Inline)
    }

    /// Wrap a shared buffer without copying
    pub fn shared(data: impl Into<Bytes>) -> Self {
        Payload::Shared(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Empty => &[],
            Payload::Inline(inline) => inline.as_bytes(),
            Payload::Shared(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Shared(bytes)
    }
}
