//! Message framing for the local socket protocol.
//!
//! Every message, in both directions, is a fixed 16-byte header followed
//! by the payload:
//!
//! ```text
//! +--------------------+----------------------+------------------+
//! | kind (u64 LE)      | length (u64 LE)      | length bytes     |
//! +--------------------+----------------------+------------------+
//! ```
//!
//! There is no padding and no compression. The payload length is
//! validated against [`MAX_PAYLOAD_SIZE`] before any allocation.
//!
//! A clean end of stream at a frame boundary ends the message stream; an
//! end of stream with a partial frame buffered surfaces as
//! [`WireError::TruncatedFrame`], which callers treat as the peer going
//! away mid-write rather than as a parse error.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{WireError, MAX_PAYLOAD_SIZE};

/// Size in bytes of the fixed message header.
pub const HEADER_LEN: usize = 16;

/// Enumerated message kinds.
///
/// The protocol is closed: both endpoints are shipped together, so an
/// unknown tag means the processes have diverged and is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum MessageKind {
    /// Client submits a task specification for scheduling.
    SubmitTask = 1,
    /// Worker asks for its next task.
    GetTask = 2,
    /// Worker reports completion of its current task. Reserved: the
    /// scheduler acknowledges it without processing a payload.
    TaskDone = 3,
    /// Client announces it is going away.
    DisconnectClient = 4,
    /// Free-form log payload, ignored by the scheduler core.
    LogMessage = 5,
    /// Scheduler assigns a task to a worker. Server to worker only.
    ExecuteTask = 6,
}

impl MessageKind {
    /// Parse a kind from its wire tag.
    #[must_use]
    pub const fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(Self::SubmitTask),
            2 => Some(Self::GetTask),
            3 => Some(Self::TaskDone),
            4 => Some(Self::DisconnectClient),
            5 => Some(Self::LogMessage),
            6 => Some(Self::ExecuteTask),
            _ => None,
        }
    }

    /// Wire tag for this kind.
    #[must_use]
    pub const fn tag(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SubmitTask => "SUBMIT_TASK",
            Self::GetTask => "GET_TASK",
            Self::TaskDone => "TASK_DONE",
            Self::DisconnectClient => "DISCONNECT_CLIENT",
            Self::LogMessage => "LOG_MESSAGE",
            Self::ExecuteTask => "EXECUTE_TASK",
        };
        f.write_str(name)
    }
}

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// What the payload means.
    pub kind: MessageKind,
    /// Payload bytes; may be empty.
    pub payload: Bytes,
}

impl Message {
    /// Build a message from kind and payload.
    #[must_use]
    pub const fn new(kind: MessageKind, payload: Bytes) -> Self {
        Self { kind, payload }
    }

    /// Build a message with an empty payload.
    #[must_use]
    pub const fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            payload: Bytes::new(),
        }
    }
}

/// Codec turning a byte stream into [`Message`]s and back.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl MessageCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = &src[..HEADER_LEN];
        let tag = header.get_u64_le();
        let length = header.get_u64_le();

        if length > MAX_PAYLOAD_SIZE as u64 {
            return Err(WireError::FrameTooLarge {
                size: length as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let length = length as usize;

        let Some(kind) = MessageKind::from_tag(tag) else {
            return Err(WireError::UnknownKind { tag });
        };

        if src.len() < HEADER_LEN + length {
            src.reserve(HEADER_LEN + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(length).freeze();
        Ok(Some(Message { kind, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(WireError::TruncatedFrame {
                buffered: src.len(),
            }),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = WireError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), WireError> {
        if message.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::FrameTooLarge {
                size: message.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        dst.reserve(HEADER_LEN + message.payload.len());
        dst.put_u64_le(message.kind.tag());
        dst.put_u64_le(message.payload.len() as u64);
        dst.put_slice(&message.payload);
        Ok(())
    }
}
