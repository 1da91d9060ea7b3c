//! Error types for the wire protocol layer.
//!
//! The protocol is closed and versioned by the two co-resident processes
//! that speak it, so errors split into two classes with very different
//! handling:
//!
//! - **Protocol violations** (unknown kind tag, oversized frame,
//!   malformed task encoding): the endpoints have diverged and no safe
//!   recovery is defined. The daemon treats these as fatal.
//! - **Connection conditions** (peer closed, mid-frame end of stream,
//!   transport I/O errors): local to one connection; the daemon cleans
//!   that connection up and keeps serving the rest.

use std::io;

use thiserror::Error;

/// Maximum payload size in bytes (16 MiB).
///
/// Frames declaring a larger payload are rejected before any allocation
/// happens.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Errors produced by the message codec.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame declares a payload larger than [`MAX_PAYLOAD_SIZE`].
    #[error("frame too large: {size} bytes exceeds maximum {max} bytes")]
    FrameTooLarge {
        /// Declared payload size from the frame header.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// Frame header carries a kind tag outside the protocol enumeration.
    #[error("unknown message kind tag {tag:#x}")]
    UnknownKind {
        /// The unrecognized tag value.
        tag: u64,
    },

    /// The stream ended in the middle of a frame.
    ///
    /// This is a connection-closed condition, not a parse error: the
    /// peer went away mid-write. It is distinguished from a malformed
    /// payload, which is a protocol violation.
    #[error("stream ended mid-frame with {buffered} bytes buffered")]
    TruncatedFrame {
        /// Bytes of the incomplete frame left in the read buffer.
        buffered: usize,
    },

    /// Underlying transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl WireError {
    /// Returns `true` if this error means the endpoints have diverged.
    ///
    /// Protocol violations are fatal to the process; the remaining
    /// variants are connection-closed conditions handled by dropping the
    /// one affected connection.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. } | Self::UnknownKind { .. })
    }
}

/// Errors produced when decoding a task specification payload.
///
/// Every variant is a protocol violation: the payload length declared in
/// the frame header did not match the task's self-describing encoding.
#[derive(Debug, Error)]
pub enum TaskCodecError {
    /// The payload ended before the encoding was complete.
    #[error("truncated task specification while reading {context}")]
    Truncated {
        /// Which part of the encoding was being read.
        context: &'static str,
    },

    /// An argument carried a kind tag outside the known enumeration.
    #[error("invalid task argument kind tag {tag:#x}")]
    InvalidArgKind {
        /// The unrecognized tag value.
        tag: u8,
    },

    /// The payload was longer than the encoding it contains.
    #[error("task specification has {extra} trailing bytes")]
    TrailingBytes {
        /// Number of undecoded bytes left over.
        extra: usize,
    },
}
