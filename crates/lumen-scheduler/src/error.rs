//! Scheduler daemon error types.
//!
//! Failures split along the lines the protocol demands: anything that
//! means the two endpoints have diverged is fatal to the process, while
//! connection-level trouble is handled in place by dropping the one
//! affected connection and never reaches this type. What does surface
//! here ends the dispatch loop.

use std::io;
use std::path::PathBuf;

use lumen_core::{ClientId, WireError};
use thiserror::Error;

/// Errors that terminate the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A peer sent something the closed protocol can never produce.
    ///
    /// The two processes have diverged; continuing would mean scheduling
    /// in an undefined state.
    #[error("protocol violation on {client}: {reason}")]
    ProtocolViolation {
        /// Connection that produced the violation.
        client: ClientId,
        /// What was wrong.
        reason: String,
    },

    /// The listening socket could not be set up.
    #[error("failed to bind scheduler socket {path}: {source}")]
    Bind {
        /// Requested socket path.
        path: PathBuf,
        /// Underlying cause.
        source: io::Error,
    },

    /// The coordination service could not be reached at startup.
    #[error("failed to connect to coordination service at {addr}: {source}")]
    Coordination {
        /// Configured `host:port` address.
        addr: String,
        /// Underlying cause.
        source: io::Error,
    },

    /// The object store notification socket could not be reached.
    #[error("failed to connect to object store at {path}: {source}")]
    ObjectStore {
        /// Configured notification socket path.
        path: PathBuf,
        /// Underlying cause.
        source: io::Error,
    },

    /// The object store notification feed ended.
    ///
    /// Without notifications the availability cache goes permanently
    /// stale and every future locality decision would be unsound.
    #[error("object store notification feed closed")]
    ObjectFeedClosed,

    /// Framing-level failure escalated by the dispatch loop.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Unclassified I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SchedulerError {
    /// Returns `true` if this error indicates endpoint divergence
    /// rather than an environmental failure.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        match self {
            Self::ProtocolViolation { .. } => true,
            Self::Wire(wire) => wire.is_protocol_violation(),
            _ => false,
        }
    }
}
