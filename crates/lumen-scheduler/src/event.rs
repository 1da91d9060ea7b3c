//! Events consumed by the dispatch loop.
//!
//! Everything that can happen to the scheduler arrives as one of these,
//! keyed by the opaque [`ClientId`] of the connection involved. Reader
//! tasks and the object store feed produce events; the single dispatch
//! task consumes them.

use lumen_core::{ClientId, Message, ObjectId, WireError};

/// One input to the dispatch loop.
#[derive(Debug)]
pub enum SchedulerEvent {
    /// A complete message arrived on a connection.
    Frame {
        /// Connection the message arrived on.
        client: ClientId,
        /// The decoded message.
        message: Message,
    },

    /// A connection ended: clean close, mid-frame end of stream, or a
    /// transport error. All three mean the same thing to the scheduler.
    ConnectionClosed {
        /// The connection that went away.
        client: ClientId,
    },

    /// A connection produced a protocol violation while being read.
    ConnectionError {
        /// The offending connection.
        client: ClientId,
        /// The violation.
        error: WireError,
    },

    /// The object store sealed an object.
    ObjectSealed {
        /// Newly available object.
        object: ObjectId,
    },

    /// The object store notification feed ended.
    ObjectFeedClosed,
}
