//! Shared leaf types for the lumen local task scheduler.
//!
//! This crate holds everything the scheduler daemon and its clients agree
//! on: fixed-size identifiers, the task model with its self-describing
//! binary encoding, and the message codec for the local socket protocol.
//! It performs no I/O of its own; the daemon crate wires these types to
//! sockets.
//!
//! # Protocol Stack
//!
//! ```text
//! +-----------------------------------------+
//! |          Task Specification             |  task (self-describing)
//! +-----------------------------------------+
//! |              Messages                   |  wire (kind + payload)
//! +-----------------------------------------+
//! |              Framing                    |  wire (fixed header)
//! +-----------------------------------------+
//! |            UDS Transport                |  owned by the daemon
//! +-----------------------------------------+
//! ```

pub mod error;
pub mod id;
pub mod task;
pub mod wire;

pub use error::{TaskCodecError, WireError, MAX_PAYLOAD_SIZE};
pub use id::{ClientId, ObjectId, TaskInstanceId, TaskKey, UniqueId, UNIQUE_ID_SIZE};
pub use task::{TaskArg, TaskInstance, TaskSpec, TaskStatus};
pub use wire::{Message, MessageCodec, MessageKind, HEADER_LEN};
