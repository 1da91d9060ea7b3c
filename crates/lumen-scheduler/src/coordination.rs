//! Coordination service adapter: the durable task log.
//!
//! Every submitted task instance is recorded with the coordination
//! service so that in-flight state can be reconstructed after a crash.
//! The log is not on the scheduling decision's critical path: a record
//! that fails to append degrades durability, not correctness, so append
//! failures are reported to the caller and the caller decides (the
//! dispatch loop logs a warning and keeps scheduling).
//!
//! # Record Format
//!
//! Records are length-prefixed on the TCP connection:
//!
//! ```text
//! +----------------+-------------------------------------------------+
//! | len (u64 LE)   | instance id (20) | status (u8) | worker         |
//! |                | (u8 flag + u64 LE when set) | task spec encoding|
//! +----------------+-------------------------------------------------+
//! ```

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use lumen_core::{ClientId, TaskCodecError, TaskInstance, TaskSpec, TaskStatus, UniqueId,
    UNIQUE_ID_SIZE};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

/// Failures of the coordination adapter.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The connection to the coordination service failed mid-append.
    #[error("coordination connection lost: {0}")]
    ConnectionLost(#[source] io::Error),

    /// A record could not be decoded.
    #[error("malformed task record: {reason}")]
    MalformedRecord {
        /// What was wrong.
        reason: String,
    },
}

impl From<TaskCodecError> for CoordinationError {
    fn from(err: TaskCodecError) -> Self {
        Self::MalformedRecord {
            reason: err.to_string(),
        }
    }
}

/// Durable record sink for task instances.
///
/// The one operation the scheduling path needs: append a record keyed
/// by the instance id. No read-back is required.
#[async_trait]
pub trait TaskLog: Send {
    /// Append one task instance record.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError`] if the record could not be
    /// written; the instance is still scheduled.
    async fn append(&mut self, instance: &TaskInstance) -> Result<(), CoordinationError>;
}

/// Task log backed by a TCP connection to the coordination service.
pub struct RemoteTaskLog {
    stream: TcpStream,
}

impl RemoteTaskLog {
    /// Connect to the coordination service.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; startup treats this as fatal.
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!(%addr, "connected to coordination service");
        Ok(Self { stream })
    }
}

#[async_trait]
impl TaskLog for RemoteTaskLog {
    async fn append(&mut self, instance: &TaskInstance) -> Result<(), CoordinationError> {
        let record = encode_record(instance);
        let mut frame = BytesMut::with_capacity(8 + record.len());
        frame.put_u64_le(record.len() as u64);
        frame.put_slice(&record);
        self.stream
            .write_all(&frame)
            .await
            .map_err(CoordinationError::ConnectionLost)
    }
}

/// In-memory task log for tests.
///
/// Clones share one record store, so a test can keep a handle while the
/// scheduler owns the log.
#[derive(Debug, Default, Clone)]
pub struct MemoryTaskLog {
    records: Arc<Mutex<Vec<TaskInstance>>>,
}

impl MemoryTaskLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all appended records, in append order.
    #[must_use]
    pub fn records(&self) -> Vec<TaskInstance> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TaskLog for MemoryTaskLog {
    async fn append(&mut self, instance: &TaskInstance) -> Result<(), CoordinationError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(instance.clone());
        Ok(())
    }
}

/// Encode one task instance record (without the length prefix).
#[must_use]
pub fn encode_record(instance: &TaskInstance) -> Vec<u8> {
    let spec = instance.spec();
    let mut buf = BytesMut::with_capacity(UNIQUE_ID_SIZE + 2 + 8 + spec.encoded_len());
    buf.put_slice(instance.instance_id().as_bytes());
    buf.put_u8(instance.status().tag());
    match instance.worker() {
        Some(worker) => {
            buf.put_u8(1);
            buf.put_u64_le(worker.raw());
        }
        None => buf.put_u8(0),
    }
    buf.put_slice(&spec.to_bytes());
    buf.to_vec()
}

/// Decode one task instance record (without the length prefix).
///
/// # Errors
///
/// Returns [`CoordinationError::MalformedRecord`] if the record is
/// truncated or carries unknown tags.
pub fn decode_record(mut buf: &[u8]) -> Result<TaskInstance, CoordinationError> {
    let malformed = |reason: &str| CoordinationError::MalformedRecord {
        reason: reason.to_string(),
    };
    if buf.remaining() < UNIQUE_ID_SIZE + 2 {
        return Err(malformed("record shorter than fixed fields"));
    }
    let mut id_bytes = [0u8; UNIQUE_ID_SIZE];
    buf.copy_to_slice(&mut id_bytes);
    let instance_id = UniqueId::from_bytes(id_bytes);

    let status = TaskStatus::from_tag(buf.get_u8())
        .ok_or_else(|| malformed("unknown status tag"))?;

    let worker = match buf.get_u8() {
        0 => None,
        1 => {
            if buf.remaining() < 8 {
                return Err(malformed("truncated worker id"));
            }
            Some(ClientId::new(buf.get_u64_le()))
        }
        _ => return Err(malformed("unknown worker flag")),
    };

    let spec = TaskSpec::decode(buf)?;
    Ok(TaskInstance::from_parts(instance_id, status, worker, spec))
}
