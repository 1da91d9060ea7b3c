//! Task model: specifications, instances, and their binary encoding.
//!
//! A [`TaskSpec`] is the immutable description of a unit of work: a task
//! key plus an ordered list of arguments, each either an inline value or
//! a reference to an object in the shared store. The scheduler never
//! looks inside argument payloads; it only cares which objects a task
//! references.
//!
//! # Encoding
//!
//! The encoding is self-describing so that a receiver can recompute the
//! total size from the fields themselves and compare it against the
//! payload length declared by the frame header:
//!
//! ```text
//! +----------------+-------------------+----------------------------+
//! | task key (20)  | arg count (u64 LE)| args ...                   |
//! +----------------+-------------------+----------------------------+
//!
//! value arg:     [0x00][len: u64 LE][len bytes]
//! reference arg: [0x01][object id (20)]
//! ```
//!
//! All integers are little-endian: the protocol only ever crosses a
//! same-host socket between co-versioned processes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::TaskCodecError;
use crate::id::{ClientId, ObjectId, TaskInstanceId, TaskKey, UNIQUE_ID_SIZE};

/// Argument kind tag for an inline value.
const ARG_VALUE_TAG: u8 = 0;

/// Argument kind tag for an object reference.
const ARG_REFERENCE_TAG: u8 = 1;

/// One argument of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskArg {
    /// Inline value bytes, opaque to the scheduler.
    Value(Bytes),
    /// Reference to an object expected in the local object store.
    Reference(ObjectId),
}

impl TaskArg {
    fn encoded_len(&self) -> usize {
        match self {
            Self::Value(bytes) => 1 + 8 + bytes.len(),
            Self::Reference(_) => 1 + UNIQUE_ID_SIZE,
        }
    }
}

/// Immutable description of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    task_key: TaskKey,
    args: Vec<TaskArg>,
}

impl TaskSpec {
    /// Build a specification from its key and arguments.
    #[must_use]
    pub fn new(task_key: TaskKey, args: Vec<TaskArg>) -> Self {
        Self { task_key, args }
    }

    /// The key identifying this task.
    #[must_use]
    pub const fn task_key(&self) -> TaskKey {
        self.task_key
    }

    /// The ordered arguments.
    #[must_use]
    pub fn args(&self) -> &[TaskArg] {
        &self.args
    }

    /// Iterate over the object ids of the by-reference arguments.
    pub fn reference_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.args.iter().filter_map(|arg| match arg {
            TaskArg::Reference(id) => Some(*id),
            TaskArg::Value(_) => None,
        })
    }

    /// Total encoded size, computable without encoding.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        UNIQUE_ID_SIZE + 8 + self.args.iter().map(TaskArg::encoded_len).sum::<usize>()
    }

    /// Encode into a freshly allocated buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(self.task_key.as_bytes());
        buf.put_u64_le(self.args.len() as u64);
        for arg in &self.args {
            match arg {
                TaskArg::Value(bytes) => {
                    buf.put_u8(ARG_VALUE_TAG);
                    buf.put_u64_le(bytes.len() as u64);
                    buf.put_slice(bytes);
                }
                TaskArg::Reference(id) => {
                    buf.put_u8(ARG_REFERENCE_TAG);
                    buf.put_slice(id.as_bytes());
                }
            }
        }
        buf.freeze()
    }

    /// Decode a specification, requiring the buffer to contain exactly
    /// one encoding.
    ///
    /// Leftover bytes are rejected: the payload length declared on the
    /// wire must equal the self-describing encoded size.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskCodecError`] if the buffer is truncated, carries
    /// an unknown argument kind tag, or has trailing bytes.
    pub fn decode(mut buf: &[u8]) -> Result<Self, TaskCodecError> {
        let task_key = read_id(&mut buf, "task key")?;
        if buf.remaining() < 8 {
            return Err(TaskCodecError::Truncated {
                context: "argument count",
            });
        }
        let count = buf.get_u64_le();
        // Each argument occupies at least one tag byte; a count beyond
        // the remaining bytes cannot be honest, so reject it before
        // reserving any capacity.
        if count > buf.remaining() as u64 {
            return Err(TaskCodecError::Truncated {
                context: "argument list",
            });
        }
        let mut args = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if buf.remaining() < 1 {
                return Err(TaskCodecError::Truncated {
                    context: "argument kind",
                });
            }
            match buf.get_u8() {
                ARG_VALUE_TAG => {
                    if buf.remaining() < 8 {
                        return Err(TaskCodecError::Truncated {
                            context: "value length",
                        });
                    }
                    let len = buf.get_u64_le();
                    if len > buf.remaining() as u64 {
                        return Err(TaskCodecError::Truncated {
                            context: "value bytes",
                        });
                    }
                    args.push(TaskArg::Value(Bytes::copy_from_slice(
                        &buf[..len as usize],
                    )));
                    buf.advance(len as usize);
                }
                ARG_REFERENCE_TAG => {
                    args.push(TaskArg::Reference(read_id(&mut buf, "object id")?));
                }
                tag => return Err(TaskCodecError::InvalidArgKind { tag }),
            }
        }
        if buf.has_remaining() {
            return Err(TaskCodecError::TrailingBytes {
                extra: buf.remaining(),
            });
        }
        Ok(Self { task_key, args })
    }
}

fn read_id(buf: &mut &[u8], context: &'static str) -> Result<ObjectId, TaskCodecError> {
    if buf.remaining() < UNIQUE_ID_SIZE {
        return Err(TaskCodecError::Truncated { context });
    }
    let mut bytes = [0u8; UNIQUE_ID_SIZE];
    buf.copy_to_slice(&mut bytes);
    Ok(ObjectId::from_bytes(bytes))
}

/// Scheduling status of a task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskStatus {
    /// In the task queue or pending dispatch.
    Waiting = 0,
    /// Assigned to a worker.
    Running = 1,
}

impl TaskStatus {
    /// Tag byte for record encoding.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a status from its tag byte.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Waiting),
            1 => Some(Self::Running),
            _ => None,
        }
    }
}

/// A scheduling-time instantiation of a task.
///
/// Wraps the immutable [`TaskSpec`] with a freshly generated instance id
/// (a task may be re-instantiated under the same key), the scheduling
/// status, and the worker executing it once assigned. The task queue
/// owns an instance until dispatch consumes it exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInstance {
    instance_id: TaskInstanceId,
    status: TaskStatus,
    worker: Option<ClientId>,
    spec: TaskSpec,
}

impl TaskInstance {
    /// Instantiate a task: fresh instance id, `Waiting`, no worker.
    #[must_use]
    pub fn new(spec: TaskSpec) -> Self {
        Self {
            instance_id: TaskInstanceId::random(),
            status: TaskStatus::Waiting,
            worker: None,
            spec,
        }
    }

    /// Reassemble an instance from its recorded parts.
    #[must_use]
    pub const fn from_parts(
        instance_id: TaskInstanceId,
        status: TaskStatus,
        worker: Option<ClientId>,
        spec: TaskSpec,
    ) -> Self {
        Self {
            instance_id,
            status,
            worker,
            spec,
        }
    }

    /// The unique id of this instantiation.
    #[must_use]
    pub const fn instance_id(&self) -> TaskInstanceId {
        self.instance_id
    }

    /// Current scheduling status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// The worker executing this instance, if assigned.
    #[must_use]
    pub const fn worker(&self) -> Option<ClientId> {
        self.worker
    }

    /// The underlying specification.
    #[must_use]
    pub const fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    /// Mark this instance as running on the given worker.
    pub fn assign(&mut self, worker: ClientId) {
        self.status = TaskStatus::Running;
        self.worker = Some(worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::UniqueId;

    fn sample_spec() -> TaskSpec {
        TaskSpec::new(
            TaskKey::random(),
            vec![
                TaskArg::Value(Bytes::from_static(b"payload")),
                TaskArg::Reference(ObjectId::random()),
                TaskArg::Value(Bytes::new()),
            ],
        )
    }

    #[test]
    fn encoded_len_matches_encoding() {
        let spec = sample_spec();
        assert_eq!(spec.to_bytes().len(), spec.encoded_len());

        let empty = TaskSpec::new(TaskKey::random(), Vec::new());
        assert_eq!(empty.to_bytes().len(), empty.encoded_len());
    }

    #[test]
    fn decode_round_trips() {
        let spec = sample_spec();
        let decoded = TaskSpec::decode(&spec.to_bytes()).unwrap();
        assert_eq!(decoded, spec);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = sample_spec().to_bytes().to_vec();
        bytes.push(0);
        assert!(matches!(
            TaskSpec::decode(&bytes),
            Err(TaskCodecError::TrailingBytes { extra: 1 })
        ));
    }

    #[test]
    fn truncated_encoding_is_rejected() {
        let bytes = sample_spec().to_bytes();
        for len in 0..bytes.len() {
            assert!(
                matches!(
                    TaskSpec::decode(&bytes[..len]),
                    Err(TaskCodecError::Truncated { .. })
                ),
                "prefix of {len} bytes decoded unexpectedly"
            );
        }
    }

    #[test]
    fn unknown_arg_kind_is_rejected() {
        let spec = TaskSpec::new(TaskKey::random(), vec![TaskArg::Value(Bytes::new())]);
        let mut bytes = spec.to_bytes().to_vec();
        bytes[UNIQUE_ID_SIZE + 8] = 0x7f;
        assert!(matches!(
            TaskSpec::decode(&bytes),
            Err(TaskCodecError::InvalidArgKind { tag: 0x7f })
        ));
    }

    #[test]
    fn dishonest_arg_count_is_rejected_before_allocation() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(UniqueId::random().as_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            TaskSpec::decode(&bytes),
            Err(TaskCodecError::Truncated { .. })
        ));
    }

    #[test]
    fn reference_ids_skips_values() {
        let object = ObjectId::random();
        let spec = TaskSpec::new(
            TaskKey::random(),
            vec![
                TaskArg::Value(Bytes::from_static(b"x")),
                TaskArg::Reference(object),
            ],
        );
        assert_eq!(spec.reference_ids().collect::<Vec<_>>(), vec![object]);
    }

    #[test]
    fn new_instance_is_waiting_and_unassigned() {
        let instance = TaskInstance::new(sample_spec());
        assert_eq!(instance.status(), TaskStatus::Waiting);
        assert_eq!(instance.worker(), None);
        assert!(!instance.instance_id().is_nil());
    }

    #[test]
    fn distinct_instances_of_one_task_get_distinct_ids() {
        let spec = sample_spec();
        let a = TaskInstance::new(spec.clone());
        let b = TaskInstance::new(spec);
        assert_ne!(a.instance_id(), b.instance_id());
        assert_eq!(a.spec().task_key(), b.spec().task_key());
    }

    #[test]
    fn assign_marks_running() {
        let mut instance = TaskInstance::new(sample_spec());
        instance.assign(ClientId::new(3));
        assert_eq!(instance.status(), TaskStatus::Running);
        assert_eq!(instance.worker(), Some(ClientId::new(3)));
    }

    #[test]
    fn status_tags_round_trip() {
        assert_eq!(TaskStatus::from_tag(TaskStatus::Waiting.tag()), Some(TaskStatus::Waiting));
        assert_eq!(TaskStatus::from_tag(TaskStatus::Running.tag()), Some(TaskStatus::Running));
        assert_eq!(TaskStatus::from_tag(9), None);
    }
}
