//! Fixed-size identifiers shared across the scheduler and its clients.
//!
//! Object identifiers, task keys, and task instance identifiers are all
//! the same 20-byte [`UniqueId`] on the wire; the aliases exist so
//! signatures document which role an id plays. [`ClientId`] is different:
//! it names one live IPC connection and never leaves the scheduler
//! process.

use std::fmt;

use rand::RngCore;

/// Size in bytes of a [`UniqueId`].
pub const UNIQUE_ID_SIZE: usize = 20;

/// A fixed-size, globally unique identifier.
///
/// Ids are opaque random byte strings. The scheduler never inspects
/// their contents beyond equality and hashing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueId([u8; UNIQUE_ID_SIZE]);

impl UniqueId {
    /// The all-zero id, used as a nil sentinel.
    pub const NIL: Self = Self([0; UNIQUE_ID_SIZE]);

    /// Generate a fresh random id.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; UNIQUE_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Construct an id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; UNIQUE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of this id.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; UNIQUE_ID_SIZE] {
        &self.0
    }

    /// Returns `true` if this is the nil sentinel.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0 == [0; UNIQUE_ID_SIZE]
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({self})")
    }
}

/// Handle naming a value in the shared object store.
pub type ObjectId = UniqueId;

/// Identifies a task definition. Distinct from the instance id: a task
/// may be re-instantiated under the same key.
pub type TaskKey = UniqueId;

/// Identifies one scheduling-time instantiation of a task.
pub type TaskInstanceId = UniqueId;

/// Opaque handle for one IPC connection.
///
/// A client becomes a worker, from the scheduler's point of view, the
/// moment it asks for work. The handle stays unique for the lifetime of
/// the scheduler process and is never reused across connections.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ClientId(u64);

impl ClientId {
    /// Construct a handle from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value of this handle.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_distinct() {
        let a = UniqueId::random();
        let b = UniqueId::random();
        assert_ne!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn nil_id_is_nil() {
        assert!(UniqueId::NIL.is_nil());
        assert_eq!(UniqueId::NIL, UniqueId::from_bytes([0; UNIQUE_ID_SIZE]));
    }

    #[test]
    fn display_is_lowercase_hex() {
        let id = UniqueId::from_bytes([0xab; UNIQUE_ID_SIZE]);
        assert_eq!(id.to_string(), "ab".repeat(UNIQUE_ID_SIZE));
    }

    #[test]
    fn client_id_round_trips_raw_value() {
        let client = ClientId::new(7);
        assert_eq!(client.raw(), 7);
        assert_eq!(client.to_string(), "client-7");
    }
}
