//! lumen-scheduler: the per-node local task scheduler daemon.
//!
//! The scheduler accepts task submissions and worker ready-for-work
//! requests over a local Unix socket, matches tasks to idle workers
//! subject to data locality (a task only runs where every object it
//! references by id is already resident in the local object store), and
//! records submitted task instances in a remote coordination service for
//! durability.
//!
//! # Architecture
//!
//! ```text
//! +-----------------------------------------------------------------+
//! |                        LocalScheduler                           |
//! |                                                                 |
//! |  listener ──► reader task per connection ──┐                    |
//! |  object store notification feed ───────────┤                    |
//! |                                            ▼                    |
//! |                                   event channel (mpsc)          |
//! |                                            │                    |
//! |                                            ▼                    |
//! |                single dispatch task ─► SchedulerEngine          |
//! |                (owns all mutable state)    │                    |
//! |                                            ▼                    |
//! |                              EXECUTE_TASK to worker socket      |
//! +-----------------------------------------------------------------+
//! ```
//!
//! All scheduling state lives in the one dispatch task, so there is a
//! single logical thread of control and no locking. Reader tasks only
//! frame bytes into typed events.

pub mod client;
pub mod config;
pub mod coordination;
pub mod engine;
pub mod error;
pub mod event;
pub mod object_store;
pub mod server;

pub use client::SchedulerClient;
pub use config::SchedulerConfig;
pub use coordination::{MemoryTaskLog, RemoteTaskLog, TaskLog};
pub use engine::{Assignment, SchedulerEngine, Submission};
pub use error::SchedulerError;
pub use event::SchedulerEvent;
pub use object_store::ObjectFeed;
pub use server::LocalScheduler;
