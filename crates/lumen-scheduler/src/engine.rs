//! The locality-aware scheduling engine.
//!
//! The engine is a synchronous state machine over three collections:
//!
//! - the **task queue**, task instances awaiting a worker or a missing
//!   object, in arrival order;
//! - the **idle worker registry**, connections that asked for work and
//!   got none, in registration order;
//! - the **object availability cache**, the set of object ids believed
//!   resident in the local object store.
//!
//! The dispatch loop owns the engine exclusively and calls it from a
//! single task, so every operation runs to completion with no
//! interleaving and no locking.
//!
//! # Matching policy
//!
//! A task is runnable when every object it references is in the
//! availability cache; inline value arguments impose no constraint.
//! Worker selection is most-recently-idle first: a just-freed worker is
//! likely still warm. Task selection scans the queue oldest first to
//! bound starvation, but skips tasks that are not yet runnable, so a
//! newer runnable task can overtake an older blocked one. A blocked
//! task must never stall the whole queue.
//!
//! # Staleness
//!
//! The cache only ever grows from notifications, so it can claim an
//! object the store has since evicted. The engine tolerates that
//! window: a task dispatched against stale availability is the worker's
//! problem to report through channels outside this scheduler.

use std::collections::{HashSet, VecDeque};

use lumen_core::{ClientId, ObjectId, TaskInstance, TaskSpec};

/// A task instance matched to a worker.
///
/// Holds the only copy of the instance: it was either never queued or
/// has been removed from the queue, and the caller consumes it by
/// serializing the spec onto the worker's connection.
#[derive(Debug)]
pub struct Assignment {
    /// The worker to execute the task.
    pub worker: ClientId,
    /// The instance being dispatched, already marked running.
    pub instance: TaskInstance,
}

/// Outcome of a task submission.
#[derive(Debug)]
pub struct Submission {
    /// Snapshot of the instance for the durability record, reflecting
    /// the final state of this call: running with a worker if it was
    /// dispatched immediately, waiting otherwise.
    pub record: TaskInstance,
    /// The immediate dispatch, if one was possible.
    pub assignment: Option<Assignment>,
}

/// Scheduling state: task queue, idle worker registry, and object
/// availability cache.
#[derive(Debug, Default)]
pub struct SchedulerEngine {
    task_queue: VecDeque<TaskInstance>,
    idle_workers: Vec<ClientId>,
    available_objects: HashSet<ObjectId>,
}

impl SchedulerEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if every by-reference argument of `spec` is in
    /// the availability cache.
    #[must_use]
    pub fn can_run(&self, spec: &TaskSpec) -> bool {
        spec.reference_ids()
            .all(|id| self.available_objects.contains(&id))
    }

    /// Submit a task for scheduling.
    ///
    /// If an idle worker exists and the task is runnable, it is
    /// dispatched in this call; otherwise the new instance joins the
    /// back of the task queue. Either way the returned record carries
    /// the instance's true identity and final state for the durability
    /// log.
    pub fn submit(&mut self, spec: TaskSpec) -> Submission {
        let mut instance = TaskInstance::new(spec);
        let worker = if self.can_run(instance.spec()) {
            self.idle_workers.pop()
        } else {
            None
        };
        match worker {
            Some(worker) => {
                instance.assign(worker);
                Submission {
                    record: instance.clone(),
                    assignment: Some(Assignment { worker, instance }),
                }
            }
            None => {
                let record = instance.clone();
                self.task_queue.push_back(instance);
                Submission {
                    record,
                    assignment: None,
                }
            }
        }
    }

    /// A worker asked for its next task.
    ///
    /// Scans the queue in arrival order for the first runnable task and
    /// hands it over; with no runnable task the worker joins the idle
    /// registry instead. A worker is never both assigned and registered
    /// by one call.
    ///
    /// # Panics
    ///
    /// Panics if the worker is already registered as idle. A worker
    /// asks for work at most once per assignment, so double
    /// registration means the endpoints have diverged.
    pub fn worker_ready(&mut self, worker: ClientId) -> Option<Assignment> {
        match self.first_runnable() {
            Some(ix) => self.take_queued(ix, worker),
            None => {
                assert!(
                    !self.idle_workers.contains(&worker),
                    "{worker} is already registered as idle"
                );
                self.idle_workers.push(worker);
                None
            }
        }
    }

    /// An object was sealed in the local store.
    ///
    /// Inserts it into the availability cache, then walks the idle
    /// registry in registration order handing each worker the first
    /// runnable task. The walk stops at the first worker that gets
    /// nothing, bounding the work done per notification; workers that
    /// were matched leave the registry.
    pub fn object_available(&mut self, object: ObjectId) -> Vec<Assignment> {
        self.available_objects.insert(object);
        let mut assignments = Vec::new();
        while assignments.len() < self.idle_workers.len() {
            let worker = self.idle_workers[assignments.len()];
            let Some(ix) = self.first_runnable() else {
                break;
            };
            let Some(assignment) = self.take_queued(ix, worker) else {
                break;
            };
            assignments.push(assignment);
        }
        self.idle_workers.drain(..assignments.len());
        assignments
    }

    /// A connection went away; forget it if it was idle.
    ///
    /// Returns `true` if the worker was in the registry. Idempotent:
    /// removing an unknown worker is a no-op.
    pub fn remove_worker(&mut self, worker: ClientId) -> bool {
        match self.idle_workers.iter().position(|w| *w == worker) {
            Some(ix) => {
                self.idle_workers.remove(ix);
                true
            }
            None => false,
        }
    }

    /// Number of tasks awaiting assignment.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.task_queue.len()
    }

    /// Idle workers in registration order.
    #[must_use]
    pub fn idle_workers(&self) -> &[ClientId] {
        &self.idle_workers
    }

    /// Returns `true` if the cache believes `object` is resident.
    #[must_use]
    pub fn object_is_available(&self, object: &ObjectId) -> bool {
        self.available_objects.contains(object)
    }

    fn first_runnable(&self) -> Option<usize> {
        self.task_queue
            .iter()
            .position(|instance| self.can_run(instance.spec()))
    }

    fn take_queued(&mut self, ix: usize, worker: ClientId) -> Option<Assignment> {
        let mut instance = self.task_queue.remove(ix)?;
        instance.assign(worker);
        Some(Assignment { worker, instance })
    }
}
