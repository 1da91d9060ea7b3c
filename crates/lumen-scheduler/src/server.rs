//! The scheduler server: listener, connection management, and the
//! dispatch loop.
//!
//! One reader task per connection turns the byte stream into complete
//! messages and forwards them, tagged with the connection's opaque
//! [`ClientId`], into a bounded event channel. A single dispatch task
//! consumes the channel and owns every piece of mutable state: the
//! [`SchedulerEngine`], the write halves of all connections, and the
//! task log handle. No other task touches that state, so handling each
//! event runs to completion without interleaving and without locks.
//!
//! # Connection lifecycle
//!
//! A connection is registered on accept and deregistered on the first
//! of: a `DISCONNECT_CLIENT` message, end of stream, or a transport
//! error. Deregistration always removes a matching idle-worker
//! registry entry; a closed connection must never be selected for an
//! assignment afterwards. Cleanup is idempotent because the close
//! message and the end of stream usually both arrive.
//!
//! # Failure policy
//!
//! Protocol violations (unknown kind, malformed task encoding,
//! client-sent `EXECUTE_TASK`) terminate the dispatch loop: the two
//! endpoints are shipped together, so divergence has no defined
//! recovery. Connection-level failures only take down the one
//! connection.

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use futures::{SinkExt, StreamExt};
use lumen_core::{ClientId, Message, MessageCodec, MessageKind, ObjectId, TaskSpec};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::coordination::TaskLog;
use crate::engine::{Assignment, SchedulerEngine, Submission};
use crate::error::SchedulerError;
use crate::event::SchedulerEvent;

/// Capacity of the event channel feeding the dispatch loop.
///
/// Readers await channel space, so a busy scheduler backpressures its
/// connections instead of buffering unboundedly.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The scheduler server.
pub struct LocalScheduler {
    listener: UnixListener,
    socket_path: PathBuf,
    engine: SchedulerEngine,
    task_log: Box<dyn TaskLog>,
    writers: HashMap<ClientId, FramedWrite<OwnedWriteHalf, MessageCodec>>,
    events_tx: mpsc::Sender<SchedulerEvent>,
    events_rx: mpsc::Receiver<SchedulerEvent>,
    next_client: u64,
}

impl LocalScheduler {
    /// Bind the listening socket and assemble the scheduler.
    ///
    /// A stale socket file left by a previous process is removed before
    /// binding; a non-socket file at the path is refused.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Bind`] if the socket cannot be set up.
    pub fn bind(
        socket_path: &Path,
        task_log: Box<dyn TaskLog>,
    ) -> Result<Self, SchedulerError> {
        cleanup_stale_socket(socket_path)?;
        let listener = UnixListener::bind(socket_path).map_err(|source| SchedulerError::Bind {
            path: socket_path.to_path_buf(),
            source,
        })?;
        info!(path = %socket_path.display(), "scheduler listening");

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            engine: SchedulerEngine::new(),
            task_log,
            writers: HashMap::new(),
            events_tx,
            events_rx,
            next_client: 0,
        })
    }

    /// Sender for injecting events, used to attach the object store
    /// feed.
    #[must_use]
    pub fn event_sender(&self) -> mpsc::Sender<SchedulerEvent> {
        self.events_tx.clone()
    }

    /// Run until `shutdown` completes or a fatal error occurs.
    ///
    /// Teardown is scoped to this call regardless of the exit path:
    /// the listening socket is closed and unlinked and all connections
    /// are dropped before returning.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`SchedulerError`] that ended the loop.
    pub async fn run(
        mut self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), SchedulerError> {
        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => self.register_connection(stream),
                    Err(error) => warn!(%error, "accept failed"),
                },
                event = self.events_rx.recv() => match event {
                    Some(event) => {
                        if let Err(error) = self.dispatch(event).await {
                            break Err(error);
                        }
                    }
                    // Unreachable while we hold a sender; kept for
                    // completeness.
                    None => break Ok(()),
                },
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }
            }
        };
        self.teardown();
        result
    }

    /// Handle one event to completion.
    async fn dispatch(&mut self, event: SchedulerEvent) -> Result<(), SchedulerError> {
        match event {
            SchedulerEvent::Frame { client, message } => {
                self.handle_message(client, message).await
            }
            SchedulerEvent::ConnectionClosed { client } => {
                self.drop_connection(client);
                Ok(())
            }
            SchedulerEvent::ConnectionError { client, error } => {
                Err(SchedulerError::ProtocolViolation {
                    client,
                    reason: error.to_string(),
                })
            }
            SchedulerEvent::ObjectSealed { object } => {
                self.handle_object_sealed(object).await;
                Ok(())
            }
            SchedulerEvent::ObjectFeedClosed => Err(SchedulerError::ObjectFeedClosed),
        }
    }

    async fn handle_message(
        &mut self,
        client: ClientId,
        message: Message,
    ) -> Result<(), SchedulerError> {
        match message.kind {
            MessageKind::SubmitTask => {
                // The encoding is self-describing; decoding the whole
                // payload exactly is the declared-length check.
                let spec = TaskSpec::decode(&message.payload).map_err(|error| {
                    SchedulerError::ProtocolViolation {
                        client,
                        reason: format!("malformed task specification: {error}"),
                    }
                })?;
                debug!(%client, task_key = %spec.task_key(), "task submitted");

                let Submission { record, assignment } = self.engine.submit(spec);
                if let Err(error) = self.task_log.append(&record).await {
                    warn!(
                        %error,
                        instance = %record.instance_id(),
                        "failed to record task instance, durability degraded"
                    );
                }
                if let Some(assignment) = assignment {
                    self.send_assignment(assignment).await;
                }
                Ok(())
            }
            MessageKind::GetTask => {
                match self.engine.worker_ready(client) {
                    Some(assignment) => self.send_assignment(assignment).await,
                    None => debug!(%client, "worker idle, no runnable task"),
                }
                Ok(())
            }
            MessageKind::TaskDone => {
                // Reserved: no result payload is processed yet.
                debug!(%client, "task done acknowledged");
                Ok(())
            }
            MessageKind::DisconnectClient => {
                self.drop_connection(client);
                Ok(())
            }
            MessageKind::LogMessage => {
                debug!(%client, len = message.payload.len(), "log message ignored");
                Ok(())
            }
            MessageKind::ExecuteTask => Err(SchedulerError::ProtocolViolation {
                client,
                reason: "EXECUTE_TASK is only sent by the scheduler".to_string(),
            }),
        }
    }

    async fn handle_object_sealed(&mut self, object: ObjectId) {
        debug!(%object, "object sealed");
        for assignment in self.engine.object_available(object) {
            self.send_assignment(assignment).await;
        }
    }

    /// Serialize an assignment onto the worker's connection.
    ///
    /// A write failure is a connection-level condition: the worker is
    /// dropped and the instance is lost to this scheduler, like any
    /// task already in flight on a dying worker.
    async fn send_assignment(&mut self, assignment: Assignment) {
        let Assignment { worker, instance } = assignment;
        info!(
            %worker,
            instance = %instance.instance_id(),
            task_key = %instance.spec().task_key(),
            "assigning task"
        );
        let message = Message::new(MessageKind::ExecuteTask, instance.spec().to_bytes());
        match self.writers.get_mut(&worker) {
            Some(writer) => {
                if let Err(error) = writer.send(message).await {
                    warn!(%worker, %error, "failed to send assignment");
                    self.drop_connection(worker);
                }
            }
            None => warn!(%worker, "assignment to a connection that is already gone"),
        }
    }

    fn register_connection(&mut self, stream: UnixStream) {
        self.next_client += 1;
        let client = ClientId::new(self.next_client);
        let (read_half, write_half) = stream.into_split();
        self.writers
            .insert(client, FramedWrite::new(write_half, MessageCodec::new()));
        tokio::spawn(read_connection(client, read_half, self.events_tx.clone()));
        info!(%client, "accepted connection");
    }

    fn drop_connection(&mut self, client: ClientId) {
        if self.writers.remove(&client).is_some() {
            info!(%client, "client disconnected");
        }
        if self.engine.remove_worker(client) {
            debug!(%client, "removed idle worker");
        }
    }

    fn teardown(&mut self) {
        self.writers.clear();
        if let Err(error) = fs::remove_file(&self.socket_path) {
            if error.kind() != io::ErrorKind::NotFound {
                warn!(
                    path = %self.socket_path.display(),
                    %error,
                    "failed to remove socket file"
                );
            }
        }
        info!("scheduler stopped");
    }
}

/// Read complete messages off one connection and forward them as
/// events. Runs until the connection or the event channel closes.
async fn read_connection(
    client: ClientId,
    read_half: OwnedReadHalf,
    events: mpsc::Sender<SchedulerEvent>,
) {
    let mut frames = FramedRead::new(read_half, MessageCodec::new());
    loop {
        let event = match frames.next().await {
            Some(Ok(message)) => SchedulerEvent::Frame { client, message },
            Some(Err(error)) if error.is_protocol_violation() => {
                let _ = events
                    .send(SchedulerEvent::ConnectionError { client, error })
                    .await;
                return;
            }
            // Mid-frame truncation and transport errors are the peer
            // going away, same as a clean end of stream.
            Some(Err(_)) | None => {
                let _ = events.send(SchedulerEvent::ConnectionClosed { client }).await;
                return;
            }
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
}

fn cleanup_stale_socket(path: &Path) -> Result<(), SchedulerError> {
    let bind_error = |source| SchedulerError::Bind {
        path: path.to_path_buf(),
        source,
    };
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::FileTypeExt;
                if !metadata.file_type().is_socket() {
                    return Err(bind_error(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "path exists and is not a socket",
                    )));
                }
            }
            fs::remove_file(path).map_err(bind_error)?;
            debug!(path = %path.display(), "removed stale socket file");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(bind_error(error)),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::coordination::MemoryTaskLog;

    #[tokio::test]
    async fn bind_removes_stale_socket() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("scheduler.sock");

        // First bind, dropped without unlinking.
        let first = LocalScheduler::bind(&path, Box::new(MemoryTaskLog::new())).unwrap();
        std::mem::forget(first);
        assert!(path.exists());

        let second = LocalScheduler::bind(&path, Box::new(MemoryTaskLog::new()));
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn bind_refuses_non_socket_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("not-a-socket");
        std::fs::write(&path, b"file").unwrap();

        let result = LocalScheduler::bind(&path, Box::new(MemoryTaskLog::new()));
        assert!(matches!(result, Err(SchedulerError::Bind { .. })));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn shutdown_unlinks_socket() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("scheduler.sock");

        let scheduler = LocalScheduler::bind(&path, Box::new(MemoryTaskLog::new())).unwrap();
        assert!(path.exists());

        scheduler.run(std::future::ready(())).await.unwrap();
        assert!(!path.exists());
    }
}
