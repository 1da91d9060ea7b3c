//! Thin client stub for talking to the scheduler.
//!
//! Application shims and workers use this to submit tasks and fetch
//! work over the scheduler's socket. It is a direct mapping of the
//! protocol: one method per message kind, no state beyond the framed
//! connection.

use std::io;
use std::path::Path;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use lumen_core::{Message, MessageCodec, MessageKind, TaskCodecError, TaskSpec, WireError};
use thiserror::Error;
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the scheduler socket.
    #[error("failed to connect to scheduler: {0}")]
    Connect(#[source] io::Error),

    /// Framing-level failure.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// An assigned task could not be decoded.
    #[error("malformed task assignment: {0}")]
    Task(#[from] TaskCodecError),

    /// The scheduler sent a message the client did not expect.
    #[error("unexpected message kind {kind}")]
    UnexpectedMessage {
        /// The kind received.
        kind: MessageKind,
    },

    /// The scheduler closed the connection.
    #[error("scheduler closed the connection")]
    Disconnected,
}

/// Connection to the local scheduler.
pub struct SchedulerClient {
    framed: Framed<UnixStream, MessageCodec>,
}

impl SchedulerClient {
    /// Connect to the scheduler's socket.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if the socket is unreachable.
    pub async fn connect(path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(ClientError::Connect)?;
        Ok(Self {
            framed: Framed::new(stream, MessageCodec::new()),
        })
    }

    /// Submit a task for scheduling.
    ///
    /// # Errors
    ///
    /// Returns a wire error if the submission could not be sent.
    pub async fn submit(&mut self, spec: &TaskSpec) -> Result<(), ClientError> {
        self.framed
            .send(Message::new(MessageKind::SubmitTask, spec.to_bytes()))
            .await?;
        Ok(())
    }

    /// Ask for the next task and wait for the assignment.
    ///
    /// Blocks until the scheduler has a runnable task for this worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the scheduler sends
    /// anything other than a task assignment.
    pub async fn get_task(&mut self) -> Result<TaskSpec, ClientError> {
        self.framed.send(Message::empty(MessageKind::GetTask)).await?;
        match self.framed.next().await {
            Some(Ok(message)) if message.kind == MessageKind::ExecuteTask => {
                Ok(TaskSpec::decode(&message.payload)?)
            }
            Some(Ok(message)) => Err(ClientError::UnexpectedMessage { kind: message.kind }),
            Some(Err(error)) => Err(error.into()),
            None => Err(ClientError::Disconnected),
        }
    }

    /// Report completion of the current task.
    ///
    /// # Errors
    ///
    /// Returns a wire error if the report could not be sent.
    pub async fn task_done(&mut self) -> Result<(), ClientError> {
        self.framed.send(Message::empty(MessageKind::TaskDone)).await?;
        Ok(())
    }

    /// Send a free-form log payload.
    ///
    /// # Errors
    ///
    /// Returns a wire error if the payload could not be sent.
    pub async fn log_message(&mut self, payload: Bytes) -> Result<(), ClientError> {
        self.framed
            .send(Message::new(MessageKind::LogMessage, payload))
            .await?;
        Ok(())
    }

    /// Announce departure and close the connection.
    ///
    /// # Errors
    ///
    /// Returns a wire error if the notice could not be sent.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.framed
            .send(Message::empty(MessageKind::DisconnectClient))
            .await?;
        Ok(())
    }
}
