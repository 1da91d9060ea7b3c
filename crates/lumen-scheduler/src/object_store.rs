//! Object store adapter: the sealed-object notification feed.
//!
//! The object store is a passive collaborator. The scheduler connects to
//! its notification socket once at startup and from then on receives one
//! fixed-size object id per sealed object. Each id becomes an
//! [`SchedulerEvent::ObjectSealed`] on the dispatch loop's channel.
//!
//! The feed ending is surfaced as [`SchedulerEvent::ObjectFeedClosed`]
//! and terminates the scheduler: without notifications the availability
//! cache can only go stale.

use std::io;
use std::path::Path;

use lumen_core::{ObjectId, UNIQUE_ID_SIZE};
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::event::SchedulerEvent;

/// Subscription to the object store's sealed-object notifications.
pub struct ObjectFeed {
    stream: UnixStream,
}

impl ObjectFeed {
    /// Connect to the object store's notification socket.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; startup treats this as fatal.
    pub async fn connect(path: &Path) -> io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        info!(path = %path.display(), "subscribed to object store notifications");
        Ok(Self { stream })
    }

    /// Spawn the reader task that forwards notifications as events.
    ///
    /// The task ends when the feed or the event channel closes.
    pub fn spawn(self, events: mpsc::Sender<SchedulerEvent>) -> JoinHandle<()> {
        let mut stream = self.stream;
        tokio::spawn(async move {
            let mut bytes = [0u8; UNIQUE_ID_SIZE];
            loop {
                match stream.read_exact(&mut bytes).await {
                    Ok(_) => {
                        let object = ObjectId::from_bytes(bytes);
                        if events
                            .send(SchedulerEvent::ObjectSealed { object })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(error) => {
                        if error.kind() != io::ErrorKind::UnexpectedEof {
                            warn!(%error, "object store notification read failed");
                        }
                        let _ = events.send(SchedulerEvent::ObjectFeedClosed).await;
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;

    use super::*;

    #[tokio::test]
    async fn notifications_become_events() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let feed = ObjectFeed::connect(&path).await.unwrap();
        let (mut store_side, _addr) = listener.accept().await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let _feed_task = feed.spawn(tx);

        let object = ObjectId::random();
        store_side.write_all(object.as_bytes()).await.unwrap();

        match rx.recv().await.unwrap() {
            SchedulerEvent::ObjectSealed { object: seen } => assert_eq!(seen, object),
            other => panic!("unexpected event {other:?}"),
        }

        drop(store_side);
        assert!(matches!(
            rx.recv().await.unwrap(),
            SchedulerEvent::ObjectFeedClosed
        ));
    }

    #[tokio::test]
    async fn partial_id_at_eof_still_closes_feed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let feed = ObjectFeed::connect(&path).await.unwrap();
        let (mut store_side, _addr) = listener.accept().await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let _feed_task = feed.spawn(tx);

        store_side.write_all(&[0xaa; 5]).await.unwrap();
        drop(store_side);

        assert!(matches!(
            rx.recv().await.unwrap(),
            SchedulerEvent::ObjectFeedClosed
        ));
    }
}
