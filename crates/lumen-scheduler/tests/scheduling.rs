//! End-to-end scheduling tests over real sockets.
//!
//! Each test stands up a scheduler on a fresh socket with a fake object
//! store feed (a Unix socket the test writes object ids into) and a
//! capturing task log, then drives it with the client stub exactly the
//! way workers and application shims do.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use lumen_core::{
    Message, MessageCodec, MessageKind, ObjectId, TaskArg, TaskKey, TaskSpec, TaskStatus,
};
use lumen_scheduler::coordination::{decode_record, MemoryTaskLog, RemoteTaskLog};
use lumen_scheduler::{LocalScheduler, ObjectFeed, SchedulerClient, SchedulerError};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;

const WAIT: Duration = Duration::from_secs(2);

/// Long enough for the dispatch loop to have drained prior events.
const SETTLE: Duration = Duration::from_millis(100);

struct Harness {
    socket_path: std::path::PathBuf,
    log: MemoryTaskLog,
    store_side: UnixStream,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), SchedulerError>>,
    _tmp: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("scheduler.sock");
        let store_path = tmp.path().join("store.sock");

        let store_listener = UnixListener::bind(&store_path).unwrap();
        let log = MemoryTaskLog::new();
        let scheduler = LocalScheduler::bind(&socket_path, Box::new(log.clone())).unwrap();

        let feed = ObjectFeed::connect(&store_path).await.unwrap();
        let (store_side, _addr) = store_listener.accept().await.unwrap();
        let _feed_task = feed.spawn(scheduler.event_sender());

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.run(async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            socket_path,
            log,
            store_side,
            shutdown,
            handle,
            _tmp: tmp,
        }
    }

    async fn seal_object(&mut self, object: ObjectId) {
        self.store_side.write_all(object.as_bytes()).await.unwrap();
    }

    async fn client(&self) -> SchedulerClient {
        SchedulerClient::connect(&self.socket_path).await.unwrap()
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        timeout(WAIT, self.handle)
            .await
            .expect("scheduler did not stop")
            .expect("scheduler task panicked")
            .expect("scheduler exited with an error");
    }
}

fn value_task() -> TaskSpec {
    TaskSpec::new(
        TaskKey::random(),
        vec![TaskArg::Value(Bytes::from_static(b"inline"))],
    )
}

fn ref_task(objects: &[ObjectId]) -> TaskSpec {
    TaskSpec::new(
        TaskKey::random(),
        objects.iter().map(|id| TaskArg::Reference(*id)).collect(),
    )
}

async fn raw_connect(path: &Path) -> Framed<UnixStream, MessageCodec> {
    Framed::new(
        UnixStream::connect(path).await.unwrap(),
        MessageCodec::new(),
    )
}

#[tokio::test]
async fn queued_task_runs_when_its_object_arrives() {
    let mut harness = Harness::start().await;
    let object = ObjectId::random();
    let task = ref_task(&[object]);

    let mut submitter = harness.client().await;
    submitter.submit(&task).await.unwrap();
    sleep(SETTLE).await;

    // The worker idles: the task's dependency is not available yet.
    let mut worker = harness.client().await;
    let assigned = tokio::spawn(async move { worker.get_task().await });
    sleep(SETTLE).await;

    harness.seal_object(object).await;

    let assigned = timeout(WAIT, assigned)
        .await
        .expect("assignment never arrived")
        .unwrap()
        .unwrap();
    assert_eq!(assigned.task_key(), task.task_key());

    // The instance was recorded at submission time, still waiting.
    let records = harness.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status(), TaskStatus::Waiting);
    assert_eq!(records[0].spec(), &task);

    harness.stop().await;
}

#[tokio::test]
async fn runnable_submit_goes_to_most_recently_idle_worker() {
    let harness = Harness::start().await;

    let mut worker_a = harness.client().await;
    let first_idle = tokio::spawn(async move { worker_a.get_task().await });
    sleep(SETTLE).await;

    let mut worker_b = harness.client().await;
    let second_idle = tokio::spawn(async move { worker_b.get_task().await });
    sleep(SETTLE).await;

    let task = value_task();
    let mut submitter = harness.client().await;
    submitter.submit(&task).await.unwrap();

    let assigned = timeout(WAIT, second_idle)
        .await
        .expect("most recent worker got nothing")
        .unwrap()
        .unwrap();
    assert_eq!(assigned.task_key(), task.task_key());

    // The earlier worker stays idle.
    assert!(timeout(Duration::from_millis(300), first_idle).await.is_err());

    harness.stop().await;
}

#[tokio::test]
async fn runnable_submit_with_idle_worker_dispatches_immediately() {
    let harness = Harness::start().await;

    let mut worker = harness.client().await;
    let assigned = tokio::spawn(async move { worker.get_task().await });
    sleep(SETTLE).await;

    let task = value_task();
    let mut submitter = harness.client().await;
    submitter.submit(&task).await.unwrap();

    let assigned = timeout(WAIT, assigned)
        .await
        .expect("assignment never arrived")
        .unwrap()
        .unwrap();
    assert_eq!(assigned.task_key(), task.task_key());

    // Immediate dispatch is recorded as already running.
    let records = harness.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status(), TaskStatus::Running);
    assert!(records[0].worker().is_some());

    harness.stop().await;
}

#[tokio::test]
async fn worker_that_vanished_while_idle_is_never_assigned() {
    let mut harness = Harness::start().await;
    let object = ObjectId::random();
    let task = ref_task(&[object]);

    let mut submitter = harness.client().await;
    submitter.submit(&task).await.unwrap();
    sleep(SETTLE).await;

    // Worker idles, then its connection dies without a goodbye.
    let mut doomed = raw_connect(&harness.socket_path).await;
    doomed.send(Message::empty(MessageKind::GetTask)).await.unwrap();
    sleep(SETTLE).await;
    drop(doomed);
    sleep(SETTLE).await;

    harness.seal_object(object).await;
    sleep(SETTLE).await;

    // The scheduler survived and the task is still there for the next
    // worker to claim.
    let mut worker = harness.client().await;
    let assigned = timeout(WAIT, worker.get_task())
        .await
        .expect("task was lost with the dead worker")
        .unwrap();
    assert_eq!(assigned.task_key(), task.task_key());

    harness.stop().await;
}

#[tokio::test]
async fn disconnect_message_while_idle_removes_the_worker() {
    let mut harness = Harness::start().await;
    let object = ObjectId::random();
    let task = ref_task(&[object]);

    let mut submitter = harness.client().await;
    submitter.submit(&task).await.unwrap();
    sleep(SETTLE).await;

    let mut leaving = raw_connect(&harness.socket_path).await;
    leaving.send(Message::empty(MessageKind::GetTask)).await.unwrap();
    sleep(SETTLE).await;
    leaving
        .send(Message::empty(MessageKind::DisconnectClient))
        .await
        .unwrap();
    sleep(SETTLE).await;

    harness.seal_object(object).await;
    sleep(SETTLE).await;

    let mut worker = harness.client().await;
    let assigned = timeout(WAIT, worker.get_task())
        .await
        .expect("task was lost with the departed worker")
        .unwrap();
    assert_eq!(assigned.task_key(), task.task_key());

    harness.stop().await;
}

#[tokio::test]
async fn malformed_task_submission_is_fatal() {
    let harness = Harness::start().await;

    let mut rogue = raw_connect(&harness.socket_path).await;
    rogue
        .send(Message::new(
            MessageKind::SubmitTask,
            Bytes::from_static(b"not a task"),
        ))
        .await
        .unwrap();

    let result = timeout(WAIT, harness.handle)
        .await
        .expect("scheduler kept running after a protocol violation")
        .unwrap();
    let error = result.expect_err("malformed submission was accepted");
    assert!(error.is_protocol_violation(), "unexpected error: {error}");
}

#[tokio::test]
async fn task_done_and_log_message_are_acknowledged_quietly() {
    let harness = Harness::start().await;

    let mut client = harness.client().await;
    client.task_done().await.unwrap();
    client
        .log_message(Bytes::from_static(b"worker says hi"))
        .await
        .unwrap();

    // The connection and the scheduler are both still usable.
    let task = value_task();
    client.submit(&task).await.unwrap();
    sleep(SETTLE).await;
    assert_eq!(harness.log.records().len(), 1);

    client.disconnect().await.unwrap();
    harness.stop().await;
}

#[tokio::test]
async fn records_reach_the_coordination_service() {
    let tmp = TempDir::new().unwrap();
    let socket_path = tmp.path().join("scheduler.sock");
    let store_path = tmp.path().join("store.sock");

    let coordination = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let coordination_addr = coordination.local_addr().unwrap().to_string();

    let store_listener = UnixListener::bind(&store_path).unwrap();
    let task_log = RemoteTaskLog::connect(&coordination_addr).await.unwrap();
    let (mut coordination_side, _addr) = coordination.accept().await.unwrap();

    let scheduler = LocalScheduler::bind(&socket_path, Box::new(task_log)).unwrap();
    let feed = ObjectFeed::connect(&store_path).await.unwrap();
    let (_store_side, _addr) = store_listener.accept().await.unwrap();
    let _feed_task = feed.spawn(scheduler.event_sender());

    let (_shutdown, shutdown_rx) = oneshot::channel::<()>();
    let _scheduler_task = tokio::spawn(scheduler.run(async move {
        let _ = shutdown_rx.await;
    }));

    let task = value_task();
    let mut submitter = SchedulerClient::connect(&socket_path).await.unwrap();
    submitter.submit(&task).await.unwrap();

    let record = timeout(WAIT, async {
        let mut len_bytes = [0u8; 8];
        coordination_side.read_exact(&mut len_bytes).await.unwrap();
        let mut record = vec![0u8; u64::from_le_bytes(len_bytes) as usize];
        coordination_side.read_exact(&mut record).await.unwrap();
        record
    })
    .await
    .expect("no record arrived");

    let instance = decode_record(&record).unwrap();
    assert_eq!(instance.spec(), &task);
    assert_eq!(instance.status(), TaskStatus::Waiting);
    assert!(!instance.instance_id().is_nil());
}
