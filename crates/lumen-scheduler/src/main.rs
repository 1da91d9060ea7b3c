//! lumen-scheduler daemon binary.
//!
//! Wires the scheduler to its collaborators: binds the listening
//! socket, connects to the coordination service and the object store's
//! notification socket, then runs the dispatch loop until SIGTERM or
//! SIGINT. All state is constructed here and passed down explicitly;
//! shutdown releases the listener, open connections, and adapter
//! handles on every exit path.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use lumen_scheduler::{LocalScheduler, ObjectFeed, RemoteTaskLog, SchedulerConfig};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Per-node local task scheduler.
#[derive(Parser, Debug)]
#[command(name = "lumen-scheduler", version, about, long_about = None)]
struct Args {
    /// Path of the Unix socket to listen on for worker and client
    /// connections
    #[arg(short = 's', value_name = "SOCKET_PATH")]
    socket_path: PathBuf,

    /// Address of the coordination service, e.g. 127.0.0.1:6379
    #[arg(short = 'r', value_name = "HOST:PORT")]
    coordination_addr: String,

    /// Path of the local object store's notification socket
    #[arg(short = 'p', value_name = "SOCKET_PATH")]
    object_store_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = SchedulerConfig::new(
        args.socket_path,
        args.coordination_addr,
        args.object_store_path,
    )
    .context("invalid configuration")?;

    let task_log = RemoteTaskLog::connect(&config.coordination_addr)
        .await
        .with_context(|| {
            format!(
                "failed to connect to coordination service at {}",
                config.coordination_addr
            )
        })?;
    let feed = ObjectFeed::connect(&config.object_store_path)
        .await
        .with_context(|| {
            format!(
                "failed to connect to object store at {}",
                config.object_store_path.display()
            )
        })?;

    let scheduler = LocalScheduler::bind(&config.socket_path, Box::new(task_log))?;
    let _feed_task = feed.spawn(scheduler.event_sender());

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    };

    scheduler.run(shutdown).await?;
    Ok(())
}
