//! Background work queue for deferred storage mutations

use crate::error::{Result, StoreError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// A deferred unit of storage work
pub type Task = BoxFuture<'static, ()>;

/// Executes submitted tasks off the caller's thread, each exactly once.
pub trait WorkQueue: Send + Sync {
    /// Hand a task to the queue without waiting for it to run
    fn submit(&self, task: Task) -> Result<()>;
}

enum Job {
    Run(Task),
    Marker(oneshot::Sender<()>),
}

/// Backlog accepted by [`BackgroundQueue::spawn`]
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// FIFO [`WorkQueue`] served by a single Tokio worker task.
///
/// The backlog is bounded; `submit` fails with [`StoreError::QueueFull`]
/// instead of growing memory when the worker falls behind. The worker stops
/// once every handle to the queue has been dropped and the backlog is empty.
#[derive(Clone)]
pub struct BackgroundQueue {
    tx: mpsc::Sender<Job>,
}

impl BackgroundQueue {
    /// Start the worker with the default backlog. Must be called from within
    /// a Tokio runtime.
    pub fn spawn() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Start the worker holding at most `capacity` pending jobs
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(rx));
        Self { tx }
    }

    /// Wait until every task submitted before this call has finished
    pub async fn drain(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Marker(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

impl WorkQueue for BackgroundQueue {
    fn submit(&self, task: Task) -> Result<()> {
        self.tx.try_send(Job::Run(task)).map_err(|e| match e {
            TrySendError::Full(_) => StoreError::QueueFull,
            TrySendError::Closed(_) => StoreError::QueueClosed,
        })
    }
}

async fn run_worker(mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Run(task) => {
                if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                    error!("Background task panicked");
                }
            }
            Job::Marker(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Background queue stopped");
}
