//! Job scheduling
//!
//! Host-owned state (registries, dispatcher, config entries) is only touched
//! from jobs on the [`JobScheduler`] queue. Jobs run one at a time in the order
//! they were submitted, so callbacks arriving on foreign threads can hand work
//! off with [`JobScheduler::add_job`] without coordinating among themselves.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

type Job = BoxFuture<'static, ()>;

/// Errors from scheduler and executor jobs
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job scheduler is shut down")]
    Closed,

    #[error("executor job panicked: {0}")]
    Panicked(String),

    #[error("executor job was cancelled")]
    Cancelled,
}

pub type JobResult<T> = Result<T, JobError>;

/// Cooperative FIFO job queue plus a blocking executor
///
/// Cloning is cheap; every clone feeds the same queue.
#[derive(Debug, Clone)]
pub struct JobScheduler {
    tx: mpsc::UnboundedSender<Job>,
}

impl JobScheduler {
    /// Start the queue worker on the current tokio runtime.
    ///
    /// Must be called from within a runtime. The worker exits once every
    /// clone of the scheduler has been dropped. A panicking job is logged
    /// and the queue keeps running.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
                    error!("Job panicked: {}", panic_message(panic.as_ref()));
                }
            }
            debug!("Job scheduler stopped");
        });

        Self { tx }
    }

    /// Submit a fire-and-forget job
    ///
    /// Safe to call from any thread, including threads outside the runtime.
    pub fn add_job<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send(Box::pin(job)).is_err() {
            warn!("Dropping job submitted after scheduler shutdown");
        } else {
            trace!("Job queued");
        }
    }

    /// Run a blocking function on the executor and await its result
    ///
    /// Use this for synchronous network or file I/O; never block inside a job.
    pub async fn async_add_executor_job<F, R>(&self, f: F) -> JobResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        tokio::task::spawn_blocking(f).await.map_err(|e| {
            if e.is_panic() {
                JobError::Panicked(e.to_string())
            } else {
                JobError::Cancelled
            }
        })
    }

    /// Wait until every job queued before this call has finished
    ///
    /// Must not be awaited from inside a job, as the marker would queue
    /// behind the job awaiting it.
    pub async fn block_till_done(&self) -> JobResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Box::pin(async move {
                let _ = done_tx.send(());
            }))
            .map_err(|_| JobError::Closed)?;
        done_rx.await.map_err(|_| JobError::Closed)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
