//! Supervised worker pool for inbound triggers.
//!
//! Jobs go through a bounded queue to a fixed set of workers. Every job's
//! outcome, including a panic, reaches its [`JobHandle`] and the pool's
//! counters, so nothing submitted here is silently lost.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

type Job = BoxFuture<'static, ()>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Job queue is full")]
    QueueFull,
    #[error("Worker pool is shut down")]
    Closed,
    #[error("Job panicked: {0}")]
    Panicked(String),
    #[error("Job was dropped before completing")]
    Lost,
}

#[derive(Debug, Default)]
struct PoolStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    pub rejected: u64,
}

/// Resolves to the job's own result, or to a [`JobError`] when the job
/// panicked or never ran.
#[derive(Debug)]
pub struct JobHandle<T> {
    label: String,
    rx: oneshot::Receiver<Result<T, JobError>>,
}

impl<T> JobHandle<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn join(self) -> Result<T, JobError> {
        self.rx.await.unwrap_or(Err(JobError::Lost))
    }
}

pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(queue_depth.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                    debug!("Worker {id} stopped");
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            stats: Arc::new(PoolStats::default()),
        }
    }

    /// Queues `job` without waiting. A full queue is reported back to the
    /// caller instead of blocking the trigger that produced the job.
    pub fn submit<F, T, E>(&self, label: impl Into<String>, job: F) -> Result<JobHandle<Result<T, E>>, JobError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let label = label.into();
        let sender = self.sender.as_ref().ok_or(JobError::Closed)?;
        let (tx, rx) = oneshot::channel();
        let stats = Arc::clone(&self.stats);
        let job_label = label.clone();

        let wrapped: Job = async move {
            let outcome = AssertUnwindSafe(job).catch_unwind().await;
            let reply = match outcome {
                Ok(Ok(value)) => {
                    stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    Ok(Ok(value))
                }
                Ok(Err(e)) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Job {job_label} failed: {e}");
                    Ok(Err(e))
                }
                Err(panic) => {
                    stats.panicked.fetch_add(1, Ordering::Relaxed);
                    let message = panic_message(panic.as_ref());
                    error!("Job {job_label} panicked: {message}");
                    Err(JobError::Panicked(message))
                }
            };
            // The submitter may have dropped its handle.
            let _ = tx.send(reply);
        }
        .boxed();

        match sender.try_send(wrapped) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(JobHandle { label, rx })
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Rejected job {label}: queue full");
                Err(JobError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(JobError::Closed),
        }
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            panicked: self.stats.panicked.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting jobs, lets queued ones finish and waits for the
    /// workers.
    pub async fn shutdown(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                error!("Worker exited abnormally: {e}");
            }
        }
        info!("Worker pool stopped: {:?}", self.stats());
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_job_result_reaches_handle() {
        let pool = WorkerPool::new(2, 8);
        let handle = pool
            .submit("add", async { Ok::<_, String>(2 + 2) })
            .unwrap();
        assert_eq!(handle.join().await, Ok(Ok(4)));

        let failing = pool
            .submit("fail", async { Err::<(), _>("boom".to_string()) })
            .unwrap();
        assert_eq!(failing.join().await, Ok(Err("boom".to_string())));

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_panic_is_observed_and_counted() {
        let pool = WorkerPool::new(1, 8);
        let handle = pool
            .submit("panics", async {
                if true {
                    panic!("worker blew up");
                }
                Ok::<(), String>(())
            })
            .unwrap();

        assert_eq!(
            handle.join().await,
            Err(JobError::Panicked("worker blew up".to_string()))
        );

        // The worker survives the panic.
        let next = pool.submit("after", async { Ok::<_, String>(1) }).unwrap();
        assert_eq!(next.join().await, Ok(Ok(1)));
        assert_eq!(pool.stats().panicked, 1);
        assert_eq!(pool.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let pool = WorkerPool::new(1, 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocker = pool
            .submit("blocker", async move {
                let _ = release_rx.await;
                Ok::<(), String>(())
            })
            .unwrap();
        // Let the worker pick up the blocker so the queue slot frees.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let queued = pool.submit("queued", async { Ok::<(), String>(()) }).unwrap();
        let rejected = pool.submit("rejected", async { Ok::<(), String>(()) });
        assert_eq!(rejected.unwrap_err(), JobError::QueueFull);
        assert_eq!(pool.stats().rejected, 1);

        release_tx.send(()).unwrap();
        assert_eq!(blocker.join().await, Ok(Ok(())));
        assert_eq!(queued.join().await, Ok(Ok(())));
        pool.shutdown().await;
    }
}
