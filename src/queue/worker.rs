//! Stage worker: claims jobs of one kind and runs them through a handler.
//!
//! A worker owns a polling task. Each claimed job runs in its own task,
//! bounded by a semaphore. An optional `governor` limiter caps how many jobs
//! are claimed per minute; it is shared behind an `Arc` so it can outlive a
//! worker restart. Closing a worker stops claiming and waits for in-flight
//! jobs.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::{FailOutcome, Job, JobKind, JobQueue};
use crate::config::QueueConfig;
use crate::error::Result;

/// Runs the work of one stage.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<()>;
}

/// How a worker polls and paces its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPolicy {
    /// Jobs running at once
    pub concurrency: usize,
    /// Ceiling on claims per 60 seconds
    pub per_minute: Option<NonZeroU32>,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
}

impl WorkerPolicy {
    /// Search stage: bounded concurrency, no throughput cap.
    pub fn search(config: &QueueConfig) -> Self {
        Self {
            concurrency: config.search_concurrency(),
            per_minute: None,
            poll_interval: config.poll_interval(),
        }
    }

    /// Download stage: one at a time, capped per minute.
    pub fn download(config: &QueueConfig) -> Self {
        Self {
            concurrency: 1,
            per_minute: Some(config.downloads_per_minute()),
            poll_interval: config.poll_interval(),
        }
    }
}

pub type DirectLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Claim limiter shared across the workers of one stage.
pub type Pacer = Arc<DirectLimiter>;

/// Strict limiter: at most `per_minute` cells in any 60 second window.
fn strict_limiter(per_minute: NonZeroU32) -> DirectLimiter {
    let quota = Quota::with_period(Duration::from_secs(60) / per_minute.get())
        .unwrap_or_else(|| Quota::per_minute(per_minute))
        .allow_burst(NonZeroU32::MIN);
    RateLimiter::direct(quota)
}

/// Fresh pacer for a ceiling, or None when the stage is unpaced.
pub fn pacer(per_minute: Option<NonZeroU32>) -> Option<Pacer> {
    per_minute.map(|n| Arc::new(strict_limiter(n)))
}

/// A running stage worker.
pub struct Worker {
    kind: JobKind,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn the polling task with a pacer of its own.
    pub fn start(
        queue: JobQueue,
        kind: JobKind,
        policy: WorkerPolicy,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self::start_paced(queue, kind, policy, pacer(policy.per_minute), handler)
    }

    /// Spawn the polling task, claiming through `pacer`.
    ///
    /// `policy.per_minute` is only logged; the pacer alone decides the pace.
    pub fn start_paced(
        queue: JobQueue,
        kind: JobKind,
        policy: WorkerPolicy,
        pacer: Option<Pacer>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        tracing::info!(
            target: "queue::worker",
            stage = %kind,
            concurrency = policy.concurrency,
            per_minute = policy.per_minute.map(NonZeroU32::get),
            "Worker started"
        );
        let handle = tokio::spawn(run(queue, kind, policy, pacer, handler, shutdown_rx));
        Self {
            kind,
            shutdown,
            handle,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Stop claiming, wait for in-flight jobs, return.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(target: "queue::worker", stage = %self.kind, "Worker task failed: {}", e);
        }
        tracing::info!(target: "queue::worker", stage = %self.kind, "Worker closed");
    }
}

async fn run(
    queue: JobQueue,
    kind: JobKind,
    policy: WorkerPolicy,
    limiter: Option<Pacer>,
    handler: Arc<dyn JobHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(policy.concurrency.max(1)));
    let signal = queue.signal();
    let mut in_flight = JoinSet::new();

    loop {
        if *shutdown.borrow() {
            break;
        }
        while let Some(done) = in_flight.try_join_next() {
            if let Err(e) = done {
                tracing::error!(target: "queue::worker", stage = %kind, "Job task panicked: {}", e);
            }
        }

        let permit = tokio::select! {
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown.changed() => break,
        };

        match queue.has_ready(kind).await {
            Ok(true) => {}
            Ok(false) => {
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(policy.poll_interval) => {}
                    _ = signal.notified() => {}
                    _ = shutdown.changed() => break,
                }
                continue;
            }
            Err(e) => {
                tracing::warn!(target: "queue::worker", stage = %kind, "Failed to poll queue: {}", e);
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(policy.poll_interval) => {}
                    _ = shutdown.changed() => break,
                }
                continue;
            }
        }

        if let Some(limiter) = &limiter {
            tokio::select! {
                _ = limiter.until_ready() => {}
                _ = shutdown.changed() => break,
            }
        }

        match queue.claim(kind).await {
            Ok(Some(job)) => {
                tracing::debug!(
                    target: "queue::worker",
                    job_id = %job.id,
                    attempt = job.attempts_made,
                    "Claimed job"
                );
                let queue = queue.clone();
                let handler = Arc::clone(&handler);
                in_flight.spawn(async move {
                    execute(&queue, handler.as_ref(), job).await;
                    drop(permit);
                });
            }
            // Another worker got there first
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(target: "queue::worker", stage = %kind, "Failed to claim job: {}", e);
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            tracing::error!(target: "queue::worker", stage = %kind, "Job task panicked: {}", e);
        }
    }
}

async fn execute(queue: &JobQueue, handler: &dyn JobHandler, job: Job) {
    match handler.handle(&job).await {
        Ok(()) => {
            if let Err(e) = queue.complete(&job.id).await {
                tracing::warn!(target: "queue::worker", job_id = %job.id, "Failed to complete job: {}", e);
            }
        }
        Err(error) => match queue.fail(&job, &error).await {
            Ok(FailOutcome::Retrying { delay_ms }) => {
                tracing::warn!(
                    target: "queue::worker",
                    job_id = %job.id,
                    attempt = job.attempts_made,
                    delay_ms,
                    "Job failed, retrying: {}",
                    error
                );
            }
            Ok(FailOutcome::Failed) => {
                tracing::warn!(
                    target: "queue::worker",
                    job_id = %job.id,
                    attempt = job.attempts_made,
                    "Job failed permanently: {}",
                    error
                );
            }
            Err(e) => {
                tracing::error!(target: "queue::worker", job_id = %job.id, "Failed to record job failure: {}", e);
            }
        },
    }
}
