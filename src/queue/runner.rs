//! Leases jobs and hands them to registered workers.
//!
//! One loop per logical queue, each bounded by a semaphore sized to the
//! queue's concurrency. On cancellation the loops stop leasing, in-flight
//! handlers see a cancelled token, and `run` returns once every permit is
//! back.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::queue::{JobArgs, JobKind, JobQueue, JobRow, JobState, QueueName};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const RESCUE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const RESCUE_GRACE: Duration = Duration::from_secs(60);

/// A leased job with its decoded arguments.
#[derive(Debug, Clone)]
pub struct Job {
    pub row: JobRow,
    pub args: JobArgs,
}

/// Handler for one job kind.
#[async_trait]
pub trait Worker: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Hard limit for one run of the handler.
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Do the work. Returned jobs are enqueued in the same transaction
    /// that marks this one completed.
    async fn work(&self, cancel: &CancellationToken, job: &Job) -> Result<Vec<JobArgs>>;
}

/// Job kinds bound to their handlers at start-up.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<JobKind, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a worker to its kind, replacing any earlier binding.
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.kind(), worker);
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn Worker>> {
        self.workers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<JobKind> {
        let mut kinds: Vec<JobKind> = self.workers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Longest handler timeout, which bounds how long a lease may last.
    pub fn max_timeout(&self) -> Duration {
        self.workers
            .values()
            .map(|w| w.timeout())
            .max()
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Runner {
    queue: JobQueue,
    registry: Arc<WorkerRegistry>,
    poll_interval: Duration,
    rate_limit_snooze: Duration,
}

impl Runner {
    pub fn new(queue: JobQueue, registry: Arc<WorkerRegistry>) -> Self {
        Self {
            queue,
            registry,
            poll_interval: Duration::from_secs(1),
            rate_limit_snooze: Duration::from_secs(30),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Process jobs on every queue until `cancel` fires, then drain.
    pub async fn run(&self, cancel: CancellationToken) {
        // Only one runner exists per database, so anything still marked
        // running was orphaned by a previous process.
        if let Err(e) = self.queue.rescue_stuck(Duration::ZERO).await {
            log::error!("Failed to rescue orphaned jobs: {e}");
        }
        log::info!("Job runner started with workers {:?}", self.registry.kinds());

        let loops = QueueName::ALL
            .iter()
            .map(|&name| self.run_queue(name, cancel.clone()));
        futures::join!(join_all(loops), self.run_rescue(cancel.clone()));
        log::info!("Job runner stopped");
    }

    async fn run_queue(&self, name: QueueName, cancel: CancellationToken) {
        let slots = name.concurrency();
        let semaphore = Arc::new(Semaphore::new(slots));

        while !cancel.is_cancelled() {
            let free = semaphore.available_permits();
            let jobs = if free == 0 {
                Vec::new()
            } else {
                self.queue.lease(name, free).await.unwrap_or_else(|e| {
                    log::error!("Failed to lease from {name}: {e}");
                    Vec::new()
                })
            };

            let idle = jobs.is_empty();
            for row in jobs {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let runner = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = runner.execute(row, &cancel).await {
                        log::error!("Failed to record job outcome: {e}");
                    }
                    drop(permit);
                });
            }

            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        // Wait for in-flight handlers to hand their permits back.
        let _ = semaphore.acquire_many(slots as u32).await;
        log::debug!("Queue {name} drained");
    }

    async fn run_rescue(&self, cancel: CancellationToken) {
        let lease = self.registry.max_timeout() + RESCUE_GRACE;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(RESCUE_INTERVAL) => {}
            }
            if let Err(e) = self.queue.rescue_stuck(lease).await {
                log::error!("Failed to rescue stuck jobs: {e}");
            }
        }
    }

    /// Run one leased job and record its outcome. Returns the job's new state.
    pub async fn execute(&self, row: JobRow, cancel: &CancellationToken) -> Result<JobState> {
        let args = match row.decode_args() {
            Ok(args) => args,
            Err(e) => {
                log::error!("Discarding job {} with undecodable args {}: {e}", row.id, row.args);
                self.queue.discard(&row, &e.to_string()).await?;
                return Ok(JobState::Discarded);
            }
        };
        let Some(worker) = self.registry.get(args.kind()) else {
            log::warn!("No worker registered for {}, discarding job {}", args.kind(), row.id);
            self.queue
                .discard(&row, &format!("no worker registered for {}", args.kind()))
                .await?;
            return Ok(JobState::Discarded);
        };

        let job = Job { row, args };
        let id = job.row.id;
        let kind = job.args.kind();
        let child = cancel.child_token();
        let started = Instant::now();
        log::debug!("Job {id} ({kind}) started, attempt {}", job.row.attempts);

        let outcome = tokio::time::timeout(
            worker.timeout(),
            AssertUnwindSafe(worker.work(&child, &job)).catch_unwind(),
        )
        .await;
        child.cancel();

        match outcome {
            Ok(Ok(Ok(follow_ups))) => {
                self.queue.complete(id, &follow_ups).await?;
                log::info!(
                    "Job {id} ({kind}) completed in {:.1}s, {} follow-ups",
                    started.elapsed().as_secs_f64(),
                    follow_ups.len()
                );
                Ok(JobState::Completed)
            }
            Ok(Ok(Err(e))) if e.is_rate_limited() => {
                log::info!("Job {id} ({kind}) rate limited, snoozing: {e}");
                self.queue.snooze(id, self.rate_limit_snooze).await?;
                Ok(JobState::Available)
            }
            Ok(Ok(Err(AppError::Cancelled))) if cancel.is_cancelled() => {
                log::info!("Job {id} ({kind}) interrupted by shutdown");
                self.queue.snooze(id, Duration::ZERO).await?;
                Ok(JobState::Available)
            }
            Ok(Ok(Err(e))) => {
                log::warn!("Job {id} ({kind}) failed: {e}");
                self.queue.retry(&job.row, &e.to_string()).await
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                log::error!("Job {id} ({kind}) panicked: {message}; args: {}", job.row.args);
                self.queue.retry(&job.row, &format!("panic: {message}")).await
            }
            Err(_) => {
                let e = AppError::Timeout(format!("{kind} exceeded {:?}", worker.timeout()));
                log::warn!("Job {id} ({kind}) {e}");
                self.queue.retry(&job.row, &e.to_string()).await
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
