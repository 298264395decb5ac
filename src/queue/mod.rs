//! Durable job queue backed by the relational store.
//!
//! Jobs move through these states:
//!
//! ```text
//! available ──lease──▶ running ──complete──▶ completed
//!     ▲                   │
//!     │ snooze            ├──retry──▶ retryable ──lease──▶ running
//!     └───────────────────┤
//!                         └──discard──▶ discarded
//! ```
//!
//! `cancel` finalizes any job that has not finished yet. Leasing is a single
//! `UPDATE ... RETURNING` statement so a job is handed to at most one worker.

pub mod periodic;
pub mod runner;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, SqliteConnection};

use crate::error::{AppError, Result};
use crate::models::Site;
use crate::storage::{Store, json_list};

pub use periodic::{PeriodicJob, Schedule, periodic_jobs};
pub use runner::{Job, Runner, Worker, WorkerRegistry};

/// Attempts before a failing job is discarded.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

const MAX_BACKOFF_SECS: u64 = 3600;

/// Logical queue a job runs on; each has its own handler concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Default,
    Priority,
    Rgl,
    Steam,
    Etf2l,
    Logstf,
    Sourcebans,
}

impl QueueName {
    pub const ALL: &'static [QueueName] = &[
        QueueName::Default,
        QueueName::Priority,
        QueueName::Rgl,
        QueueName::Steam,
        QueueName::Etf2l,
        QueueName::Logstf,
        QueueName::Sourcebans,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::Default => "default",
            QueueName::Priority => "priority",
            QueueName::Rgl => "rgl",
            QueueName::Steam => "steam",
            QueueName::Etf2l => "etf2l",
            QueueName::Logstf => "logstf",
            QueueName::Sourcebans => "sourcebans",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|q| q.as_str() == s)
    }

    /// Maximum handlers running at once on this queue.
    pub fn concurrency(self) -> usize {
        match self {
            QueueName::Default => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower values are leased first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    RealTime = 1,
    High = 2,
    Normal = 3,
    Slow = 4,
}

impl Priority {
    fn from_i64(value: i64) -> Self {
        match value {
            1 => Priority::RealTime,
            2 => Priority::High,
            4 => Priority::Slow,
            _ => Priority::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Available,
    Running,
    Completed,
    Retryable,
    Cancelled,
    Discarded,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Available => "available",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Retryable => "retryable",
            JobState::Cancelled => "cancelled",
            JobState::Discarded => "discarded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "available" => JobState::Available,
            "running" => JobState::Running,
            "completed" => JobState::Completed,
            "retryable" => JobState::Retryable,
            "cancelled" => JobState::Cancelled,
            "discarded" => JobState::Discarded,
            _ => return None,
        })
    }
}

/// Every kind of work the service knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    Serveme,
    SteamSummary,
    SteamServers,
    BdLists,
    RglBans,
    RglSeason,
    Etf2lBans,
    SourceBans,
    SourceBansSite,
    LogsTf,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Serveme => "serveme",
            JobKind::SteamSummary => "steam_summary",
            JobKind::SteamServers => "steam_servers",
            JobKind::BdLists => "bd_lists",
            JobKind::RglBans => "rgl_bans",
            JobKind::RglSeason => "rgl_season",
            JobKind::Etf2lBans => "etf2l_bans",
            JobKind::SourceBans => "sourcebans",
            JobKind::SourceBansSite => "sourcebans_site",
            JobKind::LogsTf => "logstf",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of a job. The encoded form is what the `args` column stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobArgs {
    Serveme,
    SteamSummary,
    SteamServers,
    BdLists,
    RglBans,
    RglSeason { start: i64 },
    #[serde(rename = "etf2l_bans")]
    Etf2lBans,
    #[serde(rename = "sourcebans")]
    SourceBans,
    #[serde(rename = "sourcebans_site")]
    SourceBansSite { site: Site },
    #[serde(rename = "logstf")]
    LogsTf,
}

impl JobArgs {
    pub fn kind(&self) -> JobKind {
        match self {
            JobArgs::Serveme => JobKind::Serveme,
            JobArgs::SteamSummary => JobKind::SteamSummary,
            JobArgs::SteamServers => JobKind::SteamServers,
            JobArgs::BdLists => JobKind::BdLists,
            JobArgs::RglBans => JobKind::RglBans,
            JobArgs::RglSeason { .. } => JobKind::RglSeason,
            JobArgs::Etf2lBans => JobKind::Etf2lBans,
            JobArgs::SourceBans => JobKind::SourceBans,
            JobArgs::SourceBansSite { .. } => JobKind::SourceBansSite,
            JobArgs::LogsTf => JobKind::LogsTf,
        }
    }

    /// Queue and priority used when the caller does not override them.
    pub fn default_opts(&self) -> InsertOpts {
        let (queue, priority) = match self.kind() {
            JobKind::Serveme | JobKind::BdLists => (QueueName::Default, Priority::Normal),
            JobKind::SteamSummary => (QueueName::Steam, Priority::High),
            JobKind::SteamServers => (QueueName::Steam, Priority::Normal),
            JobKind::RglBans | JobKind::RglSeason => (QueueName::Rgl, Priority::Slow),
            JobKind::Etf2lBans => (QueueName::Etf2l, Priority::Slow),
            JobKind::SourceBans | JobKind::SourceBansSite => {
                (QueueName::Sourcebans, Priority::Slow)
            }
            JobKind::LogsTf => (QueueName::Logstf, Priority::Slow),
        };
        InsertOpts {
            queue: Some(queue),
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Per-insert overrides. Unset fields fall back to [`JobArgs::default_opts`].
#[derive(Debug, Clone, Default)]
pub struct InsertOpts {
    pub queue: Option<QueueName>,
    pub priority: Option<Priority>,
    pub max_attempts: Option<i32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Skip the insert when the same args were enqueued within the same
    /// window of this length.
    pub unique_period: Option<Duration>,
}

impl InsertOpts {
    fn or(self, fallback: InsertOpts) -> InsertOpts {
        InsertOpts {
            queue: self.queue.or(fallback.queue),
            priority: self.priority.or(fallback.priority),
            max_attempts: self.max_attempts.or(fallback.max_attempts),
            scheduled_at: self.scheduled_at.or(fallback.scheduled_at),
            unique_period: self.unique_period.or(fallback.unique_period),
        }
    }
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub attempt: i32,
    pub at: DateTime<Utc>,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub kind: String,
    pub queue: QueueName,
    pub priority: Priority,
    /// Encoded [`JobArgs`]
    pub args: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub state: JobState,
    pub scheduled_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub unique_key: Option<String>,
    pub errors: Vec<JobError>,
    pub created_at: DateTime<Utc>,
}

impl JobRow {
    pub fn decode_args(&self) -> Result<JobArgs> {
        serde_json::from_str(&self.args).map_err(|e| AppError::parse("job args", e))
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let queue: String = row.try_get("queue")?;
        let state: String = row.try_get("state")?;
        let errors: String = row.try_get("errors")?;
        Ok(Self {
            id: row.try_get("job_id")?,
            kind: row.try_get("kind")?,
            queue: QueueName::parse(&queue)
                .ok_or_else(|| AppError::Queue(format!("unknown queue {queue}")))?,
            priority: Priority::from_i64(row.try_get("priority")?),
            args: row.try_get("args")?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            state: JobState::parse(&state)
                .ok_or_else(|| AppError::Queue(format!("unknown state {state}")))?,
            scheduled_at: row.try_get("scheduled_at")?,
            attempted_at: row.try_get("attempted_at")?,
            finalized_at: row.try_get("finalized_at")?,
            unique_key: row.try_get("unique_key")?,
            errors: json_list(&errors),
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Deterministic part of the retry delay: `attempt⁴` seconds, capped at an hour.
pub fn backoff_base(attempt: i32) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_secs(attempt.saturating_pow(4).min(MAX_BACKOFF_SECS))
}

/// Retry delay with up to 10% jitter.
pub fn backoff(attempt: i32) -> Duration {
    let base = backoff_base(attempt);
    let jitter_ms = (base.as_millis() / 10) as u64;
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ms)
    };
    base + Duration::from_millis(jitter)
}

fn unique_key(encoded: &str, period: Duration, now: DateTime<Utc>) -> String {
    let bucket = now.timestamp() / period.as_secs().max(1) as i64;
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    hasher.update(b"|");
    hasher.update(bucket.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn add(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

/// Insert a job on an existing connection or transaction. Returns `None`
/// when a unique job for the same window already exists.
pub async fn enqueue_in_tx(
    conn: &mut SqliteConnection,
    args: &JobArgs,
    opts: InsertOpts,
) -> Result<Option<i64>> {
    let now = Utc::now();
    let opts = opts.or(args.default_opts());
    let encoded = args.encode()?;
    let key = opts.unique_period.map(|p| unique_key(&encoded, p, now));

    let result = sqlx::query(
        "INSERT INTO job (kind, queue, priority, args, max_attempts, state, scheduled_at, unique_key, created_at)
         VALUES (?, ?, ?, ?, ?, 'available', ?, ?, ?)
         ON CONFLICT (unique_key) DO NOTHING",
    )
    .bind(args.kind().as_str())
    .bind(opts.queue.unwrap_or(QueueName::Default).as_str())
    .bind(opts.priority.unwrap_or(Priority::Normal) as i64)
    .bind(&encoded)
    .bind(opts.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS))
    .bind(opts.scheduled_at.unwrap_or(now))
    .bind(key)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        log::debug!("Skipped duplicate {} job", args.kind());
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

/// Handle over the `job` table.
#[derive(Debug, Clone)]
pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    pub fn new(store: &Store) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    pub async fn enqueue(&self, args: &JobArgs, opts: InsertOpts) -> Result<Option<i64>> {
        let mut conn = self.pool.acquire().await?;
        enqueue_in_tx(&mut conn, args, opts).await
    }

    /// Claim up to `limit` due jobs of `queue`, highest priority first.
    pub async fn lease(&self, queue: QueueName, limit: usize) -> Result<Vec<JobRow>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let rows = sqlx::query(
            "UPDATE job SET state = 'running', attempts = attempts + 1, attempted_at = ?
             WHERE job_id IN (
                SELECT job_id FROM job
                WHERE queue = ? AND state IN ('available', 'retryable') AND scheduled_at <= ?
                ORDER BY priority, scheduled_at, job_id
                LIMIT ?
             )
             RETURNING *",
        )
        .bind(now)
        .bind(queue.as_str())
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = rows.iter().map(JobRow::from_row).collect::<Result<Vec<_>>>()?;
        jobs.sort_by_key(|j| (j.priority, j.scheduled_at, j.id));
        Ok(jobs)
    }

    /// Finish a running job and enqueue its follow-ups in the same transaction.
    pub async fn complete(&self, id: i64, follow_ups: &[JobArgs]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query(
            "UPDATE job SET state = 'completed', finalized_at = ?
             WHERE job_id = ? AND state = 'running'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if done.rows_affected() == 0 {
            return Err(AppError::Queue(format!("job {id} is not running")));
        }

        for args in follow_ups {
            enqueue_in_tx(&mut tx, args, InsertOpts::default()).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Record a failure. The job is rescheduled with backoff, or discarded
    /// once it has used all its attempts. Returns the new state.
    pub async fn retry(&self, job: &JobRow, error: &str) -> Result<JobState> {
        if job.attempts >= job.max_attempts {
            self.discard(job, error).await?;
            return Ok(JobState::Discarded);
        }
        let now = Utc::now();
        sqlx::query(
            "UPDATE job SET state = 'retryable', scheduled_at = ?,
                errors = json_insert(errors, '$[#]', json(?))
             WHERE job_id = ?",
        )
        .bind(add(now, backoff(job.attempts)))
        .bind(error_json(job.attempts, now, error)?)
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(JobState::Retryable)
    }

    pub async fn discard(&self, job: &JobRow, error: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE job SET state = 'discarded', finalized_at = ?,
                errors = json_insert(errors, '$[#]', json(?))
             WHERE job_id = ?",
        )
        .bind(now)
        .bind(error_json(job.attempts, now, error)?)
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Put a running job back without consuming the attempt it was leased with.
    pub async fn snooze(&self, id: i64, delay: Duration) -> Result<()> {
        sqlx::query(
            "UPDATE job SET state = 'available', attempts = MAX(attempts - 1, 0), scheduled_at = ?
             WHERE job_id = ? AND state = 'running'",
        )
        .bind(add(Utc::now(), delay))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cancel a job that has not finished. Returns false if it already had.
    pub async fn cancel(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE job SET state = 'cancelled', finalized_at = ?
             WHERE job_id = ? AND state IN ('available', 'retryable', 'running')",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return jobs whose lease is older than `older_than` to the queue.
    /// Jobs out of attempts are discarded instead.
    pub async fn rescue_stuck(&self, older_than: Duration) -> Result<u64> {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let note = error_json(0, now, "rescued after exceeding its lease")?;
        let mut tx = self.pool.begin().await?;

        let discarded = sqlx::query(
            "UPDATE job SET state = 'discarded', finalized_at = ?,
                errors = json_insert(errors, '$[#]', json(?))
             WHERE state = 'running' AND attempted_at <= ? AND attempts >= max_attempts",
        )
        .bind(now)
        .bind(&note)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let rescued = sqlx::query(
            "UPDATE job SET state = 'retryable', scheduled_at = ?,
                errors = json_insert(errors, '$[#]', json(?))
             WHERE state = 'running' AND attempted_at <= ?",
        )
        .bind(now)
        .bind(&note)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let total = discarded.rows_affected() + rescued.rows_affected();
        if total > 0 {
            log::warn!(
                "Rescued {} stuck jobs, discarded {}",
                rescued.rows_affected(),
                discarded.rows_affected()
            );
        }
        Ok(total)
    }

    pub async fn job_get(&self, id: i64) -> Result<Option<JobRow>> {
        let row = sqlx::query("SELECT * FROM job WHERE job_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(JobRow::from_row).transpose()
    }

    pub async fn jobs_by_state(&self, state: JobState) -> Result<Vec<JobRow>> {
        let rows = sqlx::query("SELECT * FROM job WHERE state = ? ORDER BY job_id")
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(JobRow::from_row).collect()
    }
}

fn error_json(attempt: i32, at: DateTime<Utc>, error: &str) -> Result<String> {
    Ok(serde_json::to_string(&JobError {
        attempt,
        at,
        error: error.to_string(),
    })?)
}

#[cfg(test)]
mod tests {
    use crate::storage::test_store;

    use super::*;

    async fn queue() -> JobQueue {
        JobQueue::new(&test_store().await)
    }

    #[test]
    fn args_encoding_is_tagged() {
        let args = JobArgs::RglSeason { start: 12 };
        assert_eq!(args.encode().unwrap(), r#"{"kind":"rgl_season","start":12}"#);
        assert_eq!(JobArgs::LogsTf.encode().unwrap(), r#"{"kind":"logstf"}"#);

        let site = JobArgs::SourceBansSite { site: Site::Skial };
        let back: JobArgs = serde_json::from_str(&site.encode().unwrap()).unwrap();
        assert_eq!(back.kind(), JobKind::SourceBansSite);
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_base(1), Duration::from_secs(1));
        assert_eq!(backoff_base(2), Duration::from_secs(16));
        assert_eq!(backoff_base(3), Duration::from_secs(81));
        assert_eq!(backoff_base(10), Duration::from_secs(3600));
        for attempt in 1..6 {
            let delay = backoff(attempt);
            let base = backoff_base(attempt);
            assert!(delay >= base && delay <= base + base / 10);
        }
    }

    #[test]
    fn unique_key_changes_with_window() {
        let period = Duration::from_secs(60);
        let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let same = DateTime::from_timestamp(1_700_000_010, 0).unwrap();
        let later = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        assert_eq!(unique_key("a", period, t), unique_key("a", period, same));
        assert_ne!(unique_key("a", period, t), unique_key("a", period, later));
        assert_ne!(unique_key("a", period, t), unique_key("b", period, t));
    }

    #[tokio::test]
    async fn unique_jobs_are_enqueued_once_per_window() {
        let q = queue().await;
        let opts = || InsertOpts {
            unique_period: Some(Duration::from_secs(3600)),
            ..Default::default()
        };
        assert!(q.enqueue(&JobArgs::BdLists, opts()).await.unwrap().is_some());
        assert!(q.enqueue(&JobArgs::BdLists, opts()).await.unwrap().is_none());
        // Without a period every insert is distinct.
        assert!(q.enqueue(&JobArgs::BdLists, InsertOpts::default()).await.unwrap().is_some());
        assert_eq!(q.jobs_by_state(JobState::Available).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn enqueue_in_tx_follows_the_caller_transaction() {
        let q = queue().await;

        let mut tx = q.pool.begin().await.unwrap();
        let id = enqueue_in_tx(&mut *tx, &JobArgs::BdLists, InsertOpts::default())
            .await
            .unwrap();
        assert!(id.is_some());
        tx.rollback().await.unwrap();
        assert!(q.jobs_by_state(JobState::Available).await.unwrap().is_empty());

        let mut tx = q.pool.begin().await.unwrap();
        let id = enqueue_in_tx(&mut *tx, &JobArgs::BdLists, InsertOpts::default())
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();
        let jobs = q.jobs_by_state(JobState::Available).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].kind, JobKind::BdLists.as_str());
    }

    #[tokio::test]
    async fn lease_orders_by_priority_and_respects_schedule() {
        let q = queue().await;
        let slow = q
            .enqueue(&JobArgs::BdLists, InsertOpts {
                priority: Some(Priority::Slow),
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        let urgent = q
            .enqueue(&JobArgs::Serveme, InsertOpts {
                priority: Some(Priority::RealTime),
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        q.enqueue(&JobArgs::Serveme, InsertOpts {
            scheduled_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        })
        .await
        .unwrap();

        let leased = q.lease(QueueName::Default, 10).await.unwrap();
        assert_eq!(leased.iter().map(|j| j.id).collect::<Vec<_>>(), vec![urgent, slow]);
        assert!(leased.iter().all(|j| j.state == JobState::Running && j.attempts == 1));

        // Nothing left that is due, and other queues are untouched.
        assert!(q.lease(QueueName::Default, 10).await.unwrap().is_empty());
        assert!(q.lease(QueueName::Steam, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn complete_enqueues_follow_ups() {
        let q = queue().await;
        let id = q.enqueue(&JobArgs::SourceBans, InsertOpts::default()).await.unwrap().unwrap();
        let job = q.lease(QueueName::Sourcebans, 1).await.unwrap().remove(0);
        assert_eq!(job.decode_args().unwrap(), JobArgs::SourceBans);

        let follow = [
            JobArgs::SourceBansSite { site: Site::Skial },
            JobArgs::SourceBansSite { site: Site::Gfl },
        ];
        q.complete(id, &follow).await.unwrap();
        assert_eq!(q.job_get(id).await.unwrap().unwrap().state, JobState::Completed);
        assert_eq!(q.jobs_by_state(JobState::Available).await.unwrap().len(), 2);

        // Completing twice is refused.
        assert!(q.complete(id, &[]).await.is_err());
    }

    #[tokio::test]
    async fn retry_then_discard_after_max_attempts() {
        let q = queue().await;
        let id = q
            .enqueue(&JobArgs::Serveme, InsertOpts {
                max_attempts: Some(2),
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();

        let job = q.lease(QueueName::Default, 1).await.unwrap().remove(0);
        assert_eq!(q.retry(&job, "boom").await.unwrap(), JobState::Retryable);
        let stored = q.job_get(id).await.unwrap().unwrap();
        assert!(stored.scheduled_at > job.attempted_at.unwrap());
        assert_eq!(stored.errors.len(), 1);
        assert_eq!(stored.errors[0].error, "boom");

        // Pretend the backoff elapsed.
        sqlx::query("UPDATE job SET scheduled_at = ? WHERE job_id = ?")
            .bind(Utc::now() - chrono::Duration::seconds(1))
            .bind(id)
            .execute(&q.pool)
            .await
            .unwrap();
        let job = q.lease(QueueName::Default, 1).await.unwrap().remove(0);
        assert_eq!(job.attempts, 2);
        assert_eq!(q.retry(&job, "boom again").await.unwrap(), JobState::Discarded);

        let stored = q.job_get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Discarded);
        assert_eq!(stored.errors.len(), 2);
        assert!(stored.finalized_at.is_some());
    }

    #[tokio::test]
    async fn snooze_keeps_attempts() {
        let q = queue().await;
        let id = q.enqueue(&JobArgs::RglBans, InsertOpts::default()).await.unwrap().unwrap();
        q.lease(QueueName::Rgl, 1).await.unwrap();
        q.snooze(id, Duration::ZERO).await.unwrap();

        let stored = q.job_get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Available);
        assert_eq!(stored.attempts, 0);
        assert_eq!(q.lease(QueueName::Rgl, 1).await.unwrap()[0].attempts, 1);
    }

    #[tokio::test]
    async fn cancel_and_rescue() {
        let q = queue().await;
        let cancelled = q.enqueue(&JobArgs::Etf2lBans, InsertOpts::default()).await.unwrap().unwrap();
        assert!(q.cancel(cancelled).await.unwrap());
        assert!(!q.cancel(cancelled).await.unwrap());
        assert!(q.lease(QueueName::Etf2l, 1).await.unwrap().is_empty());

        let stuck = q.enqueue(&JobArgs::LogsTf, InsertOpts::default()).await.unwrap().unwrap();
        q.lease(QueueName::Logstf, 1).await.unwrap();
        // A fresh lease is left alone.
        assert_eq!(q.rescue_stuck(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(q.rescue_stuck(Duration::ZERO).await.unwrap(), 1);
        assert_eq!(q.job_get(stuck).await.unwrap().unwrap().state, JobState::Retryable);
        assert!(q.job_get(999).await.unwrap().is_none());
    }
}
