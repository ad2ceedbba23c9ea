//! SQLite-backed job store.
//!
//! Rows move `waiting -> active` on claim. A successful job is deleted; a
//! failed one goes back to `waiting` with a later `run_at` while attempts
//! remain and the error is retryable, otherwise it is kept as `failed` for
//! inspection.

use std::sync::Arc;

use sqlx::sqlite::SqlitePool;
use tokio::sync::Notify;

use super::{Job, JobKind, JobOptions, TrackSnapshot};
use crate::error::{Error, Result};

/// Database row for the jobs table.
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    kind: String,
    payload: String,
    attempts_made: i64,
    max_attempts: i64,
    backoff_ms: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            kind: row.kind.parse()?,
            payload: serde_json::from_str(&row.payload)?,
            id: row.id,
            attempts_made: row.attempts_made.max(0) as u32,
            max_attempts: row.max_attempts.max(1) as u32,
            backoff_ms: row.backoff_ms.max(0) as u64,
        })
    }
}

/// A job parked after its last attempt.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FailedJob {
    pub id: String,
    pub kind: String,
    pub attempts_made: i64,
    pub last_error: Option<String>,
}

/// What [`JobQueue::fail`] did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Rescheduled; the next attempt runs after this many milliseconds
    Retrying { delay_ms: u64 },
    /// No attempts left, or the error is not worth retrying
    Failed,
}

/// Handle to the durable queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
    signal: Arc<Notify>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            signal: Arc::new(Notify::new()),
        }
    }

    /// Woken whenever a job is enqueued, so idle workers can skip the rest
    /// of their poll interval.
    pub fn signal(&self) -> Arc<Notify> {
        Arc::clone(&self.signal)
    }

    /// Add a job unless one with the same id is waiting or active.
    ///
    /// A `failed` job with the same id is replaced, so a later submission is
    /// never blocked by an old failure. Returns whether a job was written.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        id: &str,
        payload: &TrackSnapshot,
        options: JobOptions,
    ) -> Result<bool> {
        let payload = serde_json::to_string(payload)?;
        let now = now_ms();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, kind, payload, state, attempts_made, max_attempts,
                backoff_ms, run_at, last_error, created_at
            )
            VALUES (?, ?, ?, 'waiting', 0, ?, ?, ?, NULL, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                payload = excluded.payload,
                state = 'waiting',
                attempts_made = 0,
                max_attempts = excluded.max_attempts,
                backoff_ms = excluded.backoff_ms,
                run_at = excluded.run_at,
                last_error = NULL,
                created_at = excluded.created_at
            WHERE jobs.state = 'failed'
            "#,
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(&payload)
        .bind(options.max_attempts as i64)
        .bind(options.backoff.as_millis() as i64)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let written = result.rows_affected() > 0;
        if written {
            tracing::debug!(target: "queue", job_id = %id, "Enqueued");
            self.signal.notify_waiters();
        } else {
            tracing::debug!(target: "queue", job_id = %id, "Already pending, skipped");
        }
        Ok(written)
    }

    /// Whether a job of `kind` is ready to run.
    pub async fn has_ready(&self, kind: JobKind) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM jobs WHERE kind = ? AND state = 'waiting' AND run_at <= ? LIMIT 1",
        )
        .bind(kind.as_str())
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Atomically take the oldest ready job of `kind`.
    ///
    /// Selection and the state change happen in one statement, so two
    /// workers can never claim the same row.
    pub async fn claim(&self, kind: JobKind) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET state = 'active', attempts_made = attempts_made + 1
            WHERE id = (
                SELECT id FROM jobs
                WHERE kind = ? AND state = 'waiting' AND run_at <= ?
                ORDER BY run_at, created_at, id
                LIMIT 1
            )
            RETURNING id, kind, payload, attempts_made, max_attempts, backoff_ms
            "#,
        )
        .bind(kind.as_str())
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    /// Remove a finished job.
    pub async fn complete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed attempt, rescheduling with exponential backoff when
    /// `error` is retryable and attempts remain.
    pub async fn fail(&self, job: &Job, error: &Error) -> Result<FailOutcome> {
        let message = error.to_string();

        if error.is_retryable() && job.attempts_made < job.max_attempts {
            let delay_ms = job.next_delay().as_millis() as u64;
            sqlx::query(
                "UPDATE jobs SET state = 'waiting', run_at = ?, last_error = ? WHERE id = ?",
            )
            .bind(now_ms() + delay_ms as i64)
            .bind(&message)
            .bind(&job.id)
            .execute(&self.pool)
            .await?;
            return Ok(FailOutcome::Retrying { delay_ms });
        }

        sqlx::query("UPDATE jobs SET state = 'failed', last_error = ? WHERE id = ?")
            .bind(&message)
            .bind(&job.id)
            .execute(&self.pool)
            .await?;
        Ok(FailOutcome::Failed)
    }

    /// Put jobs left `active` by a previous process back in line.
    pub async fn requeue_stalled(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE jobs SET state = 'waiting' WHERE state = 'active'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Jobs kept after their final failure, most recent first.
    pub async fn list_failed(&self) -> Result<Vec<FailedJob>> {
        let jobs = sqlx::query_as(
            r#"
            SELECT id, kind, attempts_made, last_error
            FROM jobs
            WHERE state = 'failed'
            ORDER BY created_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// Number of jobs of `kind` waiting or running.
    pub async fn pending_count(&self, kind: JobKind) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM jobs WHERE kind = ? AND state IN ('waiting', 'active')",
        )
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ExternalError;
    use crate::queue::search_job_id;
    use crate::test_utils::temp_db;
    use std::time::Duration;

    fn snapshot(track_id: i64) -> TrackSnapshot {
        TrackSnapshot {
            track_id,
            playlist_id: None,
            artist: "Artist".into(),
            name: "Song".into(),
            album: String::new(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_while_pending() {
        let (pool, _dir) = temp_db().await;
        let queue = JobQueue::new(pool);
        let id = search_job_id(1);

        assert!(queue.enqueue(JobKind::Search, &id, &snapshot(1), JobOptions::once()).await.unwrap());
        assert!(!queue.enqueue(JobKind::Search, &id, &snapshot(1), JobOptions::once()).await.unwrap());
        assert_eq!(queue.pending_count(JobKind::Search).await.unwrap(), 1);

        // Still deduplicated while active
        let job = queue.claim(JobKind::Search).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert!(!queue.enqueue(JobKind::Search, &id, &snapshot(1), JobOptions::once()).await.unwrap());
        assert!(queue.claim(JobKind::Search).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_job_can_be_resubmitted() {
        let (pool, _dir) = temp_db().await;
        let queue = JobQueue::new(pool);
        let id = search_job_id(2);

        queue.enqueue(JobKind::Search, &id, &snapshot(2), JobOptions::once()).await.unwrap();
        let job = queue.claim(JobKind::Search).await.unwrap().unwrap();
        let outcome = queue.fail(&job, &Error::validation("missing title")).await.unwrap();
        assert_eq!(outcome, FailOutcome::Failed);
        assert_eq!(queue.list_failed().await.unwrap().len(), 1);

        assert!(queue.enqueue(JobKind::Search, &id, &snapshot(2), JobOptions::once()).await.unwrap());
        assert!(queue.list_failed().await.unwrap().is_empty());
        let again = queue.claim(JobKind::Search).await.unwrap().unwrap();
        assert_eq!(again.attempts_made, 1);
    }

    #[tokio::test]
    async fn test_claim_respects_kind_and_completion_removes() {
        let (pool, _dir) = temp_db().await;
        let queue = JobQueue::new(pool);

        queue.enqueue(JobKind::Download, "download:1:0", &snapshot(1), JobOptions::once()).await.unwrap();
        assert!(queue.claim(JobKind::Search).await.unwrap().is_none());

        let job = queue.claim(JobKind::Download).await.unwrap().unwrap();
        assert_eq!(job.track_id(), 1);
        queue.complete(&job.id).await.unwrap();
        assert_eq!(queue.pending_count(JobKind::Download).await.unwrap(), 0);
        assert!(queue.list_failed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_backs_off_then_parks() {
        let (pool, _dir) = temp_db().await;
        let queue = JobQueue::new(pool);
        let options = JobOptions::new(2, Duration::from_millis(50));
        queue.enqueue(JobKind::Download, "download:3:0", &snapshot(3), options).await.unwrap();

        let transient = Error::External(ExternalError::Transient("timeout".into()));

        let first = queue.claim(JobKind::Download).await.unwrap().unwrap();
        let outcome = queue.fail(&first, &transient).await.unwrap();
        assert_eq!(outcome, FailOutcome::Retrying { delay_ms: 50 });

        // Not ready until the backoff elapses
        assert!(!queue.has_ready(JobKind::Download).await.unwrap());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(queue.has_ready(JobKind::Download).await.unwrap());

        let second = queue.claim(JobKind::Download).await.unwrap().unwrap();
        assert_eq!(second.attempts_made, 2);
        assert_eq!(queue.fail(&second, &transient).await.unwrap(), FailOutcome::Failed);

        let failed = queue.list_failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts_made, 2);
        assert!(failed[0].last_error.as_deref().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let (pool, _dir) = temp_db().await;
        let queue = JobQueue::new(pool);
        queue
            .enqueue(JobKind::Download, "download:4:0", &snapshot(4), JobOptions::new(5, Duration::ZERO))
            .await
            .unwrap();

        let job = queue.claim(JobKind::Download).await.unwrap().unwrap();
        let permanent = Error::External(ExternalError::Permanent("gone".into()));
        assert_eq!(queue.fail(&job, &permanent).await.unwrap(), FailOutcome::Failed);
    }

    #[tokio::test]
    async fn test_requeue_stalled() {
        let (pool, _dir) = temp_db().await;
        let queue = JobQueue::new(pool);
        queue.enqueue(JobKind::Search, "search:5", &snapshot(5), JobOptions::once()).await.unwrap();
        queue.claim(JobKind::Search).await.unwrap().unwrap();
        assert!(queue.claim(JobKind::Search).await.unwrap().is_none());

        assert_eq!(queue.requeue_stalled().await.unwrap(), 1);
        let job = queue.claim(JobKind::Search).await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 2);
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_share_a_job() {
        let (pool, _dir) = temp_db().await;
        let queue = JobQueue::new(pool);
        for i in 0..20 {
            queue
                .enqueue(JobKind::Search, &search_job_id(i), &snapshot(i), JobOptions::once())
                .await
                .unwrap();
        }

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let queue = queue.clone();
            set.spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = queue.claim(JobKind::Search).await.unwrap() {
                    claimed.push(job.id);
                }
                claimed
            });
        }

        let mut all = Vec::new();
        while let Some(claimed) = set.join_next().await {
            all.extend(claimed.unwrap());
        }
        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(before, 20);
        assert_eq!(all.len(), 20);
    }
}
