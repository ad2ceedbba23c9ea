//! Durable two-stage job queue.
//!
//! # Architecture
//!
//! - **Jobs** (this file) - job kinds, deterministic ids and payloads
//! - **Store** (`store.rs`) - SQLite-backed queue with idempotent enqueue,
//!   atomic claim and exponential backoff
//! - **Worker** (`worker.rs`) - polls one stage under a concurrency and
//!   throughput policy
//! - **Supervisor** (`supervisor.rs`) - restarts a stage worker when its
//!   configured policy changes
//!
//! Delivery is at least once: a job left `active` by a crashed process is put
//! back to `waiting` on the next start, so handlers must tolerate re-entry.

mod store;
mod supervisor;
mod worker;

pub use store::{FailOutcome, FailedJob, JobQueue};
pub use supervisor::spawn_supervised;
pub use worker::{JobHandler, Worker, WorkerPolicy};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Track;

/// Pipeline stage a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Search,
    Download,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Search => "search",
            JobKind::Download => "download",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "search" => Ok(JobKind::Search),
            "download" => Ok(JobKind::Download),
            other => Err(Error::validation(format!("unknown job kind '{other}'"))),
        }
    }
}

/// Primitive copy of a track carried by a job.
///
/// Handlers reload the track by id; the rest is for logs and inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub track_id: i64,
    pub playlist_id: Option<i64>,
    pub artist: String,
    pub name: String,
    pub album: String,
}

impl From<&Track> for TrackSnapshot {
    fn from(track: &Track) -> Self {
        Self {
            track_id: track.id,
            playlist_id: track.playlist_id,
            artist: track.artist.clone(),
            name: track.name.clone(),
            album: track.album.clone(),
        }
    }
}

/// Attempt and backoff policy for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub backoff: Duration,
}

impl JobOptions {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt with no retry.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// A claimed job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub payload: TrackSnapshot,
    /// Attempts so far, including the current one
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Job {
    pub fn track_id(&self) -> i64 {
        self.payload.track_id
    }

    /// Delay before the next attempt: `backoff * 2^(attempts_made - 1)`.
    pub fn next_delay(&self) -> Duration {
        let exponent = self.attempts_made.saturating_sub(1).min(20);
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << exponent))
    }
}

/// Id of the search job for a track. At most one can be outstanding.
pub fn search_job_id(track_id: i64) -> String {
    format!("search:{track_id}")
}

/// Id of a download submission for a track.
pub fn download_job_id(track_id: i64, submitted_at: DateTime<Utc>) -> String {
    format!("download:{}:{}", track_id, submitted_at.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_ids() {
        assert_eq!(search_job_id(7), "search:7");
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(download_job_id(7, at), "download:7:1700000000123");
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [JobKind::Search, JobKind::Download] {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert!("upload".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let mut job = Job {
            id: "download:1:0".into(),
            kind: JobKind::Download,
            payload: TrackSnapshot {
                track_id: 1,
                playlist_id: None,
                artist: "A".into(),
                name: "B".into(),
                album: String::new(),
            },
            attempts_made: 1,
            max_attempts: 3,
            backoff_ms: 5_000,
        };
        assert_eq!(job.next_delay(), Duration::from_secs(5));
        job.attempts_made = 2;
        assert_eq!(job.next_delay(), Duration::from_secs(10));
        job.attempts_made = 3;
        assert_eq!(job.next_delay(), Duration::from_secs(20));
    }

    #[test]
    fn test_options_never_zero_attempts() {
        assert_eq!(JobOptions::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(JobOptions::once().max_attempts, 1);
    }
}
