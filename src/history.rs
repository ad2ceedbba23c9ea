//! Download history view.
//!
//! Raw history has one row per completed track. The view folds a page of
//! rows (newest first) into one summary per playlist. A playlist can appear
//! under its local id, under its origin URL, or both, and catalog URLs come
//! with and without a `/intl-xx/` locale segment. All of those collapse into
//! the same summary.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db;
use crate::error::Result;
use crate::model::HistoryEntry;

/// One playlist's consolidated history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    /// Stable grouping key (`id:…`, `url:…` or `ts:…`)
    pub key: String,
    pub playlist_id: Option<i64>,
    pub playlist_name: String,
    pub playlist_url: Option<String>,
    pub last_completed_at: DateTime<Utc>,
    /// Distinct tracks completed
    pub track_count: usize,
}

/// Strip locale segments (`/intl-de/`, `/intl-pt-br/`) from a catalog URL.
pub fn normalize_url(url: &str) -> String {
    url.split('/')
        .filter(|segment| !is_locale_segment(segment))
        .collect::<Vec<_>>()
        .join("/")
}

fn is_locale_segment(segment: &str) -> bool {
    segment.strip_prefix("intl-").is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphabetic() || c == '-')
    })
}

struct Accumulator {
    summary: HistorySummary,
    track_ids: HashSet<i64>,
}

/// Fold raw entries into per-playlist summaries, most recent first.
pub fn summarize(entries: &[HistoryEntry]) -> Vec<HistorySummary> {
    let mut by_id: HashMap<i64, String> = HashMap::new();
    let mut by_url: HashMap<String, String> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Accumulator> = HashMap::new();

    for entry in entries {
        let url = entry.playlist_url.as_deref().map(normalize_url);

        let key = entry
            .playlist_id
            .and_then(|id| by_id.get(&id).cloned())
            .or_else(|| url.as_ref().and_then(|u| by_url.get(u).cloned()))
            .unwrap_or_else(|| match (entry.playlist_id, &url) {
                (Some(id), _) => format!("id:{id}"),
                (None, Some(u)) => format!("url:{u}"),
                (None, None) => format!("ts:{}", entry.completed_at.timestamp_millis()),
            });

        let group = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Accumulator {
                summary: HistorySummary {
                    key: key.clone(),
                    playlist_id: entry.playlist_id,
                    playlist_name: entry.playlist_name.clone(),
                    playlist_url: entry.playlist_url.clone(),
                    last_completed_at: entry.completed_at,
                    track_count: 0,
                },
                track_ids: HashSet::new(),
            }
        });

        group.track_ids.insert(entry.track_id);
        if entry.completed_at > group.summary.last_completed_at {
            group.summary.last_completed_at = entry.completed_at;
            group.summary.playlist_name = entry.playlist_name.clone();
        }
        if group.summary.playlist_id.is_none() {
            group.summary.playlist_id = entry.playlist_id;
        }
        if group.summary.playlist_url.is_none() {
            group.summary.playlist_url = entry.playlist_url.clone();
        }

        if let Some(id) = entry.playlist_id {
            by_id.entry(id).or_insert_with(|| key.clone());
        }
        if let Some(u) = url {
            by_url.entry(u).or_insert(key);
        }
    }

    let mut summaries: Vec<HistorySummary> = order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|group| HistorySummary {
            track_count: group.track_ids.len(),
            ..group.summary
        })
        .collect();
    summaries.sort_by(|a, b| b.last_completed_at.cmp(&a.last_completed_at));
    summaries
}

/// Summaries over the `limit` most recent history rows.
pub async fn history_view(pool: &SqlitePool, limit: u32) -> Result<Vec<HistorySummary>> {
    let entries = db::recent_history(pool, limit).await?;
    Ok(summarize(&entries))
}
