//! Run index: one JSON file with append-only arrays per run kind.
//!
//! Mutation is read-modify-write under an exclusive sidecar lock, with an
//! atomic rename so readers never observe a torn file. Entries are only ever
//! pushed onto the arrays.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::engine::canonical::{canonical_string, parse_iso_utc};

const LOCK_RETRIES: u32 = 100;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

/// One index entry. `run_id` and `created_at_utc` are always present; the
/// remaining fields vary per run kind and ride along as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub run_id: String,
    pub created_at_utc: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl IndexEntry {
    pub fn new(run_id: impl Into<String>, created_at_utc: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            created_at_utc: created_at_utc.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    fn flag(&self, key: &str) -> bool {
        self.extra.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn count(&self, key: &str) -> u64 {
        self.extra.get(key).and_then(Value::as_u64).unwrap_or(0)
    }
}

/// The report index document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportIndex {
    #[serde(default)]
    pub runs: Vec<IndexEntry>,
    #[serde(default)]
    pub activation_runs: Vec<IndexEntry>,
    #[serde(default)]
    pub burn_in_ops_runs: Vec<IndexEntry>,
    #[serde(default)]
    pub live_shadow_runs: Vec<IndexEntry>,
    #[serde(default)]
    pub live_shadow_analyze_runs: Vec<IndexEntry>,
}

impl ReportIndex {
    /// Activations already consumed today (UTC): sum of `activated_count`
    /// over activation and burn-in entries dated today with `activated=true`.
    pub fn daily_activations_used(&self, today_utc: DateTime<Utc>) -> u64 {
        let today = today_utc.date_naive();
        self.activation_runs
            .iter()
            .chain(self.burn_in_ops_runs.iter())
            .filter(|entry| entry.flag("activated"))
            .filter(|entry| {
                parse_iso_utc(&entry.created_at_utc)
                    .map(|dt| dt.date_naive() == today)
                    .unwrap_or(false)
            })
            .map(|entry| entry.count("activated_count"))
            .sum()
    }

    /// Alert count recorded on the most recent live-shadow-analyze run.
    pub fn latest_analyze_alerts(&self) -> Option<(String, u64)> {
        self.live_shadow_analyze_runs
            .last()
            .map(|entry| (entry.run_id.clone(), entry.count("alerts_count")))
    }

    /// Alert counts over the most recent `max_runs` live-shadow-analyze runs.
    pub fn recent_analyze_alerts(&self, max_runs: usize) -> Vec<(String, u64)> {
        let runs = &self.live_shadow_analyze_runs;
        let start = runs.len().saturating_sub(max_runs);
        runs[start..]
            .iter()
            .map(|entry| (entry.run_id.clone(), entry.count("alerts_count")))
            .collect()
    }
}

/// Load the index; a missing or unreadable file yields an empty index.
pub fn load_index(path: &Path) -> ReportIndex {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "index unreadable; starting empty");
            ReportIndex::default()
        }),
        Err(_) => ReportIndex::default(),
    }
}

/// Save the index under the sidecar lock with an atomic rename.
pub fn save_index(index: &ReportIndex, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _guard = IndexLock::acquire(path)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, canonical_string(index))?;
    std::fs::rename(&tmp, path)
}

/// Read-modify-write helper holding the lock across the whole mutation.
pub fn update_index(
    path: &Path,
    mutate: impl FnOnce(&mut ReportIndex),
) -> std::io::Result<ReportIndex> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _guard = IndexLock::acquire(path)?;
    let mut index = load_index(path);
    mutate(&mut index);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, canonical_string(&index))?;
    std::fs::rename(&tmp, path)?;
    Ok(index)
}

/// Exclusive sidecar lock file; released on drop. Bounded retry keeps a
/// crashed writer from deadlocking the store forever.
struct IndexLock {
    lock_path: PathBuf,
}

impl IndexLock {
    fn acquire(index_path: &Path) -> std::io::Result<Self> {
        let lock_path = index_path.with_extension("json.lock");
        for attempt in 0..LOCK_RETRIES {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(Self { lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt == LOCK_RETRIES - 1 {
                        warn!(lock = %lock_path.display(), "breaking stale index lock");
                        let _ = std::fs::remove_file(&lock_path);
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => return Err(e),
            }
        }
        // Retried past the stale-lock break; one final attempt.
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)?;
        Ok(Self { lock_path })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}
