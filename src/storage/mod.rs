//! Repository contract consumed by the core.
//!
//! The core only calls create/read operations; row ownership stays here.
//! `SqliteRepository` is the provided implementation (file-backed or
//! in-memory for tests). Swapping the driver means implementing this trait,
//! nothing else.

pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::models::{
    AnalysisRunRow, FetchLogRow, MatchRow, PredictionOutcomeRow, PredictionRow, RawPayloadRow,
    SnapshotResolutionRow, TeamAliasRow,
};

pub use sqlite::SqliteRepository;

/// Storage failure.
#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Serialization(serde_json::Error),
    Decode(String),
    NotFound(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "SQLite error: {e}"),
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Decode(msg) => write!(f, "Decode error: {msg}"),
            Self::NotFound(what) => write!(f, "Not found: {what}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

/// Repository contract. All operations may block on I/O; none spin or sleep.
pub trait Repository: Send + Sync {
    // Analysis runs and predictions.
    fn create_analysis_run(&self, row: &AnalysisRunRow) -> Result<i64, StorageError>;
    fn analysis_run(&self, run_id: i64) -> Result<Option<AnalysisRunRow>, StorageError>;
    fn list_analysis_runs(&self, limit: usize) -> Result<Vec<AnalysisRunRow>, StorageError>;
    fn create_prediction(&self, row: &PredictionRow) -> Result<i64, StorageError>;
    fn predictions_for_run(&self, run_id: i64) -> Result<Vec<PredictionRow>, StorageError>;

    // Evaluation.
    fn create_prediction_outcome(&self, row: &PredictionOutcomeRow) -> Result<i64, StorageError>;
    fn outcomes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PredictionOutcomeRow>, StorageError>;
    fn upsert_snapshot_resolution(&self, row: &SnapshotResolutionRow) -> Result<i64, StorageError>;
    fn snapshot_resolution_for_run(
        &self,
        run_id: i64,
    ) -> Result<Option<SnapshotResolutionRow>, StorageError>;
    fn list_snapshot_resolutions(
        &self,
        limit: usize,
    ) -> Result<Vec<SnapshotResolutionRow>, StorageError>;

    // Raw payload cache.
    fn raw_payload_by_hash(&self, payload_hash: &str)
        -> Result<Option<RawPayloadRow>, StorageError>;
    fn add_raw_payload(&self, row: &RawPayloadRow) -> Result<i64, StorageError>;
    fn add_fetch_log(&self, row: &FetchLogRow) -> Result<i64, StorageError>;

    // Resolver lookups.
    fn team_ids_for_alias(&self, alias_norm: &str) -> Result<Vec<String>, StorageError>;
    fn find_matches_by_pair(
        &self,
        home_team_id: &str,
        away_team_id: &str,
    ) -> Result<Vec<MatchRow>, StorageError>;

    // Seeding (connectors ensure matches exist before analysis).
    fn insert_team_alias(&self, row: &TeamAliasRow) -> Result<(), StorageError>;
    fn ensure_match(&self, row: &MatchRow) -> Result<(), StorageError>;
}
