//! Persisted row types shared by the repository and the pipeline.
//!
//! Rows mirror the storage schema one to one. JSON-carrying columns keep
//! their serialized form here; typed views live in the modules that own the
//! semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One analyzer invocation that was persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRunRow {
    pub id: i64,
    pub created_at_utc: DateTime<Utc>,
    pub logic_version: String,
    pub mode: String,
    pub match_id: String,
    pub data_quality_score: f64,
    pub flags_json: String,
}

/// One persisted per-market decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub id: i64,
    pub created_at_utc: DateTime<Utc>,
    pub analysis_run_id: i64,
    pub match_id: String,
    pub market: String,
    pub decision: String,
    pub pick: Option<String>,
    pub confidence: f64,
    pub risk: f64,
    pub reasons_json: String,
    pub evidence_pack_json: String,
}

/// Evaluation of one activated prediction against the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcomeRow {
    pub id: i64,
    pub prediction_id: i64,
    pub match_id: String,
    pub evaluated_at_utc: DateTime<Utc>,
    pub final_home_score: i32,
    pub final_away_score: i32,
    pub final_result_1x2: String,
    pub final_ou25: String,
    pub final_ggng: String,
    pub hit_bool: bool,
}

/// Per-analysis-run resolution of market outcomes against the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResolutionRow {
    pub id: i64,
    pub analysis_run_id: i64,
    pub home_goals: i32,
    pub away_goals: i32,
    pub status: String,
    pub resolved_at_utc: DateTime<Utc>,
    pub market_outcomes_json: String,
    pub reason_codes_by_market_json: String,
}

/// Raw payload cache row (envelope-wrapped JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayloadRow {
    pub id: i64,
    pub source_name: String,
    pub domain: String,
    pub payload_hash: String,
    pub payload_json: String,
    pub related_match_id: Option<String>,
    pub fetched_at_utc: DateTime<Utc>,
}

/// Team alias for the resolver. `alias_norm` is the normalized lookup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAliasRow {
    pub team_id: String,
    pub alias: String,
    pub alias_norm: String,
    pub language: String,
    pub quality: f64,
}

/// Canonical match row used by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    pub id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub kickoff_utc: DateTime<Utc>,
    pub competition_id: Option<String>,
    pub status: String,
}

/// Fetch log entry for multi-source ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchLogRow {
    pub id: i64,
    pub source_name: String,
    pub domain: String,
    pub status: String,
    pub latency_ms: i64,
    pub notes: Option<String>,
    pub created_at_utc: DateTime<Utc>,
}
