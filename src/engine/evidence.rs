//! Typed evidence model: the analyzer's per-match input.
//!
//! Free-form maps are rejected at the parse boundary; every domain carries a
//! typed payload. An absent domain is an absent map entry, never an empty
//! `DomainData`. Packs are passed by value between components and no
//! component mutates a pack it did not build.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::canonical::{sha256_canonical_short, strip_volatile};

/// Evidence domains known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Fixtures,
    Stats,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fixtures => "fixtures",
            Self::Stats => "stats",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixtures" => Some(Self::Fixtures),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controlled quality flags.
pub const FLAG_NO_SOURCES_AVAILABLE: &str = "NO_SOURCES_AVAILABLE";
pub const FLAG_INSUFFICIENT_SOURCES: &str = "INSUFFICIENT_SOURCES";
pub const FLAG_STALE_DATA: &str = "STALE_DATA";
pub const FLAG_INCOMPLETE_DATA: &str = "INCOMPLETE_DATA";
pub const FLAG_LOW_AGREEMENT: &str = "LOW_AGREEMENT";

/// Quality gate assessment for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub passed: bool,
    /// 0.0 - 1.0
    pub score: f64,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl QualityReport {
    pub fn failed(flags: Vec<String>) -> Self {
        Self {
            passed: false,
            score: 0.0,
            flags,
        }
    }
}

/// Fixture identity data for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixturesData {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_utc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    pub competition: String,
    pub status: String,
}

/// Per-team strength numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub goals_scored: f64,
    pub goals_conceded: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shots_per_game: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possession_avg: Option<f64>,
}

/// Head-to-head record between the two teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub matches_played: u32,
    pub home_wins: u32,
    pub away_wins: u32,
    pub draws: u32,
}

/// Stats data for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsData {
    pub match_id: String,
    pub home_team_stats: TeamStats,
    pub away_team_stats: TeamStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_to_head: Option<HeadToHead>,
}

/// Typed domain payload union. The parse boundary maps raw JSON into one of
/// these variants or fails the domain; nothing downstream sees a raw map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainPayload {
    Fixtures(FixturesData),
    Stats(StatsData),
}

impl DomainPayload {
    /// Parse raw consensus data for a domain into the typed payload.
    pub fn parse(domain: Domain, data: &Value) -> Option<Self> {
        match domain {
            Domain::Fixtures => serde_json::from_value::<FixturesData>(data.clone())
                .ok()
                .map(Self::Fixtures),
            Domain::Stats => serde_json::from_value::<StatsData>(data.clone())
                .ok()
                .map(Self::Stats),
        }
    }

    pub fn as_fixtures(&self) -> Option<&FixturesData> {
        match self {
            Self::Fixtures(f) => Some(f),
            Self::Stats(_) => None,
        }
    }

    pub fn as_stats(&self) -> Option<&StatsData> {
        match self {
            Self::Stats(s) => Some(s),
            Self::Fixtures(_) => None,
        }
    }
}

/// One domain's data with quality and source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainData {
    pub data: DomainPayload,
    pub quality: QualityReport,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Structured evidence pack ready for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePack {
    pub match_id: String,
    pub captured_at_utc: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub domains: BTreeMap<Domain, DomainData>,
}

impl EvidencePack {
    pub fn new(match_id: impl Into<String>, captured_at_utc: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            captured_at_utc: captured_at_utc.into(),
            flags: Vec::new(),
            domains: BTreeMap::new(),
        }
    }

    pub fn domain(&self, domain: Domain) -> Option<&DomainData> {
        self.domains.get(&domain)
    }
}

/// Keys excluded from evidence checksums: repeated runs on identical payloads
/// must yield identical checksums.
pub const VOLATILE_EVIDENCE_KEYS: [&str; 2] = ["captured_at_utc", "fetched_at_utc"];

/// Stable content hash of an evidence pack (volatility-stripped, 32 hex chars).
pub fn evidence_pack_hash(pack: &EvidencePack) -> String {
    let serialized = serde_json::to_value(pack).unwrap_or(Value::Null);
    let stripped = strip_volatile(&serialized, &VOLATILE_EVIDENCE_KEYS);
    sha256_canonical_short(&stripped)
}
