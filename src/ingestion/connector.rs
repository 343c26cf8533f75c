//! Connector contract and the normalized ingestion payload.
//!
//! Every ingestion source implements `Connector`. Match lists are always
//! returned sorted ascending by match id; `fetch_match_data` returns `None`
//! for an unknown id rather than failing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::canonical::iso_utc;
use crate::ingestion::live_io::LiveIoError;

/// Connector category. Live connectors require the LIVE_IO_ALLOWED capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorCategory {
    Recorded,
    Live,
}

/// Ingestion failure.
#[derive(Debug)]
pub enum ConnectorError {
    InvalidPayload(String),
    NotAllowed(String),
    Transport(LiveIoError),
    Io(std::io::Error),
}

impl std::fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPayload(msg) => write!(f, "invalid payload: {msg}"),
            Self::NotAllowed(msg) => write!(f, "not allowed: {msg}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl From<LiveIoError> for ConnectorError {
    fn from(e: LiveIoError) -> Self {
        Self::Transport(e)
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Lightweight match identity from a connector listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchIdentity {
    pub match_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kickoff_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<String>,
}

/// 1X2 odds. All prices strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsOneXTwo {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

/// Normalized per-match ingestion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedMatchData {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub competition: String,
    pub kickoff_utc: String,
    pub odds_1x2: OddsOneXTwo,
    pub status: String,
}

/// Normalize kickoff to canonical ISO-8601 UTC; `Z` is accepted on input.
pub fn normalize_kickoff_utc(value: &str) -> Result<String, ConnectorError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConnectorError::InvalidPayload(
            "kickoff_utc is required and must be a non-empty string".to_string(),
        ));
    }
    let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ConnectorError::InvalidPayload(format!("kickoff_utc must be ISO8601: {e}")))?;
    Ok(iso_utc(parsed))
}

/// Extract 1X2 odds. Required keys home, draw, away; all values > 0.
pub fn parse_odds_1x2(raw: &Value) -> Result<OddsOneXTwo, ConnectorError> {
    let map = raw.as_object().ok_or_else(|| {
        ConnectorError::InvalidPayload("odds_1x2 must be an object with home, draw, away".to_string())
    })?;
    let get = |key: &str| -> Result<f64, ConnectorError> {
        let value = map
            .get(key)
            .ok_or_else(|| ConnectorError::InvalidPayload(format!("odds_1x2 missing required key: {key:?}")))?;
        let number = value
            .as_f64()
            .ok_or_else(|| ConnectorError::InvalidPayload(format!("odds_1x2.{key} must be a number > 0")))?;
        if number <= 0.0 {
            return Err(ConnectorError::InvalidPayload(format!(
                "odds_1x2.{key} must be > 0"
            )));
        }
        Ok(number)
    };
    Ok(OddsOneXTwo {
        home: get("home")?,
        draw: get("draw")?,
        away: get("away")?,
    })
}

/// Map a raw provider payload to `IngestedMatchData`. Required fields:
/// match_id (or id), home_team, away_team, competition, kickoff_utc,
/// odds_1x2, status.
pub fn ingested_from_value(raw: &Value) -> Result<IngestedMatchData, ConnectorError> {
    let map = raw.as_object().ok_or_else(|| {
        ConnectorError::InvalidPayload("provider payload must be an object".to_string())
    })?;

    let match_id = map
        .get("match_id")
        .or_else(|| map.get("id"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConnectorError::InvalidPayload("match_id is required (or id)".to_string()))?;

    let required_str = |key: &str, fallback: &str| -> Result<String, ConnectorError> {
        let value = map
            .get(key)
            .ok_or_else(|| ConnectorError::InvalidPayload(format!("{key} is required")))?;
        let s = value
            .as_str()
            .map(str::trim)
            .unwrap_or("");
        Ok(if s.is_empty() { fallback.to_string() } else { s.to_string() })
    };

    let home_team = required_str("home_team", "Home")?;
    let away_team = required_str("away_team", "Away")?;
    let competition = required_str("competition", "Competition")?;
    let status = required_str("status", "scheduled")?;

    let kickoff_raw = map
        .get("kickoff_utc")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ConnectorError::InvalidPayload("kickoff_utc is required".to_string()))?;
    let kickoff_utc = normalize_kickoff_utc(kickoff_raw)?;

    let odds_raw = map
        .get("odds_1x2")
        .ok_or_else(|| ConnectorError::InvalidPayload("odds_1x2 is required".to_string()))?;
    let odds_1x2 = parse_odds_1x2(odds_raw)?;

    Ok(IngestedMatchData {
        match_id: match_id.to_string(),
        home_team,
        away_team,
        competition,
        kickoff_utc,
        odds_1x2,
        status,
    })
}

/// Contract implemented by every ingestion source.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;
    fn category(&self) -> ConnectorCategory;

    /// All known matches, sorted ascending by match id.
    async fn fetch_matches(&self) -> Result<Vec<MatchIdentity>, ConnectorError>;

    /// Match data for one id; `None` when unknown (404-equivalent).
    async fn fetch_match_data(
        &self,
        match_id: &str,
    ) -> Result<Option<IngestedMatchData>, ConnectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn odds_require_all_three_positive_prices() {
        assert!(parse_odds_1x2(&json!({"home": 1.8, "draw": 3.3, "away": 4.1})).is_ok());
        assert!(parse_odds_1x2(&json!({"home": 1.8, "draw": 3.3})).is_err());
        assert!(parse_odds_1x2(&json!({"home": 0.0, "draw": 3.3, "away": 4.1})).is_err());
        assert!(parse_odds_1x2(&json!({"home": "1.8", "draw": 3.3, "away": 4.1})).is_err());
    }

    #[test]
    fn kickoff_normalizes_z_suffix_to_offset() {
        assert_eq!(
            normalize_kickoff_utc("2025-10-01T18:00:00Z").unwrap(),
            "2025-10-01T18:00:00+00:00"
        );
        assert!(normalize_kickoff_utc("").is_err());
        assert!(normalize_kickoff_utc("tomorrow").is_err());
    }

    #[test]
    fn ingested_from_value_applies_fallbacks_and_validation() {
        let raw = json!({
            "id": "m-001",
            "home_team": "  ",
            "away_team": "AEK",
            "competition": "Super League",
            "kickoff_utc": "2025-10-01T18:00:00Z",
            "odds_1x2": {"home": 2.1, "draw": 3.2, "away": 3.6},
            "status": "scheduled",
        });
        let parsed = ingested_from_value(&raw).unwrap();
        assert_eq!(parsed.match_id, "m-001");
        assert_eq!(parsed.home_team, "Home");
        assert_eq!(parsed.away_team, "AEK");

        let missing_odds = json!({
            "match_id": "m-002",
            "home_team": "A",
            "away_team": "B",
            "competition": "L",
            "kickoff_utc": "2025-10-01T18:00:00Z",
            "status": "scheduled",
        });
        assert!(ingested_from_value(&missing_odds).is_err());
    }
}
