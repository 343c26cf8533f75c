//! Match resolver: free-text team names to a canonical match id.
//!
//! Alias lookup is exact on the normalized form. Candidate ordering is
//! `(kickoff_utc ascending, match_id ascending)` so the same inputs always
//! produce the same candidate list.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Repository, StorageError};

/// Cap on candidates returned for an ambiguous resolution.
pub const MAX_CANDIDATES: usize = 5;

/// Default search window around the kickoff hint.
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Resolver outcome. Returned as data, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Resolved,
    Ambiguous,
    NotFound,
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Resolved => "RESOLVED",
            Self::Ambiguous => "AMBIGUOUS",
            Self::NotFound => "NOT_FOUND",
        };
        f.write_str(s)
    }
}

/// One candidate match for an ambiguous resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub match_id: String,
    pub kickoff_utc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_id: Option<String>,
}

/// Resolver input.
#[derive(Debug, Clone)]
pub struct MatchResolutionInput {
    pub home_text: String,
    pub away_text: String,
    pub kickoff_hint_utc: Option<DateTime<Utc>>,
    pub window_hours: u32,
    pub competition_id: Option<String>,
}

impl MatchResolutionInput {
    pub fn new(home_text: impl Into<String>, away_text: impl Into<String>) -> Self {
        Self {
            home_text: home_text.into(),
            away_text: away_text.into(),
            kickoff_hint_utc: None,
            window_hours: DEFAULT_WINDOW_HOURS,
            competition_id: None,
        }
    }
}

/// Resolver output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResolution {
    pub status: ResolutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(default)]
    pub candidates: Vec<MatchCandidate>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl MatchResolution {
    fn not_found(notes: Vec<String>) -> Self {
        Self {
            status: ResolutionStatus::NotFound,
            match_id: None,
            candidates: Vec::new(),
            notes,
        }
    }
}

/// Normalize a team string for alias lookup: lowercase, trim, strip
/// punctuation, collapse whitespace.
pub fn normalize_alias(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.trim().chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if c.is_whitespace() || c == '-' || c == '_' {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
        // Other punctuation is stripped entirely.
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Resolve `(home_text, away_text)` plus optional hints to a match.
pub fn resolve_match(
    repo: &dyn Repository,
    input: &MatchResolutionInput,
) -> Result<MatchResolution, StorageError> {
    let home_norm = normalize_alias(&input.home_text);
    let away_norm = normalize_alias(&input.away_text);
    if home_norm.is_empty() || away_norm.is_empty() {
        return Ok(MatchResolution::not_found(vec![
            "empty team text after normalization".to_string(),
        ]));
    }

    let mut home_ids = repo.team_ids_for_alias(&home_norm)?;
    let mut away_ids = repo.team_ids_for_alias(&away_norm)?;
    home_ids.sort();
    away_ids.sort();
    if home_ids.is_empty() || away_ids.is_empty() {
        let mut notes = Vec::new();
        if home_ids.is_empty() {
            notes.push(format!("no alias for home text {:?}", input.home_text));
        }
        if away_ids.is_empty() {
            notes.push(format!("no alias for away text {:?}", input.away_text));
        }
        return Ok(MatchResolution::not_found(notes));
    }

    let window = input
        .kickoff_hint_utc
        .map(|hint| {
            let half = Duration::hours(i64::from(input.window_hours));
            (hint - half, hint + half)
        });

    let mut candidates: Vec<MatchCandidate> = Vec::new();
    for home_id in &home_ids {
        for away_id in &away_ids {
            let rows = repo.find_matches_by_pair(home_id, away_id)?;
            for row in rows {
                if let Some((start, end)) = window {
                    if row.kickoff_utc < start || row.kickoff_utc > end {
                        continue;
                    }
                }
                if let Some(comp) = &input.competition_id {
                    if row.competition_id.as_deref() != Some(comp.as_str()) {
                        continue;
                    }
                }
                candidates.push(MatchCandidate {
                    match_id: row.id.clone(),
                    kickoff_utc: crate::engine::canonical::iso_utc(row.kickoff_utc),
                    competition_id: row.competition_id.clone(),
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        a.kickoff_utc
            .cmp(&b.kickoff_utc)
            .then_with(|| a.match_id.cmp(&b.match_id))
    });
    candidates.dedup_by(|a, b| a.match_id == b.match_id);

    match candidates.len() {
        0 => Ok(MatchResolution::not_found(vec![
            "no matching fixture for resolved team pair".to_string(),
        ])),
        1 => Ok(MatchResolution {
            status: ResolutionStatus::Resolved,
            match_id: Some(candidates[0].match_id.clone()),
            candidates,
            notes: Vec::new(),
        }),
        n => {
            candidates.truncate(MAX_CANDIDATES);
            Ok(MatchResolution {
                status: ResolutionStatus::Ambiguous,
                match_id: None,
                candidates,
                notes: vec![format!("{n} candidate matches in window")],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize_alias("  PAOK  F.C. "), "paok fc");
        assert_eq!(normalize_alias("Saint-Étienne"), "saint étienne");
        assert_eq!(normalize_alias("A.E.K."), "aek");
        assert_eq!(normalize_alias("  "), "");
    }
}
