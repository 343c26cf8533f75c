//! Deterministic feature extraction from the evidence pack.
//!
//! Conservative: only explicitly present fields are pulled. Missing domains
//! land in `missing`; gates decide what that means. Nothing here raises.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::evidence::{Domain, EvidencePack, HeadToHead, TeamStats};

/// Quality summary for one domain, as seen by the gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainQuality {
    pub score: f64,
    pub passed: bool,
    pub flags: Vec<String>,
}

/// Home/away strength numbers pulled from the stats domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamStrength {
    pub home: TeamStats,
    pub away: TeamStats,
}

/// Goals-trend view used by the OU and BTTS scorers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalsTrend {
    pub home_avg: f64,
    pub away_avg: f64,
    pub home_conceded_avg: f64,
    pub away_conceded_avg: f64,
}

/// Extracted features for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub has_fixtures: bool,
    pub has_stats: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_strength: Option<TeamStrength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h2h: Option<HeadToHead>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals_trend: Option<GoalsTrend>,
    pub missing: Vec<Domain>,
    pub domain_quality: BTreeMap<Domain, DomainQuality>,
    pub global_flags: Vec<String>,
}

impl Features {
    fn empty() -> Self {
        Self {
            has_fixtures: false,
            has_stats: false,
            home_team: None,
            away_team: None,
            team_strength: None,
            h2h: None,
            goals_trend: None,
            missing: Vec::new(),
            domain_quality: BTreeMap::new(),
            global_flags: Vec::new(),
        }
    }
}

/// Extract features from an evidence pack (or its absence).
pub fn extract_features(pack: Option<&EvidencePack>) -> Features {
    let mut features = Features::empty();

    let Some(pack) = pack else {
        // No pack at all: both domains are missing.
        features.missing = vec![Domain::Fixtures, Domain::Stats];
        return features;
    };

    features.global_flags = pack.flags.clone();

    for (domain, data) in &pack.domains {
        features.domain_quality.insert(
            *domain,
            DomainQuality {
                score: data.quality.score,
                passed: data.quality.passed,
                flags: data.quality.flags.clone(),
            },
        );
    }

    match pack
        .domain(Domain::Fixtures)
        .and_then(|d| d.data.as_fixtures())
    {
        Some(fixtures) => {
            features.has_fixtures = true;
            features.home_team = Some(fixtures.home_team.clone());
            features.away_team = Some(fixtures.away_team.clone());
        }
        None => features.missing.push(Domain::Fixtures),
    }

    match pack.domain(Domain::Stats).and_then(|d| d.data.as_stats()) {
        Some(stats) => {
            features.has_stats = true;
            features.team_strength = Some(TeamStrength {
                home: stats.home_team_stats,
                away: stats.away_team_stats,
            });
            features.h2h = stats.head_to_head;
            features.goals_trend = Some(GoalsTrend {
                home_avg: stats.home_team_stats.goals_scored,
                away_avg: stats.away_team_stats.goals_scored,
                home_conceded_avg: stats.home_team_stats.goals_conceded,
                away_conceded_avg: stats.away_team_stats.goals_conceded,
            });
        }
        None => features.missing.push(Domain::Stats),
    }

    features
}

/// Overall evidence quality 0..1: mean of domain quality scores.
pub fn evidence_quality_score(features: &Features) -> f64 {
    if features.domain_quality.is_empty() {
        return 0.0;
    }
    let sum: f64 = features.domain_quality.values().map(|q| q.score).sum();
    sum / features.domain_quality.len() as f64
}

/// Consensus quality 0..1: minimum domain score, penalized by 0.7 when any
/// agreement/conflict flag is present.
pub fn consensus_quality(features: &Features) -> f64 {
    if features.domain_quality.is_empty() {
        return 0.0;
    }
    let min_score = features
        .domain_quality
        .values()
        .map(|q| q.score)
        .fold(f64::INFINITY, f64::min);
    let has_conflict_flag = features.global_flags.iter().any(|f| {
        let upper = f.to_ascii_uppercase();
        upper.contains("LOW_AGREEMENT") || upper.contains("CONFLICT")
    });
    if has_conflict_flag {
        min_score * 0.7
    } else {
        min_score
    }
}
