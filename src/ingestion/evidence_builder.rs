//! Evidence synthesis for connector-backed flows.
//!
//! Connector payloads carry identity and 1X2 odds only; the stats domain is
//! derived deterministically from the implied probabilities so the analyzer
//! sees the same typed pack shape as the multi-source pipeline. Derived
//! strengths are a proxy, so the stats domain carries a lower quality score
//! than first-class stats would.

use chrono::{DateTime, Utc};

use crate::engine::canonical::iso_utc;
use crate::engine::evidence::{
    Domain, DomainData, DomainPayload, EvidencePack, FixturesData, QualityReport, StatsData,
    TeamStats,
};
use crate::ingestion::connector::IngestedMatchData;

/// Quality score for the fixtures domain (identity straight from the feed).
const FIXTURES_QUALITY: f64 = 1.0;
/// Quality score for odds-derived stats.
const DERIVED_STATS_QUALITY: f64 = 0.75;

/// Implied 1X2 probabilities with the overround normalized away.
pub fn implied_probabilities(odds: &crate::ingestion::connector::OddsOneXTwo) -> (f64, f64, f64) {
    let inv = (1.0 / odds.home, 1.0 / odds.draw, 1.0 / odds.away);
    let total = inv.0 + inv.1 + inv.2;
    (inv.0 / total, inv.1 / total, inv.2 / total)
}

fn derived_team_stats(p_team: f64, p_opponent: f64) -> TeamStats {
    // Attack tracks the team's win probability twice as strongly as defense
    // tracks the opponent's, so a clear favorite nets out positive.
    let scored = (1.2 + 2.0 * (p_team - 1.0 / 3.0)).max(0.1);
    let conceded = (1.2 + 1.0 * (p_opponent - 1.0 / 3.0)).max(0.1);
    TeamStats {
        goals_scored: round2(scored),
        goals_conceded: round2(conceded),
        shots_per_game: None,
        possession_avg: None,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Build an evidence pack from one connector payload.
pub fn ingested_to_evidence_pack(
    ingested: &IngestedMatchData,
    captured_at_utc: DateTime<Utc>,
) -> EvidencePack {
    let mut pack = EvidencePack::new(ingested.match_id.clone(), iso_utc(captured_at_utc));

    pack.domains.insert(
        Domain::Fixtures,
        DomainData {
            data: DomainPayload::Fixtures(FixturesData {
                match_id: ingested.match_id.clone(),
                home_team: ingested.home_team.clone(),
                away_team: ingested.away_team.clone(),
                kickoff_utc: ingested.kickoff_utc.clone(),
                venue: None,
                competition: ingested.competition.clone(),
                status: ingested.status.clone(),
            }),
            quality: QualityReport {
                passed: true,
                score: FIXTURES_QUALITY,
                flags: vec![],
            },
            sources: vec!["connector".to_string()],
        },
    );

    let (p_home, _p_draw, p_away) = implied_probabilities(&ingested.odds_1x2);
    pack.domains.insert(
        Domain::Stats,
        DomainData {
            data: DomainPayload::Stats(StatsData {
                match_id: ingested.match_id.clone(),
                home_team_stats: derived_team_stats(p_home, p_away),
                away_team_stats: derived_team_stats(p_away, p_home),
                head_to_head: None,
            }),
            quality: QualityReport {
                passed: true,
                score: DERIVED_STATS_QUALITY,
                flags: vec![],
            },
            sources: vec!["odds_implied".to_string()],
        },
    );

    pack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::analyzer::{analyze_v2, MarketRequest};
    use crate::engine::contracts::{DecisionKind, Market, Selection};
    use crate::engine::resolver::ResolutionStatus;
    use crate::ingestion::connector::OddsOneXTwo;
    use chrono::TimeZone;

    fn ingested(odds: (f64, f64, f64)) -> IngestedMatchData {
        IngestedMatchData {
            match_id: "m1".to_string(),
            home_team: "Alpha".to_string(),
            away_team: "Beta".to_string(),
            competition: "League".to_string(),
            kickoff_utc: "2025-10-01T18:00:00+00:00".to_string(),
            odds_1x2: OddsOneXTwo {
                home: odds.0,
                draw: odds.1,
                away: odds.2,
            },
            status: "scheduled".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn implied_probabilities_normalize_overround() {
        let (h, d, a) = implied_probabilities(&OddsOneXTwo {
            home: 2.0,
            draw: 3.5,
            away: 4.0,
        });
        assert!((h + d + a - 1.0).abs() < 1e-9);
        assert!(h > d && d > a);
    }

    #[test]
    fn pack_carries_both_typed_domains() {
        let pack = ingested_to_evidence_pack(&ingested((1.5, 4.0, 6.0)), now());
        assert!(pack.domain(Domain::Fixtures).is_some());
        let stats = pack
            .domain(Domain::Stats)
            .and_then(|d| d.data.as_stats())
            .unwrap();
        assert!(stats.home_team_stats.goals_scored > stats.away_team_stats.goals_scored);
    }

    #[test]
    fn clear_odds_favorite_becomes_a_home_play() {
        let pack = ingested_to_evidence_pack(&ingested((1.45, 4.4, 7.0)), now());
        let result = analyze_v2(
            ResolutionStatus::Resolved,
            Some(&pack),
            &[MarketRequest::supported(Market::OneXTwo)],
            0.5,
        );
        let decision = &result.decisions[0];
        assert_eq!(decision.decision, DecisionKind::Play);
        assert_eq!(decision.selection, Some(Selection::Home));
    }

    #[test]
    fn identical_payloads_build_identical_packs() {
        let a = ingested_to_evidence_pack(&ingested((2.1, 3.3, 3.4)), now());
        let b = ingested_to_evidence_pack(&ingested((2.1, 3.3, 3.4)), now());
        assert_eq!(a, b);
    }
}
