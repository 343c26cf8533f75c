//! Resolver-fronted analysis flow: resolver -> multi-source pipeline ->
//! analyzer. Ambiguous or unresolved inputs short-circuit before any
//! pipeline or analyzer work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::analyzer::{analyze_v2, default_market_requests};
use crate::engine::contracts::AnalyzerResult;
use crate::engine::resolver::{resolve_match, MatchResolution, MatchResolutionInput, ResolutionStatus};
use crate::pipeline::multi_source::{run_pipeline, PipelineInput};
use crate::storage::{Repository, StorageError};

/// Combined output of one analysis flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFlowResult {
    pub resolution: MatchResolution,
    pub analyzer: AnalyzerResult,
}

/// Run resolver -> pipeline -> analyzer. When the resolver does not resolve,
/// the analyzer is invoked with the failed status (global gate) and the
/// pipeline is skipped entirely.
pub async fn run_analysis_flow(
    repo: &dyn Repository,
    resolver_input: &MatchResolutionInput,
    min_confidence: f64,
    now_utc: DateTime<Utc>,
) -> Result<AnalysisFlowResult, StorageError> {
    let resolution = resolve_match(repo, resolver_input)?;

    if resolution.status != ResolutionStatus::Resolved {
        let analyzer = analyze_v2(
            resolution.status,
            None,
            &default_market_requests(),
            min_confidence,
        );
        return Ok(AnalysisFlowResult {
            resolution,
            analyzer,
        });
    }

    let match_id = resolution
        .match_id
        .clone()
        .unwrap_or_default();
    let pipeline_result = run_pipeline(repo, &PipelineInput::new(match_id), now_utc, false).await?;
    let analyzer = analyze_v2(
        ResolutionStatus::Resolved,
        pipeline_result.evidence_pack.as_ref(),
        &default_market_requests(),
        min_confidence,
    );

    Ok(AnalysisFlowResult {
        resolution,
        analyzer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::contracts::AnalyzerStatus;
    use crate::models::{MatchRow, TeamAliasRow};
    use crate::storage::SqliteRepository;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
    }

    fn seed_alias(repo: &SqliteRepository, team_id: &str, alias: &str) {
        repo.insert_team_alias(&TeamAliasRow {
            team_id: team_id.to_string(),
            alias: alias.to_string(),
            alias_norm: crate::engine::resolver::normalize_alias(alias),
            language: "en".to_string(),
            quality: 1.0,
        })
        .unwrap();
    }

    fn seed_match(repo: &SqliteRepository, id: &str, kickoff_hour: u32) {
        repo.ensure_match(&MatchRow {
            id: id.to_string(),
            home_team_id: "t-paok".to_string(),
            away_team_id: "t-aek".to_string(),
            kickoff_utc: Utc.with_ymd_and_hms(2025, 10, 1, kickoff_hour, 0, 0).unwrap(),
            competition_id: Some("gr-1".to_string()),
            status: "SCHEDULED".to_string(),
        })
        .unwrap();
    }

    #[tokio::test]
    async fn resolved_single_match_runs_full_analysis() {
        let repo = SqliteRepository::in_memory().unwrap();
        seed_alias(&repo, "t-paok", "PAOK");
        seed_alias(&repo, "t-aek", "AEK");
        seed_match(&repo, "m-derby", 18);

        let input = MatchResolutionInput::new("PAOK", "AEK");
        let result = run_analysis_flow(&repo, &input, 0.62, now()).await.unwrap();
        assert_eq!(result.resolution.status, ResolutionStatus::Resolved);
        assert_eq!(result.resolution.match_id.as_deref(), Some("m-derby"));
        assert_eq!(result.analyzer.decisions.len(), 3);
    }

    #[tokio::test]
    async fn two_candidate_matches_are_ambiguous_and_skip_analysis() {
        let repo = SqliteRepository::in_memory().unwrap();
        seed_alias(&repo, "t-paok", "PAOK");
        seed_alias(&repo, "t-aek", "AEK");
        seed_match(&repo, "m-derby-1", 15);
        seed_match(&repo, "m-derby-2", 19);

        let mut input = MatchResolutionInput::new("PAOK", "AEK");
        input.kickoff_hint_utc = Some(Utc.with_ymd_and_hms(2025, 10, 1, 17, 0, 0).unwrap());
        input.window_hours = 6;

        let result = run_analysis_flow(&repo, &input, 0.62, now()).await.unwrap();
        assert_eq!(result.resolution.status, ResolutionStatus::Ambiguous);
        assert_eq!(result.resolution.candidates.len(), 2);
        // Candidates sorted by kickoff ascending.
        assert_eq!(result.resolution.candidates[0].match_id, "m-derby-1");
        // The analyzer emitted no market decisions: global gate only.
        assert_eq!(result.analyzer.status, AnalyzerStatus::NoPrediction);
        assert!(result.analyzer.decisions.is_empty());
        assert!(result
            .analyzer
            .analysis_run
            .flags
            .contains(&"AMBIGUOUS".to_string()));
    }

    #[tokio::test]
    async fn unknown_teams_are_not_found() {
        let repo = SqliteRepository::in_memory().unwrap();
        let input = MatchResolutionInput::new("Nowhere FC", "Phantom United");
        let result = run_analysis_flow(&repo, &input, 0.62, now()).await.unwrap();
        assert_eq!(result.resolution.status, ResolutionStatus::NotFound);
        assert!(result
            .analyzer
            .analysis_run
            .flags
            .contains(&"NOT_FOUND".to_string()));
    }
}
