//! Resolver tests over a seeded repository.

use chrono::{TimeZone, Utc};

use crate::engine::resolver::{
    resolve_match, MatchResolutionInput, ResolutionStatus, MAX_CANDIDATES,
};
use crate::models::{MatchRow, TeamAliasRow};
use crate::storage::{Repository, SqliteRepository};

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

fn seed_match(repo: &SqliteRepository, id: &str, day: u32, hour: u32, competition: &str) {
    repo.ensure_match(&MatchRow {
        id: id.to_string(),
        home_team_id: "t-home".to_string(),
        away_team_id: "t-away".to_string(),
        kickoff_utc: Utc.with_ymd_and_hms(2025, 10, day, hour, 0, 0).unwrap(),
        competition_id: Some(competition.to_string()),
        status: "SCHEDULED".to_string(),
    })
    .unwrap();
}

fn seeded_repo() -> SqliteRepository {
    let repo = SqliteRepository::in_memory().unwrap();
    seed_alias(&repo, "t-home", "Home City F.C.");
    seed_alias(&repo, "t-away", "Away Town");
    repo
}

#[test]
fn exactly_one_match_resolves() {
    let repo = seeded_repo();
    seed_match(&repo, "m-1", 1, 18, "league-a");
    let input = MatchResolutionInput::new("home city fc", "AWAY TOWN");
    let out = resolve_match(&repo, &input).unwrap();
    assert_eq!(out.status, ResolutionStatus::Resolved);
    assert_eq!(out.match_id.as_deref(), Some("m-1"));
}

#[test]
fn multiple_matches_in_window_are_ambiguous_sorted_by_kickoff() {
    let repo = seeded_repo();
    seed_match(&repo, "m-late", 1, 20, "league-a");
    seed_match(&repo, "m-early", 1, 15, "league-a");

    let mut input = MatchResolutionInput::new("Home City FC", "Away Town");
    input.kickoff_hint_utc = Some(Utc.with_ymd_and_hms(2025, 10, 1, 17, 0, 0).unwrap());
    input.window_hours = 6;

    let out = resolve_match(&repo, &input).unwrap();
    assert_eq!(out.status, ResolutionStatus::Ambiguous);
    assert_eq!(out.candidates.len(), 2);
    assert_eq!(out.candidates[0].match_id, "m-early");
    assert_eq!(out.candidates[1].match_id, "m-late");
}

#[test]
fn kickoff_window_excludes_distant_matches() {
    let repo = seeded_repo();
    seed_match(&repo, "m-near", 1, 18, "league-a");
    seed_match(&repo, "m-far", 5, 18, "league-a");

    let mut input = MatchResolutionInput::new("Home City FC", "Away Town");
    input.kickoff_hint_utc = Some(Utc.with_ymd_and_hms(2025, 10, 1, 17, 0, 0).unwrap());
    input.window_hours = 12;

    let out = resolve_match(&repo, &input).unwrap();
    assert_eq!(out.status, ResolutionStatus::Resolved);
    assert_eq!(out.match_id.as_deref(), Some("m-near"));
}

#[test]
fn competition_filter_narrows_to_one() {
    let repo = seeded_repo();
    seed_match(&repo, "m-cup", 1, 18, "cup");
    seed_match(&repo, "m-league", 1, 20, "league-a");

    let mut input = MatchResolutionInput::new("Home City FC", "Away Town");
    input.competition_id = Some("cup".to_string());
    let out = resolve_match(&repo, &input).unwrap();
    assert_eq!(out.status, ResolutionStatus::Resolved);
    assert_eq!(out.match_id.as_deref(), Some("m-cup"));
}

#[test]
fn unknown_aliases_are_not_found_with_notes() {
    let repo = seeded_repo();
    seed_match(&repo, "m-1", 1, 18, "league-a");
    let out = resolve_match(&repo, &MatchResolutionInput::new("Phantom", "Away Town")).unwrap();
    assert_eq!(out.status, ResolutionStatus::NotFound);
    assert!(!out.notes.is_empty());
}

#[test]
fn candidate_list_is_capped() {
    let repo = seeded_repo();
    for i in 0..(MAX_CANDIDATES + 3) {
        seed_match(&repo, &format!("m-{i}"), 1, 8 + i as u32, "league-a");
    }
    let out = resolve_match(&repo, &MatchResolutionInput::new("Home City FC", "Away Town"))
        .unwrap();
    assert_eq!(out.status, ResolutionStatus::Ambiguous);
    assert_eq!(out.candidates.len(), MAX_CANDIDATES);
}
