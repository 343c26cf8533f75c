//! SQLite-backed repository.
//!
//! Single connection behind a mutex, WAL mode for file-backed databases.
//! Timestamps are stored as canonical ISO-8601 UTC strings so rows remain
//! byte-comparable across processes.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::engine::canonical::{iso_utc, parse_iso_utc};
use crate::models::{
    AnalysisRunRow, FetchLogRow, MatchRow, PredictionOutcomeRow, PredictionRow, RawPayloadRow,
    SnapshotResolutionRow, TeamAliasRow,
};
use crate::storage::{Repository, StorageError};

const SCHEMA_VERSION: u32 = 1;

/// SQLite repository implementation.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) a file-backed repository.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;
        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.initialize_schema()?;
        Ok(repo)
    }

    /// In-memory repository (for tests and dry runs).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.initialize_schema()?;
        Ok(repo)
    }

    fn initialize_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);

            CREATE TABLE IF NOT EXISTS analysis_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at_utc TEXT NOT NULL,
                logic_version TEXT NOT NULL,
                mode TEXT NOT NULL,
                match_id TEXT NOT NULL,
                data_quality_score REAL NOT NULL,
                flags_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analysis_runs_match
                ON analysis_runs(match_id, created_at_utc DESC);

            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at_utc TEXT NOT NULL,
                analysis_run_id INTEGER NOT NULL,
                match_id TEXT NOT NULL,
                market TEXT NOT NULL,
                decision TEXT NOT NULL,
                pick TEXT,
                confidence REAL NOT NULL,
                risk REAL NOT NULL,
                reasons_json TEXT NOT NULL,
                evidence_pack_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_predictions_run
                ON predictions(analysis_run_id);

            CREATE TABLE IF NOT EXISTS prediction_outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prediction_id INTEGER NOT NULL,
                match_id TEXT NOT NULL,
                evaluated_at_utc TEXT NOT NULL,
                final_home_score INTEGER NOT NULL,
                final_away_score INTEGER NOT NULL,
                final_result_1x2 TEXT NOT NULL,
                final_ou25 TEXT NOT NULL,
                final_ggng TEXT NOT NULL,
                hit_bool INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_outcomes_evaluated
                ON prediction_outcomes(evaluated_at_utc);

            CREATE TABLE IF NOT EXISTS snapshot_resolutions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                analysis_run_id INTEGER NOT NULL UNIQUE,
                home_goals INTEGER NOT NULL,
                away_goals INTEGER NOT NULL,
                status TEXT NOT NULL,
                resolved_at_utc TEXT NOT NULL,
                market_outcomes_json TEXT NOT NULL,
                reason_codes_by_market_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS raw_payloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_name TEXT NOT NULL,
                domain TEXT NOT NULL,
                payload_hash TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                related_match_id TEXT,
                fetched_at_utc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_raw_payloads_hash
                ON raw_payloads(payload_hash, fetched_at_utc DESC);

            CREATE TABLE IF NOT EXISTS fetch_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_name TEXT NOT NULL,
                domain TEXT NOT NULL,
                status TEXT NOT NULL,
                latency_ms INTEGER NOT NULL,
                notes TEXT,
                created_at_utc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS team_aliases (
                team_id TEXT NOT NULL,
                alias TEXT NOT NULL,
                alias_norm TEXT NOT NULL,
                language TEXT NOT NULL,
                quality REAL NOT NULL,
                PRIMARY KEY (team_id, alias_norm)
            );
            CREATE INDEX IF NOT EXISTS idx_aliases_norm ON team_aliases(alias_norm);

            CREATE TABLE IF NOT EXISTS matches (
                id TEXT PRIMARY KEY,
                home_team_id TEXT NOT NULL,
                away_team_id TEXT NOT NULL,
                kickoff_utc TEXT NOT NULL,
                competition_id TEXT,
                status TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_matches_pair
                ON matches(home_team_id, away_team_id, kickoff_utc);
        "#,
        )?;

        let current: Option<u32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        if current.is_none() {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?)",
                [SCHEMA_VERSION],
            )?;
            debug!("created repository schema v{}", SCHEMA_VERSION);
        }
        Ok(())
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StorageError> {
    parse_iso_utc(s).ok_or_else(|| StorageError::Decode(format!("bad timestamp: {s:?}")))
}

impl Repository for SqliteRepository {
    fn create_analysis_run(&self, row: &AnalysisRunRow) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO analysis_runs
                (created_at_utc, logic_version, mode, match_id, data_quality_score, flags_json)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                iso_utc(row.created_at_utc),
                row.logic_version,
                row.mode,
                row.match_id,
                row.data_quality_score,
                row.flags_json,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn analysis_run(&self, run_id: i64) -> Result<Option<AnalysisRunRow>, StorageError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT id, created_at_utc, logic_version, mode, match_id,
                        data_quality_score, flags_json
                 FROM analysis_runs WHERE id = ?",
                [run_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;
        found
            .map(|(id, ts, logic_version, mode, match_id, score, flags_json)| {
                Ok(AnalysisRunRow {
                    id,
                    created_at_utc: parse_ts(&ts)?,
                    logic_version,
                    mode,
                    match_id,
                    data_quality_score: score,
                    flags_json,
                })
            })
            .transpose()
    }

    fn list_analysis_runs(&self, limit: usize) -> Result<Vec<AnalysisRunRow>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, created_at_utc, logic_version, mode, match_id,
                    data_quality_score, flags_json
             FROM analysis_runs ORDER BY id ASC LIMIT ?",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, ts, logic_version, mode, match_id, score, flags_json) = row?;
            out.push(AnalysisRunRow {
                id,
                created_at_utc: parse_ts(&ts)?,
                logic_version,
                mode,
                match_id,
                data_quality_score: score,
                flags_json,
            });
        }
        Ok(out)
    }

    fn create_prediction(&self, row: &PredictionRow) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO predictions
                (created_at_utc, analysis_run_id, match_id, market, decision, pick,
                 confidence, risk, reasons_json, evidence_pack_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                iso_utc(row.created_at_utc),
                row.analysis_run_id,
                row.match_id,
                row.market,
                row.decision,
                row.pick,
                row.confidence,
                row.risk,
                row.reasons_json,
                row.evidence_pack_json,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn predictions_for_run(&self, run_id: i64) -> Result<Vec<PredictionRow>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, created_at_utc, analysis_run_id, match_id, market, decision,
                    pick, confidence, risk, reasons_json, evidence_pack_json
             FROM predictions WHERE analysis_run_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([run_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, ts, analysis_run_id, match_id, market, decision, pick, confidence, risk, reasons_json, evidence_pack_json) =
                row?;
            out.push(PredictionRow {
                id,
                created_at_utc: parse_ts(&ts)?,
                analysis_run_id,
                match_id,
                market,
                decision,
                pick,
                confidence,
                risk,
                reasons_json,
                evidence_pack_json,
            });
        }
        Ok(out)
    }

    fn create_prediction_outcome(&self, row: &PredictionOutcomeRow) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO prediction_outcomes
                (prediction_id, match_id, evaluated_at_utc, final_home_score,
                 final_away_score, final_result_1x2, final_ou25, final_ggng, hit_bool)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                row.prediction_id,
                row.match_id,
                iso_utc(row.evaluated_at_utc),
                row.final_home_score,
                row.final_away_score,
                row.final_result_1x2,
                row.final_ou25,
                row.final_ggng,
                row.hit_bool as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn outcomes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PredictionOutcomeRow>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, prediction_id, match_id, evaluated_at_utc, final_home_score,
                    final_away_score, final_result_1x2, final_ou25, final_ggng, hit_bool
             FROM prediction_outcomes
             WHERE evaluated_at_utc >= ? AND evaluated_at_utc < ?
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![iso_utc(start), iso_utc(end)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i32>(4)?,
                row.get::<_, i32>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, i64>(9)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, prediction_id, match_id, ts, home, away, r1x2, ou25, ggng, hit) = row?;
            out.push(PredictionOutcomeRow {
                id,
                prediction_id,
                match_id,
                evaluated_at_utc: parse_ts(&ts)?,
                final_home_score: home,
                final_away_score: away,
                final_result_1x2: r1x2,
                final_ou25: ou25,
                final_ggng: ggng,
                hit_bool: hit != 0,
            });
        }
        Ok(out)
    }

    fn upsert_snapshot_resolution(&self, row: &SnapshotResolutionRow) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO snapshot_resolutions
                (analysis_run_id, home_goals, away_goals, status, resolved_at_utc,
                 market_outcomes_json, reason_codes_by_market_json)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(analysis_run_id) DO UPDATE SET
                home_goals = excluded.home_goals,
                away_goals = excluded.away_goals,
                status = excluded.status,
                resolved_at_utc = excluded.resolved_at_utc,
                market_outcomes_json = excluded.market_outcomes_json,
                reason_codes_by_market_json = excluded.reason_codes_by_market_json",
            params![
                row.analysis_run_id,
                row.home_goals,
                row.away_goals,
                row.status,
                iso_utc(row.resolved_at_utc),
                row.market_outcomes_json,
                row.reason_codes_by_market_json,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn snapshot_resolution_for_run(
        &self,
        run_id: i64,
    ) -> Result<Option<SnapshotResolutionRow>, StorageError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT id, analysis_run_id, home_goals, away_goals, status,
                        resolved_at_utc, market_outcomes_json, reason_codes_by_market_json
                 FROM snapshot_resolutions WHERE analysis_run_id = ?",
                [run_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i32>(2)?,
                        row.get::<_, i32>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;
        found
            .map(|(id, analysis_run_id, home, away, status, ts, outcomes, codes)| {
                Ok(SnapshotResolutionRow {
                    id,
                    analysis_run_id,
                    home_goals: home,
                    away_goals: away,
                    status,
                    resolved_at_utc: parse_ts(&ts)?,
                    market_outcomes_json: outcomes,
                    reason_codes_by_market_json: codes,
                })
            })
            .transpose()
    }

    fn list_snapshot_resolutions(
        &self,
        limit: usize,
    ) -> Result<Vec<SnapshotResolutionRow>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, analysis_run_id, home_goals, away_goals, status,
                    resolved_at_utc, market_outcomes_json, reason_codes_by_market_json
             FROM snapshot_resolutions ORDER BY id ASC LIMIT ?",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, i32>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, analysis_run_id, home, away, status, ts, outcomes, codes) = row?;
            out.push(SnapshotResolutionRow {
                id,
                analysis_run_id,
                home_goals: home,
                away_goals: away,
                status,
                resolved_at_utc: parse_ts(&ts)?,
                market_outcomes_json: outcomes,
                reason_codes_by_market_json: codes,
            });
        }
        Ok(out)
    }

    fn raw_payload_by_hash(
        &self,
        payload_hash: &str,
    ) -> Result<Option<RawPayloadRow>, StorageError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT id, source_name, domain, payload_hash, payload_json,
                        related_match_id, fetched_at_utc
                 FROM raw_payloads WHERE payload_hash = ?
                 ORDER BY fetched_at_utc DESC LIMIT 1",
                [payload_hash],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;
        found
            .map(|(id, source_name, domain, hash, payload_json, related, ts)| {
                Ok(RawPayloadRow {
                    id,
                    source_name,
                    domain,
                    payload_hash: hash,
                    payload_json,
                    related_match_id: related,
                    fetched_at_utc: parse_ts(&ts)?,
                })
            })
            .transpose()
    }

    fn add_raw_payload(&self, row: &RawPayloadRow) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO raw_payloads
                (source_name, domain, payload_hash, payload_json, related_match_id, fetched_at_utc)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                row.source_name,
                row.domain,
                row.payload_hash,
                row.payload_json,
                row.related_match_id,
                iso_utc(row.fetched_at_utc),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn add_fetch_log(&self, row: &FetchLogRow) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO fetch_logs (source_name, domain, status, latency_ms, notes, created_at_utc)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                row.source_name,
                row.domain,
                row.status,
                row.latency_ms,
                row.notes,
                iso_utc(row.created_at_utc),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn team_ids_for_alias(&self, alias_norm: &str) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT team_id FROM team_aliases WHERE alias_norm = ? ORDER BY team_id",
        )?;
        let rows = stmt.query_map([alias_norm], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn find_matches_by_pair(
        &self,
        home_team_id: &str,
        away_team_id: &str,
    ) -> Result<Vec<MatchRow>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, home_team_id, away_team_id, kickoff_utc, competition_id, status
             FROM matches WHERE home_team_id = ? AND away_team_id = ?
             ORDER BY kickoff_utc ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![home_team_id, away_team_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, home, away, ts, competition_id, status) = row?;
            out.push(MatchRow {
                id,
                home_team_id: home,
                away_team_id: away,
                kickoff_utc: parse_ts(&ts)?,
                competition_id,
                status,
            });
        }
        Ok(out)
    }

    fn insert_team_alias(&self, row: &TeamAliasRow) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO team_aliases (team_id, alias, alias_norm, language, quality)
             VALUES (?, ?, ?, ?, ?)",
            params![row.team_id, row.alias, row.alias_norm, row.language, row.quality],
        )?;
        Ok(())
    }

    fn ensure_match(&self, row: &MatchRow) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO matches
                (id, home_team_id, away_team_id, kickoff_utc, competition_id, status)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                row.id,
                row.home_team_id,
                row.away_team_id,
                iso_utc(row.kickoff_utc),
                row.competition_id,
                row.status,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn run_and_predictions_round_trip() {
        let repo = SqliteRepository::in_memory().unwrap();
        let run_id = repo
            .create_analysis_run(&AnalysisRunRow {
                id: 0,
                created_at_utc: ts(12),
                logic_version: "v2".to_string(),
                mode: "PREGAME".to_string(),
                match_id: "m1".to_string(),
                data_quality_score: 0.8,
                flags_json: "[]".to_string(),
            })
            .unwrap();
        assert!(run_id > 0);

        repo.create_prediction(&PredictionRow {
            id: 0,
            created_at_utc: ts(12),
            analysis_run_id: run_id,
            match_id: "m1".to_string(),
            market: "1X2".to_string(),
            decision: "PLAY".to_string(),
            pick: Some("HOME".to_string()),
            confidence: 0.74,
            risk: 0.26,
            reasons_json: "[\"top=HOME sep=0.12\"]".to_string(),
            evidence_pack_json: "{}".to_string(),
        })
        .unwrap();

        let preds = repo.predictions_for_run(run_id).unwrap();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].pick.as_deref(), Some("HOME"));
        assert_eq!(preds[0].created_at_utc, ts(12));
    }

    #[test]
    fn snapshot_resolution_upsert_replaces() {
        let repo = SqliteRepository::in_memory().unwrap();
        let base = SnapshotResolutionRow {
            id: 0,
            analysis_run_id: 7,
            home_goals: 1,
            away_goals: 0,
            status: "FINAL".to_string(),
            resolved_at_utc: ts(14),
            market_outcomes_json: "{}".to_string(),
            reason_codes_by_market_json: "{}".to_string(),
        };
        repo.upsert_snapshot_resolution(&base).unwrap();
        let mut updated = base.clone();
        updated.home_goals = 2;
        repo.upsert_snapshot_resolution(&updated).unwrap();

        let stored = repo.snapshot_resolution_for_run(7).unwrap().unwrap();
        assert_eq!(stored.home_goals, 2);
        assert_eq!(repo.list_snapshot_resolutions(10).unwrap().len(), 1);
    }

    #[test]
    fn outcomes_between_respects_bounds() {
        let repo = SqliteRepository::in_memory().unwrap();
        for (i, hour) in [9u32, 12, 23].iter().enumerate() {
            repo.create_prediction_outcome(&PredictionOutcomeRow {
                id: 0,
                prediction_id: i as i64 + 1,
                match_id: format!("m{i}"),
                evaluated_at_utc: ts(*hour),
                final_home_score: 1,
                final_away_score: 0,
                final_result_1x2: "1".to_string(),
                final_ou25: "UNDER".to_string(),
                final_ggng: "NG".to_string(),
                hit_bool: i % 2 == 0,
            })
            .unwrap();
        }
        let rows = repo.outcomes_between(ts(10), ts(23)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].match_id, "m1");
    }

    #[test]
    fn alias_and_match_lookups_are_sorted() {
        let repo = SqliteRepository::in_memory().unwrap();
        for (team, alias) in [("t-paok", "paok"), ("t-paok-b", "paok")] {
            repo.insert_team_alias(&TeamAliasRow {
                team_id: team.to_string(),
                alias: alias.to_string(),
                alias_norm: alias.to_string(),
                language: "el".to_string(),
                quality: 1.0,
            })
            .unwrap();
        }
        assert_eq!(
            repo.team_ids_for_alias("paok").unwrap(),
            vec!["t-paok".to_string(), "t-paok-b".to_string()]
        );

        repo.ensure_match(&MatchRow {
            id: "m2".to_string(),
            home_team_id: "t-paok".to_string(),
            away_team_id: "t-aek".to_string(),
            kickoff_utc: ts(20),
            competition_id: Some("gr-1".to_string()),
            status: "SCHEDULED".to_string(),
        })
        .unwrap();
        repo.ensure_match(&MatchRow {
            id: "m1".to_string(),
            home_team_id: "t-paok".to_string(),
            away_team_id: "t-aek".to_string(),
            kickoff_utc: ts(18),
            competition_id: Some("gr-1".to_string()),
            status: "SCHEDULED".to_string(),
        })
        .unwrap();

        let matches = repo.find_matches_by_pair("t-paok", "t-aek").unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "m1");
    }
}
