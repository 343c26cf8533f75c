//! Live-shadow compare runner: two parallel ingestion snapshots per match
//! (live and recorded) diffed by the compare engine.
//!
//! No database writes happen here under any capability; the outputs are the
//! report bundle and an index entry.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::engine::canonical::iso_utc;
use crate::ingestion::connector::Connector;
use crate::ingestion::live_io::{live_io_alerts, LiveIoContext, LiveIoMetricsSnapshot};
use crate::reports::bundle::write_bundle_file;
use crate::reports::index_store::{update_index, IndexEntry};
use crate::reports::live_shadow_compare::{
    build_snapshot_list, compare_snapshots, ComparePolicy, CompareReport,
};
use crate::reports::Alert;

/// Subdirectory for compare bundles under the reports root.
pub const COMPARE_REPORTS_SUBDIR: &str = "live_shadow";

/// Compare runner output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareRunReport {
    pub run_id: String,
    pub created_at_utc: String,
    pub live_connector: String,
    pub recorded_connector: String,
    pub match_count: usize,
    pub compare: CompareReport,
    pub live_io: LiveIoMetricsSnapshot,
    pub alerts: Vec<Alert>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn compare_run_id(now: DateTime<Utc>) -> String {
    format!(
        "live_shadow_{}_{}",
        now.format("%Y%m%d_%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    )
}

/// Run the compare: fetch both sides for every match id, diff, write bundle
/// and index entry.
#[allow(clippy::too_many_arguments)]
pub async fn run_live_shadow_compare(
    live: Arc<dyn Connector>,
    recorded: Arc<dyn Connector>,
    match_ids: Option<Vec<String>>,
    policy: &ComparePolicy,
    live_io: Arc<LiveIoContext>,
    reports_dir: &Path,
    index_path: &Path,
    now_utc: DateTime<Utc>,
) -> CompareRunReport {
    let run_id = compare_run_id(now_utc);
    let created_at = iso_utc(now_utc);

    let mut match_ids = match match_ids {
        Some(ids) => ids,
        None => match live.fetch_matches().await {
            Ok(identities) => identities.into_iter().map(|m| m.match_id).collect(),
            Err(e) => {
                return error_report(
                    run_id,
                    created_at,
                    live.name(),
                    recorded.name(),
                    live_io,
                    "FETCH_MATCHES_FAILED",
                    e.to_string(),
                );
            }
        },
    };
    match_ids.sort();
    match_ids.dedup();

    if match_ids.is_empty() {
        return error_report(
            run_id,
            created_at,
            live.name(),
            recorded.name(),
            live_io,
            "NO_MATCHES",
            "No matches found or provided.".to_string(),
        );
    }

    let mut live_items = Vec::with_capacity(match_ids.len());
    let mut recorded_items = Vec::with_capacity(match_ids.len());
    for match_id in &match_ids {
        let live_data = match live.fetch_match_data(match_id).await {
            Ok(data) => data,
            Err(e) => {
                warn!(match_id = %match_id, error = %e, "live fetch failed; recording absent side");
                None
            }
        };
        let recorded_data = match recorded.fetch_match_data(match_id).await {
            Ok(data) => data,
            Err(e) => {
                warn!(match_id = %match_id, error = %e, "recorded fetch failed; recording absent side");
                None
            }
        };
        live_items.push((match_id.clone(), live_data));
        recorded_items.push((match_id.clone(), recorded_data));
    }

    let live_snapshots = build_snapshot_list(live_items);
    let recorded_snapshots = build_snapshot_list(recorded_items);
    let compare = compare_snapshots(&live_snapshots, &recorded_snapshots, policy);

    let live_io_snapshot = live_io.metrics.snapshot();
    let mut alerts = compare.alerts.clone();
    alerts.extend(live_io_alerts(&live_io_snapshot, &live_io.thresholds));

    let report = CompareRunReport {
        run_id: run_id.clone(),
        created_at_utc: created_at.clone(),
        live_connector: live.name().to_string(),
        recorded_connector: recorded.name().to_string(),
        match_count: match_ids.len(),
        compare,
        live_io: live_io_snapshot,
        alerts: alerts.clone(),
        status: "ok".to_string(),
        error: None,
        detail: None,
    };

    let bundle_dir = reports_dir.join(COMPARE_REPORTS_SUBDIR).join(&run_id);
    if let Err(e) = write_bundle_file(&bundle_dir, "compare.json", &report) {
        warn!(error = %e, "failed to write compare bundle");
    }
    let index_result = update_index(index_path, |index| {
        index.live_shadow_runs.push(
            IndexEntry::new(run_id.clone(), created_at.clone())
                .with("matches_count", json!(match_ids.len()))
                .with("alerts_count", json!(alerts.len()))
                .with("live_connector", json!(live.name()))
                .with("recorded_connector", json!(recorded.name())),
        );
    });
    if let Err(e) = index_result {
        warn!(error = %e, "failed to update report index");
    }

    report
}

fn error_report(
    run_id: String,
    created_at: String,
    live_name: &str,
    recorded_name: &str,
    live_io: Arc<LiveIoContext>,
    code: &str,
    detail: String,
) -> CompareRunReport {
    CompareRunReport {
        run_id,
        created_at_utc: created_at,
        live_connector: live_name.to_string(),
        recorded_connector: recorded_name.to_string(),
        match_count: 0,
        compare: compare_snapshots(&[], &[], &ComparePolicy::default()),
        live_io: live_io.metrics.snapshot(),
        alerts: Vec::new(),
        status: "error".to_string(),
        error: Some(code.to_string()),
        detail: Some(detail),
    }
}
