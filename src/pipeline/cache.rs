//! Raw-payload cache keyed by `(match_id, domain, window_hours)`.
//!
//! Cached rows are envelope-wrapped (`{"metadata": ..., "payload": ...}`) so
//! provenance and integrity survive storage. Reads accept legacy flat rows;
//! missing envelope fields and integrity mismatches are logged, never raised.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::engine::canonical::sha256_hex;
use crate::engine::snapshot_envelope::{build_envelope_for_recorded, parse_stored_payload};
use crate::models::RawPayloadRow;
use crate::storage::{Repository, StorageError};

/// Source name stamped on cache-written envelopes.
pub const CACHE_SOURCE_NAME: &str = "pipeline_cache";

/// Cache key: truncated SHA-256 over the identifying triple.
pub fn make_cache_key(match_id: &str, domain: &str, window_hours: u32) -> String {
    let key = format!("{match_id}:{domain}:{window_hours}");
    sha256_hex(key.as_bytes())[..16].to_string()
}

/// Fetch a cached payload. Returns `None` on a miss or an empty payload.
pub fn get_cached_payload(
    repo: &dyn Repository,
    match_id: &str,
    domain: &str,
    window_hours: u32,
) -> Result<Option<Value>, StorageError> {
    let cache_key = make_cache_key(match_id, domain, window_hours);
    let Some(row) = repo.raw_payload_by_hash(&cache_key)? else {
        return Ok(None);
    };

    let parsed = parse_stored_payload(
        &row.payload_json,
        Some(row.fetched_at_utc),
        |missing| {
            warn!(
                snapshot_missing_fields = ?missing,
                cache_key = %cache_key,
                "cached snapshot envelope incomplete"
            );
        },
        |snapshot_id, reason| {
            error!(
                snapshot_id = %snapshot_id,
                reason = %reason,
                "cached snapshot integrity check failed; keeping record"
            );
        },
    );

    let is_empty = parsed
        .payload
        .as_object()
        .map(|m| m.is_empty())
        .unwrap_or(true);
    Ok(if is_empty { None } else { Some(parsed.payload) })
}

/// Cache a payload under a fresh recorded envelope.
pub fn cache_payload(
    repo: &dyn Repository,
    match_id: &str,
    domain: &str,
    window_hours: u32,
    payload: &Value,
    now_utc: DateTime<Utc>,
) -> Result<(), StorageError> {
    let cache_key = make_cache_key(match_id, domain, window_hours);
    let envelope = build_envelope_for_recorded(payload, &cache_key, now_utc, CACHE_SOURCE_NAME);
    let stored = serde_json::json!({
        "metadata": serde_json::to_value(&envelope)?,
        "payload": payload,
    });
    debug!(cache_key = %cache_key, domain = %domain, "writing cache snapshot");
    repo.add_raw_payload(&RawPayloadRow {
        id: 0,
        source_name: CACHE_SOURCE_NAME.to_string(),
        domain: domain.to_string(),
        payload_hash: cache_key,
        payload_json: crate::engine::canonical::canonical_string(&stored),
        related_match_id: Some(match_id.to_string()),
        fetched_at_utc: now_utc,
    })?;
    Ok(())
}
