//! Snapshot envelope: provenance and timing tags for every ingested payload.
//!
//! Every stored payload is wrapped as `{"metadata": <envelope>, "payload": <payload>}`.
//! Legacy flat payloads (no envelope) are still readable: metadata is
//! synthesized with recorded defaults and the caller is told via the
//! missing-fields hook. Integrity failures are reported, never raised, and
//! never cause a record to be discarded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::canonical::{iso_utc, parse_iso_utc, sha256_canonical, sha256_hex};

/// Schema version written on new envelopes.
pub const ENVELOPE_SCHEMA_VERSION: u32 = 1;

/// Provenance class of a snapshot source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceClass {
    Recorded,
    LiveShadow,
    Editorial,
    Unknown,
}

/// Reliability tier assigned to a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReliabilityTier {
    High,
    Med,
    Low,
}

/// Source descriptor carried inside an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSource {
    #[serde(rename = "class")]
    pub class: SourceClass,
    pub name: String,
    #[serde(default)]
    pub r#ref: Option<String>,
    pub reliability_tier: ReliabilityTier,
}

impl SnapshotSource {
    fn recorded_default() -> Self {
        Self {
            class: SourceClass::Recorded,
            name: "recorded".to_string(),
            r#ref: None,
            reliability_tier: ReliabilityTier::High,
        }
    }
}

/// Snapshot kind: recorded baseline or live-shadow observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    Recorded,
    LiveShadow,
}

/// Canonical envelope. All timestamps are ISO-8601 UTC strings with an
/// explicit `+00:00` offset in the canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub snapshot_id: String,
    pub snapshot_type: SnapshotType,
    pub created_at_utc: String,
    /// SHA-256 of the canonical payload. A function of the payload alone;
    /// envelope metadata changes must not affect it.
    pub payload_checksum: String,
    pub source: SnapshotSource,
    pub observed_at_utc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_started_at_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_ended_at_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_from_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_valid_until_utc: Option<String>,
    pub schema_version: u32,
    /// SHA-256 of the canonicalized envelope excluding this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_checksum: Option<String>,
}

impl SnapshotEnvelope {
    /// Return a copy with `envelope_checksum` computed over every other field.
    pub fn with_envelope_checksum(mut self) -> Self {
        self.envelope_checksum = None;
        let checksum = compute_envelope_checksum_value(
            &serde_json::to_value(&self).unwrap_or(Value::Null),
        );
        self.envelope_checksum = Some(checksum);
        self
    }
}

/// SHA-256 of the canonical payload. String payloads that are not valid JSON
/// hash the raw bytes instead.
pub fn compute_payload_checksum(payload: &Value) -> String {
    if let Value::String(s) = payload {
        if let Ok(parsed) = serde_json::from_str::<Value>(s) {
            return sha256_canonical(&parsed);
        }
        return sha256_hex(s.as_bytes());
    }
    sha256_canonical(payload)
}

/// SHA-256 of the canonicalized envelope metadata excluding `envelope_checksum`.
pub fn compute_envelope_checksum_value(metadata: &Value) -> String {
    let clean = match metadata {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if k != "envelope_checksum" {
                    out.insert(k.clone(), v.clone());
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    };
    sha256_canonical(&clean)
}

/// Milliseconds between two fetch timestamps. `None` when either is missing
/// or unparseable.
pub fn compute_latency_ms(fetch_started: Option<&str>, fetch_ended: Option<&str>) -> Option<f64> {
    let start = parse_iso_utc(fetch_started?)?;
    let end = parse_iso_utc(fetch_ended?)?;
    Some((end - start).num_milliseconds() as f64)
}

/// Build an envelope for a recorded snapshot. `observed_at_utc` defaults to
/// the creation time.
pub fn build_envelope_for_recorded(
    payload: &Value,
    snapshot_id: &str,
    created_at_utc: DateTime<Utc>,
    source_name: &str,
) -> SnapshotEnvelope {
    let created = iso_utc(created_at_utc);
    SnapshotEnvelope {
        snapshot_id: snapshot_id.to_string(),
        snapshot_type: SnapshotType::Recorded,
        created_at_utc: created.clone(),
        payload_checksum: compute_payload_checksum(payload),
        source: SnapshotSource {
            class: SourceClass::Recorded,
            name: source_name.to_string(),
            r#ref: None,
            reliability_tier: ReliabilityTier::High,
        },
        observed_at_utc: created,
        fetch_started_at_utc: None,
        fetch_ended_at_utc: None,
        latency_ms: None,
        effective_from_utc: None,
        expected_valid_until_utc: None,
        schema_version: ENVELOPE_SCHEMA_VERSION,
        envelope_checksum: None,
    }
    .with_envelope_checksum()
}

/// Build an envelope for a live-shadow snapshot with timing tags.
#[allow(clippy::too_many_arguments)]
pub fn build_envelope_for_live_shadow(
    payload: &Value,
    snapshot_id: &str,
    created_at_utc: DateTime<Utc>,
    source_name: &str,
    observed_at_utc: DateTime<Utc>,
    fetch_started_at_utc: Option<DateTime<Utc>>,
    fetch_ended_at_utc: Option<DateTime<Utc>>,
    latency_ms: Option<f64>,
) -> SnapshotEnvelope {
    SnapshotEnvelope {
        snapshot_id: snapshot_id.to_string(),
        snapshot_type: SnapshotType::LiveShadow,
        created_at_utc: iso_utc(created_at_utc),
        payload_checksum: compute_payload_checksum(payload),
        source: SnapshotSource {
            class: SourceClass::LiveShadow,
            name: source_name.to_string(),
            r#ref: None,
            reliability_tier: ReliabilityTier::Med,
        },
        observed_at_utc: iso_utc(observed_at_utc),
        fetch_started_at_utc: fetch_started_at_utc.map(iso_utc),
        fetch_ended_at_utc: fetch_ended_at_utc.map(iso_utc),
        latency_ms: latency_ms.map(|v| (v * 100.0).round() / 100.0),
        effective_from_utc: None,
        expected_valid_until_utc: None,
        schema_version: ENVELOPE_SCHEMA_VERSION,
        envelope_checksum: None,
    }
    .with_envelope_checksum()
}

/// Result of parsing a stored payload: metadata (as a raw value, since legacy
/// rows carry partial envelopes) plus the payload itself.
#[derive(Debug, Clone)]
pub struct ParsedStoredPayload {
    pub metadata: Value,
    pub payload: Value,
}

/// Parse stored payload JSON, accepting the enveloped v2 format and legacy
/// flat payloads. Missing fields are defaulted and reported via `on_missing`;
/// envelope-checksum mismatches are reported via `on_integrity_fail`. Neither
/// hook may abort the parse.
pub fn parse_stored_payload(
    payload_json: &str,
    created_at_fallback: Option<DateTime<Utc>>,
    mut on_missing: impl FnMut(&[String]),
    mut on_integrity_fail: impl FnMut(&str, &str),
) -> ParsedStoredPayload {
    let fallback = created_at_fallback.unwrap_or_else(Utc::now);
    let created_str = iso_utc(fallback);

    let raw: Value = match serde_json::from_str(payload_json) {
        Ok(v) => v,
        Err(_) => {
            on_missing(&["legacy_no_envelope".to_string()]);
            return ParsedStoredPayload {
                metadata: default_metadata(&created_str),
                payload: Value::Object(serde_json::Map::new()),
            };
        }
    };

    let (mut meta, payload) = match &raw {
        Value::Object(map) if map.contains_key("metadata") && map.contains_key("payload") => {
            let meta = map
                .get("metadata")
                .and_then(|m| m.as_object())
                .cloned()
                .unwrap_or_default();
            let payload = match map.get("payload") {
                Some(Value::Object(p)) => Value::Object(p.clone()),
                _ => Value::Object(serde_json::Map::new()),
            };
            (meta, payload)
        }
        Value::Object(_) => {
            // Legacy: the whole row is the payload.
            on_missing(&["legacy_no_envelope".to_string()]);
            return ParsedStoredPayload {
                metadata: default_metadata(&created_str),
                payload: raw,
            };
        }
        _ => {
            on_missing(&["legacy_no_envelope".to_string()]);
            return ParsedStoredPayload {
                metadata: default_metadata(&created_str),
                payload: Value::Object(serde_json::Map::new()),
            };
        }
    };

    let mut missing: Vec<String> = Vec::new();

    // Normalize historical field names to the v2 vocabulary.
    rename_if_absent(&mut meta, "observed_at", "observed_at_utc");
    rename_if_absent(&mut meta, "checksum", "payload_checksum");
    rename_if_absent(&mut meta, "fetch_started_at", "fetch_started_at_utc");
    rename_if_absent(&mut meta, "fetch_ended_at", "fetch_ended_at_utc");

    if non_empty_str(&meta, "created_at_utc").is_none() {
        let fallback_value = non_empty_str(&meta, "created_at")
            .unwrap_or_else(|| created_str.clone());
        if non_empty_str(&meta, "created_at").is_none() {
            missing.push("created_at_utc".to_string());
        }
        meta.insert("created_at_utc".to_string(), Value::String(fallback_value));
    }
    if non_empty_str(&meta, "observed_at_utc").is_none() {
        let v = non_empty_str(&meta, "created_at_utc").unwrap_or_else(|| created_str.clone());
        meta.insert("observed_at_utc".to_string(), Value::String(v));
        missing.push("observed_at_utc".to_string());
    }
    if !meta.contains_key("schema_version") {
        meta.insert("schema_version".to_string(), Value::from(0u32));
        missing.push("schema_version".to_string());
    }
    let source_ok = matches!(meta.get("source"), Some(Value::Object(_)));
    if !source_ok {
        meta.insert(
            "source".to_string(),
            serde_json::to_value(SnapshotSource::recorded_default()).unwrap_or(Value::Null),
        );
        missing.push("source".to_string());
    }
    if non_empty_str(&meta, "snapshot_id").is_none() {
        let fallback_id = non_empty_str(&meta, "payload_checksum").unwrap_or_default();
        meta.insert("snapshot_id".to_string(), Value::String(fallback_id));
    }

    if !missing.is_empty() {
        on_missing(&missing);
    }

    if let Some(stored) = non_empty_str(&meta, "envelope_checksum") {
        let computed = compute_envelope_checksum_value(&Value::Object(meta.clone()));
        if computed != stored {
            let snapshot_id = non_empty_str(&meta, "snapshot_id").unwrap_or_default();
            on_integrity_fail(&snapshot_id, "envelope_checksum mismatch");
        }
    }

    ParsedStoredPayload {
        metadata: Value::Object(meta),
        payload,
    }
}

fn default_metadata(created_str: &str) -> Value {
    serde_json::json!({
        "snapshot_id": "",
        "snapshot_type": "recorded",
        "created_at_utc": created_str,
        "payload_checksum": "",
        "source": SnapshotSource::recorded_default(),
        "observed_at_utc": created_str,
        "schema_version": 0,
    })
}

fn rename_if_absent(meta: &mut serde_json::Map<String, Value>, old: &str, new: &str) {
    if meta.get(new).and_then(|v| v.as_str()).map_or(true, str::is_empty) {
        if let Some(v) = meta.get(old).cloned() {
            if v.as_str().map_or(false, |s| !s.is_empty()) {
                meta.insert(new.to_string(), v);
            }
        }
    }
}

fn non_empty_str(meta: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    meta.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
