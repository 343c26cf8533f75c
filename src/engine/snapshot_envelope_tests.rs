//! Envelope build/parse round-trip and backward-compatibility tests.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use crate::engine::snapshot_envelope::{
    build_envelope_for_live_shadow, build_envelope_for_recorded, compute_envelope_checksum_value,
    compute_latency_ms, compute_payload_checksum, parse_stored_payload, SnapshotType,
};

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
}

#[test]
fn payload_checksum_is_function_of_payload_alone() {
    let payload = json!({"home_team": "PAOK", "away_team": "AEK"});
    let a = build_envelope_for_recorded(&payload, "snap-a", fixed_now(), "recorded");
    let b = build_envelope_for_live_shadow(
        &payload,
        "snap-b",
        fixed_now(),
        "stub_live_platform",
        fixed_now(),
        None,
        None,
        Some(12.0),
    );
    assert_eq!(a.payload_checksum, b.payload_checksum);
    assert_eq!(a.payload_checksum, compute_payload_checksum(&payload));
}

#[test]
fn recorded_envelope_defaults_observed_to_created() {
    let env = build_envelope_for_recorded(&json!({"k": 1}), "snap", fixed_now(), "pipeline_cache");
    assert_eq!(env.snapshot_type, SnapshotType::Recorded);
    assert_eq!(env.observed_at_utc, env.created_at_utc);
    assert_eq!(env.created_at_utc, "2025-10-01T12:00:00+00:00");
    assert!(env.envelope_checksum.is_some());
}

#[test]
fn envelope_checksum_covers_every_field_except_itself() {
    let env = build_envelope_for_recorded(&json!({"k": 1}), "snap", fixed_now(), "recorded");
    let as_value = serde_json::to_value(&env).unwrap();
    let recomputed = compute_envelope_checksum_value(&as_value);
    assert_eq!(env.envelope_checksum.as_deref(), Some(recomputed.as_str()));

    let mut tampered = env.clone();
    tampered.snapshot_id = "other".to_string();
    let tampered_value = serde_json::to_value(&tampered).unwrap();
    assert_ne!(
        compute_envelope_checksum_value(&tampered_value),
        recomputed
    );
}

#[test]
fn build_serialize_parse_round_trip_preserves_checksums() {
    let payload = json!({"match_id": "m1", "odds_1x2": {"home": 1.8, "draw": 3.4, "away": 4.2}});
    let env = build_envelope_for_recorded(&payload, "snap-rt", fixed_now(), "recorded");
    let stored = serde_json::to_string(&json!({
        "metadata": serde_json::to_value(&env).unwrap(),
        "payload": payload,
    }))
    .unwrap();

    let mut missing_calls = 0u32;
    let mut integrity_calls = 0u32;
    let parsed = parse_stored_payload(
        &stored,
        Some(fixed_now()),
        |_| missing_calls += 1,
        |_, _| integrity_calls += 1,
    );

    assert_eq!(missing_calls, 0);
    assert_eq!(integrity_calls, 0);
    assert_eq!(parsed.payload, payload);
    assert_eq!(
        parsed.metadata.get("payload_checksum").and_then(Value::as_str),
        Some(compute_payload_checksum(&parsed.payload).as_str())
    );
}

#[test]
fn legacy_flat_payload_parses_with_defaults_and_signal() {
    let mut signals: Vec<Vec<String>> = Vec::new();
    let parsed = parse_stored_payload(
        r#"{"home_team": "A", "away_team": "B"}"#,
        Some(fixed_now()),
        |missing| signals.push(missing.to_vec()),
        |_, _| panic!("no integrity failure expected"),
    );
    assert_eq!(signals, vec![vec!["legacy_no_envelope".to_string()]]);
    assert_eq!(
        parsed.payload.get("home_team").and_then(Value::as_str),
        Some("A")
    );
    assert_eq!(
        parsed.metadata.get("schema_version").and_then(Value::as_u64),
        Some(0)
    );
}

#[test]
fn historical_field_names_are_normalized() {
    let stored = json!({
        "metadata": {
            "snapshot_id": "legacy-1",
            "snapshot_type": "recorded",
            "created_at_utc": "2025-09-01T00:00:00+00:00",
            "observed_at": "2025-09-01T01:00:00+00:00",
            "checksum": "abc123",
            "fetch_started_at": "2025-09-01T00:59:58+00:00",
            "fetch_ended_at": "2025-09-01T00:59:59+00:00",
        },
        "payload": {"k": 1},
    })
    .to_string();

    let parsed = parse_stored_payload(&stored, Some(fixed_now()), |_| {}, |_, _| {});
    let meta = parsed.metadata.as_object().unwrap();
    assert_eq!(
        meta.get("observed_at_utc").and_then(Value::as_str),
        Some("2025-09-01T01:00:00+00:00")
    );
    assert_eq!(
        meta.get("payload_checksum").and_then(Value::as_str),
        Some("abc123")
    );
    assert_eq!(
        meta.get("fetch_started_at_utc").and_then(Value::as_str),
        Some("2025-09-01T00:59:58+00:00")
    );
    assert_eq!(
        meta.get("fetch_ended_at_utc").and_then(Value::as_str),
        Some("2025-09-01T00:59:59+00:00")
    );
}

#[test]
fn integrity_mismatch_is_reported_but_record_kept() {
    let payload = json!({"k": 1});
    let mut env = build_envelope_for_recorded(&payload, "snap-x", fixed_now(), "recorded");
    env.envelope_checksum = Some("0".repeat(64));
    let stored = json!({"metadata": serde_json::to_value(&env).unwrap(), "payload": payload})
        .to_string();

    let mut failures: Vec<(String, String)> = Vec::new();
    let parsed = parse_stored_payload(
        &stored,
        Some(fixed_now()),
        |_| {},
        |id, reason| failures.push((id.to_string(), reason.to_string())),
    );
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "snap-x");
    assert!(failures[0].1.contains("mismatch"));
    // The record itself is still returned intact.
    assert_eq!(parsed.payload, payload);
}

#[test]
fn latency_from_fetch_timestamps() {
    let ms = compute_latency_ms(
        Some("2025-10-01T12:00:00+00:00"),
        Some("2025-10-01T12:00:01+00:00"),
    );
    assert_eq!(ms, Some(1000.0));
    assert_eq!(compute_latency_ms(None, Some("2025-10-01T12:00:01Z")), None);
    assert_eq!(compute_latency_ms(Some("bad"), Some("also bad")), None);
}
