//! Canonical JSON and checksum helpers.
//!
//! Every checksum in the system routes through this module so that two
//! serializations of the same logical value can never disagree. The canonical
//! form is: keys sorted lexicographically, compact separators (`","` / `":"`),
//! and UTC timestamps rendered as ISO-8601 with a `+00:00` offset (never `Z`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a UTC timestamp in the canonical ISO-8601 form (`+00:00` offset).
pub fn iso_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parse an ISO-8601 timestamp, accepting both `Z` and `+00:00` offsets.
/// Returns `None` for empty or malformed input instead of raising.
pub fn parse_iso_utc(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Canonical JSON string for a serializable value.
///
/// Serialization failures collapse to the canonical encoding of `null`; the
/// values hashed here are plain data types that cannot fail to serialize.
pub fn canonical_string<T: Serialize>(value: &T) -> String {
    let v = serde_json::to_value(value).unwrap_or(Value::Null);
    let mut out = String::new();
    write_canonical(&v, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar).unwrap_or_default()),
    }
}

/// SHA-256 over the canonical JSON encoding, hex-encoded (64 chars).
pub fn sha256_canonical<T: Serialize>(value: &T) -> String {
    sha256_hex(canonical_string(value).as_bytes())
}

/// SHA-256 over raw bytes, hex-encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Truncated SHA-256 over the canonical JSON encoding (32 hex chars).
/// Used for input/output stability hashes and cache keys.
pub fn sha256_canonical_short<T: Serialize>(value: &T) -> String {
    let full = sha256_canonical(value);
    full[..32].to_string()
}

/// Recursively remove volatile keys from a serialized value so repeated runs
/// over identical payloads produce identical checksums.
pub fn strip_volatile(value: &Value, volatile_keys: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if volatile_keys.contains(&k.as_str()) {
                    continue;
                }
                out.insert(k.clone(), strip_volatile(v, volatile_keys));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| strip_volatile(v, volatile_keys))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn canonical_sorts_keys_and_uses_compact_separators() {
        let v = json!({"b": 1, "a": {"z": true, "y": [1, 2]}});
        assert_eq!(canonical_string(&v), r#"{"a":{"y":[1,2],"z":true},"b":1}"#);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let v = json!({"k": [3, 2, {"x": null}], "t": "2025-10-01T12:00:00+00:00"});
        let once = canonical_string(&v);
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        assert_eq!(canonical_string(&reparsed), once);
        assert_eq!(sha256_canonical(&v), sha256_canonical(&reparsed));
    }

    #[test]
    fn iso_utc_uses_explicit_offset_not_z() {
        let dt = Utc.with_ymd_and_hms(2025, 10, 1, 12, 30, 0).unwrap();
        assert_eq!(iso_utc(dt), "2025-10-01T12:30:00+00:00");
    }

    #[test]
    fn parse_iso_accepts_z_and_offset() {
        let a = parse_iso_utc("2025-10-01T12:30:00Z").unwrap();
        let b = parse_iso_utc("2025-10-01T12:30:00+00:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_iso_utc("").is_none());
        assert!(parse_iso_utc("not-a-date").is_none());
    }

    #[test]
    fn strip_volatile_removes_keys_recursively() {
        let v = json!({
            "captured_at_utc": "2025-10-01T12:00:00+00:00",
            "domains": {"stats": {"fetched_at_utc": "x", "data": {"a": 1}}}
        });
        let stripped = strip_volatile(&v, &["captured_at_utc", "fetched_at_utc"]);
        assert_eq!(stripped, json!({"domains": {"stats": {"data": {"a": 1}}}}));
    }

    #[test]
    fn short_hash_is_32_chars() {
        assert_eq!(sha256_canonical_short(&json!({"a": 1})).len(), 32);
    }
}
