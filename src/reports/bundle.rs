//! Report bundle writing and retention.
//!
//! A bundle is one directory per run holding canonically-encoded JSON
//! section files. Retention keeps the most recent N bundles; run ids embed a
//! UTC timestamp so lexicographic order is chronological.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::engine::canonical::canonical_string;

/// Write one canonical-JSON section file into a bundle directory.
pub fn write_bundle_file<T: Serialize>(
    bundle_dir: &Path,
    file_name: &str,
    value: &T,
) -> std::io::Result<()> {
    std::fs::create_dir_all(bundle_dir)?;
    std::fs::write(bundle_dir.join(file_name), canonical_string(value))
}

/// Remove the oldest bundle directories beyond `max_retained`.
pub fn prune_bundles(bundles_root: &Path, max_retained: usize) -> std::io::Result<()> {
    if !bundles_root.is_dir() {
        return Ok(());
    }
    let mut dirs: Vec<_> = std::fs::read_dir(bundles_root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.path())
        .collect();
    if dirs.len() <= max_retained {
        return Ok(());
    }
    dirs.sort();
    let excess = dirs.len() - max_retained;
    for dir in dirs.into_iter().take(excess) {
        debug!(bundle = %dir.display(), "pruning old report bundle");
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bundle_files_are_canonical_json() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("run_1");
        write_bundle_file(&bundle, "summary.json", &json!({"b": 1, "a": 2})).unwrap();
        let written = std::fs::read_to_string(bundle.join("summary.json")).unwrap();
        assert_eq!(written, r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn prune_keeps_most_recent_bundles() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["run_20250101", "run_20250102", "run_20250103"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        prune_bundles(dir.path(), 2).unwrap();
        let mut remaining: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["run_20250102", "run_20250103"]);
    }
}
