//! Delta-Sync State
//!
//! Persisted per-repository ingestion state used to decide what changed
//! since the last index run: the indexed commit, the indexed timestamp, and
//! per-file content hashes. Stored as a single atomic JSON document at
//! `ingest_state.json` in the data directory.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::persist;

/// Per-repository ingestion state for delta sync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaState {
    /// Repository identifier (basename of the indexed root)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Branch at the time of the last successful ingest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// HEAD commit at the last successful ingest (None outside VC repos)
    #[serde(default)]
    pub indexed_commit: Option<String>,
    /// RFC 3339 timestamp of the last successful ingest
    #[serde(default)]
    pub indexed_at: Option<String>,
    /// Absolute path -> md5 hex of file content at index time
    #[serde(default)]
    pub file_hashes: BTreeMap<String, String>,
}

impl DeltaState {
    /// Load state from disk, migrating the legacy flat `{path: hash}`
    /// layout to the structured form. Missing or empty files yield the
    /// default state.
    pub fn load(path: &Path) -> Self {
        let raw: Option<Value> = match persist::read_json(path) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to read delta state {}: {}", path.display(), e);
                None
            }
        };
        match raw {
            Some(value) => Self::migrate(value),
            None => Self::default(),
        }
    }

    /// Migrate a raw JSON value into the structured state.
    ///
    /// The legacy layout was a bare `{"<path>": "<md5>"}` map with no
    /// structural keys.
    pub fn migrate(raw: Value) -> Self {
        let Value::Object(map) = raw else {
            return Self::default();
        };

        let is_structured = map.contains_key("file_hashes") || map.contains_key("indexed_commit");
        if is_structured {
            return serde_json::from_value(Value::Object(map)).unwrap_or_default();
        }

        // Legacy flat layout: every value is a hash string
        let file_hashes = map
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect();

        Self {
            file_hashes,
            ..Self::default()
        }
    }

    /// Atomically persist the state (write temp sibling, fsync, rename).
    pub fn save(&self, path: &Path) -> Result<(), persist::PersistError> {
        persist::write_json(path, self)
    }

    /// Drop hash entries for removed or renamed-away paths.
    pub fn purge_paths<S: AsRef<str>>(&mut self, paths: &[S]) {
        for p in paths {
            self.file_hashes.remove(p.as_ref());
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = DeltaState::load(&dir.path().join("ingest_state.json"));
        assert!(state.indexed_commit.is_none());
        assert!(state.file_hashes.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest_state.json");

        let mut state = DeltaState {
            repository: Some("demo".into()),
            branch: Some("main".into()),
            indexed_commit: Some("abc123".into()),
            indexed_at: Some("2026-01-01T00:00:00+00:00".into()),
            ..Default::default()
        };
        state
            .file_hashes
            .insert("/repo/a.py".into(), "d41d8cd9".into());
        state.save(&path).unwrap();

        let back = DeltaState::load(&path);
        assert_eq!(back.repository.as_deref(), Some("demo"));
        assert_eq!(back.indexed_commit.as_deref(), Some("abc123"));
        assert_eq!(back.file_hashes.len(), 1);
    }

    #[test]
    fn test_legacy_flat_layout_migrates() {
        let legacy = json!({
            "/repo/a.py": "hash-a",
            "/repo/b.py": "hash-b",
        });
        let state = DeltaState::migrate(legacy);
        assert_eq!(state.file_hashes.len(), 2);
        assert_eq!(state.file_hashes["/repo/a.py"], "hash-a");
        assert!(state.indexed_commit.is_none());
    }

    #[test]
    fn test_structured_layout_preserved() {
        let structured = json!({
            "indexed_commit": "fff",
            "file_hashes": {"/x": "1"},
        });
        let state = DeltaState::migrate(structured);
        assert_eq!(state.indexed_commit.as_deref(), Some("fff"));
        assert_eq!(state.file_hashes["/x"], "1");
    }

    #[test]
    fn test_purge_paths() {
        let mut state = DeltaState::default();
        state.file_hashes.insert("/a".into(), "1".into());
        state.file_hashes.insert("/b".into(), "2".into());
        state.purge_paths(&["/a"]);
        assert!(!state.file_hashes.contains_key("/a"));
        assert!(state.file_hashes.contains_key("/b"));
    }
}
