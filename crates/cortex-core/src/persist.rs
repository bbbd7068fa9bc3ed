//! Atomic JSON Persistence
//!
//! Shared rename-over-temp discipline for `ingest_state.json` and the task
//! queue files: serialize to a temporary sibling, fsync, then rename over
//! the target so readers never observe a partial write.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Persistence error type
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Atomic rename failed: {0}")]
    Persist(String),
}

/// Persistence result type
pub type Result<T> = std::result::Result<T, PersistError>;

/// Atomically write `value` as pretty JSON to `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| PersistError::Persist(e.to_string()))?;

    Ok(())
}

/// Read JSON from `path`. Returns `Ok(None)` when the file is missing or
/// empty.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&content)?))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json(&path, &json!({"a": 1, "b": ["x"]})).unwrap();
        let back: Option<serde_json::Value> = read_json(&path).unwrap();
        assert_eq!(back.unwrap()["a"], 1);
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let back: Option<serde_json::Value> = read_json(&path).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json(&path, &json!({"v": 1})).unwrap();
        write_json(&path, &json!({"v": 2})).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let back: Option<serde_json::Value> = read_json(&path).unwrap();
        assert_eq!(back.unwrap()["v"], 2);
    }
}
