//! Staleness Assessment
//!
//! Computes how trustworthy a stored insight/note still is by comparing
//! linked-file hashes against the working tree and measuring time since
//! the last verification. Pure in (metadata, filesystem snapshot): the
//! same inputs always produce the same assessment.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::documents::{Metadata, MetadataExt};
use crate::walker::compute_file_hash;

// ============================================================================
// TYPES
// ============================================================================

/// Freshness levels, ordered roughly by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessLevel {
    Fresh,
    PossiblyStale,
    LikelyStale,
    FilesDeleted,
    Deprecated,
}

/// Thresholds for time-based staleness (days)
#[derive(Debug, Clone, Copy)]
pub struct StalenessConfig {
    /// Advisory threshold: old but not alarming
    pub stale_threshold_days: i64,
    /// Verification threshold: too old to trust unverified
    pub very_stale_threshold_days: i64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            stale_threshold_days: 30,
            very_stale_threshold_days: 90,
        }
    }
}

/// A staleness assessment attached to search results
#[derive(Debug, Clone, Serialize)]
pub struct Staleness {
    pub level: StalenessLevel,
    pub verification_required: bool,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_deleted: Vec<String>,
    pub days_since_created: i64,
    pub days_since_verified: i64,
}

impl Staleness {
    fn fresh() -> Self {
        Self {
            level: StalenessLevel::Fresh,
            verification_required: false,
            reasons: vec![],
            files_changed: vec![],
            files_deleted: vec![],
            days_since_created: 0,
            days_since_verified: 0,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.level == StalenessLevel::Fresh
    }
}

// ============================================================================
// CHECKS
// ============================================================================

fn days_since(timestamp: Option<&str>) -> i64 {
    timestamp
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| (Utc::now() - t.with_timezone(&Utc)).num_days())
        .unwrap_or(0)
}

fn fill_ages(result: &mut Staleness, meta: &Metadata) {
    let created_at = meta.str_of("created_at");
    let verified_at = meta.str_of("verified_at").or(created_at);
    result.days_since_created = days_since(created_at);
    result.days_since_verified = days_since(verified_at);
}

/// Assess an insight against the current repository state.
///
/// Precedence: deprecated status, then deleted files, then changed file
/// hashes, then the 90-day verification threshold, then the 30-day
/// advisory threshold.
pub fn check_insight(metadata: &Metadata, repo_path: Option<&Path>, config: &StalenessConfig) -> Staleness {
    let mut result = Staleness::fresh();

    if metadata.str_of("status") == Some("deprecated") {
        result.level = StalenessLevel::Deprecated;
        result.reasons.push("Insight has been deprecated".to_string());
        return result;
    }

    fill_ages(&mut result, metadata);

    let linked_files = metadata.json_list_of("files");
    let stored_hashes = metadata.json_map_of("file_hashes");

    if let Some(repo_path) = repo_path {
        for file_path in &linked_files {
            let full_path = resolve_path(repo_path, file_path);

            if !full_path.exists() {
                result.files_deleted.push(file_path.clone());
                continue;
            }

            if stored_hashes.is_empty() {
                continue;
            }
            let stored = stored_hashes
                .get(file_path)
                .or_else(|| stored_hashes.get(&full_path.to_string_lossy().to_string()));
            let Some(stored) = stored else { continue };

            match compute_file_hash(&full_path) {
                Ok(current) if &current != stored => result.files_changed.push(file_path.clone()),
                Ok(_) => {}
                Err(e) => tracing::warn!("Could not hash {}: {}", file_path, e),
            }
        }
    }

    if !result.files_deleted.is_empty() {
        result.level = StalenessLevel::FilesDeleted;
        result.reasons.push(format!(
            "Linked file(s) deleted: {}",
            result.files_deleted.join(", ")
        ));
        result.verification_required = true;
    } else if !result.files_changed.is_empty() {
        result.level = StalenessLevel::LikelyStale;
        result.reasons.push(format!(
            "Linked file(s) modified: {}",
            result.files_changed.join(", ")
        ));
        result.verification_required = true;
    } else if result.days_since_verified >= config.very_stale_threshold_days {
        result.level = StalenessLevel::PossiblyStale;
        result.reasons.push(format!(
            "Not verified in {} days",
            result.days_since_verified
        ));
        result.verification_required = true;
    } else if result.days_since_verified >= config.stale_threshold_days {
        result.level = StalenessLevel::PossiblyStale;
        result.reasons.push(format!(
            "Insight is {} days old",
            result.days_since_verified
        ));
        // Advisory only at the lower threshold
    }

    result
}

/// Assess a note or session summary. Time-based only: notes carry no file
/// links, so only the higher threshold applies and it requires
/// verification.
pub fn check_note(metadata: &Metadata, config: &StalenessConfig) -> Staleness {
    let mut result = Staleness::fresh();

    if metadata.str_of("status") == Some("deprecated") {
        result.level = StalenessLevel::Deprecated;
        result.reasons.push("Note has been deprecated".to_string());
        return result;
    }

    fill_ages(&mut result, metadata);

    if result.days_since_verified >= config.very_stale_threshold_days {
        result.level = StalenessLevel::PossiblyStale;
        result.reasons.push(format!(
            "Note is {} days old",
            result.days_since_verified
        ));
        result.verification_required = true;
    }

    result
}

fn resolve_path(repo_path: &Path, file_path: &str) -> PathBuf {
    let p = Path::new(file_path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        repo_path.join(p)
    }
}

// ============================================================================
// WARNINGS
// ============================================================================

/// Human-readable verification warning for the assistant. `None` when no
/// warning is needed.
pub fn format_warning(staleness: &Staleness, metadata: &Metadata) -> Option<String> {
    let doc_type = metadata.str_of("type").unwrap_or("note");

    // Deprecated always warns, even though verification is not "required"
    if staleness.level == StalenessLevel::Deprecated {
        return Some(match metadata.str_of("superseded_by") {
            Some(replacement) if !replacement.is_empty() => format!(
                "DEPRECATED: This {doc_type} has been marked invalid. See replacement: {replacement}"
            ),
            _ => format!("DEPRECATED: This {doc_type} has been marked invalid."),
        });
    }

    if !staleness.verification_required {
        return None;
    }

    match staleness.level {
        StalenessLevel::FilesDeleted => {
            let files = staleness.files_deleted.join(", ");
            Some(format!(
                "VERIFICATION REQUIRED - FILES DELETED: The files this {doc_type} references \
                 ({files}) no longer exist. This {doc_type} may be obsolete. \
                 DO NOT TRUST without investigation."
            ))
        }
        StalenessLevel::LikelyStale => {
            let files = staleness.files_changed.join(", ");
            Some(format!(
                "VERIFICATION REQUIRED - FILES CHANGED: This {doc_type} references files that \
                 have been modified since it was created ({files}). You MUST re-read these \
                 files to verify this analysis is still accurate before using this information."
            ))
        }
        StalenessLevel::PossiblyStale => {
            let days = staleness.days_since_verified;
            Some(format!(
                "POSSIBLY OUTDATED: This {doc_type} is {days} days old and has not been \
                 verified recently. Consider validating before relying on it heavily."
            ))
        }
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::MetadataExt;

    fn insight_meta(files: &[&str], hashes: &[(&str, &str)]) -> Metadata {
        let mut meta = Metadata::new();
        meta.set_str("type", "insight");
        meta.set_str("created_at", chrono::Utc::now().to_rfc3339());
        meta.set_str("verified_at", chrono::Utc::now().to_rfc3339());
        meta.set_str("status", "active");
        meta.set_str("files", serde_json::to_string(files).unwrap());
        let map: std::collections::HashMap<_, _> = hashes.iter().cloned().collect();
        meta.set_str("file_hashes", serde_json::to_string(&map).unwrap());
        meta
    }

    #[test]
    fn test_fresh_insight() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("auth.py");
        std::fs::write(&file, "session auth").unwrap();
        let hash = compute_file_hash(&file).unwrap();

        let meta = insight_meta(&["auth.py"], &[("auth.py", hash.as_str())]);
        let result = check_insight(&meta, Some(dir.path()), &StalenessConfig::default());

        assert_eq!(result.level, StalenessLevel::Fresh);
        assert!(!result.verification_required);
        assert!(format_warning(&result, &meta).is_none());
    }

    #[test]
    fn test_changed_file_is_likely_stale() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("auth.py");
        std::fs::write(&file, "session auth").unwrap();
        let hash = compute_file_hash(&file).unwrap();
        std::fs::write(&file, "jwt token auth").unwrap();

        let meta = insight_meta(&["auth.py"], &[("auth.py", hash.as_str())]);
        let result = check_insight(&meta, Some(dir.path()), &StalenessConfig::default());

        assert_eq!(result.level, StalenessLevel::LikelyStale);
        assert!(result.verification_required);
        assert_eq!(result.files_changed, vec!["auth.py"]);

        let warning = format_warning(&result, &meta).unwrap();
        assert!(warning.starts_with("VERIFICATION REQUIRED - FILES CHANGED"));
    }

    #[test]
    fn test_deleted_file_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let meta = insight_meta(&["gone.py"], &[("gone.py", "whatever")]);
        let result = check_insight(&meta, Some(dir.path()), &StalenessConfig::default());

        assert_eq!(result.level, StalenessLevel::FilesDeleted);
        assert!(result.verification_required);
        assert_eq!(result.files_deleted, vec!["gone.py"]);

        let warning = format_warning(&result, &meta).unwrap();
        assert!(warning.starts_with("VERIFICATION REQUIRED - FILES DELETED"));
    }

    #[test]
    fn test_deprecated_wins_over_everything() {
        let mut meta = insight_meta(&["gone.py"], &[]);
        meta.set_str("status", "deprecated");
        meta.set_str("superseded_by", "insight:new00001");

        let result = check_insight(&meta, None, &StalenessConfig::default());
        assert_eq!(result.level, StalenessLevel::Deprecated);

        let warning = format_warning(&result, &meta).unwrap();
        assert!(warning.starts_with("DEPRECATED"));
        assert!(warning.contains("insight:new00001"));
    }

    #[test]
    fn test_age_thresholds() {
        let old = (chrono::Utc::now() - chrono::Duration::days(45)).to_rfc3339();
        let very_old = (chrono::Utc::now() - chrono::Duration::days(120)).to_rfc3339();
        let config = StalenessConfig::default();

        // 45 days: advisory only
        let mut meta = insight_meta(&[], &[]);
        meta.set_str("created_at", old.clone());
        meta.set_str("verified_at", old.clone());
        let result = check_insight(&meta, None, &config);
        assert_eq!(result.level, StalenessLevel::PossiblyStale);
        assert!(!result.verification_required);

        // 120 days: verification required
        meta.set_str("verified_at", very_old.clone());
        let result = check_insight(&meta, None, &config);
        assert_eq!(result.level, StalenessLevel::PossiblyStale);
        assert!(result.verification_required);
    }

    #[test]
    fn test_note_only_triggers_at_higher_threshold() {
        let config = StalenessConfig::default();
        let mut meta = Metadata::new();
        meta.set_str("type", "note");

        let at_45 = (chrono::Utc::now() - chrono::Duration::days(45)).to_rfc3339();
        meta.set_str("created_at", at_45.clone());
        meta.set_str("verified_at", at_45);
        let result = check_note(&meta, &config);
        assert_eq!(result.level, StalenessLevel::Fresh);

        let at_120 = (chrono::Utc::now() - chrono::Duration::days(120)).to_rfc3339();
        meta.set_str("verified_at", at_120);
        let result = check_note(&meta, &config);
        assert_eq!(result.level, StalenessLevel::PossiblyStale);
        assert!(result.verification_required);

        let warning = format_warning(&result, &meta).unwrap();
        assert!(warning.starts_with("POSSIBLY OUTDATED"));
    }

    #[test]
    fn test_determinism() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "content").unwrap();

        let meta = insight_meta(&["a.py"], &[("a.py", "stale-hash")]);
        let first = check_insight(&meta, Some(dir.path()), &StalenessConfig::default());
        let second = check_insight(&meta, Some(dir.path()), &StalenessConfig::default());
        assert_eq!(first.level, second.level);
        assert_eq!(first.files_changed, second.files_changed);
        assert_eq!(first.reasons, second.reasons);
    }
}
