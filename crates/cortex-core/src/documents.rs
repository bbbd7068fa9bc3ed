//! Document Type Definitions
//!
//! Central definition of all document kinds, their metadata schemas, and
//! related constants.
//!
//! Document categories:
//! - Navigation (the map): `code`, `skeleton`, `file_metadata`, `dependency`
//! - Understanding (the manual): `entry_point`, `data_contract`
//! - Semantic memory (the brain): `note`, `insight`, `session_summary`,
//!   `tech_stack`, `initiative`, `focus`
//!
//! Every document carries `type`, `repository`, `created_at`, `updated_at`
//! in its metadata. Arrays (tags, files, file hashes) are serialized as JSON
//! strings because the store speaks a flat scalar map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// DOCUMENT KINDS
// ============================================================================

/// Kinds of documents held in the store
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// A chunk of a source file
    Code,
    /// A repository's rendered tree structure
    Skeleton,
    /// Per-file description
    FileMetadata,
    /// Per-file dependency edges
    Dependency,
    /// Wire/data format description
    DataContract,
    /// Program entry point description
    EntryPoint,
    /// Decision, learning, or documentation snippet
    Note,
    /// Understanding anchored to specific files
    Insight,
    /// End-of-session context capture
    SessionSummary,
    /// Stable per-repository description
    TechStack,
    /// Multi-session workstream
    Initiative,
    /// Pointer to the currently focused initiative
    Focus,
}

impl DocType {
    /// Convert to the string stored in metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Code => "code",
            DocType::Skeleton => "skeleton",
            DocType::FileMetadata => "file_metadata",
            DocType::Dependency => "dependency",
            DocType::DataContract => "data_contract",
            DocType::EntryPoint => "entry_point",
            DocType::Note => "note",
            DocType::Insight => "insight",
            DocType::SessionSummary => "session_summary",
            DocType::TechStack => "tech_stack",
            DocType::Initiative => "initiative",
            DocType::Focus => "focus",
        }
    }

    /// Parse from a metadata string
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "code" => Some(DocType::Code),
            "skeleton" => Some(DocType::Skeleton),
            "file_metadata" => Some(DocType::FileMetadata),
            "dependency" => Some(DocType::Dependency),
            "data_contract" => Some(DocType::DataContract),
            "entry_point" => Some(DocType::EntryPoint),
            "note" => Some(DocType::Note),
            "insight" => Some(DocType::Insight),
            "session_summary" => Some(DocType::SessionSummary),
            "tech_stack" => Some(DocType::TechStack),
            "initiative" => Some(DocType::Initiative),
            "focus" => Some(DocType::Focus),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TYPE SETS
// ============================================================================

/// Types scoped to a git branch. Everything else is cross-branch.
pub const BRANCH_SCOPED_TYPES: &[&str] = &[
    "code",
    "skeleton",
    "file_metadata",
    "dependency",
    "data_contract",
    "entry_point",
];

/// Cross-branch semantic memory types, always included by branch-aware
/// filters.
pub const CROSS_BRANCH_TYPES: &[&str] = &[
    "note",
    "session_summary",
    "tech_stack",
    "initiative",
    "insight",
];

/// Types that receive the recency boost. Code is not boosted - old code is
/// not less relevant.
pub const RECENCY_BOOSTED_TYPES: &[&str] = &["note", "session_summary"];

/// Repository-wide metadata types: retained by initiative filtering even
/// when untagged, since they belong to the whole repository.
pub const METADATA_ONLY_TYPES: &[&str] = &[
    "code",
    "skeleton",
    "file_metadata",
    "dependency",
    "data_contract",
    "entry_point",
    "tech_stack",
];

/// Code-family types garbage-collected when a file is deleted or renamed.
pub const FILE_SCOPED_TYPES: &[&str] = &["code", "file_metadata", "dependency"];

/// Default type-based score multipliers: understanding over navigation.
/// "Code can be grepped. Understanding cannot."
pub fn default_type_multipliers() -> HashMap<String, f64> {
    let mut m = HashMap::new();
    m.insert("insight".to_string(), 2.0);
    m.insert("note".to_string(), 1.5);
    m.insert("session_summary".to_string(), 1.5);
    m.insert("entry_point".to_string(), 1.4);
    m.insert("file_metadata".to_string(), 1.3);
    m.insert("data_contract".to_string(), 1.3);
    m.insert("tech_stack".to_string(), 1.2);
    m.insert("dependency".to_string(), 1.0);
    m.insert("skeleton".to_string(), 1.0);
    m.insert("initiative".to_string(), 1.0);
    m
}

// ============================================================================
// METADATA
// ============================================================================

/// Flat scalar metadata map attached to every document.
///
/// Values are JSON scalars; collections (tags, files, file_hashes) are
/// stored as JSON-encoded strings.
pub type Metadata = serde_json::Map<String, Value>;

/// Typed accessors over the metadata map
pub trait MetadataExt {
    fn str_of(&self, key: &str) -> Option<&str>;
    fn i64_of(&self, key: &str) -> Option<i64>;
    fn f64_of(&self, key: &str) -> Option<f64>;
    fn bool_of(&self, key: &str) -> Option<bool>;
    /// Decode a JSON-string-encoded array value (e.g. `tags`, `files`)
    fn json_list_of(&self, key: &str) -> Vec<String>;
    /// Decode a JSON-string-encoded string map value (e.g. `file_hashes`)
    fn json_map_of(&self, key: &str) -> HashMap<String, String>;
    fn set_str(&mut self, key: &str, value: impl Into<String>);
}

impl MetadataExt for Metadata {
    fn str_of(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn i64_of(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    fn f64_of(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    fn bool_of(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    fn json_list_of(&self, key: &str) -> Vec<String> {
        self.str_of(key)
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }

    fn json_map_of(&self, key: &str) -> HashMap<String, String> {
        self.str_of(key)
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }

    fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.insert(key.to_string(), Value::String(value.into()));
    }
}

/// Generate a short document id of the form `<kind>:<short-hex>`
pub fn new_doc_id(kind: DocType) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}:{}", kind.as_str(), &hex[..8])
}

/// Current timestamp in RFC 3339 UTC, the format used by all metadata
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_roundtrip() {
        for t in [
            DocType::Code,
            DocType::Skeleton,
            DocType::Note,
            DocType::Insight,
            DocType::SessionSummary,
            DocType::TechStack,
            DocType::Initiative,
            DocType::Focus,
        ] {
            assert_eq!(DocType::parse_name(t.as_str()), Some(t));
        }
        assert_eq!(DocType::parse_name("idiom"), None);
    }

    #[test]
    fn test_new_doc_id_shape() {
        let id = new_doc_id(DocType::Note);
        assert!(id.starts_with("note:"));
        assert_eq!(id.len(), "note:".len() + 8);
    }

    #[test]
    fn test_metadata_ext() {
        let mut meta = Metadata::new();
        meta.set_str("type", "insight");
        meta.set_str("tags", r#"["auth","jwt"]"#);
        meta.set_str("file_hashes", r#"{"src/auth.py":"abc123"}"#);
        meta.insert("chunk_index".to_string(), Value::from(3));

        assert_eq!(meta.str_of("type"), Some("insight"));
        assert_eq!(meta.i64_of("chunk_index"), Some(3));
        assert_eq!(meta.json_list_of("tags"), vec!["auth", "jwt"]);
        assert_eq!(
            meta.json_map_of("file_hashes").get("src/auth.py").map(String::as_str),
            Some("abc123")
        );
        assert!(meta.json_list_of("missing").is_empty());
    }

    #[test]
    fn test_type_multiplier_defaults() {
        let m = default_type_multipliers();
        assert_eq!(m["insight"], 2.0);
        assert_eq!(m["note"], 1.5);
        assert_eq!(m["tech_stack"], 1.2);
        assert!(!m.contains_key("code"));
    }
}
