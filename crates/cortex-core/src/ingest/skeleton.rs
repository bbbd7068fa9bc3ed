//! Repository Skeleton
//!
//! Renders a repository's directory tree and stores it as the singleton
//! `<repository>:skeleton:<branch>` document for file-path grounding.
//! Prefers the system `tree` command and falls back to an internal
//! traversal honoring the same ignore patterns.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::documents::{Metadata, MetadataExt, now_rfc3339};
use crate::store::{Store, StoreError};

/// Maximum tree depth rendered
const MAX_DEPTH: usize = 10;

/// Budget for the system `tree` command
const TREE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tree statistics derived from the rendered output
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SkeletonStats {
    pub total_files: i64,
    pub total_dirs: i64,
}

/// Render the tree for `root`, trying the system `tree` binary first.
pub async fn generate_tree(root: &Path, ignore: &HashSet<String>) -> (String, SkeletonStats) {
    let output = match run_system_tree(root, ignore).await {
        Some(tree) => tree,
        None => render_fallback(root, ignore),
    };
    let stats = analyze_tree(&output);
    (output, stats)
}

async fn run_system_tree(root: &Path, ignore: &HashSet<String>) -> Option<String> {
    let ignore_pattern = ignore.iter().cloned().collect::<Vec<_>>().join("|");

    let fut = tokio::process::Command::new("tree")
        .args(["-L", &MAX_DEPTH.to_string(), "-a", "-I", &ignore_pattern, "--noreport"])
        .current_dir(root)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(TREE_TIMEOUT, fut).await {
        Ok(Ok(output)) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

/// Internal traversal fallback producing `tree`-style connectors.
fn render_fallback(root: &Path, ignore: &HashSet<String>) -> String {
    fn keep(name: &str, ignore: &HashSet<String>) -> bool {
        !name.starts_with('.') && !name.ends_with(".egg-info") && !ignore.contains(name)
    }

    fn traverse(path: &Path, prefix: &str, depth: usize, ignore: &HashSet<String>, lines: &mut Vec<String>) {
        if depth > MAX_DEPTH {
            return;
        }
        let Ok(entries) = std::fs::read_dir(path) else {
            return;
        };

        let mut items: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| keep(n, ignore))
                    .unwrap_or(false)
            })
            .collect();
        // Directories first, then case-insensitive by name
        items.sort_by_key(|p| {
            (
                !p.is_dir(),
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_lowercase())
                    .unwrap_or_default(),
            )
        });

        let count = items.len();
        for (i, item) in items.into_iter().enumerate() {
            let is_last = i == count - 1;
            let connector = if is_last { "└── " } else { "├── " };
            let name = item
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string();
            lines.push(format!("{prefix}{connector}{name}"));

            if item.is_dir() {
                let next_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
                traverse(&item, &next_prefix, depth + 1, ignore, lines);
            }
        }
    }

    let root_name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(".")
        .to_string();
    let mut lines = vec![root_name];
    traverse(root, "", 0, ignore, &mut lines);
    lines.join("\n")
}

/// Count files and directories from the rendered connectors. Entries with
/// a dot in the name count as files.
fn analyze_tree(tree: &str) -> SkeletonStats {
    let mut stats = SkeletonStats::default();
    for line in tree.lines().skip(1) {
        let Some(name) = line.rsplit("── ").next().filter(|_| line.contains("── ")) else {
            continue;
        };
        if name.contains('.') && !name.ends_with('/') {
            stats.total_files += 1;
        } else {
            stats.total_dirs += 1;
        }
    }
    stats
}

/// Upsert the skeleton document, overwriting the previous one for this
/// (repository, branch).
pub fn store_skeleton(
    store: &Store,
    tree: &str,
    repository: &str,
    branch: &str,
    stats: SkeletonStats,
    indexed_commit: Option<&str>,
) -> Result<String, StoreError> {
    let doc_id = format!("{repository}:skeleton:{branch}");
    let timestamp = now_rfc3339();

    let mut meta = Metadata::new();
    meta.set_str("type", "skeleton");
    meta.set_str("repository", repository);
    meta.set_str("branch", branch);
    meta.insert("total_files".to_string(), stats.total_files.into());
    meta.insert("total_dirs".to_string(), stats.total_dirs.into());
    meta.set_str("indexed_commit", indexed_commit.unwrap_or(""));
    meta.set_str("created_at", timestamp.clone());
    meta.set_str("updated_at", timestamp);

    store.upsert(&doc_id, tree, meta, None)?;
    tracing::debug!(
        "Skeleton stored: {} ({} files, {} dirs)",
        doc_id,
        stats.total_files,
        stats.total_dirs
    );
    Ok(doc_id)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_render_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.py"), "x").unwrap();
        std::fs::write(dir.path().join("README.md"), "x").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/junk.js"), "x").unwrap();

        let ignore: HashSet<String> = ["node_modules".to_string()].into_iter().collect();
        let tree = render_fallback(dir.path(), &ignore);

        assert!(tree.contains("src"));
        assert!(tree.contains("app.py"));
        assert!(tree.contains("README.md"));
        assert!(!tree.contains("node_modules"));

        let stats = analyze_tree(&tree);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_dirs, 1);
    }

    #[test]
    fn test_analyze_empty_tree() {
        let stats = analyze_tree("root-only");
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.total_dirs, 0);
    }
}
