//! Version-Control Introspection
//!
//! Wraps the `git` command-line tool for branch/commit lookups and
//! changed-file detection. All operations are best-effort: a missing
//! binary, a non-repo directory, or a timeout yields a conservative
//! default (false, empty, or `None`) rather than an error, so callers
//! never fail because version control is unavailable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

/// Timeout for cheap lookups (rev-parse, log counts)
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for diff and file-listing operations on large repos
pub const DIFF_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a git subcommand in `path`, returning trimmed stdout on success.
async fn run_git(path: &Path, args: &[&str], timeout: Duration) -> Option<String> {
    let fut = Command::new("git")
        .args(args)
        .current_dir(path)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        Ok(Ok(output)) => {
            tracing::debug!(
                "git {:?} exited with {} in {}",
                args,
                output.status,
                path.display()
            );
            None
        }
        Ok(Err(e)) => {
            tracing::debug!("git {:?} failed to spawn: {}", args, e);
            None
        }
        Err(_) => {
            tracing::warn!("git {:?} timed out after {:?}", args, timeout);
            None
        }
    }
}

/// Check whether `path` is inside a git repository.
pub async fn is_repo(path: &Path) -> bool {
    run_git(path, &["rev-parse", "--git-dir"], LOOKUP_TIMEOUT)
        .await
        .is_some()
}

/// Current HEAD commit hash, or `None` outside a repo.
pub async fn head_commit(path: &Path) -> Option<String> {
    run_git(path, &["rev-parse", "HEAD"], LOOKUP_TIMEOUT).await
}

/// Current branch name, or `None` outside a repo.
pub async fn branch(path: &Path) -> Option<String> {
    run_git(path, &["rev-parse", "--abbrev-ref", "HEAD"], LOOKUP_TIMEOUT).await
}

/// Current branch name, or `"unknown"` when unavailable.
pub async fn current_branch(path: &Path) -> String {
    branch(path).await.unwrap_or_else(|| "unknown".to_string())
}

/// Repository root (toplevel) for `path`.
pub async fn root(path: &Path) -> Option<PathBuf> {
    run_git(path, &["rev-parse", "--show-toplevel"], LOOKUP_TIMEOUT)
        .await
        .map(PathBuf::from)
}

/// Files changed since `since_commit`, with rename detection.
///
/// Returns `(modified, deleted, renamed)` as absolute paths under `path`.
/// A rename contributes both a `(old, new)` pair and the new path in
/// `modified` so the caller cleans up the old location and indexes the new
/// one.
pub async fn changed_since(
    path: &Path,
    since_commit: &str,
) -> (Vec<PathBuf>, Vec<PathBuf>, Vec<(PathBuf, PathBuf)>) {
    let Some(stdout) = run_git(
        path,
        &["diff", "--name-status", "-M", since_commit, "HEAD"],
        DIFF_TIMEOUT,
    )
    .await
    else {
        return (vec![], vec![], vec![]);
    };

    let mut modified = Vec::new();
    let mut deleted = Vec::new();
    let mut renamed = Vec::new();

    for line in stdout.lines() {
        let mut parts = line.split('\t');
        let Some(status) = parts.next() else { continue };

        if status.starts_with('R') {
            // Rename: R100\told_path\tnew_path
            if let (Some(old), Some(new)) = (parts.next(), parts.next()) {
                let new_abs = path.join(new);
                renamed.push((path.join(old), new_abs.clone()));
                modified.push(new_abs);
            }
        } else if status == "D" {
            if let Some(p) = parts.next() {
                deleted.push(path.join(p));
            }
        } else if matches!(status, "A" | "M" | "T") {
            if let Some(p) = parts.next() {
                modified.push(path.join(p));
            }
        }
    }

    (modified, deleted, renamed)
}

/// Untracked files that are not ignored, as absolute paths.
pub async fn untracked(path: &Path) -> Vec<PathBuf> {
    match run_git(
        path,
        &["ls-files", "--others", "--exclude-standard"],
        DIFF_TIMEOUT,
    )
    .await
    {
        Some(stdout) => stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| path.join(l))
            .collect(),
        None => vec![],
    }
}

/// Count commits since an ISO timestamp.
pub async fn commits_since(path: &Path, since_timestamp: &str) -> u64 {
    count_log_lines(path, &["log", "--oneline", &format!("--since={since_timestamp}")]).await
}

/// Count merge commits since an ISO timestamp.
pub async fn merge_commits_since(path: &Path, since_timestamp: &str) -> u64 {
    count_log_lines(
        path,
        &[
            "log",
            "--oneline",
            "--merges",
            &format!("--since={since_timestamp}"),
        ],
    )
    .await
}

async fn count_log_lines(path: &Path, args: &[&str]) -> u64 {
    match run_git(path, args, LOOKUP_TIMEOUT).await {
        Some(stdout) => stdout.lines().filter(|l| !l.is_empty()).count() as u64,
        None => 0,
    }
}

/// Number of tracked files in the repository.
pub async fn tracked_file_count(path: &Path) -> u64 {
    match run_git(path, &["ls-files"], DIFF_TIMEOUT).await {
        Some(stdout) => stdout.lines().filter(|l| !l.is_empty()).count() as u64,
        None => 0,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Tests exercise the conservative-default paths only: they must pass on
    // machines without git and never depend on this crate's own history.

    #[tokio::test]
    async fn test_non_repo_is_not_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_repo(dir.path()).await);
    }

    #[tokio::test]
    async fn test_non_repo_conservative_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert!(head_commit(dir.path()).await.is_none());
        assert!(branch(dir.path()).await.is_none());
        assert_eq!(current_branch(dir.path()).await, "unknown");
        assert_eq!(tracked_file_count(dir.path()).await, 0);
        assert_eq!(commits_since(dir.path(), "2026-01-01").await, 0);
        assert!(untracked(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_changed_since_non_repo_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (modified, deleted, renamed) = changed_since(dir.path(), "HEAD~1").await;
        assert!(modified.is_empty());
        assert!(deleted.is_empty());
        assert!(renamed.is_empty());
    }
}
