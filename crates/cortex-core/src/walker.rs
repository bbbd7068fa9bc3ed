//! Codebase Walker
//!
//! Filtered filesystem traversal for ingestion. Directories matching an
//! ignore pattern are pruned before descent; files are filtered by hidden
//! prefix, binary extension, size cap, extension allow-list, and include
//! globs. Also home to the content-hash helpers that drive hash-mode delta
//! sync.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::config::data_path;

/// Maximum file size eligible for indexing (1 MB). A file exactly at the
/// cap is included; one byte over is excluded.
pub const MAX_FILE_SIZE: u64 = 1_000_000;

/// File extensions skipped as binary
pub const BINARY_EXTENSIONS: &[&str] = &[
    ".exe", ".bin", ".so", ".dylib", ".dll", ".o", ".a", ".lib",
    // Images
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".ico", ".svg", ".webp",
    // Media
    ".mp3", ".mp4", ".wav", ".avi", ".mov", ".webm",
    // Archives
    ".zip", ".tar", ".gz", ".bz2", ".7z", ".rar",
    // Documents
    ".pdf", ".doc", ".docx", ".xls", ".xlsx",
    // Fonts
    ".ttf", ".otf", ".woff", ".woff2", ".eot",
    // Databases
    ".db", ".sqlite", ".sqlite3",
];

/// Default ignore patterns applied to every project
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // Version control
    ".git", ".svn", ".hg",
    // Dependencies
    "node_modules", ".venv", "venv", "env", "__pycache__", ".pytest_cache",
    ".mypy_cache", ".ruff_cache",
    // Build outputs
    "dist", "build", "out", ".next", ".nuxt", "target",
    // IDE
    ".idea", ".vscode",
    // Misc
    ".cache", "coverage", ".coverage", ".tox", ".eggs", "*.egg-info",
];

/// Traversal options for [`walk`]
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Extension allow-list (lowercase, with leading dot), e.g. `{".py"}`
    pub extensions: Option<HashSet<String>>,
    /// Ignore patterns; defaults + cortexignore files when `None`
    pub ignore_patterns: Option<HashSet<String>>,
    /// Include globs relative to the root, e.g. `["src/**"]`
    pub include_globs: Option<Vec<String>>,
    /// Merge global and project cortexignore files into the pattern set
    pub use_cortexignore: bool,
}

impl WalkOptions {
    pub fn new() -> Self {
        Self {
            use_cortexignore: true,
            ..Default::default()
        }
    }
}

/// Load patterns from a cortexignore-style file (one pattern per line,
/// `#` comments).
fn load_ignore_file(path: &Path) -> HashSet<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return HashSet::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Merge defaults with global `<data>/cortexignore` and project
/// `<root>/.cortexignore` patterns.
pub fn load_ignore_patterns(root: &Path, use_cortexignore: bool) -> HashSet<String> {
    let mut patterns: HashSet<String> =
        DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect();

    if !use_cortexignore {
        return patterns;
    }

    patterns.extend(load_ignore_file(&data_path().join("cortexignore")));
    patterns.extend(load_ignore_file(&root.join(".cortexignore")));
    patterns
}

/// Compiled pattern matcher: literal names match exactly, glob patterns
/// match via [`glob::Pattern`].
struct PatternSet {
    literals: HashSet<String>,
    globs: Vec<glob::Pattern>,
}

impl PatternSet {
    fn compile(patterns: &HashSet<String>) -> Self {
        let mut literals = HashSet::new();
        let mut globs = Vec::new();
        for p in patterns {
            if p.contains(['*', '?', '[']) {
                match glob::Pattern::new(p) {
                    Ok(pat) => globs.push(pat),
                    Err(e) => tracing::debug!("Invalid ignore pattern '{}': {}", p, e),
                }
            } else {
                literals.insert(p.clone());
            }
        }
        Self { literals, globs }
    }

    fn matches(&self, name: &str) -> bool {
        self.literals.contains(name) || self.globs.iter().any(|g| g.matches(name))
    }
}

/// Lazy filtered traversal yielding absolute file paths under `root`.
pub fn walk(root: &Path, options: &WalkOptions) -> Walk {
    let ignore = match &options.ignore_patterns {
        Some(patterns) => patterns.clone(),
        None => load_ignore_patterns(root, options.use_cortexignore),
    };

    let include_globs = options
        .include_globs
        .as_ref()
        .map(|patterns| {
            patterns
                .iter()
                .filter_map(|p| glob::Pattern::new(p).ok())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Walk {
        root: root.to_path_buf(),
        dirs: VecDeque::from([root.to_path_buf()]),
        files: VecDeque::new(),
        ignore: PatternSet::compile(&ignore),
        extensions: options.extensions.clone(),
        include_globs,
    }
}

/// Iterator state for [`walk`]
pub struct Walk {
    root: PathBuf,
    dirs: VecDeque<PathBuf>,
    files: VecDeque<PathBuf>,
    ignore: PatternSet,
    extensions: Option<HashSet<String>>,
    include_globs: Vec<glob::Pattern>,
}

impl Walk {
    fn file_passes(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        // Hidden files and file-level ignore patterns
        if name.starts_with('.') || self.ignore.matches(name) {
            return false;
        }

        // Binary extensions
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            return false;
        }

        // Size cap
        match path.metadata() {
            Ok(meta) if meta.len() <= MAX_FILE_SIZE => {}
            _ => return false,
        }

        // Extension allow-list
        if let Some(allowed) = &self.extensions {
            if !allowed.contains(&ext) {
                return false;
            }
        }

        // Include globs (relative to root)
        if !self.include_globs.is_empty() {
            let Ok(rel) = path.strip_prefix(&self.root) else {
                return false;
            };
            let rel_str = rel.to_string_lossy();
            if !self.include_globs.iter().any(|g| g.matches(&rel_str)) {
                return false;
            }
        }

        true
    }

    fn dir_passes(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        !name.starts_with('.') && !name.ends_with(".egg-info") && !self.ignore.matches(name)
    }

    fn expand_dir(&mut self, dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };

        let mut items: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        items.sort();

        for path in items {
            if path.is_dir() {
                if self.dir_passes(&path) {
                    self.dirs.push_back(path);
                }
            } else if self.file_passes(&path) {
                self.files.push_back(path);
            }
        }
    }
}

impl Iterator for Walk {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if let Some(file) = self.files.pop_front() {
                return Some(file);
            }
            let dir = self.dirs.pop_front()?;
            self.expand_dir(&dir);
        }
    }
}

/// Compute the md5 hex digest of a file's content.
pub fn compute_file_hash(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    let mut hasher = Md5::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

/// Return only the paths whose current hash differs from `prior_hashes`.
/// Unreadable files are silently skipped.
pub fn changed_files<'a>(
    paths: impl IntoIterator<Item = &'a PathBuf>,
    prior_hashes: &std::collections::BTreeMap<String, String>,
) -> Vec<PathBuf> {
    let mut changed = Vec::new();
    for path in paths {
        let Ok(current) = compute_file_hash(path) else {
            continue;
        };
        let key = path.to_string_lossy();
        if prior_hashes.get(key.as_ref()).map(String::as_str) != Some(current.as_str()) {
            changed.push(path.clone());
        }
    }
    changed
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn options_no_cortexignore() -> WalkOptions {
        WalkOptions {
            use_cortexignore: false,
            ..WalkOptions::new()
        }
    }

    #[test]
    fn test_walk_basic_filtering() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.py", "print('hi')");
        write(dir.path(), "src/lib.rs", "fn main() {}");
        write(dir.path(), ".hidden", "nope");
        write(dir.path(), "node_modules/pkg/index.js", "ignored");
        write(dir.path(), "logo.png", "binary");

        let found: Vec<_> = walk(dir.path(), &options_no_cortexignore()).collect();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert!(names.contains(&"app.py".to_string()));
        assert!(names.contains(&"lib.rs".to_string()));
        assert!(!names.contains(&".hidden".to_string()));
        assert!(!names.contains(&"index.js".to_string()));
        assert!(!names.contains(&"logo.png".to_string()));
    }

    #[test]
    fn test_walk_size_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let at_cap = dir.path().join("at_cap.txt");
        std::fs::write(&at_cap, vec![b'a'; MAX_FILE_SIZE as usize]).unwrap();
        let over_cap = dir.path().join("over_cap.txt");
        std::fs::write(&over_cap, vec![b'a'; MAX_FILE_SIZE as usize + 1]).unwrap();

        let found: Vec<_> = walk(dir.path(), &options_no_cortexignore()).collect();
        assert!(found.contains(&at_cap));
        assert!(!found.contains(&over_cap));
    }

    #[test]
    fn test_walk_extension_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "x = 1");
        write(dir.path(), "b.js", "let x = 1");

        let mut options = options_no_cortexignore();
        options.extensions = Some([".py".to_string()].into_iter().collect());

        let found: Vec<_> = walk(dir.path(), &options).collect();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("a.py"));
    }

    #[test]
    fn test_walk_include_globs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.py", "x = 1");
        write(dir.path(), "docs/readme.md", "# hi");

        let mut options = options_no_cortexignore();
        options.include_globs = Some(vec!["src/**".to_string()]);

        let found: Vec<_> = walk(dir.path(), &options).collect();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("src/app.py"));
    }

    #[test]
    fn test_walk_custom_glob_ignore() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "data.csv", "a,b");
        write(dir.path(), "main.py", "x = 1");

        let mut options = options_no_cortexignore();
        let mut patterns: HashSet<String> =
            DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect();
        patterns.insert("*.csv".to_string());
        options.ignore_patterns = Some(patterns);

        let found: Vec<_> = walk(dir.path(), &options).collect();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("main.py"));
    }

    #[test]
    fn test_compute_file_hash_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "f.txt", "content");
        let h1 = compute_file_hash(&path).unwrap();
        let h2 = compute_file_hash(&path).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 32);
    }

    #[test]
    fn test_changed_files_detection() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "one");
        let b = write(dir.path(), "b.txt", "two");

        let mut prior = std::collections::BTreeMap::new();
        prior.insert(
            a.to_string_lossy().to_string(),
            compute_file_hash(&a).unwrap(),
        );

        let paths = vec![a.clone(), b.clone()];
        let changed = changed_files(&paths, &prior);
        // a unchanged, b has no prior hash
        assert_eq!(changed, vec![b.clone()]);

        std::fs::write(&a, "changed").unwrap();
        let changed = changed_files(&paths, &prior);
        assert!(changed.contains(&a));
    }
}
