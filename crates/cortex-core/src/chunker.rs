//! Language-Aware Code Chunking
//!
//! Language detection from extension or shebang, recursive splitting that
//! prefers syntactic boundaries (class/function starts, blank lines) before
//! falling back to lines, words, and finally characters, and regex-based
//! scope extraction for the enclosing function/class of a chunk.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default maximum chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1500;

/// Default overlap between adjacent chunks
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

// ============================================================================
// LANGUAGES
// ============================================================================

/// Languages with dedicated splitting separators and/or scope patterns
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    Js,
    Ts,
    Java,
    Go,
    Rust,
    Ruby,
    Php,
    Cpp,
    C,
    CSharp,
    Swift,
    Kotlin,
    Scala,
    Markdown,
    Html,
    Sol,
    Lua,
    Haskell,
    Elixir,
}

impl Lang {
    /// Short name stored in chunk metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Python => "python",
            Lang::Js => "js",
            Lang::Ts => "ts",
            Lang::Java => "java",
            Lang::Go => "go",
            Lang::Rust => "rust",
            Lang::Ruby => "ruby",
            Lang::Php => "php",
            Lang::Cpp => "cpp",
            Lang::C => "c",
            Lang::CSharp => "csharp",
            Lang::Swift => "swift",
            Lang::Kotlin => "kotlin",
            Lang::Scala => "scala",
            Lang::Markdown => "markdown",
            Lang::Html => "html",
            Lang::Sol => "sol",
            Lang::Lua => "lua",
            Lang::Haskell => "haskell",
            Lang::Elixir => "elixir",
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detect language from the file extension, then from a shebang when the
/// extension is unknown and a content prefix is available.
pub fn detect_language(path: &str, content_prefix: Option<&str>) -> Option<Lang> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let by_ext = match ext.as_str() {
        "py" => Some(Lang::Python),
        "js" | "jsx" | "mjs" => Some(Lang::Js),
        "ts" | "tsx" => Some(Lang::Ts),
        "java" => Some(Lang::Java),
        "go" => Some(Lang::Go),
        "rs" => Some(Lang::Rust),
        "rb" => Some(Lang::Ruby),
        "php" => Some(Lang::Php),
        "cpp" | "cc" | "cxx" | "hpp" => Some(Lang::Cpp),
        "c" | "h" => Some(Lang::C),
        "cs" => Some(Lang::CSharp),
        "swift" => Some(Lang::Swift),
        "kt" | "kts" => Some(Lang::Kotlin),
        "scala" => Some(Lang::Scala),
        "md" | "markdown" => Some(Lang::Markdown),
        "html" | "htm" => Some(Lang::Html),
        "sol" => Some(Lang::Sol),
        "lua" => Some(Lang::Lua),
        "hs" => Some(Lang::Haskell),
        "ex" | "exs" => Some(Lang::Elixir),
        _ => None,
    };

    if by_ext.is_some() {
        return by_ext;
    }

    // Shebang detection
    let prefix = content_prefix?;
    if !prefix.starts_with("#!") {
        return None;
    }
    let first_line = prefix.lines().next().unwrap_or("").to_lowercase();
    if first_line.contains("python") {
        Some(Lang::Python)
    } else if first_line.contains("node") || first_line.contains("deno") {
        Some(Lang::Js)
    } else if first_line.contains("ruby") {
        Some(Lang::Ruby)
    } else {
        // Shell scripts split fine with the generic separators
        None
    }
}

// ============================================================================
// SPLITTING
// ============================================================================

/// Generic fallback separator order: blank line, newline, space, character
const GENERIC_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Separator preference list per language, syntactic boundaries first
fn separators_for(lang: Lang) -> &'static [&'static str] {
    match lang {
        Lang::Python => &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""],
        Lang::Js | Lang::Ts => &[
            "\nfunction ", "\nconst ", "\nlet ", "\nvar ", "\nclass ", "\nif ", "\nfor ",
            "\nwhile ", "\nswitch ", "\ncase ", "\ndefault ", "\n\n", "\n", " ", "",
        ],
        Lang::Go => &[
            "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ",
            "\ncase ", "\n\n", "\n", " ", "",
        ],
        Lang::Rust => &[
            "\nfn ", "\nconst ", "\nlet ", "\nif ", "\nwhile ", "\nfor ", "\nloop ",
            "\nmatch ", "\n\n", "\n", " ", "",
        ],
        Lang::Java | Lang::CSharp | Lang::Kotlin | Lang::Scala => &[
            "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ",
            "\nfor ", "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
        ],
        Lang::Ruby => &[
            "\ndef ", "\nclass ", "\nmodule ", "\nif ", "\nunless ", "\nwhile ", "\nfor ",
            "\nbegin ", "\nrescue ", "\n\n", "\n", " ", "",
        ],
        Lang::Php => &[
            "\nfunction ", "\nclass ", "\nif ", "\nforeach ", "\nwhile ", "\ndo ",
            "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
        ],
        Lang::Cpp | Lang::C => &[
            "\nclass ", "\nvoid ", "\nint ", "\nfloat ", "\ndouble ", "\nstruct ",
            "\nif ", "\nfor ", "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
        ],
        Lang::Swift => &[
            "\nfunc ", "\nclass ", "\nstruct ", "\nenum ", "\nif ", "\nfor ", "\nwhile ",
            "\n\n", "\n", " ", "",
        ],
        Lang::Markdown => &["\n# ", "\n## ", "\n### ", "\n#### ", "\n\n", "\n", " ", ""],
        Lang::Html => &[
            "<body", "<div", "<p", "<br", "<li", "<h1", "<h2", "<h3", "<table", "<tr",
            "\n\n", "\n", " ", "",
        ],
        Lang::Sol => &[
            "\ncontract ", "\nfunction ", "\nstruct ", "\nenum ", "\nif ", "\nfor ",
            "\n\n", "\n", " ", "",
        ],
        Lang::Lua => &[
            "\nlocal ", "\nfunction ", "\nif ", "\nfor ", "\nwhile ", "\nrepeat ",
            "\n\n", "\n", " ", "",
        ],
        Lang::Haskell => &["\nmain ", "\ndata ", "\ntype ", "\nwhere ", "\n\n", "\n", " ", ""],
        Lang::Elixir => &[
            "\ndef ", "\ndefp ", "\ndefmodule ", "\nif ", "\ncase ", "\ncond ", "\n\n",
            "\n", " ", "",
        ],
    }
}

/// Split content into ordered chunks bounded by `chunk_size`, with adjacent
/// chunks overlapping by at most `chunk_overlap`.
///
/// Empty or whitespace-only content yields an empty sequence; unknown
/// languages use the generic separator order.
pub fn chunk_code(
    content: &str,
    lang: Option<Lang>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    if content.trim().is_empty() {
        return vec![];
    }

    let separators = lang.map(separators_for).unwrap_or(GENERIC_SEPARATORS);
    split_recursive(content, separators, chunk_size, chunk_overlap)
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    // First separator present in the text wins; "" always matches
    let mut chosen = separators.len().saturating_sub(1);
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            chosen = i;
            break;
        }
    }
    let sep = separators[chosen];
    let remaining = &separators[chosen + 1..];

    if sep.is_empty() {
        return split_chars(text, chunk_size, chunk_overlap);
    }

    // Split, attaching the separator to the start of the following piece so
    // "\nclass Foo" boundaries survive in the next chunk
    let mut pieces = Vec::new();
    for (i, part) in text.split(sep).enumerate() {
        if i == 0 {
            if !part.is_empty() {
                pieces.push(part.to_string());
            }
        } else {
            pieces.push(format!("{sep}{part}"));
        }
    }

    let mut chunks = Vec::new();
    let mut mergeable = Vec::new();
    for piece in pieces {
        if piece.len() <= chunk_size {
            mergeable.push(piece);
        } else {
            if !mergeable.is_empty() {
                chunks.extend(merge_pieces(
                    std::mem::take(&mut mergeable),
                    chunk_size,
                    chunk_overlap,
                ));
            }
            chunks.extend(split_recursive(&piece, remaining, chunk_size, chunk_overlap));
        }
    }
    if !mergeable.is_empty() {
        chunks.extend(merge_pieces(mergeable, chunk_size, chunk_overlap));
    }

    chunks
}

/// Greedily merge small pieces into chunks, retaining a trailing window of
/// pieces totaling at most `overlap` characters as the start of the next
/// chunk.
fn merge_pieces(pieces: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<String> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = piece.len();
        if total + len > chunk_size && !window.is_empty() {
            chunks.push(window.iter().map(String::as_str).collect::<String>());
            while !window.is_empty() && (total > overlap || total + len > chunk_size) {
                if let Some(removed) = window.pop_front() {
                    total -= removed.len();
                }
            }
        }
        total += len;
        window.push_back(piece);
    }

    if !window.is_empty() {
        chunks.push(window.iter().map(String::as_str).collect());
    }

    chunks
}

/// Last-resort character windows (UTF-8 safe).
fn split_chars(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let stride = chunk_size.saturating_sub(overlap).max(1);

    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    out
}

// ============================================================================
// SCOPE EXTRACTION
// ============================================================================

/// Extracted scope information for a chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScopeInfo {
    /// Innermost function defined in the chunk
    pub function_name: Option<String>,
    /// Outermost class/type defined in the chunk
    pub class_name: Option<String>,
    /// `class.function` when both are present
    pub scope: Option<String>,
}

struct ScopePatterns {
    function: Regex,
    class: Regex,
}

macro_rules! scope_patterns {
    ($func:expr, $class:expr) => {
        ScopePatterns {
            function: Regex::new($func).expect("static scope pattern must compile"),
            class: Regex::new($class).expect("static scope pattern must compile"),
        }
    };
}

static PYTHON_SCOPE: LazyLock<ScopePatterns> = LazyLock::new(|| {
    scope_patterns!(
        r"(?:async\s+)?def\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(",
        r"class\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*[:\(]"
    )
});

static JS_SCOPE: LazyLock<ScopePatterns> = LazyLock::new(|| {
    scope_patterns!(
        r"(?:function\s+([a-zA-Z_$][a-zA-Z0-9_$]*)|(?:const|let|var)\s+([a-zA-Z_$][a-zA-Z0-9_$]*)\s*=\s*(?:async\s*)?\()",
        r"class\s+([a-zA-Z_$][a-zA-Z0-9_$]*)"
    )
});

static GO_SCOPE: LazyLock<ScopePatterns> = LazyLock::new(|| {
    scope_patterns!(
        r"func\s+(?:\([^)]+\)\s+)?([a-zA-Z_][a-zA-Z0-9_]*)\s*\(",
        r"type\s+([a-zA-Z_][a-zA-Z0-9_]*)\s+struct"
    )
});

static RUST_SCOPE: LazyLock<ScopePatterns> = LazyLock::new(|| {
    scope_patterns!(
        r"(?:pub\s+)?(?:async\s+)?fn\s+([a-zA-Z_][a-zA-Z0-9_]*)",
        r"(?:pub\s+)?(?:struct|impl|enum)\s+([a-zA-Z_][a-zA-Z0-9_]*)"
    )
});

static JAVA_SCOPE: LazyLock<ScopePatterns> = LazyLock::new(|| {
    scope_patterns!(
        r"(?:public|private|protected|static|\s)+[\w<>\[\]]+\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(",
        r"(?:public\s+)?(?:abstract\s+)?(?:final\s+)?class\s+([a-zA-Z_][a-zA-Z0-9_]*)"
    )
});

static KOTLIN_SCOPE: LazyLock<ScopePatterns> = LazyLock::new(|| {
    scope_patterns!(
        r"(?:suspend\s+)?fun\s+([a-zA-Z_][a-zA-Z0-9_]*)",
        r"(?:class|object|interface)\s+([a-zA-Z_][a-zA-Z0-9_]*)"
    )
});

static RUBY_SCOPE: LazyLock<ScopePatterns> = LazyLock::new(|| {
    scope_patterns!(
        r"def\s+(?:self\.)?([a-zA-Z_][a-zA-Z0-9_?!]*)",
        r"(?:class|module)\s+([A-Z][a-zA-Z0-9_]*)"
    )
});

static C_SCOPE: LazyLock<ScopePatterns> = LazyLock::new(|| {
    scope_patterns!(
        r"(?:[\w*]+\s+)+([a-zA-Z_][a-zA-Z0-9_]*)\s*\([^;]*\)\s*\{",
        r"(?:struct|class)\s+([a-zA-Z_][a-zA-Z0-9_]*)"
    )
});

fn patterns_for(lang: Lang) -> &'static ScopePatterns {
    match lang {
        Lang::Python => &PYTHON_SCOPE,
        Lang::Js | Lang::Ts => &JS_SCOPE,
        Lang::Go => &GO_SCOPE,
        Lang::Rust => &RUST_SCOPE,
        Lang::Java | Lang::CSharp | Lang::Scala => &JAVA_SCOPE,
        Lang::Kotlin | Lang::Swift => &KOTLIN_SCOPE,
        Lang::Ruby => &RUBY_SCOPE,
        Lang::C | Lang::Cpp => &C_SCOPE,
        // Markup and the rest fall back to python-like def/class shapes
        _ => &PYTHON_SCOPE,
    }
}

/// Extract the enclosing scope of a chunk: the outermost class (first
/// match) and the innermost function (last match), joined as
/// `class.function` when both are present.
pub fn extract_scope(chunk: &str, lang: Option<Lang>) -> ScopeInfo {
    let mut result = ScopeInfo::default();
    let Some(lang) = lang else {
        return result;
    };
    if chunk.is_empty() {
        return result;
    }

    let patterns = patterns_for(lang);

    if let Some(caps) = patterns.class.captures_iter(chunk).next() {
        result.class_name = first_group(&caps);
    }

    if let Some(caps) = patterns.function.captures_iter(chunk).last() {
        result.function_name = first_group(&caps);
    }

    let parts: Vec<&str> = [result.class_name.as_deref(), result.function_name.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !parts.is_empty() {
        result.scope = Some(parts.join("."));
    }

    result
}

/// First non-empty capture group (JS patterns have alternates).
fn first_group(caps: &regex::Captures<'_>) -> Option<String> {
    caps.iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str().to_string())
        .find(|s| !s.is_empty())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language_by_extension() {
        assert_eq!(detect_language("src/app.py", None), Some(Lang::Python));
        assert_eq!(detect_language("lib.rs", None), Some(Lang::Rust));
        assert_eq!(detect_language("index.tsx", None), Some(Lang::Ts));
        assert_eq!(detect_language("README.md", None), Some(Lang::Markdown));
        assert_eq!(detect_language("data.csv", None), None);
    }

    #[test]
    fn test_detect_language_by_shebang() {
        assert_eq!(
            detect_language("script", Some("#!/usr/bin/env python3\nprint()")),
            Some(Lang::Python)
        );
        assert_eq!(
            detect_language("run", Some("#!/usr/bin/env node\n")),
            Some(Lang::Js)
        );
        // Shell scripts intentionally undetected
        assert_eq!(detect_language("run", Some("#!/bin/bash\n")), None);
        assert_eq!(detect_language("plain", Some("no shebang here")), None);
    }

    #[test]
    fn test_chunk_empty_content() {
        assert!(chunk_code("", Some(Lang::Python), 1500, 200).is_empty());
        assert!(chunk_code("   \n\n  ", None, 1500, 200).is_empty());
    }

    #[test]
    fn test_chunk_small_content_single_chunk() {
        let chunks = chunk_code("def f():\n    return 1\n", Some(Lang::Python), 1500, 200);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("def f()"));
    }

    #[test]
    fn test_chunk_size_bound() {
        let body: String = (0..100)
            .map(|i| format!("def func_{i}():\n    return {i}\n\n"))
            .collect();
        let chunks = chunk_code(&body, Some(Lang::Python), 300, 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 300, "chunk of {} chars exceeds bound", chunk.len());
        }
    }

    #[test]
    fn test_chunk_unknown_language_generic_split() {
        let text = "para one\n\npara two\n\npara three".repeat(40);
        let chunks = chunk_code(&text, None, 200, 20);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 200);
        }
    }

    #[test]
    fn test_chunk_no_separators_char_split() {
        let text = "x".repeat(5000);
        let chunks = chunk_code(&text, None, 1000, 100);
        assert!(chunks.len() >= 5);
        for chunk in &chunks {
            assert!(chunk.len() <= 1000);
        }
    }

    #[test]
    fn test_extract_scope_python() {
        let chunk = "class AuthService:\n    def validate_token(self, token):\n        pass\n";
        let scope = extract_scope(chunk, Some(Lang::Python));
        assert_eq!(scope.class_name.as_deref(), Some("AuthService"));
        assert_eq!(scope.function_name.as_deref(), Some("validate_token"));
        assert_eq!(scope.scope.as_deref(), Some("AuthService.validate_token"));
    }

    #[test]
    fn test_extract_scope_innermost_function() {
        let chunk = "def outer():\n    pass\n\ndef inner():\n    pass\n";
        let scope = extract_scope(chunk, Some(Lang::Python));
        // Last match wins: most specific function
        assert_eq!(scope.function_name.as_deref(), Some("inner"));
    }

    #[test]
    fn test_extract_scope_rust() {
        let chunk = "impl Store {\n    pub fn upsert(&self) {}\n}\n";
        let scope = extract_scope(chunk, Some(Lang::Rust));
        assert_eq!(scope.class_name.as_deref(), Some("Store"));
        assert_eq!(scope.function_name.as_deref(), Some("upsert"));
    }

    #[test]
    fn test_extract_scope_js_arrow_function() {
        let chunk = "const handleClick = async (e) => {};\nfunction render() {}\n";
        let scope = extract_scope(chunk, Some(Lang::Js));
        assert_eq!(scope.function_name.as_deref(), Some("render"));
    }

    #[test]
    fn test_extract_scope_no_language() {
        let scope = extract_scope("def f(): pass", None);
        assert_eq!(scope, ScopeInfo::default());
    }
}
