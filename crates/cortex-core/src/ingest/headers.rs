//! Chunk Header Generation
//!
//! Optional LLM-written one-line context headers prepended to code chunks
//! before embedding. Any provider failure degrades to the trivial header -
//! a header must never abort an ingest.

use std::time::Duration;

use crate::chunker::Lang;
use crate::llm::{LlmClient, ProviderKind};

/// Budget for a single header generation
const HEADER_TIMEOUT: Duration = Duration::from_secs(30);

/// Chunk sample passed to the model
const HEADER_SAMPLE_CHARS: usize = 1200;

/// Header provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderProvider {
    Anthropic,
    ClaudeCli,
    #[default]
    None,
}

impl HeaderProvider {
    pub fn parse_name(s: &str) -> Option<Self> {
        match ProviderKind::parse_name(s)? {
            ProviderKind::Anthropic => Some(Self::Anthropic),
            ProviderKind::ClaudeCli => Some(Self::ClaudeCli),
            ProviderKind::None => Some(Self::None),
            _ => None,
        }
    }
}

fn trivial_header(path: &str, lang: Option<Lang>) -> String {
    let lang = lang.map(|l| l.as_str()).unwrap_or("unknown");
    format!("File: {path} ({lang})")
}

/// Generate a contextual header for a chunk, degrading to the trivial
/// header on any provider failure.
pub async fn generate_header(
    llm: &LlmClient,
    provider: HeaderProvider,
    chunk: &str,
    path: &str,
    lang: Option<Lang>,
) -> String {
    let fallback = trivial_header(path, lang);
    let kind = match provider {
        HeaderProvider::Anthropic => ProviderKind::Anthropic,
        HeaderProvider::ClaudeCli => ProviderKind::ClaudeCli,
        HeaderProvider::None => return fallback,
    };

    let sample: String = chunk.chars().take(HEADER_SAMPLE_CHARS).collect();
    let prompt = format!(
        "Write a one or two sentence header describing what this code chunk from {path} does. \
         Output ONLY the header, no preamble.\n\n{sample}"
    );

    let generated = tokio::time::timeout(HEADER_TIMEOUT, llm.generate(kind, &prompt)).await;
    match generated {
        Ok(Ok(header)) if !header.trim().is_empty() => header.trim().to_string(),
        Ok(Ok(_)) => fallback,
        Ok(Err(e)) => {
            tracing::debug!("Header provider failed for {}: {} - using trivial header", path, e);
            fallback
        }
        Err(_) => {
            tracing::debug!("Header provider timed out for {} - using trivial header", path);
            fallback
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    #[test]
    fn test_parse_provider() {
        assert_eq!(HeaderProvider::parse_name("anthropic"), Some(HeaderProvider::Anthropic));
        assert_eq!(HeaderProvider::parse_name("claude-cli"), Some(HeaderProvider::ClaudeCli));
        assert_eq!(HeaderProvider::parse_name("none"), Some(HeaderProvider::None));
        // Summarization-only providers are not header providers
        assert_eq!(HeaderProvider::parse_name("ollama"), None);
    }

    #[tokio::test]
    async fn test_none_provider_trivial_header() {
        let llm = LlmClient::new(LlmConfig::default());
        let header = generate_header(
            &llm,
            HeaderProvider::None,
            "def f(): pass",
            "src/app.py",
            Some(Lang::Python),
        )
        .await;
        assert_eq!(header, "File: src/app.py (python)");
    }
}
