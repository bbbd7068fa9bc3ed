//! LLM Provider Facades
//!
//! Opaque adapters over the providers used for session summarization and
//! chunk-header generation: Anthropic API, the claude CLI, Ollama, and
//! OpenRouter. HTTP providers retry with exponential backoff (3 attempts,
//! 1-60 s); summarization walks the configured fallback chain before
//! giving up. API keys come from the standard environment variables.

use std::time::Duration;

use serde_json::{Value, json};

use crate::config::{LlmConfig, ProviderSettings};

/// LLM request timeout
pub const LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Retry attempts for HTTP providers
const RETRY_ATTEMPTS: u32 = 3;

/// Backoff bounds (seconds)
const BACKOFF_MIN_SECS: u64 = 1;
const BACKOFF_MAX_SECS: u64 = 60;

/// Transcripts and prompts are truncated to this many characters
pub const MAX_PROMPT_CHARS: usize = 100_000;

/// Session summarization prompt
const SUMMARIZE_PROMPT: &str = "Summarize this coding session transcript for future reference.
Focus on:
1. What was implemented or changed
2. Key decisions made and why
3. Problems encountered and solutions
4. Files that were modified

Keep it concise but include enough detail to understand the work done.
Output ONLY the summary, no preamble.

Transcript:
";

// ============================================================================
// ERROR TYPES
// ============================================================================

/// LLM error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Provider returned an unusable response: {0}")]
    BadResponse(String),
    #[error("Subprocess failed: {0}")]
    Subprocess(String),
    #[error("Request timed out")]
    Timeout,
    #[error("All providers failed: {0}")]
    AllProvidersFailed(String),
    #[error("Missing API key: {0}")]
    MissingApiKey(String),
}

// ============================================================================
// PROVIDERS
// ============================================================================

/// Known provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    ClaudeCli,
    Ollama,
    OpenRouter,
    None,
}

impl ProviderKind {
    /// Parse a provider name from config or environment
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "claude-cli" | "claude_cli" => Some(Self::ClaudeCli),
            "ollama" => Some(Self::Ollama),
            "openrouter" => Some(Self::OpenRouter),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::ClaudeCli => "claude-cli",
            Self::Ollama => "ollama",
            Self::OpenRouter => "openrouter",
            Self::None => "none",
        }
    }
}

/// Resolve the active primary provider.
///
/// Priority: `CORTEX_LLM_PROVIDER`, legacy `CORTEX_HEADER_PROVIDER`, then
/// `llm.primary_provider` from config, then `none`.
pub fn resolve_primary(config: &LlmConfig) -> ProviderKind {
    if let Ok(v) = std::env::var("CORTEX_LLM_PROVIDER") {
        if let Some(kind) = ProviderKind::parse_name(&v) {
            return kind;
        }
    }
    if let Ok(v) = std::env::var("CORTEX_HEADER_PROVIDER") {
        if let Some(kind) = ProviderKind::parse_name(&v) {
            return kind;
        }
    }
    ProviderKind::parse_name(&config.primary_provider).unwrap_or(ProviderKind::None)
}

// ============================================================================
// CLIENT
// ============================================================================

/// Shared client over all configured providers
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Generate a completion with the given provider. `None` provider
    /// yields an empty string (callers treat that as "no LLM available").
    pub async fn generate(&self, kind: ProviderKind, prompt: &str) -> Result<String, LlmError> {
        let prompt = truncate_chars(prompt, MAX_PROMPT_CHARS);
        match kind {
            ProviderKind::Anthropic => self.generate_anthropic(&prompt).await,
            ProviderKind::ClaudeCli => self.generate_claude_cli(&prompt, LLM_TIMEOUT).await,
            ProviderKind::Ollama => self.generate_ollama(&prompt).await,
            ProviderKind::OpenRouter => self.generate_openrouter(&prompt).await,
            ProviderKind::None => Ok(String::new()),
        }
    }

    /// Summarize a session transcript via the primary provider, walking
    /// the fallback chain on failure. Empty output from every provider is
    /// an explicit error - capture must not silently commit nothing.
    pub async fn summarize_session(&self, transcript: &str) -> Result<String, LlmError> {
        let transcript = truncate_chars(transcript, MAX_PROMPT_CHARS);
        let prompt = format!("{SUMMARIZE_PROMPT}{transcript}");

        let mut chain = vec![resolve_primary(&self.config)];
        for name in &self.config.fallback_chain {
            if let Some(kind) = ProviderKind::parse_name(name) {
                if !chain.contains(&kind) {
                    chain.push(kind);
                }
            }
        }

        let mut last_error = String::from("no providers configured");
        for kind in chain {
            if kind == ProviderKind::None {
                continue;
            }
            match self.generate(kind, &prompt).await {
                Ok(summary) if !summary.trim().is_empty() => return Ok(summary),
                Ok(_) => {
                    last_error = format!("{} returned empty output", kind.as_str());
                    tracing::warn!("{}", last_error);
                }
                Err(e) => {
                    last_error = format!("{}: {}", kind.as_str(), e);
                    tracing::warn!("Summarization provider failed: {}", last_error);
                }
            }
        }

        Err(LlmError::AllProvidersFailed(last_error))
    }

    // ------------------------------------------------------------------
    // Provider implementations
    // ------------------------------------------------------------------

    async fn generate_anthropic(&self, prompt: &str) -> Result<String, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| LlmError::MissingApiKey("ANTHROPIC_API_KEY".to_string()))?;
        let model = model_of(&self.config.anthropic, "claude-3-haiku-20240307");

        let body = json!({
            "model": model,
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .post_with_retry(|| {
                self.http
                    .post("https://api.anthropic.com/v1/messages")
                    .header("x-api-key", &api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
            })
            .await?;

        response["content"][0]["text"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::BadResponse("missing content[0].text".to_string()))
    }

    async fn generate_ollama(&self, prompt: &str) -> Result<String, LlmError> {
        let base_url = self
            .config
            .ollama
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let model = model_of(&self.config.ollama, "llama3.2");

        let body = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .post_with_retry(|| self.http.post(format!("{base_url}/api/generate")).json(&body))
            .await?;

        response["response"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::BadResponse("missing response field".to_string()))
    }

    async fn generate_openrouter(&self, prompt: &str) -> Result<String, LlmError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| LlmError::MissingApiKey("OPENROUTER_API_KEY".to_string()))?;
        let model = model_of(&self.config.openrouter, "anthropic/claude-3-haiku");

        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .post_with_retry(|| {
                self.http
                    .post("https://openrouter.ai/api/v1/chat/completions")
                    .bearer_auth(&api_key)
                    .json(&body)
            })
            .await?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::BadResponse("missing choices[0].message.content".to_string()))
    }

    /// Spawn the claude CLI in print mode, feeding the prompt on stdin.
    async fn generate_claude_cli(&self, prompt: &str, timeout: Duration) -> Result<String, LlmError> {
        use tokio::io::AsyncWriteExt;

        let model = model_of(&self.config.claude_cli, "haiku");

        let mut child = tokio::process::Command::new("claude")
            .args(["-p", "--model", &model])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LlmError::Subprocess(format!("claude CLI not available: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| LlmError::Subprocess(e.to_string()))?;
            drop(stdin);
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::Subprocess(e.to_string()))?;

        if !output.status.success() {
            return Err(LlmError::Subprocess(format!(
                "claude CLI exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// POST with exponential backoff: 1s, 2s, 4s... capped at 60s.
    async fn post_with_retry<F>(&self, build: F) -> Result<Value, LlmError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut delay = BACKOFF_MIN_SECS;
        let mut last_error = String::new();

        for attempt in 1..=RETRY_ATTEMPTS {
            match build().send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| LlmError::BadResponse(e.to_string()));
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status());
                    // Client errors other than rate limiting will not heal
                    if response.status().is_client_error()
                        && response.status() != reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        return Err(LlmError::Http(last_error));
                    }
                }
                Err(e) => last_error = e.to_string(),
            }

            if attempt < RETRY_ATTEMPTS {
                tracing::debug!("LLM request failed ({}), retrying in {}s", last_error, delay);
                tokio::time::sleep(Duration::from_secs(delay)).await;
                delay = (delay * 2).min(BACKOFF_MAX_SECS);
            }
        }

        Err(LlmError::Http(last_error))
    }
}

fn model_of(settings: &ProviderSettings, default: &str) -> String {
    settings.model.clone().unwrap_or_else(|| default.to_string())
}

/// Truncate to a character budget on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(ProviderKind::parse_name("anthropic"), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::parse_name("claude-cli"), Some(ProviderKind::ClaudeCli));
        assert_eq!(ProviderKind::parse_name("NONE"), Some(ProviderKind::None));
        assert_eq!(ProviderKind::parse_name("gpt4"), None);
    }

    #[test]
    fn test_truncate_chars_boundary() {
        let exactly = "a".repeat(MAX_PROMPT_CHARS);
        assert_eq!(truncate_chars(&exactly, MAX_PROMPT_CHARS).len(), MAX_PROMPT_CHARS);

        let over = "a".repeat(MAX_PROMPT_CHARS + 1);
        assert_eq!(truncate_chars(&over, MAX_PROMPT_CHARS).chars().count(), MAX_PROMPT_CHARS);
    }

    #[tokio::test]
    async fn test_none_provider_returns_empty() {
        let client = LlmClient::new(LlmConfig::default());
        let out = client.generate(ProviderKind::None, "anything").await.unwrap();
        assert!(out.is_empty());
    }
}
