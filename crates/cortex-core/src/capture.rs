//! Session Auto-Capture
//!
//! Turns raw session transcripts into stored session summaries:
//! significance gating (skip trivial sessions), transcript truncation,
//! summarization through the LLM provider fallback chain, and the final
//! `conclude_session` commit. In async mode the hook enqueues and
//! returns; the capture worker runs this pipeline in the background.

use serde::{Deserialize, Serialize};

use crate::config::SignificanceConfig;
use crate::llm::{LlmError, MAX_PROMPT_CHARS, truncate_chars};
use crate::memory::{self, ConcludedSession, MemoryError};
use crate::services::Services;

// ============================================================================
// TYPES
// ============================================================================

/// Capture errors
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Transcript is empty")]
    EmptyTranscript,
    #[error("Session not significant: {0}")]
    NotSignificant(String),
    #[error("Summarization failed: {0}")]
    Summarization(#[from] LlmError),
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Session-end payload supplied by the out-of-process hook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCapture {
    pub session_id: String,
    pub transcript_text: String,
    #[serde(default)]
    pub files_edited: Vec<String>,
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default)]
    pub initiative_id: Option<String>,
    /// Token count when the hook measured it; estimated from transcript
    /// length otherwise
    #[serde(default)]
    pub token_count: Option<u64>,
    #[serde(default)]
    pub tool_calls: Option<u64>,
}

fn default_repository() -> String {
    "global".to_string()
}

/// Significance thresholds - a session is captured when ANY is met
#[derive(Debug, Clone, Copy)]
pub struct SignificanceThresholds {
    pub min_tokens: u64,
    pub min_file_edits: u64,
    pub min_tool_calls: u64,
}

impl From<&SignificanceConfig> for SignificanceThresholds {
    fn from(config: &SignificanceConfig) -> Self {
        Self {
            min_tokens: config.min_tokens,
            min_file_edits: config.min_file_edits,
            min_tool_calls: config.min_tool_calls,
        }
    }
}

/// Result of a processed capture
#[derive(Debug, Serialize)]
pub struct CaptureResult {
    pub status: &'static str,
    pub session_id: String,
    pub summary_length: usize,
    pub save: ConcludedSession,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Rough token estimate when the hook did not measure (4 chars/token).
fn estimated_tokens(capture: &SessionCapture) -> u64 {
    capture
        .token_count
        .unwrap_or_else(|| (capture.transcript_text.len() / 4) as u64)
}

/// Significance gate: capture when tokens, file edits, OR tool calls meet
/// their thresholds.
pub fn is_significant(capture: &SessionCapture, thresholds: &SignificanceThresholds) -> bool {
    estimated_tokens(capture) >= thresholds.min_tokens
        || capture.files_edited.len() as u64 >= thresholds.min_file_edits
        || capture.tool_calls.unwrap_or(0) >= thresholds.min_tool_calls
}

/// Run the capture pipeline: gate, truncate, summarize, commit.
///
/// An empty summary from every provider aborts with an explicit error -
/// silently committing nothing would lose the session.
pub async fn process_session(
    services: &Services,
    capture: SessionCapture,
) -> Result<CaptureResult, CaptureError> {
    if capture.transcript_text.trim().is_empty() {
        return Err(CaptureError::EmptyTranscript);
    }

    let thresholds = SignificanceThresholds::from(&services.yaml().autocapture.significance);
    if !is_significant(&capture, &thresholds) {
        return Err(CaptureError::NotSignificant(format!(
            "~{} tokens, {} file edits, {} tool calls",
            estimated_tokens(&capture),
            capture.files_edited.len(),
            capture.tool_calls.unwrap_or(0)
        )));
    }

    let transcript = truncate_chars(&capture.transcript_text, MAX_PROMPT_CHARS);
    let summary = services.llm.summarize_session(&transcript).await?;

    let save = memory::conclude_session(
        services,
        &summary,
        &capture.files_edited,
        Some(&capture.repository),
        capture.initiative_id.as_deref(),
    )
    .await?;

    tracing::info!(
        "Session captured: {} -> {} ({} chars)",
        capture.session_id,
        save.session_id,
        summary.len()
    );

    Ok(CaptureResult {
        status: "success",
        session_id: capture.session_id,
        summary_length: summary.len(),
        save,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(transcript_len: usize, files: usize, tool_calls: u64) -> SessionCapture {
        SessionCapture {
            session_id: "s1".to_string(),
            transcript_text: "x".repeat(transcript_len),
            files_edited: (0..files).map(|i| format!("f{i}.py")).collect(),
            repository: "demo".to_string(),
            initiative_id: None,
            token_count: None,
            tool_calls: Some(tool_calls),
        }
    }

    fn thresholds() -> SignificanceThresholds {
        SignificanceThresholds {
            min_tokens: 5000,
            min_file_edits: 1,
            min_tool_calls: 3,
        }
    }

    #[test]
    fn test_insignificant_session_skipped() {
        // Short transcript, no edits, few tool calls
        assert!(!is_significant(&capture(100, 0, 1), &thresholds()));
    }

    #[test]
    fn test_any_threshold_is_enough() {
        // Tokens alone (~5000 tokens = 20000 chars)
        assert!(is_significant(&capture(20_001, 0, 0), &thresholds()));
        // One file edit alone
        assert!(is_significant(&capture(10, 1, 0), &thresholds()));
        // Tool calls alone
        assert!(is_significant(&capture(10, 0, 3), &thresholds()));
    }

    #[test]
    fn test_measured_token_count_preferred() {
        let mut c = capture(10, 0, 0);
        c.token_count = Some(6000);
        assert!(is_significant(&c, &thresholds()));
    }
}
