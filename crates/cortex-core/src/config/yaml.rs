//! YAML Configuration
//!
//! Typed model of `config.yaml` in the data directory. Missing files and
//! missing sections fall back to defaults so a bare installation works
//! without any configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::{data_path, ensure_data_dir};

/// Top-level `config.yaml` contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YamlConfig {
    /// Directories containing code to index
    pub code_paths: Vec<String>,
    /// Daemon port for tool-channel communication
    pub daemon_port: Option<u16>,
    /// HTTP debug/browse/auto-capture port
    pub http_port: Option<u16>,
    /// Enable debug logging
    pub debug: bool,
    /// LLM provider configuration (summarization, chunk headers)
    pub llm: LlmConfig,
    /// Session auto-capture configuration
    pub autocapture: AutocaptureConfig,
    /// Runtime overrides merged into [`super::RuntimeConfig`]
    pub runtime: serde_yaml::Mapping,
}

/// LLM provider selection and per-provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Primary provider: anthropic, claude-cli, ollama, openrouter, none
    pub primary_provider: String,
    /// Fallback chain, tried in order when the primary fails
    pub fallback_chain: Vec<String>,
    pub anthropic: ProviderSettings,
    pub ollama: ProviderSettings,
    pub openrouter: ProviderSettings,
    pub claude_cli: ProviderSettings,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary_provider: "claude-cli".to_string(),
            fallback_chain: vec!["anthropic".to_string(), "ollama".to_string()],
            anthropic: ProviderSettings {
                model: Some("claude-3-haiku-20240307".to_string()),
                base_url: None,
            },
            ollama: ProviderSettings {
                model: Some("llama3.2".to_string()),
                base_url: Some("http://localhost:11434".to_string()),
            },
            openrouter: ProviderSettings {
                model: Some("anthropic/claude-3-haiku".to_string()),
                base_url: None,
            },
            claude_cli: ProviderSettings {
                model: Some("haiku".to_string()),
                base_url: None,
            },
        }
    }
}

/// Model name and optional base URL for one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Auto-capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutocaptureConfig {
    /// Capture sessions on session end
    pub enabled: bool,
    /// Async mode: the hook enqueues and exits fast. Sync mode waits for
    /// the summary + commit.
    pub auto_commit_async: bool,
    /// Seconds the hook waits in sync mode before falling back to async
    pub sync_timeout: u64,
    /// Significance thresholds - a session is captured if ANY is met
    pub significance: SignificanceConfig,
}

impl Default for AutocaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_commit_async: true,
            sync_timeout: 60,
            significance: SignificanceConfig::default(),
        }
    }
}

/// Session significance thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceConfig {
    pub min_tokens: u64,
    pub min_file_edits: u64,
    pub min_tool_calls: u64,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            min_tokens: 5000,
            min_file_edits: 1,
            min_tool_calls: 3,
        }
    }
}

/// Path to `config.yaml`
pub fn config_path() -> PathBuf {
    data_path().join("config.yaml")
}

/// Load `config.yaml`, returning defaults when missing or unreadable.
pub fn load_yaml_config() -> YamlConfig {
    let path = config_path();
    if !path.exists() {
        return YamlConfig::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match serde_yaml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                YamlConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read {}: {} - using defaults", path.display(), e);
            YamlConfig::default()
        }
    }
}

/// Persist the configuration back to `config.yaml`.
pub fn save_yaml_config(config: &YamlConfig) -> std::io::Result<()> {
    ensure_data_dir()?;
    let content = serde_yaml::to_string(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(config_path(), content)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = YamlConfig::default();
        assert_eq!(config.llm.primary_provider, "claude-cli");
        assert_eq!(config.autocapture.significance.min_tokens, 5000);
        assert!(config.autocapture.auto_commit_async);
        assert_eq!(config.autocapture.sync_timeout, 60);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = "\
daemon_port: 9000
llm:
  primary_provider: \"ollama\"
autocapture:
  significance:
    min_tokens: 2000
";
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.daemon_port, Some(9000));
        assert_eq!(config.llm.primary_provider, "ollama");
        assert_eq!(config.autocapture.significance.min_tokens, 2000);
        // Unspecified fields keep their defaults
        assert_eq!(config.autocapture.significance.min_tool_calls, 3);
        assert_eq!(config.llm.ollama.model.as_deref(), Some("llama3.2"));
    }
}
