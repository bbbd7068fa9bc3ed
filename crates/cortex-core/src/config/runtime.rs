//! Runtime Configuration
//!
//! Mutable search/staleness tuning knobs, merged from defaults, the
//! `runtime:` section of `config.yaml`, and environment variables
//! (highest wins). Held behind an `RwLock` in the service registry and
//! adjustable at runtime through the `configure_cortex` tool.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::documents::default_type_multipliers;

use super::yaml::YamlConfig;

/// Search and staleness tuning, mutable at runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Minimum final score for a search result to be returned
    pub min_score: f64,
    /// Include boost factors and config in search responses
    pub verbose: bool,
    /// Master switch - search is rejected when false
    pub enabled: bool,
    /// Candidates fetched from each retrieval source (capped at 200)
    pub top_k_retrieve: usize,
    /// Results kept after cross-encoder reranking (capped at 50)
    pub top_k_rerank: usize,
    /// Apply exponential recency decay to notes/session summaries
    pub recency_boost: bool,
    /// Days until the recency boost decays to ~0.5
    pub recency_half_life_days: f64,
    /// Apply type-based score multipliers
    pub type_boost: bool,
    /// Per-type score multipliers (unknown types score 1.0)
    pub type_multipliers: HashMap<String, f64>,
    /// Annotate top results with staleness assessments
    pub staleness_check_enabled: bool,
    /// Only check the top N results for staleness
    pub staleness_check_limit: usize,
    /// Days after which an unverified memory is advisory-stale
    pub staleness_time_threshold_days: i64,
    /// Days after which an unverified memory requires verification
    pub staleness_very_stale_threshold_days: i64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            verbose: false,
            enabled: true,
            top_k_retrieve: 50,
            top_k_rerank: 10,
            recency_boost: true,
            recency_half_life_days: 30.0,
            type_boost: true,
            type_multipliers: default_type_multipliers(),
            staleness_check_enabled: true,
            staleness_check_limit: 10,
            staleness_time_threshold_days: 30,
            staleness_very_stale_threshold_days: 90,
        }
    }
}

impl RuntimeConfig {
    /// Merge order: defaults, then the `runtime:` YAML section, then
    /// environment overrides.
    pub fn resolve(yaml: &YamlConfig) -> Self {
        let mut config = Self::default();
        config.apply_yaml(&yaml.runtime);
        config.apply_env();
        config.clamp();
        config
    }

    fn apply_yaml(&mut self, runtime: &serde_yaml::Mapping) {
        if runtime.is_empty() {
            return;
        }
        // Re-serialize the section over the defaults so partial configs work
        let merged = serde_yaml::to_string(runtime)
            .ok()
            .and_then(|s| serde_yaml::from_str::<RuntimeOverlay>(&s).ok());
        if let Some(overlay) = merged {
            overlay.apply(self);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("CORTEX_MIN_SCORE") {
            if let Ok(parsed) = v.parse::<f64>() {
                self.min_score = parsed;
            }
        }
        if let Ok(v) = std::env::var("CORTEX_VERBOSE") {
            self.verbose = v.eq_ignore_ascii_case("true");
        }
    }

    fn clamp(&mut self) {
        self.top_k_retrieve = self.top_k_retrieve.clamp(1, 200);
        self.top_k_rerank = self.top_k_rerank.clamp(1, 50);
    }
}

/// Every-field-optional overlay for the YAML `runtime:` section
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RuntimeOverlay {
    min_score: Option<f64>,
    verbose: Option<bool>,
    enabled: Option<bool>,
    top_k_retrieve: Option<usize>,
    top_k_rerank: Option<usize>,
    recency_boost: Option<bool>,
    recency_half_life_days: Option<f64>,
    type_boost: Option<bool>,
    type_multipliers: Option<HashMap<String, f64>>,
    staleness_check_enabled: Option<bool>,
    staleness_check_limit: Option<usize>,
    staleness_time_threshold_days: Option<i64>,
    staleness_very_stale_threshold_days: Option<i64>,
}

impl RuntimeOverlay {
    fn apply(self, config: &mut RuntimeConfig) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = self.$field { config.$field = v; })*
            };
        }
        merge!(
            min_score,
            verbose,
            enabled,
            top_k_retrieve,
            top_k_rerank,
            recency_boost,
            recency_half_life_days,
            type_boost,
            type_multipliers,
            staleness_check_enabled,
            staleness_check_limit,
            staleness_time_threshold_days,
            staleness_very_stale_threshold_days,
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.min_score, 0.5);
        assert_eq!(config.top_k_retrieve, 50);
        assert_eq!(config.staleness_time_threshold_days, 30);
        assert_eq!(config.staleness_very_stale_threshold_days, 90);
        assert_eq!(config.type_multipliers["insight"], 2.0);
    }

    #[test]
    fn test_yaml_overlay() {
        let yaml: YamlConfig = serde_yaml::from_str(
            "runtime:\n  min_score: 0.2\n  top_k_rerank: 25\n",
        )
        .unwrap();
        let config = RuntimeConfig::resolve(&yaml);
        assert_eq!(config.min_score, 0.2);
        assert_eq!(config.top_k_rerank, 25);
        // Untouched fields keep defaults
        assert!(config.recency_boost);
    }

    #[test]
    fn test_clamping() {
        let yaml: YamlConfig = serde_yaml::from_str(
            "runtime:\n  top_k_retrieve: 9999\n  top_k_rerank: 9999\n",
        )
        .unwrap();
        let config = RuntimeConfig::resolve(&yaml);
        assert_eq!(config.top_k_retrieve, 200);
        assert_eq!(config.top_k_rerank, 50);
    }
}
