//! Configuration
//!
//! Data directory layout, `config.yaml` parsing, and the mutable runtime
//! configuration merged from defaults, YAML, and environment variables.

mod paths;
mod runtime;
mod yaml;

pub use paths::{
    GLOBAL_CORTEXIGNORE_TEMPLATE, data_path, db_path, ensure_data_dir, log_file_path, state_file_path,
};
pub use runtime::RuntimeConfig;
pub use yaml::{
    AutocaptureConfig, LlmConfig, ProviderSettings, SignificanceConfig, YamlConfig, config_path,
    load_yaml_config, save_yaml_config,
};
