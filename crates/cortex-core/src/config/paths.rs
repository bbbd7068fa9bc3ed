//! Data Paths
//!
//! Resolves the Cortex data directory and the well-known files inside it.
//! Container environments are auto-detected: when `/app` exists and is
//! writable the data lives at `/app/cortex_data`, otherwise `~/.cortex`.
//! Every location can be overridden through `CORTEX_*` environment
//! variables.

use std::path::PathBuf;

/// Global cortexignore template, written to `<data>/cortexignore` on first
/// run.
pub const GLOBAL_CORTEXIGNORE_TEMPLATE: &str = "\
# Cortex global ignore patterns
# These apply to all projects. Edit as needed.

# Large data files
*.csv
*.parquet
*.pkl
*.h5
*.hdf5

# ML/AI artifacts
*.pt
*.pth
*.onnx
*.safetensors
checkpoints
wandb
mlruns

# Logs and databases
*.log
*.sqlite
*.db

# OS files
.DS_Store
Thumbs.db

# Archives
*.zip
*.tar
*.tar.gz
*.tgz

# Lock files
package-lock.json
yarn.lock
pnpm-lock.yaml
poetry.lock
Cargo.lock
Gemfile.lock
";

/// Resolve the data directory.
///
/// Priority: `CORTEX_DATA_PATH` env var, then `/app/cortex_data` when `/app`
/// is present and writable (container), then `~/.cortex`.
pub fn data_path() -> PathBuf {
    if let Ok(path) = std::env::var("CORTEX_DATA_PATH") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    let app = std::path::Path::new("/app");
    if app.exists() && !app.metadata().map(|m| m.permissions().readonly()).unwrap_or(true) {
        return PathBuf::from("/app/cortex_data");
    }

    if let Some(base) = directories::BaseDirs::new() {
        return base.home_dir().join(".cortex");
    }

    PathBuf::from(".cortex")
}

/// Ensure the data directory exists, creating the global cortexignore from
/// the template on first run.
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = data_path();
    std::fs::create_dir_all(&dir)?;

    let cortexignore = dir.join("cortexignore");
    if !cortexignore.exists() {
        std::fs::write(&cortexignore, GLOBAL_CORTEXIGNORE_TEMPLATE)?;
    }

    Ok(dir)
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().filter(|p| !p.is_empty()).map(PathBuf::from)
}

/// Store backend directory (`CORTEX_DB_PATH` or `<data>/db`)
pub fn db_path(data_dir: &std::path::Path) -> PathBuf {
    env_path("CORTEX_DB_PATH").unwrap_or_else(|| data_dir.join("db"))
}

/// Delta-sync state file (`CORTEX_STATE_FILE` or `<data>/ingest_state.json`)
pub fn state_file_path(data_dir: &std::path::Path) -> PathBuf {
    env_path("CORTEX_STATE_FILE").unwrap_or_else(|| data_dir.join("ingest_state.json"))
}

/// Daemon log file (`CORTEX_LOG_FILE` or `<data>/daemon.log`)
pub fn log_file_path(data_dir: &std::path::Path) -> PathBuf {
    env_path("CORTEX_LOG_FILE").unwrap_or_else(|| data_dir.join("daemon.log"))
}
