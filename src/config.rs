//! Application configuration values.
//!
//! Defaults are designed for local use and can be overridden with
//! environment variables or CLI flags when deploying elsewhere.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Environment variable overriding the database location.
pub const DB_PATH_ENV: &str = "PAPERS_DB_PATH";

/// Environment variable controlling log filtering (tracing `EnvFilter`).
pub const LOG_ENV: &str = "PAPERS_LOG";

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Resolve the SQLite database location.
///
/// Precedence: explicit CLI flag, then `PAPERS_DB_PATH`, then a per-user
/// data directory (`papers.db` under the platform data dir).
pub fn database_path(cli_override: Option<&Path>) -> PathBuf {
    resolve_database_path(cli_override, std::env::var_os(DB_PATH_ENV))
}

fn resolve_database_path(cli_override: Option<&Path>, env_value: Option<OsString>) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return PathBuf::from(value);
    }
    default_database_path()
}

fn default_database_path() -> PathBuf {
    ProjectDirs::from("", "", "papers-explorer")
        .map(|dirs| dirs.data_dir().join("papers.db"))
        .unwrap_or_else(|| PathBuf::from("papers.db"))
}
