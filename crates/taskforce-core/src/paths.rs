//! Centralized path utilities

use std::path::{Path, PathBuf};

use crate::constants::app;

/// Get the taskforce config directory (~/.taskforce)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app::CONFIG_DIR_NAME)
}

/// Default SQLite database location (~/.taskforce/taskforce.db)
pub fn default_database_path() -> PathBuf {
    config_dir().join(app::DATABASE_FILE_NAME)
}

/// Optional settings file (~/.taskforce/config.toml)
pub fn config_file_path() -> PathBuf {
    config_dir().join(app::CONFIG_FILE_NAME)
}

/// Per-task workspace directory where tools write deliverables
pub fn task_workspace(workspace_root: &Path, task_id: i64) -> PathBuf {
    workspace_root.join(format!("task_{task_id}"))
}

/// Final component of a caller-supplied file name, so it cannot leave the
/// directory it is joined onto
pub fn safe_file_name(name: &str) -> Option<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
}
