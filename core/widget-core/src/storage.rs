//! Storage configuration and path management for the shared widget namespace.
//!
//! The app and every widget surface must agree on one directory. This module is
//! the only place that decides where that directory lives.
//!
//! ## Resolution Order
//!
//! 1. `WIDGET_SYNC_ROOT` environment variable (app-group containers, tests)
//! 2. `<data_local_dir>/habit-widget` (e.g. `~/.local/share/habit-widget`)
//!
//! `StorageConfig::with_root()` bypasses resolution entirely for injection.

use std::path::{Path, PathBuf};

use crate::error::{Result, WidgetError};

/// Environment variable that overrides the namespace root.
pub const ROOT_ENV_VAR: &str = "WIDGET_SYNC_ROOT";

const DEFAULT_DIR_NAME: &str = "habit-widget";

/// Central configuration for all widget storage paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Root directory for all widget data.
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the root from the environment, then the platform data dir.
    pub fn resolve() -> Result<Self> {
        if let Some(root) = std::env::var_os(ROOT_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let base = dirs::data_local_dir().ok_or_else(|| WidgetError::Io {
            context: "resolving platform data directory".to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no data directory for this platform",
            ),
        })?;
        Ok(Self::with_root(base.join(DEFAULT_DIR_NAME)))
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the root directory for widget data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Namespace Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Directory holding one file per namespace entry.
    pub fn namespace_dir(&self) -> PathBuf {
        self.root.join("shared")
    }

    /// Path of a single namespace entry, e.g. `shared/habits_data.json`.
    pub fn entry_file(&self, key: &str) -> PathBuf {
        self.namespace_dir().join(format!("{}.json", key))
    }

    /// Advisory lock file guarding every namespace session.
    pub fn lock_file(&self) -> PathBuf {
        self.namespace_dir().join("namespace.lock")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    /// Directory for rolling log files written by the hook binary.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Ensures the root directory and standard subdirectories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.root)?;
        fs_err::create_dir_all(self.namespace_dir())?;
        fs_err::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_file_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/widget"));
        assert_eq!(
            config.entry_file("habits_data"),
            PathBuf::from("/tmp/widget/shared/habits_data.json")
        );
    }

    #[test]
    fn test_lock_file_lives_next_to_entries() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/widget"));
        assert_eq!(
            config.lock_file().parent(),
            Some(config.namespace_dir().as_path())
        );
    }

    #[test]
    fn test_logs_dir_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/widget"));
        assert_eq!(config.logs_dir(), PathBuf::from("/tmp/widget/logs"));
    }

    #[test]
    fn test_ensure_dirs_creates_structure() {
        let temp = TempDir::new().unwrap();
        let config = StorageConfig::with_root(temp.path().join("root"));

        config.ensure_dirs().unwrap();

        assert!(config.root().exists());
        assert!(config.namespace_dir().exists());
        assert!(config.logs_dir().exists());
    }
}
