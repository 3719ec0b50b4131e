//! Configuration for mailvault applications
//!
//! The query engines and the archive writer consume one typed settings
//! value, [`VaultConfig`], persisted as JSON at
//! `~/.config/mailvault/vault.json`. When no settings file exists, paths
//! default into the per-user data directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "mailvault";
const CONFIG_FILE: &str = "vault.json";

/// Per-user config directory (~/.config/mailvault).
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|base| base.join(APP_DIR))
        .context("could not determine the config directory")
}

/// Per-user data directory (~/.local/share/mailvault); the default home of
/// the row-store database and the columnar archive.
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|base| base.join(APP_DIR))
        .context("could not determine the data directory")
}

/// Location of the settings file.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Settings consumed by the query engines and the archive writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Path to the row-store SQLite database
    pub db_path: PathBuf,
    /// Root directory of the columnar Parquet archive
    pub archive_dir: PathBuf,
    /// DuckDB worker threads; `None` means host parallelism
    #[serde(default)]
    pub threads: Option<usize>,
}

impl VaultConfig {
    /// Load the settings file, falling back to [`VaultConfig::default_paths`]
    /// when it does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file()?)
    }

    /// Load settings from an explicit path; a missing file yields the
    /// defaults rather than an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Self::default_paths();
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Default locations under the mailvault data directory.
    pub fn default_paths() -> Result<Self> {
        let data = data_dir()?;
        Ok(Self {
            db_path: data.join("vault.db"),
            archive_dir: data.join("archive"),
            threads: None,
        })
    }

    /// Persist to the settings file, creating the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file()?)
    }

    /// Persist to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_location() {
        let path = config_file().unwrap();
        assert!(path.ends_with("mailvault/vault.json"));
    }

    #[test]
    fn test_missing_file_yields_default_paths() {
        let dir = tempdir().unwrap();
        let cfg = VaultConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(cfg.db_path.ends_with("mailvault/vault.db"));
        assert!(cfg.archive_dir.ends_with("mailvault/archive"));
        assert_eq!(cfg.threads, None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("vault.json");

        let cfg = VaultConfig {
            db_path: PathBuf::from("/tmp/vault.db"),
            archive_dir: PathBuf::from("/tmp/archive"),
            threads: Some(4),
        };
        cfg.save_to(&path).unwrap();

        let back = VaultConfig::load_from(&path).unwrap();
        assert_eq!(back.db_path, cfg.db_path);
        assert_eq!(back.archive_dir, cfg.archive_dir);
        assert_eq!(back.threads, Some(4));
    }

    #[test]
    fn test_threads_field_is_optional_in_json() {
        let back: VaultConfig =
            serde_json::from_str(r#"{"db_path": "/tmp/v.db", "archive_dir": "/tmp/a"}"#).unwrap();
        assert_eq!(back.threads, None);
    }
}
