use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};
use crate::fsops;

pub const DEFAULT_WORK_DIRNAME: &str = ".organizer";
pub const MEMORY_FILENAME: &str = "organizer.memory.json";
pub const STAGING_DIRNAME: &str = "staging";
pub const LOG_DIRNAME: &str = "logs";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root of the organizer's working state. Defaults to `~/.organizer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    /// Fallback directory for move/rename actions that name no destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_destination: Option<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
}

pub fn load_configuration() -> std::result::Result<AppConfig, ConfigError> {
    load_configuration_from("Config")
}

/// Layer an optional config file (any format the config crate knows) under
/// `STAGEHAND_*` environment variables.
pub fn load_configuration_from(name: &str) -> std::result::Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(name).required(false))
        .add_source(Environment::with_prefix("STAGEHAND").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    pub fn work_paths(&self) -> WorkPaths {
        let root = match &self.work_dir {
            Some(dir) => fsops::expand_tilde(Path::new(dir)),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_WORK_DIRNAME),
        };
        WorkPaths::new(root)
    }

    pub fn default_destination_path(&self) -> Option<PathBuf> {
        self.default_destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| fsops::expand_tilde(Path::new(d)))
    }
}

/// Filesystem locations the organizer reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPaths {
    pub root: PathBuf,
    pub memory_file: PathBuf,
    pub staging_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl WorkPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = fsops::absolutize(&root.into());
        Self {
            memory_file: root.join(MEMORY_FILENAME),
            staging_dir: root.join(STAGING_DIRNAME),
            log_dir: root.join(LOG_DIRNAME),
            root,
        }
    }

    /// Directories that must exist, in creation order.
    pub fn dirs(&self) -> [&Path; 3] {
        [&self.root, &self.staging_dir, &self.log_dir]
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in self.dirs() {
            fs::create_dir_all(dir).op_context("create directory", dir)?;
        }
        Ok(())
    }

    pub fn manifest_dir(&self, manifest_id: &str) -> PathBuf {
        self.staging_dir.join(manifest_id)
    }

    pub fn manifest_log_dir(&self, manifest_id: &str) -> PathBuf {
        self.log_dir.join(manifest_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_work_paths_layout() {
        let paths = WorkPaths::new("/tmp/organizer-root");
        assert_eq!(paths.root, PathBuf::from("/tmp/organizer-root"));
        assert_eq!(
            paths.memory_file,
            PathBuf::from("/tmp/organizer-root/organizer.memory.json")
        );
        assert_eq!(paths.staging_dir, PathBuf::from("/tmp/organizer-root/staging"));
        assert_eq!(paths.log_dir, PathBuf::from("/tmp/organizer-root/logs"));
        assert_eq!(
            paths.manifest_dir("abc"),
            PathBuf::from("/tmp/organizer-root/staging/abc")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_all() {
        let tmp = tempdir().unwrap();
        let paths = WorkPaths::new(tmp.path().join("work"));
        paths.ensure_dirs().unwrap();
        for dir in paths.dirs() {
            assert!(dir.is_dir(), "{} should exist", dir.display());
        }
        assert!(!paths.memory_file.exists());
    }

    #[test]
    fn test_config_file_values() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("Stagehand.toml");
        fs::write(
            &file,
            "work_dir = \"/srv/organizer\"\n\
             default_destination = \"/srv/sorted\"\n\
             ignore_patterns = [\"*.tmp\"]\n",
        )
        .unwrap();

        let name = tmp.path().join("Stagehand");
        let config = load_configuration_from(name.to_str().unwrap()).unwrap();
        assert_eq!(config.work_dir.as_deref(), Some("/srv/organizer"));
        assert_eq!(config.ignore_patterns, vec!["*.tmp".to_string()]);
        assert!(!config.include_hidden);
        assert_eq!(
            config.default_destination_path(),
            Some(PathBuf::from("/srv/sorted"))
        );
        assert_eq!(config.work_paths().root, PathBuf::from("/srv/organizer"));
    }

    #[test]
    fn test_blank_default_destination_is_unset() {
        let config = AppConfig {
            default_destination: Some("   ".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(config.default_destination_path(), None);
    }
}
