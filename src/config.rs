use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{MemoError, Result};

const CONFIG_FILE_NAME: &str = "config.json";

/// Upper bound for the warning lead and window: one year in milliseconds.
pub const MAX_WARNING_MS: u64 = 365 * 24 * 60 * 60 * 1_000;

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory the key-value store writes into
    pub data_dir: PathBuf,

    /// Key the note collection is stored under
    pub storage_key: String,

    /// How often expired notes are swept (milliseconds)
    pub sweep_interval_ms: u64,

    /// Quiet period before edits are written (milliseconds)
    pub persist_debounce_ms: u64,

    /// How long before expiry the warning fires (milliseconds)
    pub warning_lead_ms: u64,

    /// Width of the window in which the warning is scheduled (milliseconds).
    /// At least one sweep interval, so every arming gets a tick inside it.
    pub warning_window_ms: u64,

    /// Characters of note text quoted in the warning
    pub preview_chars: usize,

    /// Title of the warning notification
    pub notification_title: String,

    /// Upper bound on the serialized collection, unbounded when unset
    pub storage_capacity_bytes: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".blipnote"));

        Self {
            data_dir,
            storage_key: "memoList".to_string(),
            sweep_interval_ms: 1_000,
            persist_debounce_ms: 100,
            warning_lead_ms: 60_000,
            warning_window_ms: 1_000,
            preview_chars: 20,
            notification_title: "Blip Memo".to_string(),
            storage_capacity_bytes: None,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "blipnote", "blipnote")
}

impl Config {
    /// Where the config file lives when no path is given.
    pub fn default_path() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Loads the config at `path` (or the default location). A missing file
    /// yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| MemoError::ConfigError {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Writes the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        self.validate()?;
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp_file = NamedTempFile::new_in(&dir)?;
        temp_file.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(&path).map_err(|e| MemoError::Io(e.error))?;

        info!("Saved config to {}", path.display());
        Ok(path)
    }

    /// Rejects settings the sweeper and scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| {
            Err(MemoError::ConfigError {
                message: message.to_string(),
            })
        };

        if self.storage_key.trim().is_empty() {
            return fail("storage_key cannot be empty");
        }
        if self.sweep_interval_ms == 0 {
            return fail("sweep_interval_ms must be greater than zero");
        }
        if self.persist_debounce_ms == 0 {
            return fail("persist_debounce_ms must be greater than zero");
        }
        if self.warning_window_ms < self.sweep_interval_ms {
            return fail("warning_window_ms must be at least sweep_interval_ms");
        }
        if self.warning_lead_ms > MAX_WARNING_MS || self.warning_window_ms > MAX_WARNING_MS {
            return fail("warning_lead_ms and warning_window_ms must be at most one year");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.storage_key, "memoList");
        assert_eq!(config.sweep_interval_ms, 1_000);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            storage_capacity_bytes: Some(4096),
            ..Config::default()
        };
        config.save(Some(&path)).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"preview_chars": 10}"#).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.preview_chars, 10);
        assert_eq!(config.warning_lead_ms, 60_000);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = Config {
            sweep_interval_ms: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(MemoError::ConfigError { .. })));
    }

    #[test]
    fn warning_window_must_cover_a_sweep_interval() {
        let config = Config {
            sweep_interval_ms: 2_000,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(MemoError::ConfigError { .. })));

        let config = Config {
            sweep_interval_ms: 2_000,
            warning_window_ms: 2_000,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn oversized_warning_settings_are_rejected() {
        for config in [
            Config {
                warning_lead_ms: u64::MAX,
                ..Config::default()
            },
            Config {
                warning_window_ms: MAX_WARNING_MS + 1,
                ..Config::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(MemoError::ConfigError { .. })));
        }
    }

    #[test]
    fn invalid_file_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"sweep_interval_ms": 5000}"#).unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(MemoError::ConfigError { .. })
        ));
    }
}
