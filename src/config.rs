use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for the frame counter, access lock and fps estimator.
///
/// The defaults reproduce the values every existing sender and receiver
/// expects, so only change them when all participants agree. The semaphore
/// seed and maximum are fixed by the protocol and live in [`crate::sys`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Bounded wait for the access lock; four frames at 60fps.
    #[serde(default = "default_access_timeout_ms")]
    pub access_timeout_ms: u32,
    #[serde(default = "default_fallback_refresh_rate")]
    pub fallback_refresh_rate: f64,
    #[serde(default = "default_fps_window")]
    pub fps_window: u32,
    #[serde(default = "default_fps_damping")]
    pub fps_damping: f64,
    #[serde(default = "default_settings_key")]
    pub settings_key: String,
    #[serde(default = "default_log_retention")]
    pub log_retention_count: usize,
}

fn default_access_timeout_ms() -> u32 {
    67
}

fn default_fallback_refresh_rate() -> f64 {
    60.0
}

fn default_fps_window() -> u32 {
    16
}

fn default_fps_damping() -> f64 {
    0.85
}

fn default_settings_key() -> String {
    "Framecount".to_string()
}

fn default_log_retention() -> usize {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            access_timeout_ms: default_access_timeout_ms(),
            fallback_refresh_rate: default_fallback_refresh_rate(),
            fps_window: default_fps_window(),
            fps_damping: default_fps_damping(),
            settings_key: default_settings_key(),
            log_retention_count: default_log_retention(),
        }
    }
}

impl SyncConfig {
    pub fn access_timeout(&self) -> Duration {
        Duration::from_millis(self.access_timeout_ms as u64)
    }
}

/// Per-user directory holding the config file, settings database and logs.
pub fn app_data_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    let base = std::env::var("APPDATA")
        .map(PathBuf::from)
        .context("Failed to get APPDATA environment variable")?;

    #[cfg(not(windows))]
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".config"))
            .context("Failed to get HOME environment variable")?,
    };

    Ok(base.join("framesync"))
}

pub struct ConfigFile {
    config_path: PathBuf,
    pub app_data_dir: PathBuf,
}

impl ConfigFile {
    pub fn new() -> Result<Self> {
        Self::in_dir(app_data_dir()?)
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let app_data_dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&app_data_dir).context("Failed to create app data directory")?;

        Ok(Self {
            config_path: app_data_dir.join("config.json"),
            app_data_dir,
        })
    }

    pub fn load(&self) -> Result<SyncConfig> {
        if !self.config_path.exists() {
            return Ok(SyncConfig::default());
        }

        let content = fs::read_to_string(&self.config_path).context("Failed to read config file")?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    pub fn save(&self, config: &SyncConfig) -> Result<()> {
        let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn settings_db_path(&self) -> PathBuf {
        self.app_data_dir.join("settings.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.app_data_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_protocol_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::in_dir(dir.path()).unwrap();
        let config = file.load().unwrap();
        assert_eq!(config.access_timeout(), Duration::from_millis(67));
        assert_eq!(config.settings_key, "Framecount");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::in_dir(dir.path()).unwrap();
        fs::write(dir.path().join("config.json"), r#"{ "access_timeout_ms": 100 }"#).unwrap();

        let config = file.load().unwrap();
        assert_eq!(config.access_timeout_ms, 100);
        assert_eq!(config.fps_window, 16);
    }

    #[test]
    fn semaphore_counts_are_not_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::in_dir(dir.path()).unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{ "semaphore_initial": 0, "semaphore_max": 3 }"#,
        )
        .unwrap();

        assert_eq!(file.load().unwrap(), SyncConfig::default());
    }

    #[test]
    fn save_then_load_keeps_changes() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::in_dir(dir.path()).unwrap();
        let config = SyncConfig {
            fps_damping: 0.5,
            ..SyncConfig::default()
        };
        file.save(&config).unwrap();
        assert_eq!(file.load().unwrap(), config);
    }
}
