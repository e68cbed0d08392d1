use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::APP_USER_AGENT;

const APP_DIR_NAME: &str = "packsmith";
const BOOTSTRAP_FILE: &str = "packsmith_bootstrap.json";
pub const SETTINGS_FILE: &str = "launcher_settings.json";

/// User-tunable knobs, stored as `launcher_settings.json` in the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Maximum simultaneous HTTP transfers.
    pub download_concurrency: usize,
    /// Extra attempts per mirror after a network failure.
    pub download_retries: u32,
    /// Linear backoff step between attempts.
    pub retry_backoff_ms: u64,
    /// When off, existing files are reused without hashing.
    pub integrity_check: bool,
    /// Give every version its own run directory.
    pub isolated_run_directories: bool,
    pub user_agent: String,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            download_concurrency: 8,
            download_retries: 3,
            retry_backoff_ms: 500,
            integrity_check: true,
            isolated_run_directories: true,
            user_agent: APP_USER_AGENT.to_string(),
        }
    }
}

impl LauncherSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Read settings from `data_dir`, falling back to defaults when the
    /// file is absent or unreadable.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("No settings at {:?}, using defaults", path);
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring malformed settings at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        let path = data_dir.join(SETTINGS_FILE);
        std::fs::create_dir_all(data_dir).map_err(|e| LauncherError::io(data_dir, e))?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| LauncherError::io(&path, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BootstrapConfig {
    data_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve the data directory: a bootstrap file under the platform data
/// directory may redirect it, otherwise `<platform data>/packsmith`.
pub fn default_data_dir() -> PathBuf {
    let base = default_base_dir();
    let bootstrap_path = base.join(BOOTSTRAP_FILE);

    if let Ok(raw) = std::fs::read_to_string(&bootstrap_path) {
        if let Ok(cfg) = serde_json::from_str::<BootstrapConfig>(&raw) {
            return cfg.data_dir;
        }
        warn!("Ignoring malformed bootstrap file {:?}", bootstrap_path);
    }

    base.join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(LauncherSettings::load(dir.path()), LauncherSettings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "download_retries": 7, "integrity_check": false }"#,
        )
        .unwrap();

        let settings = LauncherSettings::load(dir.path());
        assert_eq!(settings.download_retries, 7);
        assert!(!settings.integrity_check);
        assert_eq!(settings.download_concurrency, 8);
        assert!(settings.isolated_run_directories);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LauncherSettings {
            retry_backoff_ms: 10,
            ..LauncherSettings::default()
        };
        settings.save(dir.path()).unwrap();
        assert_eq!(LauncherSettings::load(dir.path()), settings);
    }
}
