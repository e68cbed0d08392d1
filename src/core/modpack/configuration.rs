use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};

/// One override file as it was laid down, with the SHA-1 it had then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub path: String,
    pub hash: String,
}

/// What a previous install left behind in `modpack.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModpackConfiguration {
    /// Provider tag, e.g. `Curse`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub manifest: serde_json::Value,
    #[serde(default)]
    pub overrides: Vec<OverrideRecord>,
}

impl ModpackConfiguration {
    pub fn override_hash(&self, path: &str) -> Option<&str> {
        self.overrides
            .iter()
            .find(|record| record.path == path)
            .map(|record| record.hash.as_str())
    }

    /// Read the configuration at `path`.
    ///
    /// A missing file is `None`; an unreadable one is logged and also
    /// treated as absent.
    pub async fn read(path: &Path) -> Option<Self> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read modpack configuration {:?}: {}", path, e);
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring malformed modpack configuration {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn read_blocking(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring malformed modpack configuration {:?}: {}", path, e);
                None
            }
        }
    }

    pub async fn write(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| LauncherError::io(path, e))
    }
}
