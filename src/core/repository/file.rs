use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use super::GameRepository;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::VersionDescriptor;

/// Default layout: `<base>/versions/<name>/<name>.json` plus
/// `<base>/libraries/<maven path>`.
pub struct FileGameRepository {
    base: PathBuf,
    isolated: bool,
}

impl FileGameRepository {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            isolated: true,
        }
    }

    /// Share `<base>` as the run directory of every version.
    pub fn with_isolation(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    pub fn versions_directory(&self) -> PathBuf {
        self.base.join("versions")
    }
}

#[async_trait]
impl GameRepository for FileGameRepository {
    fn base_directory(&self) -> &Path {
        &self.base
    }

    fn version_root(&self, name: &str) -> PathBuf {
        self.versions_directory().join(name)
    }

    fn run_directory(&self, name: &str) -> PathBuf {
        if self.isolated {
            self.version_root(name)
        } else {
            self.base.clone()
        }
    }

    async fn remove_version_from_disk(&self, name: &str) -> LauncherResult<bool> {
        let root = self.version_root(name);
        if !root.exists() {
            return Ok(false);
        }

        // Rename first so a half-deleted tree never looks like a version.
        let doomed = self
            .versions_directory()
            .join(format!(".{}.{}.removing", name, uuid::Uuid::new_v4()));
        let target = match tokio::fs::rename(&root, &doomed).await {
            Ok(()) => doomed,
            Err(e) => {
                warn!("Could not move {:?} aside, deleting in place: {}", root, e);
                root
            }
        };

        tokio::fs::remove_dir_all(&target)
            .await
            .map_err(|e| LauncherError::io(&target, e))?;

        info!("Removed version {}", name);
        Ok(true)
    }

    async fn read_version_descriptor(&self, name: &str) -> LauncherResult<VersionDescriptor> {
        let path = self.version_json(name);
        if !path.is_file() {
            return Err(LauncherError::VersionNotFound(name.to_string()));
        }
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LauncherError::io(&path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn save_version_descriptor(&self, descriptor: &VersionDescriptor) -> LauncherResult<()> {
        let path = self.version_json(&descriptor.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(descriptor)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| LauncherError::io(&path, e))
    }

    async fn list_versions(&self) -> LauncherResult<Vec<String>> {
        let dir = self.versions_directory();
        let mut names = Vec::new();
        if !dir.exists() {
            return Ok(names);
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| LauncherError::io(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LauncherError::io(&dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            match self.read_version_descriptor(&name).await {
                Ok(_) => names.push(name),
                Err(e) => warn!("Skipping version directory {:?}: {}", entry.path(), e),
            }
        }

        names.sort();
        Ok(names)
    }
}
