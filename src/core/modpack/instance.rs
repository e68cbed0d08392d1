use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::archive::ModpackArchive;
use super::configuration::{ModpackConfiguration, OverrideRecord};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::HashAlgorithm;
use crate::core::task::{Task, TaskContext};

/// Records the pack's identity and the hash of every override it ships, so a
/// later update can tell pack files from user edits.
pub struct InstanceWriterTask {
    archive: ModpackArchive,
    subpaths: Vec<String>,
    kind: String,
    name: String,
    version: String,
    manifest: serde_json::Value,
    destination: PathBuf,
}

impl InstanceWriterTask {
    pub fn new(
        archive: ModpackArchive,
        subpaths: Vec<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        manifest: serde_json::Value,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            archive,
            subpaths,
            kind: kind.into(),
            name: name.into(),
            version: version.into(),
            manifest,
            destination: destination.into(),
        }
    }
}

/// SHA-1 of every override entry, earlier sub-paths shadowing later ones.
fn hash_overrides(archive: &ModpackArchive, subpaths: &[String]) -> LauncherResult<Vec<OverrideRecord>> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for subpath in subpaths {
        for (path, hash) in archive.hash_subtree(subpath, HashAlgorithm::Sha1)? {
            if seen.insert(path.clone()) {
                records.push(OverrideRecord { path, hash });
            }
        }
    }
    Ok(records)
}

#[async_trait]
impl Task for InstanceWriterTask {
    fn name(&self) -> String {
        format!("record modpack {}", self.name)
    }

    fn stage(&self) -> Option<&str> {
        Some("modpack")
    }

    async fn execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
        let archive = self.archive.clone();
        let subpaths = self.subpaths.clone();
        let overrides = tokio::task::spawn_blocking(move || hash_overrides(&archive, &subpaths))
            .await
            .map_err(|e| LauncherError::Other(format!("Override hashing aborted: {}", e)))??;

        let configuration = ModpackConfiguration {
            kind: self.kind.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            manifest: self.manifest.clone(),
            overrides,
        };
        configuration.write(&self.destination).await?;
        info!(
            "Recorded {} overrides of {} {}",
            configuration.overrides.len(),
            self.name,
            self.version
        );
        Ok(())
    }
}
