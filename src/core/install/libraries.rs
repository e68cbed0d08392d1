use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::core::cache::ArtifactIdentity;
use crate::core::downloader::DownloadTask;
use crate::core::error::LauncherResult;
use crate::core::integrity::{should_refetch, ArtifactExpectation, IntegrityProbe};
use crate::core::state::InstallEnvironment;
use crate::core::task::{Significance, Task, TaskContext};
use crate::core::version::{Library, LibraryFile};

/// Make sure every library of a version is present and valid.
///
/// Files that fail verification get a download task; valid ones are adopted
/// into the cache.
pub struct LibrariesTask {
    env: InstallEnvironment,
    libraries: Vec<Library>,
}

impl LibrariesTask {
    pub fn new(env: InstallEnvironment, libraries: Vec<Library>) -> Self {
        Self { env, libraries }
    }

    fn expectation(&self, file: &LibraryFile) -> ArtifactExpectation {
        if !self.env.settings.integrity_check {
            return ArtifactExpectation::new();
        }
        ArtifactExpectation::new()
            .with_checksum(file.checksum.clone())
            .with_alternates(file.alternates.clone())
            .with_probe(IntegrityProbe::for_path(&file.path))
    }

    /// A download for `file`, or `None` when the local copy is reusable.
    async fn refresh(&self, library: Library, file: LibraryFile) -> Option<DownloadTask> {
        let path = self.env.repository.library_file(&file.path);

        if !should_refetch(&path, &self.expectation(&file)).await {
            if let Some(checksum) = file.checksum {
                let identity = ArtifactIdentity::new(file.coordinate.to_string(), checksum);
                if let Err(e) = self.env.cache.try_adopt(&identity, &path).await {
                    warn!("Could not cache {:?}: {}", path, e);
                }
            }
            return None;
        }

        if library.is_optifine() && !file.declared_url {
            debug!("Skipping OptiFine library {} without a download URL", library.name);
            return None;
        }

        Some(
            DownloadTask::new(self.env.downloader.clone(), file.urls, &path)
                .with_checksum(file.checksum)
                .with_probe(IntegrityProbe::for_path(&path))
                .with_cache(self.env.cache.clone())
                .with_coordinates(file.coordinate.to_string())
                .with_stage("libraries"),
        )
    }
}

#[async_trait]
impl Task for LibrariesTask {
    fn name(&self) -> String {
        "libraries".into()
    }

    fn stage(&self) -> Option<&str> {
        Some("libraries")
    }

    fn significance(&self) -> Significance {
        Significance::Moderate
    }

    async fn execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
        let mut wanted = Vec::new();
        for library in &self.libraries {
            if !library.is_allowed_for_current_os() {
                debug!("Skipping library (OS rule): {}", library.name);
                continue;
            }
            match library.files() {
                Ok(files) => wanted.extend(files.into_iter().map(|f| (library.clone(), f))),
                Err(e) => warn!("Skipping malformed library {}: {}", library.name, e),
            }
        }

        let checked = wanted.len();
        let checks: Vec<_> = wanted
            .into_iter()
            .map(|(library, file)| self.refresh(library, file))
            .collect();
        let refreshed: Vec<Option<DownloadTask>> = stream::iter(checks)
            .buffer_unordered(self.env.downloader.concurrency())
            .collect()
            .await;
        let downloads: Vec<DownloadTask> = refreshed.into_iter().flatten().collect();

        info!("{} of {} library files need downloading", downloads.len(), checked);
        for task in downloads {
            ctx.add_dependent(task);
        }
        ctx.set_total(ctx.pending_dependents() as u64);
        Ok(())
    }
}
