use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::client::{is_retryable, Downloader};
use crate::core::cache::{ArtifactIdentity, CacheRepository};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{Checksum, HashAlgorithm, IntegrityProbe};
use crate::core::task::{Significance, Task, TaskContext};

/// Fetch one file from the first mirror that answers, verify it, then move
/// it into place.
pub struct DownloadTask {
    downloader: Arc<Downloader>,
    urls: Vec<String>,
    destination: PathBuf,
    checksum: Option<Checksum>,
    probe: Option<IntegrityProbe>,
    cache: Option<Arc<CacheRepository>>,
    coordinates: Option<String>,
    significance: Significance,
    stage: Option<&'static str>,
}

impl DownloadTask {
    pub fn new(downloader: Arc<Downloader>, urls: Vec<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            urls,
            destination: destination.into(),
            checksum: None,
            probe: None,
            cache: None,
            coordinates: None,
            significance: Significance::Major,
            stage: None,
        }
    }

    pub fn with_checksum(mut self, checksum: Option<Checksum>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_probe(mut self, probe: Option<IntegrityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Consult and populate `cache`.
    pub fn with_cache(mut self, cache: Arc<CacheRepository>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_coordinates(mut self, coordinates: impl Into<String>) -> Self {
        self.coordinates = Some(coordinates.into());
        self
    }

    pub fn with_significance(mut self, significance: Significance) -> Self {
        self.significance = significance;
        self
    }

    pub fn with_stage(mut self, stage: &'static str) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    fn identity(&self, checksum: Checksum) -> ArtifactIdentity {
        let coordinates = self
            .coordinates
            .clone()
            .unwrap_or_else(|| self.destination.to_string_lossy().into_owned());
        let identity = ArtifactIdentity::new(coordinates, checksum);
        match self.urls.first() {
            Some(url) => identity.with_url(url.clone()),
            None => identity,
        }
    }

    fn staging_path(&self, dir: &Path) -> PathBuf {
        let name = self
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".into());
        dir.join(format!(".{}.{}.part", name, uuid::Uuid::new_v4()))
    }

    /// Try every mirror in order, retrying network failures on each.
    async fn transfer(&self, staging: &Path, ctx: &TaskContext) -> LauncherResult<String> {
        let algorithm = self
            .checksum
            .as_ref()
            .map(|c| c.algorithm)
            .unwrap_or(HashAlgorithm::Sha1);

        let mut last_error = None;
        for url in &self.urls {
            let mut attempt = 0;
            loop {
                match self
                    .downloader
                    .fetch_to(url, staging, algorithm, Some(ctx.progress()))
                    .await
                {
                    Ok(fetched) => return Ok(fetched.digest),
                    Err(e @ LauncherError::Io { .. }) => return Err(e),
                    Err(e) if is_retryable(&e) && attempt < self.downloader.retries() => {
                        attempt += 1;
                        let delay = self.downloader.backoff_for(attempt);
                        debug!("Retrying {} in {:?} (attempt {}): {}", url, delay, attempt, e);
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        warn!("Giving up on {}: {}", url, e);
                        last_error = Some(e);
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LauncherError::NoDownloadSource(self.destination.clone())))
    }

    async fn verify_and_place(&self, staging: &Path, digest: &str) -> LauncherResult<()> {
        if let Some(expected) = &self.checksum {
            if !expected.matches(digest) {
                return Err(LauncherError::ChecksumMismatch {
                    path: self.destination.clone(),
                    expected: expected.to_string(),
                    actual: digest.to_string(),
                });
            }
        }

        if let Some(probe) = self.probe {
            let owned = staging.to_path_buf();
            let verdict = tokio::task::spawn_blocking(move || probe.check(&owned))
                .await
                .map_err(|e| LauncherError::Other(format!("Probe task failed: {}", e)))?;
            if let Err(reason) = verdict {
                return Err(LauncherError::CorruptedArchive {
                    path: self.destination.clone(),
                    reason,
                });
            }
        }

        tokio::fs::rename(staging, &self.destination)
            .await
            .map_err(|e| LauncherError::io(&self.destination, e))
    }
}

#[async_trait]
impl Task for DownloadTask {
    fn name(&self) -> String {
        format!("download {}", self.destination.display())
    }

    fn stage(&self) -> Option<&str> {
        self.stage
    }

    fn significance(&self) -> Significance {
        self.significance
    }

    async fn execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
        if let (Some(cache), Some(checksum)) = (&self.cache, &self.checksum) {
            if cache.fetch(&self.identity(checksum.clone()), &self.destination).await? {
                return Ok(());
            }
        }

        if self.urls.is_empty() {
            return Err(LauncherError::NoDownloadSource(self.destination.clone()));
        }

        let dir = self
            .destination
            .parent()
            .ok_or_else(|| LauncherError::Other(format!("No parent for {:?}", self.destination)))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| LauncherError::io(dir, e))?;

        let staging = self.staging_path(dir);
        let placed = match self.transfer(&staging, ctx).await {
            Ok(digest) => self.verify_and_place(&staging, &digest).await.map(|()| digest),
            Err(e) => Err(e),
        };
        let digest = match placed {
            Ok(digest) => digest,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };
        ctx.notify_progress();

        if let Some(cache) = &self.cache {
            let checksum = self
                .checksum
                .clone()
                .unwrap_or_else(|| Checksum::sha1(&digest));
            if let Err(e) = cache.try_adopt(&self.identity(checksum), &self.destination).await {
                warn!("Could not cache {:?}: {}", self.destination, e);
            }
        }
        Ok(())
    }
}
