use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::archive::sanitize_relative;
use super::ManifestFile;
use crate::core::downloader::DownloadTask;
use crate::core::error::{CompletionShortfall, LauncherError, LauncherResult};
use crate::core::state::InstallEnvironment;
use crate::core::task::{FailurePolicy, Task, TaskContext};

/// Fetch every file a manifest references that the run directory lacks.
///
/// Download failures do not abort the siblings; once all are done the
/// post-step turns them into a [`CompletionShortfall`].
pub struct CompletionTask {
    env: InstallEnvironment,
    run_directory: PathBuf,
    files: Vec<ManifestFile>,
    unresolved: AtomicUsize,
}

impl CompletionTask {
    pub fn new(env: InstallEnvironment, run_directory: impl Into<PathBuf>, files: Vec<ManifestFile>) -> Self {
        Self {
            env,
            run_directory: run_directory.into(),
            files,
            unresolved: AtomicUsize::new(0),
        }
    }
}

/// Classify what went wrong after every download settled.
pub fn classify_shortfall(unresolved: usize, failures: &[LauncherError]) -> Option<CompletionShortfall> {
    if failures.iter().any(LauncherError::is_not_found) {
        Some(CompletionShortfall::ResourceMissing)
    } else if unresolved > 0 || !failures.is_empty() {
        Some(CompletionShortfall::Incomplete)
    } else {
        None
    }
}

#[async_trait]
impl Task for CompletionTask {
    fn name(&self) -> String {
        format!("complete modpack files in {}", self.run_directory.display())
    }

    fn stage(&self) -> Option<&str> {
        Some("modpack")
    }

    fn dependent_policy(&self) -> FailurePolicy {
        FailurePolicy::Tolerate
    }

    fn post_execute_on_failure(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
        let mut unresolved = 0;
        for file in &self.files {
            if !file.client_supported {
                debug!("Skipping client-unsupported {}", file.key);
                continue;
            }
            let Some(relative) = file.path.as_deref() else {
                warn!("Modpack file {} has no name", file.key);
                unresolved += 1;
                continue;
            };
            let Some(relative) = sanitize_relative(relative) else {
                warn!("Refusing modpack file outside the run directory: {}", relative);
                unresolved += 1;
                continue;
            };

            let target = self.run_directory.join(relative);
            if target.exists() {
                continue;
            }
            if file.urls.is_empty() {
                debug!("Modpack file {} is missing and declares no download", file.key);
                continue;
            }

            let download = DownloadTask::new(self.env.downloader.clone(), file.urls.clone(), target)
                .with_checksum(file.checksum.clone())
                .with_cache(self.env.cache.clone())
                .with_coordinates(file.key.clone())
                .with_stage("modpack");
            ctx.add_dependent(download);
        }

        self.unresolved.store(unresolved, Ordering::Release);
        let pending = ctx.pending_dependents();
        ctx.set_total(pending as u64);
        info!("Completing modpack: {} downloads, {} unresolved", pending, unresolved);
        Ok(())
    }

    async fn post_execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
        if let Some(error) = ctx.error() {
            debug!("Completion aborted before classification: {}", error);
            return Ok(());
        }

        let failures: Vec<LauncherError> = ctx
            .dependent_failures()
            .iter()
            .map(|failure| LauncherError::Task {
                task: failure.task.clone(),
                source: failure.error.clone(),
            })
            .collect();
        for failure in &failures {
            warn!("{}", failure);
        }

        match classify_shortfall(self.unresolved.load(Ordering::Acquire), &failures) {
            Some(shortfall) => Err(LauncherError::Completion(shortfall)),
            None => Ok(()),
        }
    }
}
