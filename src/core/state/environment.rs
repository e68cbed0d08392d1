use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::settings::{default_data_dir, LauncherSettings};
use crate::core::cache::CacheRepository;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::loaders::{MetaVersionProvider, VersionProvider};
use crate::core::repository::{FileGameRepository, GameRepository};

/// Collaborators shared by every installation step.
#[derive(Clone)]
pub struct InstallEnvironment {
    pub data_dir: PathBuf,
    pub settings: LauncherSettings,
    pub repository: Arc<dyn GameRepository>,
    pub cache: Arc<CacheRepository>,
    pub downloader: Arc<Downloader>,
    pub provider: Arc<dyn VersionProvider>,
}

impl InstallEnvironment {
    /// Environment rooted at the default data directory.
    pub fn load_default() -> LauncherResult<Self> {
        Self::open(&default_data_dir())
    }

    /// Read settings from `data_dir` and wire the default collaborators.
    pub fn open(data_dir: &Path) -> LauncherResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| LauncherError::io(data_dir, e))?;
        let settings = LauncherSettings::load(data_dir);
        let downloader = Arc::new(Downloader::from_settings(&settings)?);
        let provider: Arc<dyn VersionProvider> =
            Arc::new(MetaVersionProvider::new(downloader.clone()));

        info!("Using data directory {:?}", data_dir);
        Ok(Self::with_parts(data_dir, settings, downloader, provider))
    }

    /// Wire an environment around an explicit downloader and provider.
    pub fn with_parts(
        data_dir: &Path,
        settings: LauncherSettings,
        downloader: Arc<Downloader>,
        provider: Arc<dyn VersionProvider>,
    ) -> Self {
        let repository = FileGameRepository::new(data_dir)
            .with_isolation(settings.isolated_run_directories);
        Self {
            data_dir: data_dir.to_path_buf(),
            repository: Arc::new(repository),
            cache: Arc::new(CacheRepository::new(data_dir.join("cache"))),
            downloader,
            provider,
            settings,
        }
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.repository.libraries_directory()
    }
}
