// ─── Game Repository ───
// On-disk layout of installed versions and the shared library store.

mod file;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::LauncherResult;
use crate::core::task::{Task, TaskContext};
use crate::core::version::VersionDescriptor;

pub use file::FileGameRepository;

pub const MODPACK_CONFIGURATION_FILE: &str = "modpack.json";

/// Resolves where a named version lives and persists its descriptor.
#[async_trait]
pub trait GameRepository: Send + Sync {
    fn base_directory(&self) -> &Path;

    fn version_root(&self, name: &str) -> PathBuf;

    /// Game working directory of `name`.
    fn run_directory(&self, name: &str) -> PathBuf;

    /// Root of the shared Maven-layout library store.
    fn libraries_directory(&self) -> PathBuf {
        self.base_directory().join("libraries")
    }

    /// Absolute path of a library file given its path relative to the store.
    fn library_file(&self, relative: &Path) -> PathBuf {
        self.libraries_directory().join(relative)
    }

    fn version_json(&self, name: &str) -> PathBuf {
        self.version_root(name).join(format!("{}.json", name))
    }

    fn version_jar(&self, name: &str) -> PathBuf {
        self.version_root(name).join(format!("{}.jar", name))
    }

    fn modpack_configuration_file(&self, name: &str) -> PathBuf {
        self.version_root(name).join(MODPACK_CONFIGURATION_FILE)
    }

    fn has_version(&self, name: &str) -> bool {
        self.version_json(name).is_file()
    }

    /// Remove the whole version directory. Returns `false` if it was absent.
    async fn remove_version_from_disk(&self, name: &str) -> LauncherResult<bool>;

    async fn read_version_descriptor(&self, name: &str) -> LauncherResult<VersionDescriptor>;

    async fn save_version_descriptor(&self, descriptor: &VersionDescriptor) -> LauncherResult<()>;

    /// Names of every version with a readable descriptor.
    async fn list_versions(&self) -> LauncherResult<Vec<String>>;
}

/// Persist a descriptor as a graph step.
pub struct SaveVersionTask {
    repository: Arc<dyn GameRepository>,
    descriptor: VersionDescriptor,
}

impl SaveVersionTask {
    pub fn new(repository: Arc<dyn GameRepository>, descriptor: VersionDescriptor) -> Self {
        Self {
            repository,
            descriptor,
        }
    }
}

#[async_trait]
impl Task for SaveVersionTask {
    fn name(&self) -> String {
        format!("save version {}", self.descriptor.id)
    }

    async fn execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
        self.repository.save_version_descriptor(&self.descriptor).await
    }
}
