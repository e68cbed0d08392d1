use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::info;

use super::libraries::LibrariesTask;
use crate::core::downloader::DownloadTask;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{should_refetch, ArtifactExpectation, Checksum, IntegrityProbe};
use crate::core::loaders::LoaderKind;
use crate::core::repository::SaveVersionTask;
use crate::core::state::InstallEnvironment;
use crate::core::task::{Task, TaskContext};
use crate::core::version::{VersionDescriptor, VersionPatch, GAME_PATCH};

/// Collects what a version should contain and produces the task building it.
///
/// ```ignore
/// let task = GameBuilder::new(&env)
///     .name("My Pack")
///     .version("game", "1.20.1")
///     .version("fabric", "0.15.0")
///     .build()?;
/// ```
pub struct GameBuilder {
    env: InstallEnvironment,
    name: Option<String>,
    game_version: Option<String>,
    loaders: Vec<(String, String)>,
}

impl GameBuilder {
    pub fn new(env: &InstallEnvironment) -> Self {
        Self {
            env: env.clone(),
            name: None,
            game_version: None,
            loaders: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn game_version(mut self, version: impl Into<String>) -> Self {
        self.game_version = Some(version.into());
        self
    }

    /// Declare a component; `game` sets the base game version.
    pub fn version(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        let version = version.into();
        if id == GAME_PATCH {
            self.game_version = Some(version);
        } else {
            self.loaders.retain(|(existing, _)| existing != &id);
            self.loaders.push((id, version));
        }
        self
    }

    pub fn build(self) -> LauncherResult<BuildVersionTask> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| LauncherError::Other("Version name is required".into()))?;
        let game_version = self
            .game_version
            .ok_or_else(|| LauncherError::Other(format!("No game version given for {}", name)))?;

        let loaders = self
            .loaders
            .into_iter()
            .map(|(id, version)| {
                LoaderKind::from_id(&id)
                    .map(|kind| (kind, version))
                    .ok_or(LauncherError::UnsupportedLoader(id))
            })
            .collect::<LauncherResult<Vec<_>>>()?;

        Ok(BuildVersionTask {
            env: self.env,
            name,
            game_version,
            loaders,
            resolved: Mutex::new(None),
        })
    }
}

/// Resolve the descriptor, fetch the client jar, save the descriptor, then
/// install libraries.
pub struct BuildVersionTask {
    env: InstallEnvironment,
    name: String,
    game_version: String,
    loaders: Vec<(LoaderKind, String)>,
    resolved: Mutex<Option<VersionDescriptor>>,
}

impl BuildVersionTask {
    pub fn version_name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self) -> LauncherResult<VersionDescriptor> {
        let provider = &self.env.provider;
        let mut descriptor = provider.game_descriptor(&self.game_version).await?;
        descriptor.id = self.name.clone();
        descriptor.inherits_from = None;
        descriptor.set_patch(VersionPatch::new(GAME_PATCH, Some(self.game_version.clone())));

        for (kind, version) in &self.loaders {
            let patch = provider.loader_patch(*kind, &self.game_version, version).await?;
            descriptor.set_patch(patch);
        }
        Ok(descriptor)
    }
}

#[async_trait]
impl Task for BuildVersionTask {
    fn name(&self) -> String {
        format!("build version {}", self.name)
    }

    fn stage(&self) -> Option<&str> {
        Some("version")
    }

    async fn pre_execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
        info!("Building {} on game {}", self.name, self.game_version);
        let descriptor = self.resolve().await?;

        if let Some(client) = descriptor.client_download() {
            let jar = self.env.repository.version_jar(&self.name);
            let checksum = Checksum::sha1(&client.sha1);
            let expectation = ArtifactExpectation::new()
                .with_checksum(Some(checksum.clone()))
                .with_probe(Some(IntegrityProbe::Zip));
            if should_refetch(&jar, &expectation).await {
                ctx.add_dependency(
                    DownloadTask::new(self.env.downloader.clone(), vec![client.url.clone()], jar)
                        .with_checksum(Some(checksum))
                        .with_probe(Some(IntegrityProbe::Zip))
                        .with_cache(self.env.cache.clone())
                        .with_coordinates(format!("com.mojang:minecraft:{}:client", self.game_version))
                        .with_stage("version"),
                );
            }
        }

        ctx.add_dependency(SaveVersionTask::new(
            self.env.repository.clone(),
            descriptor.clone(),
        ));
        *self.resolved.lock().unwrap_or_else(PoisonError::into_inner) = Some(descriptor);
        Ok(())
    }

    async fn execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
        let descriptor = self
            .resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| LauncherError::Other(format!("{} was not resolved", self.name)))?;

        ctx.add_dependent(LibrariesTask::new(
            self.env.clone(),
            descriptor.resolved_libraries(),
        ));
        ctx.set_result(descriptor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::Downloader;
    use crate::core::loaders::VersionProvider;
    use crate::core::state::LauncherSettings;
    use crate::core::task::TaskGraph;
    use crate::core::version::Library;
    use std::sync::Arc;

    struct StaticProvider;

    #[async_trait]
    impl VersionProvider for StaticProvider {
        async fn game_descriptor(&self, game_version: &str) -> LauncherResult<VersionDescriptor> {
            let mut descriptor = VersionDescriptor::new(game_version);
            descriptor.main_class = Some("net.minecraft.client.main.Main".into());
            Ok(descriptor)
        }

        async fn loader_patch(&self, kind: LoaderKind, _: &str, v: &str) -> LauncherResult<VersionPatch> {
            let mut patch = VersionPatch::new(kind.id(), Some(v.to_string()));
            patch.priority = kind.priority();
            // Library from an unreachable repository: the libraries step fails.
            let mut lib = Library::new("com.example:unreachable:1.0");
            lib.url = Some("http://127.0.0.1:9/".into());
            patch.libraries.push(lib);
            Ok(patch)
        }
    }

    fn env(dir: &std::path::Path) -> InstallEnvironment {
        InstallEnvironment::with_parts(
            dir,
            LauncherSettings::default(),
            Arc::new(Downloader::new(reqwest::Client::new()).with_retries(0, Default::default())),
            Arc::new(StaticProvider),
        )
    }

    #[test]
    fn builder_validates_components() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(dir.path());

        assert!(GameBuilder::new(&env).version("game", "1.20.1").build().is_err());
        assert!(GameBuilder::new(&env).name("pack").build().is_err());

        let err = GameBuilder::new(&env)
            .name("pack")
            .version("game", "1.20.1")
            .version("rift", "1.0")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, LauncherError::UnsupportedLoader(_)));

        let task = GameBuilder::new(&env)
            .name("pack")
            .version("game", "1.20.1")
            .version("fabric", "0.15.0")
            .version("fabric", "0.15.1")
            .build()
            .unwrap();
        assert_eq!(task.loaders, vec![(LoaderKind::Fabric, "0.15.1".to_string())]);
    }

    #[tokio::test]
    async fn vanilla_build_saves_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(dir.path());
        let task = GameBuilder::new(&env)
            .name("pack")
            .version("game", "1.20.1")
            .build()
            .unwrap();

        let graph = TaskGraph::new();
        let id = graph.add(task);
        graph.run(id).await.unwrap();

        let saved = env.repository.read_version_descriptor("pack").await.unwrap();
        assert_eq!(saved.game_version(), "1.20.1");
        assert_eq!(
            graph.result::<VersionDescriptor>(id).map(|d| d.id.clone()),
            Some("pack".to_string())
        );
    }

    #[tokio::test]
    async fn library_failure_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(dir.path());
        let task = GameBuilder::new(&env)
            .name("pack")
            .version("game", "1.20.1")
            .version("forge", "47.2.0")
            .build()
            .unwrap();

        let graph = TaskGraph::new();
        let id = graph.add(task);
        assert!(graph.run(id).await.is_err());

        // The descriptor is saved before libraries are attempted.
        let saved = env.repository.read_version_descriptor("pack").await.unwrap();
        assert!(saved.patch("forge").is_some());
    }
}
