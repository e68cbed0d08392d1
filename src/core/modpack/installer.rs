use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::archive::sanitize_relative;
use super::configuration::ModpackConfiguration;
use super::mcbbs::MCBBS_PATCH;
use super::multimc::is_local_library;
use super::{
    CompletionTask, InstallPlan, InstanceWriterTask, LoadedModpack, ModpackKind, ModpackManifest,
    OverridesTask,
};
use crate::core::error::{CompletionShortfall, LauncherError, LauncherResult};
use crate::core::install::{BuildVersionTask, GameBuilder, LibrariesTask};
use crate::core::state::InstallEnvironment;
use crate::core::task::{ProgressObserver, Task, TaskContext, TaskGraph};
use crate::core::version::VersionDescriptor;

/// What happens to the version directory after a failed install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    RemoveVersion,
    /// The pack is usable but some referenced files are missing.
    KeepVersion,
}

pub fn rollback_decision(error: &LauncherError) -> Rollback {
    match error.completion_shortfall() {
        Some(_) => Rollback::KeepVersion,
        None => Rollback::RemoveVersion,
    }
}

/// Result of a modpack install that did not roll back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Complete,
    Incomplete(CompletionShortfall),
}

/// Installs or updates one pack as the version `name`.
///
/// Before the body: the base version is built, overrides are laid down and
/// the instance record is written. The body then adds format patches,
/// removes files the previous pack had and this one dropped, keeps a copy
/// of the manifest, and finally hands the file list to a
/// [`CompletionTask`].
pub struct ModpackInstaller {
    env: InstallEnvironment,
    name: String,
    pack: LoadedModpack,
    previous: Option<Arc<ModpackConfiguration>>,
    apply_format_patches: bool,
    build: Mutex<Option<BuildVersionTask>>,
}

/// Whether the descriptor on disk already carries the `mcbbs` patch.
fn has_mcbbs_patch(version_json: &Path) -> bool {
    std::fs::read_to_string(version_json)
        .ok()
        .and_then(|text| serde_json::from_str::<VersionDescriptor>(&text).ok())
        .is_some_and(|descriptor| descriptor.patch(MCBBS_PATCH).is_some())
}

impl ModpackInstaller {
    /// Check `name` against what is on disk and prepare the build request.
    ///
    /// Fails without touching the disk when `name` holds a version that was
    /// not installed from a pack, or one installed from a different format.
    pub fn new(env: &InstallEnvironment, pack: LoadedModpack, name: impl Into<String>) -> LauncherResult<Self> {
        let name = name.into();
        let repository = &env.repository;
        let kind = pack.manifest.kind();

        let configuration_file = repository.modpack_configuration_file(&name);
        let update = repository.has_version(&name);
        if update && !configuration_file.is_file() {
            return Err(LauncherError::VersionConflict(name));
        }

        let previous = ModpackConfiguration::read_blocking(&configuration_file);
        if let Some(previous) = &previous {
            if previous.kind != kind.tag() {
                return Err(LauncherError::ModpackTypeMismatch {
                    name,
                    expected: kind.tag().to_string(),
                });
            }
        }

        let mut builder = GameBuilder::new(env).name(&name);
        for (id, version) in pack.manifest.loader_declarations()? {
            builder = builder.version(id, version);
        }
        let build = builder.build()?;

        // A version another launcher set up from an mcbbs pack keeps its own
        // library layout.
        let apply_format_patches = match kind {
            ModpackKind::Mcbbs => !update || has_mcbbs_patch(&repository.version_json(&name)),
            _ => true,
        };

        Ok(Self {
            env: env.clone(),
            name,
            pack,
            previous: previous.map(Arc::new),
            apply_format_patches,
            build: Mutex::new(Some(build)),
        })
    }

    /// Open the pack at `path` and prepare its install as `name`.
    pub fn from_file(env: &InstallEnvironment, path: &Path, name: impl Into<String>) -> LauncherResult<Self> {
        Self::new(env, LoadedModpack::open(path)?, name)
    }

    pub fn version_name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModpackKind {
        self.pack.manifest.kind()
    }

    /// Run the install on a fresh graph.
    ///
    /// A completion shortfall is reported as [`InstallOutcome::Incomplete`];
    /// every other failure has already rolled the version back.
    pub async fn install(self) -> LauncherResult<InstallOutcome> {
        let name = self.name.clone();
        let graph = TaskGraph::new();
        let observer = ProgressObserver::spawn(&graph);
        let id = graph.add(self);
        let result = graph.run(id).await;
        observer.abort();

        match result {
            Ok(()) => Ok(InstallOutcome::Complete),
            Err(e) => match e.completion_shortfall() {
                Some(shortfall) => {
                    warn!("Installed {} with missing content: {}", name, shortfall);
                    Ok(InstallOutcome::Incomplete(shortfall))
                }
                None => Err(e),
            },
        }
    }

    fn version_root(&self) -> PathBuf {
        self.env.repository.version_root(&self.name)
    }

    fn run_directory(&self) -> PathBuf {
        self.env.repository.run_directory(&self.name)
    }

    /// Add the format's own patches to the freshly built descriptor and copy
    /// the trees it keeps next to the version.
    async fn apply_version_extras(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
        let archive = self.pack.archive.clone();
        let manifest = self.pack.manifest.clone();
        let version_root = self.version_root();

        let patches = tokio::task::spawn_blocking(move || -> LauncherResult<_> {
            for (subtree, destination) in manifest.version_trees() {
                if archive.has_subtree(&subtree)? {
                    let copied = archive.extract_subtree(&subtree, &version_root.join(destination), |_| true)?;
                    debug!("Copied {} files into {}", copied.len(), destination);
                }
            }
            manifest.version_patches(&archive)
        })
        .await
        .map_err(|e| LauncherError::Other(format!("Reading version patches aborted: {}", e)))??;

        if patches.is_empty() {
            return Ok(());
        }
        if !self.apply_format_patches {
            info!("{} was set up by another launcher; leaving its patches alone", self.name);
            return Ok(());
        }

        let repository = &self.env.repository;
        let mut descriptor = repository.read_version_descriptor(&self.name).await?;
        let mut libraries = Vec::new();
        for patch in patches {
            libraries.extend(
                patch
                    .libraries
                    .iter()
                    .filter(|library| !is_local_library(library))
                    .cloned(),
            );
            debug!("Applying patch {} to {}", patch.id, self.name);
            descriptor.set_patch(patch);
        }
        repository.save_version_descriptor(&descriptor).await?;

        if !libraries.is_empty() {
            ctx.add_dependent(LibrariesTask::new(self.env.clone(), libraries));
        }
        Ok(())
    }

    /// Delete files the previous pack referenced and this one does not.
    async fn remove_dropped_files(&self, previous: &ModpackManifest) -> LauncherResult<()> {
        let current: HashSet<String> = self
            .pack
            .manifest
            .file_list()
            .into_iter()
            .map(|file| file.key)
            .collect();
        let run = self.run_directory();

        for file in previous.file_list() {
            if current.contains(&file.key) {
                continue;
            }
            let Some(relative) = file
                .path
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .and_then(sanitize_relative)
            else {
                continue;
            };
            let target = run.join(relative);
            if target.is_file() {
                tokio::fs::remove_file(&target)
                    .await
                    .map_err(|e| LauncherError::io(&target, e))?;
                debug!("Removed {} dropped by the pack", file.key);
            }
        }
        Ok(())
    }

    async fn keep_manifest_copy(&self) -> LauncherResult<()> {
        let path = self
            .version_root()
            .join(self.pack.manifest.kind().manifest_file_name());
        tokio::fs::write(&path, &self.pack.raw_manifest)
            .await
            .map_err(|e| LauncherError::io(&path, e))
    }
}

#[async_trait]
impl Task for ModpackInstaller {
    fn name(&self) -> String {
        format!("install {} modpack {}", self.kind(), self.name)
    }

    fn stage(&self) -> Option<&str> {
        Some("modpack")
    }

    async fn pre_execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
        let build = self
            .build
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| LauncherError::Other(format!("{} already started", self.name)))?;
        let manifest = &self.pack.manifest;
        let subpaths = manifest.overrides_subpaths();

        info!(
            "Installing {} {} {} as {}",
            manifest.kind(),
            manifest.pack_name(),
            manifest.pack_version(),
            self.name
        );
        ctx.add_dependency(build);
        ctx.add_dependency(OverridesTask::new(
            self.pack.archive.clone(),
            self.run_directory(),
            subpaths.clone(),
            self.previous.clone(),
        ));
        ctx.add_dependency(InstanceWriterTask::new(
            self.pack.archive.clone(),
            subpaths,
            manifest.kind().tag(),
            manifest.pack_name(),
            manifest.pack_version(),
            manifest.snapshot()?,
            self.env.repository.modpack_configuration_file(&self.name),
        ));
        Ok(())
    }

    async fn execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
        self.apply_version_extras(ctx).await?;

        if let Some(previous) = &self.previous {
            match ModpackManifest::from_snapshot(self.kind(), previous.manifest.clone()) {
                Ok(old) => self.remove_dropped_files(&old).await?,
                Err(e) => warn!("Cannot read the previous manifest of {}: {}", self.name, e),
            }
        }

        self.keep_manifest_copy().await?;

        let files = self.pack.manifest.file_list();
        if !files.is_empty() {
            ctx.add_dependent(CompletionTask::new(self.env.clone(), self.run_directory(), files));
        }
        Ok(())
    }

    async fn on_done(&self, outcome: &Result<(), Arc<LauncherError>>) {
        let Err(error) = outcome else {
            info!("Installed modpack {}", self.name);
            return;
        };

        match rollback_decision(error) {
            Rollback::KeepVersion => {
                warn!("Keeping {} although some files are missing: {}", self.name, error);
            }
            Rollback::RemoveVersion => {
                warn!("Installing {} failed, removing it: {}", self.name, error);
                if let Err(e) = self.env.repository.remove_version_from_disk(&self.name).await {
                    warn!("Could not remove {}: {}", self.name, e);
                }
            }
        }
    }
}
