// ─── Loaders ───
// Resolution of the base game descriptor and of loader patches.

pub mod fabric;
pub mod forge;
pub mod vanilla;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::{FORGE_MAVEN, NEOFORGE_MAVEN};
use crate::core::version::{VersionDescriptor, VersionPatch};
use crate::core::version::VERSION_MANIFEST_URL;

/// Add-ons a version can carry on top of the base game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    Forge,
    NeoForge,
    Fabric,
    Quilt,
    LiteLoader,
    OptiFine,
}

impl LoaderKind {
    pub const ALL: [LoaderKind; 6] = [
        LoaderKind::Forge,
        LoaderKind::NeoForge,
        LoaderKind::Fabric,
        LoaderKind::Quilt,
        LoaderKind::LiteLoader,
        LoaderKind::OptiFine,
    ];

    /// Patch id used in version descriptors.
    pub fn id(self) -> &'static str {
        match self {
            LoaderKind::Forge => "forge",
            LoaderKind::NeoForge => "neoforge",
            LoaderKind::Fabric => "fabric",
            LoaderKind::Quilt => "quilt",
            LoaderKind::LiteLoader => "liteloader",
            LoaderKind::OptiFine => "optifine",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    /// Layer order: tweaks below mod loaders.
    pub fn priority(self) -> i32 {
        match self {
            LoaderKind::LiteLoader | LoaderKind::OptiFine => 10000,
            _ => 30000,
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Supplies the base game descriptor and loader patches for a build.
#[async_trait]
pub trait VersionProvider: Send + Sync {
    async fn game_descriptor(&self, game_version: &str) -> LauncherResult<VersionDescriptor>;

    async fn loader_patch(
        &self,
        kind: LoaderKind,
        game_version: &str,
        loader_version: &str,
    ) -> LauncherResult<VersionPatch>;
}

/// Remote endpoints consulted by [`MetaVersionProvider`].
#[derive(Debug, Clone)]
pub struct MetaEndpoints {
    pub mojang_manifest: String,
    pub fabric_meta: String,
    pub quilt_meta: String,
    pub forge_maven: String,
    pub neoforge_maven: String,
}

impl Default for MetaEndpoints {
    fn default() -> Self {
        Self {
            mojang_manifest: VERSION_MANIFEST_URL.to_string(),
            fabric_meta: fabric::FABRIC_META_BASE.to_string(),
            quilt_meta: fabric::QUILT_META_BASE.to_string(),
            forge_maven: FORGE_MAVEN.to_string(),
            neoforge_maven: NEOFORGE_MAVEN.to_string(),
        }
    }
}

/// Network provider backed by Mojang's manifest, the Fabric and Quilt meta
/// services and the Forge/NeoForge installer jars.
pub struct MetaVersionProvider {
    downloader: Arc<Downloader>,
    endpoints: MetaEndpoints,
}

impl MetaVersionProvider {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self {
            downloader,
            endpoints: MetaEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: MetaEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[async_trait]
impl VersionProvider for MetaVersionProvider {
    async fn game_descriptor(&self, game_version: &str) -> LauncherResult<VersionDescriptor> {
        vanilla::fetch_game_descriptor(&self.downloader, &self.endpoints.mojang_manifest, game_version)
            .await
    }

    async fn loader_patch(
        &self,
        kind: LoaderKind,
        game_version: &str,
        loader_version: &str,
    ) -> LauncherResult<VersionPatch> {
        match kind {
            LoaderKind::Fabric => {
                fabric::profile_patch(
                    &self.downloader,
                    &fabric::ProfileSource::fabric(&self.endpoints.fabric_meta),
                    game_version,
                    loader_version,
                )
                .await
            }
            LoaderKind::Quilt => {
                fabric::profile_patch(
                    &self.downloader,
                    &fabric::ProfileSource::quilt(&self.endpoints.quilt_meta),
                    game_version,
                    loader_version,
                )
                .await
            }
            LoaderKind::Forge | LoaderKind::NeoForge => {
                let maven = if kind == LoaderKind::Forge {
                    &self.endpoints.forge_maven
                } else {
                    &self.endpoints.neoforge_maven
                };
                let urls = forge::installer_urls(kind, maven, game_version, loader_version);
                forge::installer_patch(&self.downloader, kind, &urls, loader_version).await
            }
            LoaderKind::LiteLoader | LoaderKind::OptiFine => {
                Err(LauncherError::UnsupportedLoader(kind.to_string()))
            }
        }
    }
}
