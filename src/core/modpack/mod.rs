// ─── Modpacks ───
// Format manifests, the generic installer written against them, and the
// steps it schedules: overrides, instance record, completion.

pub mod archive;
pub mod completion;
pub mod configuration;
pub mod curse;
pub mod installer;
pub mod instance;
pub mod mcbbs;
pub mod modrinth;
pub mod multimc;
pub mod overrides;


use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::Checksum;
use crate::core::version::VersionPatch;

pub use archive::ModpackArchive;
pub use completion::CompletionTask;
pub use configuration::{ModpackConfiguration, OverrideRecord};
pub use curse::CurseManifest;
pub use installer::{rollback_decision, InstallOutcome, ModpackInstaller, Rollback};
pub use instance::InstanceWriterTask;
pub use mcbbs::McbbsManifest;
pub use modrinth::ModrinthManifest;
pub use multimc::MultiMcManifest;
pub use overrides::OverridesTask;

/// The closed set of supported pack formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModpackKind {
    Curse,
    Modrinth,
    MultiMc,
    Mcbbs,
}

impl ModpackKind {
    /// Provider tag stored in `modpack.json`.
    pub fn tag(self) -> &'static str {
        match self {
            ModpackKind::Curse => "Curse",
            ModpackKind::Modrinth => "Modrinth",
            ModpackKind::MultiMc => "MultiMC",
            ModpackKind::Mcbbs => "Mcbbs",
        }
    }

    /// Name of the manifest copy kept next to the version.
    pub fn manifest_file_name(self) -> &'static str {
        match self {
            ModpackKind::Curse => "manifest.json",
            ModpackKind::Modrinth => "modrinth.index.json",
            ModpackKind::MultiMc => "instance.cfg",
            ModpackKind::Mcbbs => "mcbbs.packmeta",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        [
            ModpackKind::Curse,
            ModpackKind::Modrinth,
            ModpackKind::MultiMc,
            ModpackKind::Mcbbs,
        ]
        .into_iter()
        .find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for ModpackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One file a manifest references.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestFile {
    /// Identity used to diff two installs of the same pack.
    pub key: String,
    /// Location relative to the run directory; `None` when the manifest
    /// does not name the file.
    pub path: Option<String>,
    pub urls: Vec<String>,
    pub checksum: Option<Checksum>,
    /// `false` for entries the client must never fetch.
    pub client_supported: bool,
}

/// What every format can tell the generic installer.
pub trait InstallPlan {
    fn kind(&self) -> ModpackKind;

    fn pack_name(&self) -> &str;

    fn pack_version(&self) -> &str;

    /// Components for the base version as `(builder id, version)` pairs,
    /// the game itself included as `game`.
    fn loader_declarations(&self) -> LauncherResult<Vec<(String, String)>>;

    fn file_list(&self) -> Vec<ManifestFile>;

    /// Archive sub-trees laid onto the run directory, highest precedence first.
    fn overrides_subpaths(&self) -> Vec<String>;
}

/// A parsed pack manifest of any supported format.
#[derive(Debug, Clone)]
pub enum ModpackManifest {
    Curse(CurseManifest),
    Modrinth(ModrinthManifest),
    MultiMc(MultiMcManifest),
    Mcbbs(McbbsManifest),
}

impl ModpackManifest {
    fn plan(&self) -> &dyn InstallPlan {
        match self {
            ModpackManifest::Curse(m) => m,
            ModpackManifest::Modrinth(m) => m,
            ModpackManifest::MultiMc(m) => m,
            ModpackManifest::Mcbbs(m) => m,
        }
    }

    /// Detect the format of `archive` and parse its manifest.
    ///
    /// Returns the manifest and its verbatim text.
    pub fn read(archive: &ModpackArchive) -> LauncherResult<(Self, String)> {
        if let Some(raw) = archive.read_text("modrinth.index.json")? {
            let manifest = serde_json::from_str(&raw).map_err(|e| {
                LauncherError::MalformedModpack(format!("modrinth.index.json: {}", e))
            })?;
            return Ok((ModpackManifest::Modrinth(manifest), raw));
        }

        // mcbbs packs usually carry a Curse-style manifest.json as well.
        if let Some(raw) = archive.read_text("mcbbs.packmeta")? {
            let manifest = serde_json::from_str(&raw)
                .map_err(|e| LauncherError::MalformedModpack(format!("mcbbs.packmeta: {}", e)))?;
            return Ok((ModpackManifest::Mcbbs(manifest), raw));
        }

        if let Some(raw) = archive.read_text("manifest.json")? {
            let manifest: CurseManifest = serde_json::from_str(&raw)
                .map_err(|e| LauncherError::MalformedModpack(format!("manifest.json: {}", e)))?;
            if manifest.manifest_type != curse::MANIFEST_TYPE {
                return Err(LauncherError::MalformedModpack(format!(
                    "Unexpected manifest type {:?}",
                    manifest.manifest_type
                )));
            }
            return Ok((ModpackManifest::Curse(manifest), raw));
        }

        if let Some((manifest, raw)) = MultiMcManifest::read(archive)? {
            return Ok((ModpackManifest::MultiMc(manifest), raw));
        }

        debug!("No known manifest in {:?}", archive.path());
        Err(LauncherError::MalformedModpack(format!(
            "{} is not a supported modpack",
            archive.path().display()
        )))
    }

    /// Rebuild a manifest from the snapshot stored in `modpack.json`.
    pub fn from_snapshot(kind: ModpackKind, snapshot: serde_json::Value) -> LauncherResult<Self> {
        Ok(match kind {
            ModpackKind::Curse => ModpackManifest::Curse(serde_json::from_value(snapshot)?),
            ModpackKind::Modrinth => ModpackManifest::Modrinth(serde_json::from_value(snapshot)?),
            ModpackKind::MultiMc => ModpackManifest::MultiMc(serde_json::from_value(snapshot)?),
            ModpackKind::Mcbbs => ModpackManifest::Mcbbs(serde_json::from_value(snapshot)?),
        })
    }

    pub fn snapshot(&self) -> LauncherResult<serde_json::Value> {
        Ok(match self {
            ModpackManifest::Curse(m) => serde_json::to_value(m)?,
            ModpackManifest::Modrinth(m) => serde_json::to_value(m)?,
            ModpackManifest::MultiMc(m) => serde_json::to_value(m)?,
            ModpackManifest::Mcbbs(m) => serde_json::to_value(m)?,
        })
    }

    /// Version patches the format contributes besides its loaders.
    pub fn version_patches(&self, archive: &ModpackArchive) -> LauncherResult<Vec<VersionPatch>> {
        match self {
            ModpackManifest::MultiMc(m) => m.instance_patches(archive),
            ModpackManifest::Mcbbs(m) => Ok(vec![m.patch()]),
            _ => Ok(Vec::new()),
        }
    }

    /// Archive sub-trees copied verbatim under the version root.
    pub fn version_trees(&self) -> Vec<(String, &'static str)> {
        match self {
            ModpackManifest::MultiMc(m) => m.version_trees(),
            _ => Vec::new(),
        }
    }
}

impl InstallPlan for ModpackManifest {
    fn kind(&self) -> ModpackKind {
        self.plan().kind()
    }

    fn pack_name(&self) -> &str {
        self.plan().pack_name()
    }

    fn pack_version(&self) -> &str {
        self.plan().pack_version()
    }

    fn loader_declarations(&self) -> LauncherResult<Vec<(String, String)>> {
        self.plan().loader_declarations()
    }

    fn file_list(&self) -> Vec<ManifestFile> {
        self.plan().file_list()
    }

    fn overrides_subpaths(&self) -> Vec<String> {
        self.plan().overrides_subpaths()
    }
}

/// An opened pack: where it lives, what it declares, and the manifest text.
#[derive(Debug, Clone)]
pub struct LoadedModpack {
    pub archive: ModpackArchive,
    pub manifest: ModpackManifest,
    pub raw_manifest: String,
}

impl LoadedModpack {
    pub fn open(path: &Path) -> LauncherResult<Self> {
        let archive = ModpackArchive::open(path)?;
        let (manifest, raw_manifest) = ModpackManifest::read(&archive)?;
        Ok(Self {
            archive,
            manifest,
            raw_manifest,
        })
    }
}
