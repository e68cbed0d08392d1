use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::curse::{CurseFile, CURSE_CDN};
use super::{InstallPlan, ManifestFile, ModpackKind};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{Checksum, HashAlgorithm};
use crate::core::loaders::LoaderKind;
use crate::core::version::{Library, VersionPatch, GAME_PATCH};

/// Patch id holding the libraries an mcbbs pack declares.
pub const MCBBS_PATCH: &str = "mcbbs";

/// `mcbbs.packmeta` of an mcbbs pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McbbsManifest {
    #[serde(default)]
    pub manifest_type: String,
    #[serde(default)]
    pub manifest_version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_api: Option<String>,
    #[serde(default)]
    pub addons: Vec<McbbsAddon>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub files: Vec<McbbsFile>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McbbsAddon {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McbbsFile {
    /// A file shipped by the pack's own file server.
    Addon {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
        #[serde(default)]
        force: bool,
    },
    Curse(CurseFile),
}

impl McbbsManifest {
    fn manifest_file(&self, file: &McbbsFile) -> ManifestFile {
        match file {
            McbbsFile::Addon { path, hash, .. } => ManifestFile {
                key: path.clone(),
                path: Some(path.clone()),
                urls: self
                    .file_api
                    .as_deref()
                    .filter(|api| !api.is_empty())
                    .map(|api| format!("{}/overrides/{}", api.trim_end_matches('/'), path))
                    .into_iter()
                    .collect(),
                checksum: hash
                    .as_deref()
                    .and_then(|digest| Checksum::parse(HashAlgorithm::Sha1, digest)),
                client_supported: true,
            },
            McbbsFile::Curse(file) => file.to_manifest_file(),
        }
    }

    /// The `mcbbs` version patch carrying the declared libraries.
    pub fn patch(&self) -> VersionPatch {
        let mut patch = VersionPatch::new(MCBBS_PATCH, None);
        patch.libraries = self.libraries.clone();
        patch
    }
}

impl InstallPlan for McbbsManifest {
    fn kind(&self) -> ModpackKind {
        ModpackKind::Mcbbs
    }

    fn pack_name(&self) -> &str {
        &self.name
    }

    fn pack_version(&self) -> &str {
        &self.version
    }

    /// Addons name the game and loaders; anything unrecognised is skipped.
    fn loader_declarations(&self) -> LauncherResult<Vec<(String, String)>> {
        let mut components = Vec::new();
        for addon in &self.addons {
            if addon.id == GAME_PATCH || LoaderKind::from_id(&addon.id).is_some() {
                components.push((addon.id.clone(), addon.version.clone()));
            } else {
                debug!("Ignoring mcbbs addon {}", addon.id);
            }
        }
        if !components.iter().any(|(id, _)| id == GAME_PATCH) {
            return Err(LauncherError::MalformedModpack(
                "mcbbs pack declares no game addon".into(),
            ));
        }
        Ok(components)
    }

    fn file_list(&self) -> Vec<ManifestFile> {
        self.files.iter().map(|file| self.manifest_file(file)).collect()
    }

    fn overrides_subpaths(&self) -> Vec<String> {
        vec!["overrides".into()]
    }
}
