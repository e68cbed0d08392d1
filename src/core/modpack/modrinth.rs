use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{InstallPlan, ManifestFile, ModpackKind};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{Checksum, HashAlgorithm};
use crate::core::version::GAME_PATCH;

/// `modrinth.index.json` of a Modrinth pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModrinthManifest {
    #[serde(default)]
    pub format_version: u32,
    #[serde(default)]
    pub game: String,
    #[serde(default)]
    pub version_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub files: Vec<ModrinthFile>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModrinthFile {
    pub path: String,
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub downloads: Vec<String>,
    #[serde(default)]
    pub file_size: u64,
}

impl ModrinthFile {
    pub fn is_client_supported(&self) -> bool {
        self.env
            .as_ref()
            .and_then(|env| env.get("client"))
            .map_or(true, |support| support != "unsupported")
    }

    pub fn sha1(&self) -> Option<&str> {
        self.hashes.get("sha1").map(String::as_str)
    }

    /// Strongest usable checksum, SHA-1 preferred as the cache key.
    ///
    /// Digests that are not hex of the right length are ignored.
    pub fn checksum(&self) -> Option<Checksum> {
        self.sha1()
            .and_then(|digest| Checksum::parse(HashAlgorithm::Sha1, digest))
            .or_else(|| {
                self.hashes
                    .get("sha512")
                    .and_then(|digest| Checksum::parse(HashAlgorithm::Sha512, digest))
            })
    }

    pub fn to_manifest_file(&self) -> ManifestFile {
        ManifestFile {
            key: format!("{}#{}", self.path, self.sha1().unwrap_or_default()),
            path: Some(self.path.clone()),
            urls: self.downloads.clone(),
            checksum: self.checksum(),
            client_supported: self.is_client_supported(),
        }
    }
}

/// Map a Modrinth dependency key to a builder component.
pub fn map_dependency(key: &str) -> Option<&'static str> {
    match key {
        "minecraft" => Some(GAME_PATCH),
        "forge" => Some("forge"),
        "neoforge" => Some("neoforge"),
        "fabric-loader" => Some("fabric"),
        "quilt-loader" => Some("quilt"),
        _ => None,
    }
}

impl InstallPlan for ModrinthManifest {
    fn kind(&self) -> ModpackKind {
        ModpackKind::Modrinth
    }

    fn pack_name(&self) -> &str {
        &self.name
    }

    fn pack_version(&self) -> &str {
        &self.version_id
    }

    fn loader_declarations(&self) -> LauncherResult<Vec<(String, String)>> {
        if !self.dependencies.contains_key("minecraft") {
            return Err(LauncherError::MalformedModpack(
                "Modrinth index declares no minecraft dependency".into(),
            ));
        }
        self.dependencies
            .iter()
            .map(|(key, version)| {
                map_dependency(key)
                    .map(|component| (component.to_string(), version.clone()))
                    .ok_or_else(|| LauncherError::UnsupportedLoader(key.clone()))
            })
            .collect()
    }

    fn file_list(&self) -> Vec<ManifestFile> {
        self.files.iter().map(ModrinthFile::to_manifest_file).collect()
    }

    fn overrides_subpaths(&self) -> Vec<String> {
        vec!["client-overrides".into(), "overrides".into()]
    }
}
