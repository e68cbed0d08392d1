use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{InstallPlan, ManifestFile, ModpackKind};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::GAME_PATCH;

pub const MANIFEST_TYPE: &str = "minecraftModpack";

/// CDN serving Curse files by id and name.
pub const CURSE_CDN: &str = "https://edge.forgecdn.net/files";

fn default_overrides() -> String {
    "overrides".into()
}

/// `manifest.json` of a Curse pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurseManifest {
    #[serde(default)]
    pub manifest_type: String,
    #[serde(default)]
    pub manifest_version: u32,
    pub minecraft: CurseMinecraft,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_overrides")]
    pub overrides: String,
    #[serde(default)]
    pub files: Vec<CurseFile>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurseMinecraft {
    pub version: String,
    #[serde(default)]
    pub mod_loaders: Vec<CurseModLoader>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurseModLoader {
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurseFile {
    #[serde(rename = "projectID")]
    pub project_id: u64,
    #[serde(rename = "fileID")]
    pub file_id: u64,
    #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl CurseFile {
    pub fn key(&self) -> String {
        format!("{}:{}", self.project_id, self.file_id)
    }

    fn name(&self) -> Option<&str> {
        self.file_name.as_deref().filter(|n| !n.trim().is_empty())
    }

    /// Where the file is fetched from: the declared URL, else the CDN path
    /// derived from its id and name.
    pub fn download_url(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        let name = self.name()?;
        Some(format!(
            "{}/{}/{}/{}",
            CURSE_CDN,
            self.file_id / 1000,
            self.file_id % 1000,
            name
        ))
    }

    pub fn to_manifest_file(&self) -> ManifestFile {
        ManifestFile {
            key: self.key(),
            path: self.name().map(|name| format!("mods/{}", name)),
            urls: self.download_url().into_iter().collect(),
            checksum: None,
            client_supported: true,
        }
    }
}

/// Map a Curse loader id such as `forge-47.2.0` to a builder component.
pub fn map_loader_id(id: &str) -> Option<(String, String)> {
    const PREFIXES: [(&str, &str); 4] = [
        ("neoforge-", "neoforge"),
        ("forge-", "forge"),
        ("fabric-", "fabric"),
        ("quilt-", "quilt"),
    ];
    PREFIXES.iter().find_map(|(prefix, component)| {
        id.strip_prefix(prefix)
            .filter(|version| !version.is_empty())
            .map(|version| (component.to_string(), version.to_string()))
    })
}

impl InstallPlan for CurseManifest {
    fn kind(&self) -> ModpackKind {
        ModpackKind::Curse
    }

    fn pack_name(&self) -> &str {
        &self.name
    }

    fn pack_version(&self) -> &str {
        &self.version
    }

    fn loader_declarations(&self) -> LauncherResult<Vec<(String, String)>> {
        if self.minecraft.version.trim().is_empty() {
            return Err(LauncherError::MalformedModpack(
                "Curse manifest declares no game version".into(),
            ));
        }
        let mut components = vec![(GAME_PATCH.to_string(), self.minecraft.version.clone())];
        for loader in &self.minecraft.mod_loaders {
            match map_loader_id(&loader.id) {
                Some(component) => components.push(component),
                None => debug!("Ignoring Curse mod loader {}", loader.id),
            }
        }
        Ok(components)
    }

    fn file_list(&self) -> Vec<ManifestFile> {
        self.files.iter().map(CurseFile::to_manifest_file).collect()
    }

    fn overrides_subpaths(&self) -> Vec<String> {
        vec![self.overrides.clone()]
    }
}
