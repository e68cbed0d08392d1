use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::archive::ModpackArchive;
use super::{InstallPlan, ManifestFile, ModpackKind};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::{Library, VersionPatch, GAME_PATCH};

const INSTANCE_CONFIG: &str = "instance.cfg";
const PACK_FILE: &str = "mmc-pack.json";

/// Priority of instance patches: above the game, below loaders.
const INSTANCE_PATCH_PRIORITY: i32 = 1;

/// A MultiMC instance export: `instance.cfg`, `mmc-pack.json`, and the
/// game directory next to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiMcManifest {
    /// Archive directory holding `instance.cfg`; empty at the root.
    pub root: String,
    /// `.minecraft` or `minecraft`.
    pub game_directory: String,
    pub config: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack: Option<MultiMcPack>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiMcPack {
    #[serde(default)]
    pub format_version: u32,
    #[serde(default)]
    pub components: Vec<MultiMcComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiMcComponent {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A file under `patches/`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstancePatch {
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    main_class: Option<String>,
    #[serde(default)]
    libraries: Vec<Library>,
    #[serde(rename = "+libraries", default)]
    extra_libraries: Vec<Library>,
    #[serde(rename = "+tweakers", default)]
    tweakers: Vec<String>,
    #[serde(default)]
    order: Option<i32>,
}

/// Builder component for a MultiMC component uid.
pub fn map_component(uid: &str) -> Option<&'static str> {
    match uid {
        "net.minecraft" => Some(GAME_PATCH),
        "net.minecraftforge" => Some("forge"),
        "net.neoforged" => Some("neoforge"),
        "net.fabricmc.fabric-loader" => Some("fabric"),
        "net.quiltmc.quilt-loader" => Some("quilt"),
        "com.mumfrey.liteloader" => Some("liteloader"),
        _ => None,
    }
}

/// `key=value` lines; section headers and comments are skipped.
pub fn parse_instance_config(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('[') && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

fn join_entry(root: &str, name: &str) -> String {
    if root.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", root, name)
    }
}

impl MultiMcManifest {
    /// Locate `instance.cfg` at the archive root or one directory down.
    ///
    /// Returns `None` when the archive is not a MultiMC export.
    pub fn read(archive: &ModpackArchive) -> LauncherResult<Option<(Self, String)>> {
        let names = archive.entry_names()?;
        let root = names.iter().find_map(|name| {
            let dir = name.strip_suffix(INSTANCE_CONFIG)?;
            match dir.strip_suffix('/') {
                None if dir.is_empty() => Some(String::new()),
                Some(parent) if !parent.is_empty() && !parent.contains('/') => Some(parent.to_string()),
                _ => None,
            }
        });
        let Some(root) = root else {
            return Ok(None);
        };

        let raw = archive
            .read_text(&join_entry(&root, INSTANCE_CONFIG))?
            .unwrap_or_default();
        let config = parse_instance_config(&raw);

        let pack = match archive.read_text(&join_entry(&root, PACK_FILE))? {
            Some(text) => Some(
                serde_json::from_str(&text)
                    .map_err(|e| LauncherError::MalformedModpack(format!("{}: {}", PACK_FILE, e)))?,
            ),
            None => None,
        };

        let game_directory = if archive.has_subtree(&join_entry(&root, ".minecraft"))? {
            ".minecraft"
        } else {
            "minecraft"
        };

        Ok(Some((
            Self {
                root,
                game_directory: game_directory.to_string(),
                config,
                pack,
            },
            raw,
        )))
    }

    fn entry(&self, name: &str) -> String {
        join_entry(&self.root, name)
    }

    /// `patches/*.json` as version patches. A malformed patch is fatal.
    pub fn instance_patches(&self, archive: &ModpackArchive) -> LauncherResult<Vec<VersionPatch>> {
        let dir = self.entry("patches");
        let mut patches = Vec::new();
        for relative in archive.list_subtree(&dir)? {
            let Some(stem) = relative.strip_suffix(".json") else {
                continue;
            };
            if relative.contains('/') {
                continue;
            }
            let entry = join_entry(&dir, &relative);
            let text = archive.read_text(&entry)?.unwrap_or_default();
            let parsed: InstancePatch = serde_json::from_str(&text)
                .map_err(|e| LauncherError::MalformedModpack(format!("{}: {}", entry, e)))?;

            let id = parsed.uid.clone().unwrap_or_else(|| stem.to_string());
            debug!("MultiMC patch {} ({})", id, parsed.name.as_deref().unwrap_or("unnamed"));

            let mut patch = VersionPatch::new(id, parsed.version);
            patch.priority = parsed.order.unwrap_or(INSTANCE_PATCH_PRIORITY);
            patch.main_class = parsed.main_class;
            patch.libraries = parsed.libraries;
            patch.libraries.extend(parsed.extra_libraries);
            patch.game_arguments = parsed
                .tweakers
                .into_iter()
                .flat_map(|tweaker| ["--tweakClass".to_string(), tweaker])
                .collect();
            patches.push(patch);
        }
        Ok(patches)
    }

    /// Archive trees copied under the version root.
    pub fn version_trees(&self) -> Vec<(String, &'static str)> {
        vec![
            (self.entry("libraries"), "libraries"),
            (self.entry("jarmods"), "jarmods"),
        ]
    }
}

/// Libraries a MultiMC patch ships inside the archive rather than online.
pub fn is_local_library(library: &Library) -> bool {
    library
        .extra
        .get("MMC-hint")
        .and_then(Value::as_str)
        .is_some_and(|hint| hint == "local")
}

impl InstallPlan for MultiMcManifest {
    fn kind(&self) -> ModpackKind {
        ModpackKind::MultiMc
    }

    fn pack_name(&self) -> &str {
        self.config.get("name").map(String::as_str).unwrap_or_default()
    }

    fn pack_version(&self) -> &str {
        self.config
            .get("ManagedPackVersionName")
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn loader_declarations(&self) -> LauncherResult<Vec<(String, String)>> {
        let mut components = Vec::new();
        match &self.pack {
            Some(pack) => {
                for component in &pack.components {
                    let Some(id) = map_component(&component.uid) else {
                        debug!("Ignoring MultiMC component {}", component.uid);
                        continue;
                    };
                    let version = component
                        .version
                        .clone()
                        .or_else(|| component.cached_version.clone())
                        .ok_or_else(|| {
                            LauncherError::MalformedModpack(format!(
                                "Component {} has no version",
                                component.uid
                            ))
                        })?;
                    components.push((id.to_string(), version));
                }
            }
            None => {
                if let Some(game) = self.config.get("IntendedVersion") {
                    components.push((GAME_PATCH.to_string(), game.clone()));
                }
            }
        }

        if !components.iter().any(|(id, _)| id == GAME_PATCH) {
            return Err(LauncherError::MalformedModpack(
                "MultiMC instance declares no game version".into(),
            ));
        }
        Ok(components)
    }

    fn file_list(&self) -> Vec<ManifestFile> {
        Vec::new()
    }

    fn overrides_subpaths(&self) -> Vec<String> {
        vec![self.entry(&self.game_directory)]
    }
}
