// ─── Version Descriptor ───
// The persisted `<name>.json` of an installed version, its loader patches
// and the OS rules deciding which libraries apply.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::LauncherResult;
use crate::core::integrity::Checksum;
use crate::core::maven::{MavenCoordinate, MOJANG_LIBRARIES};

/// Patch id carrying the base game version.
pub const GAME_PATCH: &str = "game";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<VersionPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<VersionDownloads>,
    /// Everything else (arguments, asset index, ...) is kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named layer on top of the base descriptor: a loader, `mcbbs`, or a
/// MultiMC component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub game_arguments: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VersionPatch {
    pub fn new(id: impl Into<String>, version: Option<String>) -> Self {
        Self {
            id: id.into(),
            version,
            priority: 0,
            main_class: None,
            libraries: Vec::new(),
            game_arguments: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<DownloadArtifact>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadArtifact {
    pub sha1: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}

impl VersionDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inherits_from: None,
            main_class: None,
            libraries: Vec::new(),
            patches: Vec::new(),
            downloads: None,
            extra: Map::new(),
        }
    }

    pub fn patch(&self, id: &str) -> Option<&VersionPatch> {
        self.patches.iter().find(|p| p.id == id)
    }

    /// Insert or replace the patch with the same id, keeping priority order.
    pub fn set_patch(&mut self, patch: VersionPatch) {
        self.patches.retain(|p| p.id != patch.id);
        self.patches.push(patch);
        self.patches.sort_by_key(|p| p.priority);
    }

    pub fn remove_patch(&mut self, id: &str) -> Option<VersionPatch> {
        let index = self.patches.iter().position(|p| p.id == id)?;
        Some(self.patches.remove(index))
    }

    /// Game version from the `game` patch, falling back to the id.
    pub fn game_version(&self) -> &str {
        self.patch(GAME_PATCH)
            .and_then(|p| p.version.as_deref())
            .unwrap_or(&self.id)
    }

    /// Main class of the highest-priority patch declaring one.
    pub fn effective_main_class(&self) -> Option<&str> {
        self.patches
            .iter()
            .rev()
            .find_map(|p| p.main_class.as_deref())
            .or(self.main_class.as_deref())
    }

    /// Base libraries plus every patch's, with later layers replacing an
    /// earlier library of the same group, artifact and classifier.
    pub fn resolved_libraries(&self) -> Vec<Library> {
        let mut resolved: Vec<Library> = Vec::new();
        let layers = std::iter::once(&self.libraries).chain(self.patches.iter().map(|p| &p.libraries));
        for library in layers.flatten() {
            let key = library.identity_key();
            match resolved.iter_mut().find(|l| l.identity_key() == key) {
                Some(existing) => *existing = library.clone(),
                None => resolved.push(library.clone()),
            }
        }
        resolved
    }

    pub fn client_download(&self) -> Option<&DownloadArtifact> {
        self.downloads.as_ref()?.client.as_ref()
    }
}

// ─── Library Entry with Rules ───

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    /// Base repository URL (Fabric/Quilt style).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<LibraryRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natives: Option<BTreeMap<String, String>>,
    /// Alternative SHA-1 digests, any of which is acceptable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checksums: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<BTreeMap<String, LibraryArtifact>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// One concrete file a library contributes.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryFile {
    pub coordinate: MavenCoordinate,
    /// Relative to the libraries root.
    pub path: PathBuf,
    pub urls: Vec<String>,
    /// `false` when `urls` holds only the default repository guess.
    pub declared_url: bool,
    pub checksum: Option<Checksum>,
    pub alternates: Vec<Checksum>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            downloads: None,
            rules: None,
            natives: None,
            checksums: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn coordinate(&self) -> LauncherResult<MavenCoordinate> {
        MavenCoordinate::parse(&self.name)
    }

    fn identity_key(&self) -> String {
        match self.coordinate() {
            Ok(c) => format!("{}:{}:{}", c.group, c.artifact, c.classifier.unwrap_or_default()),
            Err(_) => self.name.clone(),
        }
    }

    pub fn is_optifine(&self) -> bool {
        let group = self.name.split(':').next().unwrap_or_default();
        group.eq_ignore_ascii_case("optifine") || group == "net.optifine"
    }

    /// Rules are processed top to bottom starting from "disallowed"; no rules
    /// means allowed.
    pub fn is_allowed_for_current_os(&self) -> bool {
        let rules = match &self.rules {
            Some(r) => r,
            None => return true,
        };

        let current_os = current_os_name();
        let mut allowed = false;

        for rule in rules {
            let os_matches = match rule.os.as_ref().and_then(|os| os.name.as_deref()) {
                None => true,
                Some(name) => name == current_os,
            };

            if os_matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }

        allowed
    }

    pub fn native_classifier_for_current_os(&self) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let arch = if cfg!(target_pointer_width = "64") {
            "64"
        } else {
            "32"
        };
        natives
            .get(current_os_name())
            .map(|c| c.replace("${arch}", arch))
    }

    /// Files to fetch for the current OS: the native jar for native
    /// libraries, the main artifact otherwise.
    pub fn files(&self) -> LauncherResult<Vec<LibraryFile>> {
        let coordinate = self.coordinate()?;

        if self.natives.is_some() {
            let Some(classifier) = self.native_classifier_for_current_os() else {
                return Ok(Vec::new());
            };
            let native = coordinate.with_classifier(&classifier);
            let declared = self
                .downloads
                .as_ref()
                .and_then(|d| d.classifiers.as_ref())
                .and_then(|c| c.get(&classifier));
            return Ok(vec![self.file_for(native, declared)]);
        }

        let declared = self.downloads.as_ref().and_then(|d| d.artifact.as_ref());
        Ok(vec![self.file_for(coordinate, declared)])
    }

    fn file_for(&self, coordinate: MavenCoordinate, declared: Option<&LibraryArtifact>) -> LibraryFile {
        let path = declared
            .and_then(|a| a.path.as_deref())
            .map(PathBuf::from)
            .unwrap_or_else(|| coordinate.relative_path());

        let explicit = declared
            .and_then(|a| a.url.as_deref())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .or_else(|| self.url.as_deref().map(|base| coordinate.url(base)));
        let declared_url = explicit.is_some();
        let urls = vec![explicit.unwrap_or_else(|| coordinate.url(MOJANG_LIBRARIES))];

        LibraryFile {
            checksum: declared.and_then(|a| a.sha1.as_deref()).map(Checksum::sha1),
            alternates: self.checksums.iter().map(Checksum::sha1).collect(),
            coordinate,
            path,
            urls,
            declared_url,
        }
    }
}

/// Mojang name of the running platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_rule(action: RuleAction, os: Option<&str>) -> LibraryRule {
        LibraryRule {
            action,
            os: Some(OsRule {
                name: os.map(str::to_string),
                arch: None,
            }),
        }
    }

    #[test]
    fn no_rules_means_allowed() {
        assert!(Library::new("test:lib:1.0").is_allowed_for_current_os());
    }

    #[test]
    fn allow_only_current_os() {
        let mut lib = Library::new("test:lib:1.0");
        lib.rules = Some(vec![os_rule(RuleAction::Allow, Some(current_os_name()))]);
        assert!(lib.is_allowed_for_current_os());

        lib.rules = Some(vec![os_rule(RuleAction::Allow, Some("amigaos"))]);
        assert!(!lib.is_allowed_for_current_os());
    }

    #[test]
    fn disallow_current_os() {
        let mut lib = Library::new("test:lib:1.0");
        lib.rules = Some(vec![
            LibraryRule {
                action: RuleAction::Allow,
                os: None,
            },
            os_rule(RuleAction::Disallow, Some(current_os_name())),
        ]);
        assert!(!lib.is_allowed_for_current_os());
    }

    #[test]
    fn main_artifact_prefers_declared_download() {
        let lib: Library = serde_json::from_value(serde_json::json!({
            "name": "com.mojang:brigadier:1.0.18",
            "downloads": { "artifact": {
                "path": "com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar",
                "sha1": "C6B7DC51DD44379CC751B7504816006E9BE4B1E6",
                "size": 77392,
                "url": "https://libraries.minecraft.net/com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar"
            }}
        }))
        .unwrap();

        let files = lib.files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].declared_url);
        assert_eq!(
            files[0].checksum.as_ref().map(|c| c.digest.as_str()),
            Some("c6b7dc51dd44379cc751b7504816006e9be4b1e6")
        );
    }

    #[test]
    fn repository_base_builds_url() {
        let mut lib = Library::new("net.fabricmc:fabric-loader:0.15.0");
        lib.url = Some("https://maven.fabricmc.net/".into());
        let files = lib.files().unwrap();
        assert_eq!(
            files[0].urls,
            vec!["https://maven.fabricmc.net/net/fabricmc/fabric-loader/0.15.0/fabric-loader-0.15.0.jar"]
        );
        assert!(files[0].declared_url);
    }

    #[test]
    fn undeclared_url_falls_back_to_mojang() {
        let lib = Library::new("optifine:OptiFine:1.20.1_HD_U_I6");
        let files = lib.files().unwrap();
        assert!(!files[0].declared_url);
        assert!(lib.is_optifine());
    }

    #[test]
    fn natives_only_library_yields_native_jar() {
        let mut natives = BTreeMap::new();
        natives.insert(current_os_name().to_string(), "natives-${arch}".to_string());
        let mut lib = Library::new("org.lwjgl.lwjgl:lwjgl-platform:2.9.4");
        lib.natives = Some(natives);

        let files = lib.files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0]
            .coordinate
            .classifier
            .as_deref()
            .is_some_and(|c| c.starts_with("natives-")));
    }

    #[test]
    fn patches_override_libraries_and_main_class() {
        let mut descriptor = VersionDescriptor::new("pack");
        descriptor.main_class = Some("net.minecraft.client.main.Main".into());
        descriptor.libraries = vec![Library::new("org.ow2.asm:asm:9.5"), Library::new("a:b:1")];

        let mut loader = VersionPatch::new("fabric", Some("0.15.0".into()));
        loader.priority = 30000;
        loader.main_class = Some("net.fabricmc.loader.impl.launch.knot.KnotClient".into());
        loader.libraries = vec![Library::new("org.ow2.asm:asm:9.6")];
        descriptor.set_patch(VersionPatch::new(GAME_PATCH, Some("1.20.1".into())));
        descriptor.set_patch(loader);

        let libs = descriptor.resolved_libraries();
        assert_eq!(libs.len(), 2);
        assert_eq!(libs[0].name, "org.ow2.asm:asm:9.6");
        assert_eq!(
            descriptor.effective_main_class(),
            Some("net.fabricmc.loader.impl.launch.knot.KnotClient")
        );
        assert_eq!(descriptor.game_version(), "1.20.1");
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = serde_json::json!({
            "id": "1.20.1",
            "mainClass": "net.minecraft.client.main.Main",
            "assetIndex": { "id": "5" },
            "libraries": []
        });
        let descriptor: VersionDescriptor = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(back["assetIndex"]["id"], "5");
    }
}
