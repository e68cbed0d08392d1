use std::io::{Cursor, Read, Seek};

use serde::Deserialize;
use tracing::{debug, info};

use super::LoaderKind;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::{Library, VersionPatch};

/// Subset of the `version.json` embedded in Forge/NeoForge installers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallerVersion {
    main_class: String,
    #[serde(default)]
    libraries: Vec<Library>,
    #[serde(default)]
    arguments: Option<InstallerArguments>,
    /// Pre-1.13 single string of game arguments.
    #[serde(default)]
    minecraft_arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstallerArguments {
    #[serde(default)]
    game: Vec<serde_json::Value>,
}

/// Candidate installer locations, newest naming scheme first.
pub fn installer_urls(kind: LoaderKind, maven: &str, game_version: &str, loader_version: &str) -> Vec<String> {
    let maven = maven.trim_end_matches('/');
    let qualified = if loader_version.starts_with(&format!("{}-", game_version)) {
        loader_version.to_string()
    } else {
        format!("{}-{}", game_version, loader_version)
    };

    match kind {
        LoaderKind::NeoForge => vec![
            format!(
                "{}/net/neoforged/neoforge/{v}/neoforge-{v}-installer.jar",
                maven,
                v = loader_version
            ),
            format!(
                "{}/net/neoforged/forge/{v}/forge-{v}-installer.jar",
                maven,
                v = qualified
            ),
        ],
        _ => vec![format!(
            "{}/net/minecraftforge/forge/{v}/forge-{v}-installer.jar",
            maven,
            v = qualified
        )],
    }
}

/// Download the installer from the first URL that answers and read its
/// version descriptor into a patch.
///
/// Install processors are not executed.
pub async fn installer_patch(
    downloader: &Downloader,
    kind: LoaderKind,
    urls: &[String],
    loader_version: &str,
) -> LauncherResult<VersionPatch> {
    let mut last_error = None;
    for url in urls {
        match downloader.get_bytes(url).await {
            Ok(bytes) => {
                let loader_version = loader_version.to_string();
                let patch = tokio::task::spawn_blocking(move || {
                    parse_installer(Cursor::new(bytes), kind, &loader_version)
                })
                .await
                .map_err(|e| LauncherError::Loader(format!("Installer parsing aborted: {}", e)))??;
                info!("Resolved {} {} from {}", kind, patch.version.as_deref().unwrap_or("?"), url);
                return Ok(patch);
            }
            Err(e) => {
                debug!("No {} installer at {}: {}", kind, url, e);
                last_error = Some(e);
            }
        }
    }

    Err(LauncherError::Loader(format!(
        "No {} installer found for {}: {}",
        kind,
        loader_version,
        last_error.map(|e| e.to_string()).unwrap_or_else(|| "no candidates".into())
    )))
}

fn read_entry<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> LauncherResult<Option<serde_json::Value>> {
    match archive.by_name(name) {
        Ok(file) => Ok(Some(serde_json::from_reader(file)?)),
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_installer<R: Read + Seek>(reader: R, kind: LoaderKind, loader_version: &str) -> LauncherResult<VersionPatch> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let profile = read_entry(&mut archive, "install_profile.json")?;

    let version_value = match read_entry(&mut archive, "version.json")? {
        Some(v) => v,
        // Legacy installers embed the descriptor in the profile.
        None => profile
            .as_ref()
            .and_then(|p| p.get("versionInfo"))
            .cloned()
            .ok_or_else(|| LauncherError::Loader("Installer has no version.json".into()))?,
    };
    let version: InstallerVersion = serde_json::from_value(version_value)?;

    let processors = profile
        .as_ref()
        .and_then(|p| p.get("processors"))
        .and_then(|p| p.as_array())
        .map_or(0, Vec::len);
    if processors > 0 {
        debug!("Skipping {} install processors of {} {}", processors, kind, loader_version);
    }

    let mut patch = VersionPatch::new(kind.id(), Some(loader_version.to_string()));
    patch.priority = kind.priority();
    patch.main_class = Some(version.main_class);
    patch.libraries = version.libraries;
    patch.game_arguments = match (version.arguments, version.minecraft_arguments) {
        (Some(args), _) => args
            .game
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        (None, Some(legacy)) => tweak_arguments(&legacy),
        (None, None) => Vec::new(),
    };
    Ok(patch)
}

/// Keep only `--tweakClass <class>` pairs of a legacy argument string.
fn tweak_arguments(legacy: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut tokens = legacy.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "--tweakClass" {
            if let Some(class) = tokens.next() {
                out.push(token.to_string());
                out.push(class.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn installer(entries: &[(&str, serde_json::Value)]) -> Cursor<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, value) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(value.to_string().as_bytes()).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn forge_urls_qualify_loader_version() {
        assert_eq!(
            installer_urls(LoaderKind::Forge, "https://maven.minecraftforge.net/", "1.20.1", "47.2.0"),
            vec!["https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"]
        );
        assert_eq!(
            installer_urls(LoaderKind::Forge, "m", "1.20.1", "1.20.1-47.2.0")[0],
            "m/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"
        );
        assert_eq!(installer_urls(LoaderKind::NeoForge, "m", "1.20.1", "47.1.79").len(), 2);
    }

    #[test]
    fn modern_installer_uses_version_json() {
        let reader = installer(&[
            ("install_profile.json", serde_json::json!({ "processors": [{ "jar": "a:b:1" }] })),
            (
                "version.json",
                serde_json::json!({
                    "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
                    "libraries": [{ "name": "net.minecraftforge:fmlloader:1.20.1-47.2.0" }],
                    "arguments": { "game": ["--launchTarget", "forgeclient"] }
                }),
            ),
        ]);

        let patch = parse_installer(reader, LoaderKind::Forge, "47.2.0").unwrap();
        assert_eq!(patch.id, "forge");
        assert_eq!(patch.libraries.len(), 1);
        assert_eq!(patch.game_arguments, vec!["--launchTarget", "forgeclient"]);
    }

    #[test]
    fn legacy_installer_reads_version_info() {
        let reader = installer(&[(
            "install_profile.json",
            serde_json::json!({
                "versionInfo": {
                    "mainClass": "net.minecraft.launchwrapper.Launch",
                    "minecraftArguments": "--username ${auth_player_name} --tweakClass net.minecraftforge.fml.common.launcher.FMLTweaker",
                    "libraries": [{ "name": "net.minecraft:launchwrapper:1.12", "checksums": ["abc"] }]
                }
            }),
        )]);

        let patch = parse_installer(reader, LoaderKind::Forge, "14.23.5.2860").unwrap();
        assert_eq!(
            patch.game_arguments,
            vec!["--tweakClass", "net.minecraftforge.fml.common.launcher.FMLTweaker"]
        );
        assert_eq!(patch.libraries[0].checksums, vec!["abc"]);
    }

    #[test]
    fn installer_without_descriptor_is_rejected() {
        let reader = installer(&[("install_profile.json", serde_json::json!({}))]);
        assert!(matches!(
            parse_installer(reader, LoaderKind::NeoForge, "20.4.1"),
            Err(LauncherError::Loader(_))
        ));
    }
}
