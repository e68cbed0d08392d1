use serde::Deserialize;
use tracing::info;

use super::LoaderKind;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::{FABRIC_MAVEN, QUILT_MAVEN};
use crate::core::version::{Library, VersionPatch};

pub const FABRIC_META_BASE: &str = "https://meta.fabricmc.net/v2";
pub const QUILT_META_BASE: &str = "https://meta.quiltmc.org/v3";

/// A meta service serving launcher profiles (Fabric and Quilt share the API).
#[derive(Debug, Clone)]
pub struct ProfileSource {
    pub kind: LoaderKind,
    pub meta_base: String,
    pub default_maven: &'static str,
    /// `group:artifact` of the loader jar itself.
    pub loader_artifact: &'static str,
}

impl ProfileSource {
    pub fn fabric(meta_base: &str) -> Self {
        Self {
            kind: LoaderKind::Fabric,
            meta_base: meta_base.trim_end_matches('/').to_string(),
            default_maven: FABRIC_MAVEN,
            loader_artifact: "net.fabricmc:fabric-loader",
        }
    }

    pub fn quilt(meta_base: &str) -> Self {
        Self {
            kind: LoaderKind::Quilt,
            meta_base: meta_base.trim_end_matches('/').to_string(),
            default_maven: QUILT_MAVEN,
            loader_artifact: "org.quiltmc:quilt-loader",
        }
    }

    fn profile_url(&self, game_version: &str, loader_version: &str) -> String {
        format!(
            "{}/versions/loader/{}/{}/profile/json",
            self.meta_base, game_version, loader_version
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoaderProfile {
    main_class: String,
    #[serde(default)]
    libraries: Vec<Library>,
    #[serde(default)]
    arguments: Option<ProfileArguments>,
}

#[derive(Debug, Deserialize)]
struct ProfileArguments {
    #[serde(default)]
    game: Vec<serde_json::Value>,
}

/// Fetch a loader profile and turn it into a version patch.
pub async fn profile_patch(
    downloader: &Downloader,
    source: &ProfileSource,
    game_version: &str,
    loader_version: &str,
) -> LauncherResult<VersionPatch> {
    let url = source.profile_url(game_version, loader_version);
    let profile: LoaderProfile = downloader.get_json(&url).await.map_err(|e| {
        LauncherError::LoaderApi(format!("{} meta failed for {}: {}", source.kind, url, e))
    })?;

    if profile.main_class.is_empty() {
        return Err(LauncherError::LoaderApi(format!(
            "{} profile missing mainClass",
            source.kind
        )));
    }

    let patch = build_patch(source, profile, loader_version);
    info!(
        "Resolved {} {} for {} ({} libraries)",
        source.kind,
        loader_version,
        game_version,
        patch.libraries.len()
    );
    Ok(patch)
}

fn build_patch(source: &ProfileSource, profile: LoaderProfile, loader_version: &str) -> VersionPatch {
    let mut libraries = profile.libraries;
    for library in &mut libraries {
        if library.url.is_none() && library.downloads.is_none() {
            library.url = Some(source.default_maven.to_string());
        }
    }
    ensure_loader_artifact(&mut libraries, source, loader_version);

    let mut patch = VersionPatch::new(source.kind.id(), Some(loader_version.to_string()));
    patch.priority = source.kind.priority();
    patch.main_class = Some(profile.main_class);
    patch.libraries = libraries;
    patch.game_arguments = profile
        .arguments
        .map(|a| {
            a.game
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    patch
}

fn ensure_loader_artifact(libraries: &mut Vec<Library>, source: &ProfileSource, loader_version: &str) {
    let prefix = format!("{}:", source.loader_artifact);
    if libraries.iter().any(|lib| lib.name.starts_with(&prefix)) {
        return;
    }
    let mut loader = Library::new(format!("{}{}", prefix, loader_version));
    loader.url = Some(source.default_maven.to_string());
    libraries.push(loader);
}
