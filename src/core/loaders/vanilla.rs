use tracing::info;

use crate::core::downloader::Downloader;
use crate::core::error::LauncherResult;
use crate::core::version::{VersionDescriptor, VersionManifest};

/// Look `game_version` up in the manifest and fetch its descriptor.
pub async fn fetch_game_descriptor(
    downloader: &Downloader,
    manifest_url: &str,
    game_version: &str,
) -> LauncherResult<VersionDescriptor> {
    let manifest = VersionManifest::fetch(downloader, manifest_url).await?;
    let entry = manifest.find_version(game_version)?;

    let descriptor: VersionDescriptor = downloader.get_json(&entry.url).await?;
    info!(
        "Resolved game {} ({} libraries)",
        game_version,
        descriptor.libraries.len()
    );
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_through_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "versions": [{
                    "id": "1.20.1",
                    "type": "release",
                    "url": format!("{}/1.20.1.json", server.uri())
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.20.1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1.20.1",
                "mainClass": "net.minecraft.client.main.Main",
                "libraries": [{ "name": "com.mojang:brigadier:1.1.8" }]
            })))
            .mount(&server)
            .await;

        let downloader = Downloader::new(reqwest::Client::new());
        let descriptor = fetch_game_descriptor(
            &downloader,
            &format!("{}/manifest.json", server.uri()),
            "1.20.1",
        )
        .await
        .unwrap();

        assert_eq!(descriptor.id, "1.20.1");
        assert_eq!(descriptor.libraries.len(), 1);

        let missing = fetch_game_descriptor(
            &downloader,
            &format!("{}/manifest.json", server.uri()),
            "0.0.1",
        )
        .await;
        assert!(missing.is_err());
    }
}
