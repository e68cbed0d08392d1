pub mod descriptor;
pub mod manifest;

pub use descriptor::{
    current_os_name, DownloadArtifact, Library, LibraryArtifact, LibraryDownloads, LibraryFile,
    LibraryRule, OsRule, RuleAction, VersionDescriptor, VersionDownloads, VersionPatch, GAME_PATCH,
};
pub use manifest::{VersionEntry, VersionManifest, VERSION_MANIFEST_URL};
