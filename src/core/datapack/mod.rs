// ─── Datapacks ───
// Datapacks of a world: loading a bundle or a world's datapack folder,
// installing into a world, enabling/disabling and deleting packs.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

use crate::core::error::{LauncherError, LauncherResult};

pub const PACK_META: &str = "pack.mcmeta";
pub const DISABLED_SUFFIX: &str = ".disabled";

const BUNDLE_DIR: &str = "datapacks/";
const RESOURCES_ZIP: &str = "resources.zip";

/// Descriptor written into a merged `resources.zip`.
const MERGED_PACK_META: &str = "{\n\t\"pack\": {\n\t\t\"pack_format\": 4,\n\t\t\"description\": \"Modified by packsmith.\"\n\t}\n}\n";

// ── Enabled / disabled ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackState {
    Enabled,
    Disabled,
}

impl PackState {
    /// State encoded in a file name: `<name>.disabled` is disabled.
    pub fn of_path(path: &Path) -> PackState {
        let disabled = path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(DISABLED_SUFFIX))
            .unwrap_or(false);
        if disabled {
            PackState::Disabled
        } else {
            PackState::Enabled
        }
    }

    /// `path` renamed so that it encodes `state`.
    pub fn path_for(path: &Path, state: PackState) -> PathBuf {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return path.to_path_buf();
        };
        let base = name.strip_suffix(DISABLED_SUFFIX).unwrap_or(&name);
        let renamed = match state {
            PackState::Enabled => base.to_string(),
            PackState::Disabled => format!("{}{}", base, DISABLED_SUFFIX),
        };
        path.with_file_name(renamed)
    }

    pub fn is_active(self) -> bool {
        self == PackState::Enabled
    }
}

// ── Packs ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackLayout {
    /// A folder holding `pack.mcmeta`.
    Directory,
    /// A `.zip` file.
    Archive,
}

/// One datapack inside a world or a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Pack {
    pub id: String,
    pub description: String,
    pub layout: PackLayout,
    /// The folder or zip file of the pack, as currently named.
    pub location: PathBuf,
    pub state: PackState,
}

impl Pack {
    /// The file whose name carries the enabled state.
    pub fn state_file(&self) -> PathBuf {
        match self.layout {
            PackLayout::Directory => {
                PackState::path_for(&self.location.join(PACK_META), self.state)
            }
            PackLayout::Archive => self.location.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

#[derive(Deserialize)]
struct PackMeta {
    pack: PackInfo,
}

#[derive(Deserialize)]
struct PackInfo {
    #[serde(default)]
    description: Value,
}

/// Plain text of a description, which may be a string or a text component.
fn description_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts.iter().map(description_text).collect(),
        Value::Object(component) => {
            let mut text = component
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if let Some(extra) = component.get("extra") {
                text.push_str(&description_text(extra));
            }
            text
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_meta(text: &str) -> LauncherResult<String> {
    let meta: PackMeta = serde_json::from_str(text.trim_start_matches('\u{feff}'))?;
    Ok(description_text(&meta.pack.description))
}

fn read_zip_text<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> LauncherResult<Option<String>> {
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(Some(text))
}

/// Id of a zipped pack: the file name without `.disabled` and `.zip`.
fn archive_pack_id(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(DISABLED_SUFFIX)
        .unwrap_or(file_name)
        .strip_suffix(".zip")
}

fn open_zip(path: &Path) -> LauncherResult<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| LauncherError::io(path, e))?;
    Ok(ZipArchive::new(file)?)
}

// ── Datapack ────────────────────────────────────────────

/// A datapack source: a world's `datapacks` folder, a single zipped pack,
/// or a bundle zip holding a `datapacks/` folder.
#[derive(Debug, Clone)]
pub struct Datapack {
    path: PathBuf,
    multiple: bool,
    packs: Vec<Pack>,
}

impl Datapack {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            multiple: false,
            packs: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn packs(&self) -> &[Pack] {
        &self.packs
    }

    pub fn is_bundle(&self) -> bool {
        self.multiple
    }

    pub fn pack(&self, id: &str) -> Option<&Pack> {
        self.packs.iter().find(|pack| pack.id == id)
    }

    /// Read a zip: a `datapacks/` folder makes it a bundle, a root
    /// `pack.mcmeta` a single pack.
    pub fn load_from_zip(&mut self) -> LauncherResult<()> {
        let mut zip = open_zip(&self.path)?;
        let names: Vec<String> = zip.file_names().map(str::to_string).collect();

        if names.iter().any(|name| name.starts_with(BUNDLE_DIR)) {
            self.multiple = true;
            self.packs = self.scan_bundle(&mut zip, &names);
            return Ok(());
        }

        let Some(meta) = read_zip_text(&mut zip, PACK_META)? else {
            return Err(LauncherError::MalformedDatapack(self.path.clone()));
        };
        self.multiple = false;
        self.packs.clear();

        let id = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        match parse_meta(&meta) {
            Ok(description) => self.packs.push(Pack {
                id,
                description,
                layout: PackLayout::Archive,
                location: self.path.clone(),
                state: PackState::of_path(&self.path),
            }),
            Err(e) => warn!("Failed to read datapack {:?}: {}", self.path, e),
        }
        Ok(())
    }

    /// Packs inside a bundle's `datapacks/` folder.
    fn scan_bundle(&self, zip: &mut ZipArchive<File>, names: &[String]) -> Vec<Pack> {
        let mut top_level: BTreeMap<String, bool> = BTreeMap::new();
        for name in names {
            let Some(rest) = name.strip_prefix(BUNDLE_DIR) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) if !dir.is_empty() => {
                    top_level.insert(dir.to_string(), true);
                }
                None if !rest.is_empty() => {
                    top_level.insert(rest.to_string(), false);
                }
                _ => {}
            }
        }

        let mut packs = Vec::new();
        for (entry, is_dir) in top_level {
            let location = self.path.join(BUNDLE_DIR).join(&entry);
            let result = if is_dir {
                self.bundle_directory_pack(zip, &entry, location)
            } else {
                self.bundle_archive_pack(zip, &entry, location)
            };
            match result {
                Ok(Some(pack)) => packs.push(pack),
                Ok(None) => {}
                Err(e) => warn!("Failed to read datapack {} in {:?}: {}", entry, self.path, e),
            }
        }
        packs
    }

    fn bundle_directory_pack(
        &self,
        zip: &mut ZipArchive<File>,
        dir: &str,
        location: PathBuf,
    ) -> LauncherResult<Option<Pack>> {
        let enabled = format!("{}{}/{}", BUNDLE_DIR, dir, PACK_META);
        let disabled = format!("{}{}", enabled, DISABLED_SUFFIX);
        let (text, state) = match read_zip_text(zip, &enabled)? {
            Some(text) => (text, PackState::Enabled),
            None => match read_zip_text(zip, &disabled)? {
                Some(text) => (text, PackState::Disabled),
                None => return Ok(None),
            },
        };
        Ok(Some(Pack {
            id: dir.to_string(),
            description: parse_meta(&text)?,
            layout: PackLayout::Directory,
            location,
            state,
        }))
    }

    fn bundle_archive_pack(
        &self,
        zip: &mut ZipArchive<File>,
        file_name: &str,
        location: PathBuf,
    ) -> LauncherResult<Option<Pack>> {
        let Some(id) = archive_pack_id(file_name) else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        zip.by_name(&format!("{}{}", BUNDLE_DIR, file_name))?
            .read_to_end(&mut bytes)?;
        let mut inner = ZipArchive::new(Cursor::new(bytes))?;
        let Some(text) = read_zip_text(&mut inner, PACK_META)? else {
            return Ok(None);
        };
        Ok(Some(Pack {
            id: id.to_string(),
            description: parse_meta(&text)?,
            layout: PackLayout::Archive,
            state: PackState::of_path(&location),
            location,
        }))
    }

    /// Scan a world's `datapacks` folder. Unreadable packs are logged and
    /// skipped.
    pub fn load_from_dir(&mut self) {
        self.multiple = false;
        self.packs = match scan_directory(&self.path) {
            Ok(packs) => packs,
            Err(e) => {
                warn!("Failed to read datapacks {:?}: {}", self.path, e);
                Vec::new()
            }
        };
    }

    /// Copy this pack or bundle into `world`, replacing packs with the same id.
    pub fn install_to(&self, world: &Path) -> LauncherResult<()> {
        let datapacks = world.join("datapacks");
        let ids: HashSet<&str> = self.packs.iter().map(|pack| pack.id.as_str()).collect();
        remove_colliding(&datapacks, &ids)?;

        if self.multiple {
            self.unpack_bundle(world)?;
            merge_resources(&self.path, &world.join(RESOURCES_ZIP))?;
        } else {
            std::fs::create_dir_all(&datapacks).map_err(|e| LauncherError::io(&datapacks, e))?;
            let file_name = self
                .path
                .file_name()
                .ok_or_else(|| LauncherError::MalformedDatapack(self.path.clone()))?;
            let target = datapacks.join(file_name);
            std::fs::copy(&self.path, &target).map_err(|e| LauncherError::io(&target, e))?;
        }
        info!("Installed {} datapack(s) into {:?}", self.packs.len(), world);
        Ok(())
    }

    /// Every entry except `resources.zip`, replacing existing files.
    fn unpack_bundle(&self, world: &Path) -> LauncherResult<()> {
        let mut zip = open_zip(&self.path)?;
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            if entry.is_dir() || entry.name() == RESOURCES_ZIP {
                continue;
            }
            let Some(relative) = entry.enclosed_name() else {
                warn!("Skipping unsafe entry {} in {:?}", entry.name(), self.path);
                continue;
            };
            let out_path = world.join(relative);
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
            }
            let mut out = File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;
        }
        Ok(())
    }

    /// Enable or disable a pack by renaming its state file.
    ///
    /// Returns whether the pack is now in the requested state. A failed
    /// rename is logged and leaves the pack as it was.
    pub fn set_active(&mut self, id: &str, active: bool) -> bool {
        let Some(pack) = self.packs.iter_mut().find(|pack| pack.id == id) else {
            warn!("No datapack {} in {:?}", id, self.path);
            return false;
        };
        let wanted = if active {
            PackState::Enabled
        } else {
            PackState::Disabled
        };
        if pack.state == wanted {
            return true;
        }

        let from = pack.state_file();
        let to = PackState::path_for(&from, wanted);
        match std::fs::rename(&from, &to) {
            Ok(()) => {
                if pack.layout == PackLayout::Archive {
                    pack.location = to;
                }
                pack.state = wanted;
                debug!("Datapack {} is now {:?}", id, wanted);
                true
            }
            Err(e) => {
                warn!("Unable to rename {:?} to {:?}: {}", from, to, e);
                false
            }
        }
    }

    /// Delete a pack's folder or zip and drop it from the list.
    pub fn delete_pack(&mut self, id: &str) -> LauncherResult<()> {
        let Some(index) = self.packs.iter().position(|pack| pack.id == id) else {
            return Ok(());
        };
        let location = &self.packs[index].location;
        if location.is_dir() {
            std::fs::remove_dir_all(location).map_err(|e| LauncherError::io(location, e))?;
        } else if location.is_file() {
            std::fs::remove_file(location).map_err(|e| LauncherError::io(location, e))?;
        }
        self.packs.remove(index);
        Ok(())
    }
}

fn scan_directory(dir: &Path) -> LauncherResult<Vec<Pack>> {
    let mut packs = Vec::new();
    if !dir.is_dir() {
        return Ok(packs);
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| LauncherError::io(dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in entries {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = if path.is_dir() {
            directory_pack(&path, &name)
        } else if path.is_file() {
            archive_pack(&path, &name)
        } else {
            Ok(None)
        };
        match result {
            Ok(Some(pack)) => packs.push(pack),
            Ok(None) => {}
            Err(e) => warn!("Failed to read datapack {:?}: {}", path, e),
        }
    }
    Ok(packs)
}

fn directory_pack(path: &Path, name: &str) -> LauncherResult<Option<Pack>> {
    let enabled = path.join(PACK_META);
    let disabled = PackState::path_for(&enabled, PackState::Disabled);
    let meta = if enabled.is_file() {
        enabled
    } else if disabled.is_file() {
        disabled
    } else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(&meta).map_err(|e| LauncherError::io(&meta, e))?;
    Ok(Some(Pack {
        id: name.to_string(),
        description: parse_meta(&text)?,
        layout: PackLayout::Directory,
        location: path.to_path_buf(),
        state: PackState::of_path(&meta),
    }))
}

fn archive_pack(path: &Path, name: &str) -> LauncherResult<Option<Pack>> {
    let Some(id) = archive_pack_id(name) else {
        return Ok(None);
    };
    let mut zip = open_zip(path)?;
    let Some(text) = read_zip_text(&mut zip, PACK_META)? else {
        return Ok(None);
    };
    Ok(Some(Pack {
        id: id.to_string(),
        description: parse_meta(&text)?,
        layout: PackLayout::Archive,
        location: path.to_path_buf(),
        state: PackState::of_path(path),
    }))
}

/// Remove packs in `datapacks` whose id is in `ids`.
fn remove_colliding(datapacks: &Path, ids: &HashSet<&str>) -> LauncherResult<()> {
    if !datapacks.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(datapacks).map_err(|e| LauncherError::io(datapacks, e))? {
        let path = entry.map_err(|e| LauncherError::io(datapacks, e))?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if path.is_dir() && ids.contains(name.as_str()) {
            std::fs::remove_dir_all(&path).map_err(|e| LauncherError::io(&path, e))?;
        } else if path.is_file() && archive_pack_id(&name).is_some_and(|id| ids.contains(id)) {
            std::fs::remove_file(&path).map_err(|e| LauncherError::io(&path, e))?;
        } else {
            continue;
        }
        debug!("Replaced existing datapack {:?}", path);
    }
    Ok(())
}

/// Merge the bundle's `resources.zip` into the world's, then pin the merged
/// descriptor and drop the pack icon.
fn merge_resources(bundle: &Path, destination: &Path) -> LauncherResult<()> {
    let mut merged: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    if destination.is_file() {
        read_all_entries(&mut open_zip(destination)?, &mut merged)?;
    }

    let mut bundle_zip = open_zip(bundle)?;
    let nested = match bundle_zip.by_name(RESOURCES_ZIP) {
        Ok(mut entry) => {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            Some(bytes)
        }
        Err(zip::result::ZipError::FileNotFound) => None,
        Err(e) => return Err(e.into()),
    };
    if let Some(bytes) = nested {
        read_all_entries(&mut ZipArchive::new(Cursor::new(bytes))?, &mut merged)?;
    }

    merged.insert(PACK_META.to_string(), MERGED_PACK_META.as_bytes().to_vec());
    merged.remove("pack.png");

    let parent = destination
        .parent()
        .ok_or_else(|| LauncherError::Other(format!("No parent for {:?}", destination)))?;
    std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
    let staging = parent.join(format!(".{}.{}.part", RESOURCES_ZIP, uuid::Uuid::new_v4()));
    let written = write_entries(&staging, &merged)
        .and_then(|()| std::fs::rename(&staging, destination).map_err(|e| LauncherError::io(destination, e)));
    if written.is_err() {
        let _ = std::fs::remove_file(&staging);
    }
    written
}

fn read_all_entries<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    into: &mut BTreeMap<String, Vec<u8>>,
) -> LauncherResult<()> {
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        into.insert(entry.name().trim_start_matches('/').to_string(), bytes);
    }
    Ok(())
}

fn write_entries(path: &Path, entries: &BTreeMap<String, Vec<u8>>) -> LauncherResult<()> {
    let file = File::create(path).map_err(|e| LauncherError::io(path, e))?;
    let mut zip = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        zip.start_file(name.as_str(), SimpleFileOptions::default())?;
        zip.write_all(bytes).map_err(|e| LauncherError::io(path, e))?;
    }
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(description: &str) -> String {
        format!(r#"{{ "pack": {{ "pack_format": 15, "description": "{}" }} }}"#, description)
    }

    fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn zip_names(path: &Path) -> Vec<String> {
        let zip = open_zip(path).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn state_is_encoded_in_the_name() {
        let enabled = Path::new("/w/datapacks/pack_a/pack.mcmeta");
        let disabled = Path::new("/w/datapacks/pack_a/pack.mcmeta.disabled");
        assert_eq!(PackState::of_path(enabled), PackState::Enabled);
        assert_eq!(PackState::of_path(disabled), PackState::Disabled);
        assert_eq!(PackState::path_for(enabled, PackState::Disabled), disabled);
        assert_eq!(PackState::path_for(disabled, PackState::Enabled), enabled);
        assert_eq!(PackState::path_for(enabled, PackState::Enabled), enabled);
    }

    #[test]
    fn directory_scan_and_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("datapacks");
        std::fs::create_dir_all(root.join("pack_a")).unwrap();
        std::fs::create_dir_all(root.join("pack_b")).unwrap();
        std::fs::create_dir_all(root.join("not_a_pack")).unwrap();
        std::fs::write(root.join("pack_a/pack.mcmeta"), meta("A")).unwrap();
        std::fs::write(root.join("pack_b/pack.mcmeta.disabled"), meta("B")).unwrap();
        std::fs::write(root.join("broken.zip"), "not a zip").unwrap();
        write_zip(
            &root.join("zipped.zip.disabled"),
            &[(PACK_META, meta("Z").into_bytes())],
        );

        let mut datapack = Datapack::new(&root);
        datapack.load_from_dir();

        let ids: Vec<&str> = datapack.packs().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["pack_a", "pack_b", "zipped"]);
        assert!(datapack.pack("pack_a").unwrap().is_active());
        assert!(!datapack.pack("pack_b").unwrap().is_active());
        assert!(!datapack.pack("zipped").unwrap().is_active());
        assert_eq!(datapack.pack("pack_a").unwrap().description, "A");

        assert!(datapack.set_active("pack_b", true));
        assert!(root.join("pack_b/pack.mcmeta").is_file());
        assert!(!root.join("pack_b/pack.mcmeta.disabled").exists());
        assert!(datapack.pack("pack_b").unwrap().is_active());

        assert!(datapack.set_active("zipped", true));
        assert!(root.join("zipped.zip").is_file());
        assert_eq!(datapack.pack("zipped").unwrap().location, root.join("zipped.zip"));
    }

    #[test]
    fn failed_rename_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("datapacks");
        std::fs::create_dir_all(root.join("pack_a")).unwrap();
        std::fs::write(root.join("pack_a/pack.mcmeta"), meta("A")).unwrap();

        let mut datapack = Datapack::new(&root);
        datapack.load_from_dir();
        std::fs::remove_file(root.join("pack_a/pack.mcmeta")).unwrap();

        assert!(!datapack.set_active("pack_a", false));
        assert!(datapack.pack("pack_a").unwrap().is_active());
    }

    #[test]
    fn zip_kinds() {
        let dir = tempfile::tempdir().unwrap();

        let single = dir.path().join("single.zip");
        write_zip(&single, &[(PACK_META, meta("one").into_bytes())]);
        let mut datapack = Datapack::new(&single);
        datapack.load_from_zip().unwrap();
        assert!(!datapack.is_bundle());
        assert_eq!(datapack.packs()[0].id, "single");

        let bundle = dir.path().join("bundle.zip");
        write_zip(
            &bundle,
            &[
                ("datapacks/inner/pack.mcmeta", meta("inner").into_bytes()),
                (
                    "datapacks/nested.zip",
                    zip_bytes(&[(PACK_META, meta("nested").into_bytes())]),
                ),
            ],
        );
        let mut datapack = Datapack::new(&bundle);
        datapack.load_from_zip().unwrap();
        assert!(datapack.is_bundle());
        let ids: Vec<&str> = datapack.packs().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["inner", "nested"]);

        let junk = dir.path().join("junk.zip");
        write_zip(&junk, &[("readme.txt", b"hi".to_vec())]);
        let mut datapack = Datapack::new(&junk);
        assert!(matches!(
            datapack.load_from_zip(),
            Err(LauncherError::MalformedDatapack(_))
        ));
    }

    #[test]
    fn bundle_install_merges_resources() {
        let dir = tempfile::tempdir().unwrap();
        let world = dir.path().join("world");
        std::fs::create_dir_all(world.join("datapacks/inner")).unwrap();
        std::fs::write(world.join("datapacks/inner/stale.json"), "{}").unwrap();
        std::fs::write(world.join("datapacks/other.zip"), "keep").unwrap();
        write_zip(
            &world.join(RESOURCES_ZIP),
            &[
                ("assets/old.txt", b"old".to_vec()),
                ("pack.png", b"png".to_vec()),
            ],
        );

        let bundle = dir.path().join("bundle.zip");
        write_zip(
            &bundle,
            &[
                ("datapacks/inner/pack.mcmeta", meta("inner").into_bytes()),
                (
                    RESOURCES_ZIP,
                    zip_bytes(&[
                        ("assets/new.txt", b"new".to_vec()),
                        (PACK_META, meta("original").into_bytes()),
                    ]),
                ),
            ],
        );

        let mut datapack = Datapack::new(&bundle);
        datapack.load_from_zip().unwrap();
        datapack.install_to(&world).unwrap();

        assert!(world.join("datapacks/inner/pack.mcmeta").is_file());
        assert!(!world.join("datapacks/inner/stale.json").exists());
        assert!(world.join("datapacks/other.zip").is_file());

        let resources = world.join(RESOURCES_ZIP);
        assert_eq!(
            zip_names(&resources),
            vec!["assets/new.txt", "assets/old.txt", PACK_META]
        );
        let merged_meta = read_zip_text(&mut open_zip(&resources).unwrap(), PACK_META)
            .unwrap()
            .unwrap();
        assert_eq!(merged_meta, MERGED_PACK_META);
    }

    #[test]
    fn single_install_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let single = dir.path().join("tweaks.zip");
        write_zip(&single, &[(PACK_META, meta("tweaks").into_bytes())]);
        let world = dir.path().join("world");
        std::fs::create_dir_all(world.join("datapacks/tweaks")).unwrap();

        let mut source = Datapack::new(&single);
        source.load_from_zip().unwrap();
        source.install_to(&world).unwrap();
        assert!(world.join("datapacks/tweaks.zip").is_file());
        assert!(!world.join("datapacks/tweaks").exists());

        let mut installed = Datapack::new(world.join("datapacks"));
        installed.load_from_dir();
        installed.delete_pack("tweaks").unwrap();
        assert!(installed.packs().is_empty());
        assert!(!world.join("datapacks/tweaks.zip").exists());
    }

    #[test]
    fn descriptions_flatten_text_components() {
        let value = serde_json::json!([{ "text": "Hello " }, { "text": "world", "extra": [" !"] }]);
        assert_eq!(description_text(&value), "Hello world !");
    }
}
