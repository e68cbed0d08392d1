use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::HashAlgorithm;

/// Read-only view of a modpack archive.
///
/// Every call reopens the zip, so a view can be shared freely and moved
/// into blocking tasks. Entry names are compared with `/` separators and
/// without a leading slash.
#[derive(Debug, Clone)]
pub struct ModpackArchive {
    path: PathBuf,
}

/// Normalise a subtree prefix: no leading slash, trailing slash unless empty.
fn subtree_prefix(subtree: &str) -> String {
    let trimmed = subtree.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Relative path of `name` below `prefix`, rejecting anything that could
/// escape the destination.
fn relative_below(name: &str, prefix: &str) -> Option<PathBuf> {
    let rest = name.trim_start_matches('/').strip_prefix(prefix)?;
    let mut relative = PathBuf::new();
    for component in Path::new(rest).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

impl ModpackArchive {
    pub fn open(path: impl Into<PathBuf>) -> LauncherResult<Self> {
        let archive = Self { path: path.into() };
        archive.zip()?;
        Ok(archive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn zip(&self) -> LauncherResult<ZipArchive<File>> {
        let file = File::open(&self.path).map_err(|e| LauncherError::io(&self.path, e))?;
        Ok(ZipArchive::new(file)?)
    }

    pub fn entry_names(&self) -> LauncherResult<Vec<String>> {
        let zip = self.zip()?;
        Ok(zip
            .file_names()
            .map(|name| name.trim_start_matches('/').to_string())
            .collect())
    }

    /// Whether any entry lives under `subtree`.
    pub fn has_subtree(&self, subtree: &str) -> LauncherResult<bool> {
        let prefix = subtree_prefix(subtree);
        Ok(self
            .entry_names()?
            .iter()
            .any(|name| name.starts_with(&prefix) && name.len() > prefix.len()))
    }

    pub fn has_entry(&self, name: &str) -> LauncherResult<bool> {
        let wanted = name.trim_start_matches('/');
        Ok(self.entry_names()?.iter().any(|n| n == wanted))
    }

    /// Text of one entry, `None` when absent.
    pub fn read_text(&self, name: &str) -> LauncherResult<Option<String>> {
        let mut zip = self.zip()?;
        let wanted = name.trim_start_matches('/');
        let index = zip
            .file_names()
            .position(|n| n.trim_start_matches('/') == wanted);
        let Some(index) = index else {
            return Ok(None);
        };

        let mut entry = zip.by_index(index)?;
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| LauncherError::io(self.path.join(wanted), e))?;
        Ok(Some(text.trim_start_matches('\u{feff}').to_string()))
    }

    /// Unpack the files under `subtree` into `destination`, replacing
    /// existing files.
    ///
    /// `accept` sees each file's path relative to `subtree` and may veto it.
    /// Returns the relative paths written, with `/` separators.
    pub fn extract_subtree<F>(
        &self,
        subtree: &str,
        destination: &Path,
        mut accept: F,
    ) -> LauncherResult<Vec<String>>
    where
        F: FnMut(&str) -> bool,
    {
        let prefix = subtree_prefix(subtree);
        let mut zip = self.zip()?;
        let mut written = Vec::new();

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let Some(relative) = relative_below(entry.name(), &prefix) else {
                continue;
            };
            let key = relative_key(&relative);
            if !accept(&key) {
                continue;
            }

            let out_path = destination.join(&relative);
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
            }
            let mut out = File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;
            written.push(key);
        }

        Ok(written)
    }

    /// `(relative path, digest)` of every file under `subtree`.
    pub fn hash_subtree(&self, subtree: &str, algorithm: HashAlgorithm) -> LauncherResult<Vec<(String, String)>> {
        let prefix = subtree_prefix(subtree);
        let mut zip = self.zip()?;
        let mut hashes = Vec::new();

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let Some(relative) = relative_below(entry.name(), &prefix) else {
                continue;
            };

            let mut hasher = algorithm.hasher();
            let mut buffer = [0u8; 8192];
            loop {
                let read = entry
                    .read(&mut buffer)
                    .map_err(|e| LauncherError::io(self.path.join(&relative), e))?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
            hashes.push((relative_key(&relative), hasher.finalize()));
        }
        Ok(hashes)
    }

    /// Relative paths of the files under `subtree`.
    pub fn list_subtree(&self, subtree: &str) -> LauncherResult<Vec<String>> {
        let prefix = subtree_prefix(subtree);
        let zip = self.zip()?;
        Ok(zip
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .filter_map(|name| relative_below(name, &prefix))
            .map(|relative| relative_key(&relative))
            .collect())
    }
}

/// `path` as a relative path that stays inside whatever it is joined to.
pub fn sanitize_relative(path: &str) -> Option<PathBuf> {
    relative_below(path, "")
}

/// `/`-separated form of a relative path, as stored in configurations.
pub fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Write;
    use std::path::Path;

    use zip::write::SimpleFileOptions;

    /// Write a zip holding `entries` (name, content) to `path`.
    pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
}
