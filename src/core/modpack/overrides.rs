use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::archive::ModpackArchive;
use super::configuration::ModpackConfiguration;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{hash_file_sync, HashAlgorithm};
use crate::core::task::{Task, TaskContext};

/// Lays a pack's override trees onto the run directory.
///
/// Sub-paths are applied in order and an earlier one wins over a later one
/// for the same file. On update, files the user changed since the previous
/// install are left alone, and files the user deleted stay deleted.
pub struct OverridesTask {
    archive: ModpackArchive,
    run_directory: PathBuf,
    subpaths: Vec<String>,
    previous: Option<Arc<ModpackConfiguration>>,
}

impl OverridesTask {
    pub fn new(
        archive: ModpackArchive,
        run_directory: impl Into<PathBuf>,
        subpaths: Vec<String>,
        previous: Option<Arc<ModpackConfiguration>>,
    ) -> Self {
        Self {
            archive,
            run_directory: run_directory.into(),
            subpaths,
            previous,
        }
    }
}

fn sha1_of(path: &Path) -> Option<String> {
    hash_file_sync(path, HashAlgorithm::Sha1).ok()
}

/// Synchronous body; runs on the blocking pool.
fn apply_overrides(
    archive: &ModpackArchive,
    run: &Path,
    subpaths: &[String],
    previous: Option<&ModpackConfiguration>,
) -> LauncherResult<usize> {
    std::fs::create_dir_all(run).map_err(|e| LauncherError::io(run, e))?;

    let recorded: HashMap<&str, &str> = previous
        .map(|config| {
            config
                .overrides
                .iter()
                .map(|record| (record.path.as_str(), record.hash.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let mut entries: HashSet<String> = HashSet::new();
    let mut written = 0;
    for subpath in subpaths {
        if !archive.has_subtree(subpath)? {
            continue;
        }
        let laid = archive.extract_subtree(subpath, run, |relative| {
            if !entries.insert(relative.to_string()) {
                return false;
            }
            let Some(old_hash) = recorded.get(relative) else {
                return true;
            };
            let target = run.join(relative);
            if !target.exists() {
                debug!("Keeping user-deleted override {} absent", relative);
                return false;
            }
            let unchanged = sha1_of(&target).is_some_and(|hash| hash.eq_ignore_ascii_case(old_hash));
            if !unchanged {
                debug!("Keeping user-modified override {}", relative);
            }
            unchanged
        })?;
        written += laid.len();
    }

    for (path, old_hash) in &recorded {
        if entries.contains(*path) {
            continue;
        }
        let target = run.join(path);
        if !target.is_file() {
            continue;
        }
        if sha1_of(&target).is_some_and(|hash| hash.eq_ignore_ascii_case(old_hash)) {
            std::fs::remove_file(&target).map_err(|e| LauncherError::io(&target, e))?;
            debug!("Removed override {} dropped by the pack", path);
        }
    }

    Ok(written)
}

#[async_trait]
impl Task for OverridesTask {
    fn name(&self) -> String {
        format!("install overrides into {}", self.run_directory.display())
    }

    fn stage(&self) -> Option<&str> {
        Some("modpack")
    }

    async fn execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
        let archive = self.archive.clone();
        let run = self.run_directory.clone();
        let subpaths = self.subpaths.clone();
        let previous = self.previous.clone();

        let written = tokio::task::spawn_blocking(move || {
            apply_overrides(&archive, &run, &subpaths, previous.as_deref())
        })
        .await
        .map_err(|e| LauncherError::Other(format!("Override extraction aborted: {}", e)))??;

        info!("Laid {} override files into {:?}", written, self.run_directory);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::modpack::archive::testing::write_zip;
    use crate::core::modpack::configuration::OverrideRecord;
    use crate::core::task::TaskGraph;

    const A_SHA1: &str = "86f7e437faa5a7fce15d1ddcb9eaeaea377667b8";

    fn previous(records: &[(&str, &str)]) -> Arc<ModpackConfiguration> {
        Arc::new(ModpackConfiguration {
            kind: "Curse".into(),
            name: "Pack".into(),
            version: "1".into(),
            manifest: serde_json::Value::Null,
            overrides: records
                .iter()
                .map(|(path, hash)| OverrideRecord {
                    path: path.to_string(),
                    hash: hash.to_string(),
                })
                .collect(),
        })
    }

    async fn run(task: OverridesTask) {
        let graph = TaskGraph::new();
        let id = graph.add(task);
        graph.run(id).await.unwrap();
    }

    #[tokio::test]
    async fn earlier_subpath_wins() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("pack.zip");
        write_zip(
            &zip,
            &[
                ("client-overrides/options.txt", "client"),
                ("overrides/options.txt", "common"),
                ("overrides/config/x.cfg", "x"),
            ],
        );
        let run_dir = dir.path().join("run");
        let subpaths = vec!["client-overrides".to_string(), "overrides".to_string()];

        run(OverridesTask::new(ModpackArchive::open(&zip).unwrap(), &run_dir, subpaths, None)).await;

        assert_eq!(std::fs::read_to_string(run_dir.join("options.txt")).unwrap(), "client");
        assert_eq!(std::fs::read_to_string(run_dir.join("config/x.cfg")).unwrap(), "x");
    }

    #[tokio::test]
    async fn update_respects_user_changes() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("pack.zip");
        write_zip(
            &zip,
            &[
                ("overrides/pristine.txt", "new"),
                ("overrides/edited.txt", "new"),
                ("overrides/deleted.txt", "new"),
            ],
        );
        let run_dir = dir.path().join("run");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join("pristine.txt"), "a").unwrap();
        std::fs::write(run_dir.join("edited.txt"), "mine").unwrap();
        std::fs::write(run_dir.join("dropped.txt"), "a").unwrap();
        std::fs::write(run_dir.join("dropped-edited.txt"), "mine").unwrap();

        let old = previous(&[
            ("pristine.txt", A_SHA1),
            ("edited.txt", A_SHA1),
            ("deleted.txt", A_SHA1),
            ("dropped.txt", A_SHA1),
            ("dropped-edited.txt", A_SHA1),
        ]);
        run(OverridesTask::new(
            ModpackArchive::open(&zip).unwrap(),
            &run_dir,
            vec!["overrides".into()],
            Some(old),
        ))
        .await;

        assert_eq!(std::fs::read_to_string(run_dir.join("pristine.txt")).unwrap(), "new");
        assert_eq!(std::fs::read_to_string(run_dir.join("edited.txt")).unwrap(), "mine");
        assert!(!run_dir.join("deleted.txt").exists());
        assert!(!run_dir.join("dropped.txt").exists());
        assert!(run_dir.join("dropped-edited.txt").exists());
    }
}
