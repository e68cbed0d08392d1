// ─── Content Cache ───
// Content-addressed store: <root>/<algorithm>/<first two hex chars>/<digest>.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{self, Checksum};

/// Coordinates plus checksums of one artifact.
///
/// Two identities denote the same artifact when any checksum matches,
/// whatever their coordinates say.
#[derive(Debug, Clone)]
pub struct ArtifactIdentity {
    pub coordinates: String,
    pub checksums: Vec<Checksum>,
    pub url: Option<String>,
}

impl ArtifactIdentity {
    pub fn new(coordinates: impl Into<String>, checksum: Checksum) -> Self {
        Self {
            coordinates: coordinates.into(),
            checksums: vec![checksum],
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn primary(&self) -> Option<&Checksum> {
        self.checksums.first()
    }
}

impl PartialEq for ArtifactIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.checksums.iter().any(|c| other.checksums.contains(c))
    }
}

pub struct CacheRepository {
    root: PathBuf,
    locks: Mutex<HashMap<Checksum, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive access to one cache entry; forgets the entry's lock once no
/// one else holds or waits for it.
struct EntryGuard<'a> {
    cache: &'a CacheRepository,
    checksum: Checksum,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.cache.locks();
        if locks
            .get(&self.checksum)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.checksum);
        }
    }
}

impl CacheRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the entry for `checksum` lives; `None` for a digest that is not
    /// plain hex of the algorithm's length.
    pub fn entry_path(&self, checksum: &Checksum) -> Option<PathBuf> {
        if !checksum.is_well_formed() {
            return None;
        }
        let digest = &checksum.digest;
        Some(
            self.root
                .join(checksum.algorithm.as_str())
                .join(&digest[..2])
                .join(digest),
        )
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<Checksum, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn lock_entry(&self, checksum: &Checksum) -> EntryGuard<'_> {
        let lock = self.locks().entry(checksum.clone()).or_default().clone();
        EntryGuard {
            cache: self,
            checksum: checksum.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Canonical stored copy of `identity`, if any.
    pub fn lookup(&self, identity: &ArtifactIdentity) -> Option<PathBuf> {
        identity
            .checksums
            .iter()
            .filter_map(|c| self.entry_path(c))
            .find(|p| p.is_file())
    }

    /// Copy the cached artifact to `destination`. Returns `false` on a miss.
    ///
    /// A stored copy that no longer verifies is evicted and counts as a miss.
    pub async fn fetch(&self, identity: &ArtifactIdentity, destination: &Path) -> LauncherResult<bool> {
        for checksum in &identity.checksums {
            let Some(stored) = self.entry_path(checksum) else {
                debug!("Ignoring malformed digest {} for {}", checksum, identity.coordinates);
                continue;
            };
            if !stored.is_file() {
                continue;
            }

            let _guard = self.lock_entry(checksum).await;

            if let Err(e) = integrity::verify_file(&stored, checksum).await {
                debug!("Evicting stale cache entry {:?}: {}", stored, e);
                let _ = tokio::fs::remove_file(&stored).await;
                continue;
            }

            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| LauncherError::io(parent, e))?;
            }
            tokio::fs::copy(&stored, destination)
                .await
                .map_err(|e| LauncherError::io(destination, e))?;
            debug!("Cache hit for {} -> {:?}", identity.coordinates, destination);
            return Ok(true);
        }
        Ok(false)
    }

    /// Register `path` as the canonical copy of `identity` if it verifies.
    ///
    /// Returns whether the cache holds the artifact afterwards. Adopting the
    /// same identity again is a no-op.
    pub async fn try_adopt(&self, identity: &ArtifactIdentity, path: &Path) -> LauncherResult<bool> {
        let Some(checksum) = identity.primary() else {
            return Ok(false);
        };
        let Some(target) = self.entry_path(checksum) else {
            debug!("Not adopting {:?}: malformed digest {}", path, checksum);
            return Ok(false);
        };

        let _guard = self.lock_entry(checksum).await;

        if target.is_file() {
            return Ok(true);
        }
        if !path.is_file() {
            return Ok(false);
        }

        match integrity::verify_file(path, checksum).await {
            Ok(()) => {}
            Err(LauncherError::ChecksumMismatch { .. }) => {
                debug!("Not adopting {:?}: checksum differs from {}", path, checksum);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        let parent = target
            .parent()
            .ok_or_else(|| LauncherError::Other(format!("Invalid cache path {:?}", target)))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io(parent, e))?;

        let staging = parent.join(format!(".{}.{}.part", checksum.digest, uuid::Uuid::new_v4()));
        tokio::fs::copy(path, &staging)
            .await
            .map_err(|e| LauncherError::io(&staging, e))?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(LauncherError::io(&target, e));
        }

        debug!("Adopted {} into cache", identity.coordinates);
        Ok(true)
    }
}
