use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Why a modpack's referenced files could not all be provided.
///
/// Installers treat both kinds as "installed, but with missing content":
/// the version is kept on disk and the caller is warned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionShortfall {
    /// At least one remote file answered 404.
    ResourceMissing,
    /// Some files could not be named or failed to download.
    Incomplete,
}

impl std::fmt::Display for CompletionShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionShortfall::ResourceMissing => write!(f, "a referenced file was not found"),
            CompletionShortfall::Incomplete => write!(f, "some referenced files are missing"),
        }
    }
}

/// Central error type for the crate.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("No download source declared for {0:?}")]
    NoDownloadSource(PathBuf),

    // ── Integrity ───────────────────────────────────────
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Archive {path:?} is corrupted: {reason}")]
    CorruptedArchive { path: PathBuf, reason: String },

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Versions ────────────────────────────────────────
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Version {0} already exists")]
    VersionConflict(String),

    // ── Loader ──────────────────────────────────────────
    #[error("Unsupported mod loader {0}")]
    UnsupportedLoader(String),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Loader API unreachable: {0}")]
    LoaderApi(String),

    // ── Modpacks ────────────────────────────────────────
    #[error("Version {name} is not a {expected} modpack. Cannot update this version.")]
    ModpackTypeMismatch { name: String, expected: String },

    #[error("Malformed modpack: {0}")]
    MalformedModpack(String),

    #[error("Modpack completion failed: {0}")]
    Completion(CompletionShortfall),

    #[error("Malformed datapack {0:?}")]
    MalformedDatapack(PathBuf),

    // ── Task graph ──────────────────────────────────────
    #[error("Adding {to} under {from} would create a dependency cycle")]
    TaskCycle { from: String, to: String },

    #[error("Task {task} failed: {source}")]
    Task {
        task: String,
        #[source]
        source: Arc<LauncherError>,
    },

    // ── Archive ─────────────────────────────────────────
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl LauncherError {
    /// Wrap an I/O error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }

    /// The completion shortfall at the bottom of a task failure chain, if any.
    pub fn completion_shortfall(&self) -> Option<CompletionShortfall> {
        match self {
            LauncherError::Completion(shortfall) => Some(*shortfall),
            LauncherError::Task { source, .. } => source.completion_shortfall(),
            _ => None,
        }
    }

    /// The innermost error of a task failure chain.
    pub fn root_cause(&self) -> &LauncherError {
        match self {
            LauncherError::Task { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// `true` when the remote side answered "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root_cause(),
            LauncherError::DownloadFailed { status: 404, .. }
        )
    }
}
