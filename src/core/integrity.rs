// ─── Artifact Integrity ───
// Checksums and structural probes deciding whether a local file is reusable.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

const READ_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    Md5,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Md5 => "md5",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Some(HashAlgorithm::Sha1),
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha512" => Some(HashAlgorithm::Sha512),
            "md5" => Some(HashAlgorithm::Md5),
            _ => None,
        }
    }

    /// Length of a hex digest produced by this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
            HashAlgorithm::Md5 => 32,
        }
    }

    pub fn hasher(self) -> Hasher {
        match self {
            HashAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            HashAlgorithm::Md5 => Hasher::Md5(Md5::new()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental digest over any supported algorithm.
pub enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Md5(Md5),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
        }
    }

    /// Lowercase hex digest.
    pub fn finalize(self) -> String {
        match self {
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// An algorithm plus the expected lowercase hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: HashAlgorithm, digest: impl AsRef<str>) -> Self {
        Self {
            algorithm,
            digest: digest.as_ref().trim().to_ascii_lowercase(),
        }
    }

    pub fn sha1(digest: impl AsRef<str>) -> Self {
        Self::new(HashAlgorithm::Sha1, digest)
    }

    /// Like [`Checksum::new`], but `None` unless the digest is hex of the
    /// algorithm's exact length. Use it for digests read from untrusted input.
    pub fn parse(algorithm: HashAlgorithm, digest: impl AsRef<str>) -> Option<Self> {
        let checksum = Self::new(algorithm, digest);
        checksum.is_well_formed().then_some(checksum)
    }

    pub fn is_well_formed(&self) -> bool {
        self.digest.len() == self.algorithm.hex_len()
            && self.digest.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn matches(&self, actual: &str) -> bool {
        self.digest.eq_ignore_ascii_case(actual)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// Structural check run on top of checksums for certain artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityProbe {
    /// Every entry of the archive must decompress with a valid CRC.
    Zip,
}

impl IntegrityProbe {
    /// Pick a probe from the file extension.
    pub fn for_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jar") | Some("zip") => Some(IntegrityProbe::Zip),
            _ => None,
        }
    }

    pub fn check(self, path: &Path) -> Result<(), String> {
        match self {
            IntegrityProbe::Zip => probe_zip(path),
        }
    }
}

/// What a local artifact must satisfy to be reused.
#[derive(Debug, Clone, Default)]
pub struct ArtifactExpectation {
    pub checksum: Option<Checksum>,
    /// When non-empty, at least one of these must match.
    pub alternates: Vec<Checksum>,
    pub probe: Option<IntegrityProbe>,
}

impl ArtifactExpectation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checksum(mut self, checksum: Option<Checksum>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_alternates(mut self, alternates: Vec<Checksum>) -> Self {
        self.alternates = alternates;
        self
    }

    pub fn with_probe(mut self, probe: Option<IntegrityProbe>) -> Self {
        self.probe = probe;
        self
    }
}

// ── Hashing ─────────────────────────────────────────────

/// Stream a file through `algorithm` without loading it whole.
pub fn hash_file_sync(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);
    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize())
}

pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> LauncherResult<String> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_sync(&owned, algorithm))
        .await
        .map_err(|e| LauncherError::Other(format!("Hashing task failed: {}", e)))?
        .map_err(|e| LauncherError::io(path, e))
}

/// Fail with `ChecksumMismatch` unless `path` hashes to `expected`.
pub async fn verify_file(path: &Path, expected: &Checksum) -> LauncherResult<()> {
    let actual = hash_file(path, expected.algorithm).await?;
    if expected.matches(&actual) {
        Ok(())
    } else {
        Err(LauncherError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

fn probe_zip(path: &Path) -> Result<(), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| e.to_string())?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| e.to_string())?;
        let name = entry.name().to_string();
        io::copy(&mut entry, &mut io::sink()).map_err(|e| format!("{}: {}", name, e))?;
    }
    Ok(())
}

// ── Refresh decision ────────────────────────────────────

/// `true` when the file at `path` must be downloaded again.
///
/// A hashing I/O error keeps the existing file.
pub async fn should_refetch(path: &Path, expectation: &ArtifactExpectation) -> bool {
    let owned: PathBuf = path.to_path_buf();
    let expectation = expectation.clone();
    match tokio::task::spawn_blocking(move || refetch_verdict(&owned, &expectation)).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!("Integrity check of {:?} did not complete: {}", path, e);
            false
        }
    }
}

fn refetch_verdict(path: &Path, expectation: &ArtifactExpectation) -> bool {
    if !path.is_file() {
        return true;
    }

    if let Some(expected) = &expectation.checksum {
        match hash_file_sync(path, expected.algorithm) {
            Ok(actual) if !expected.matches(&actual) => {
                debug!("{:?} has {} {}, expected {}", path, expected.algorithm, actual, expected.digest);
                return true;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Unable to hash {:?}, keeping it: {}", path, e);
                return false;
            }
        }
    }

    if !expectation.alternates.is_empty() {
        let mut matched = false;
        for candidate in &expectation.alternates {
            match hash_file_sync(path, candidate.algorithm) {
                Ok(actual) if candidate.matches(&actual) => {
                    matched = true;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Unable to hash {:?}, keeping it: {}", path, e);
                    return false;
                }
            }
        }
        if !matched {
            debug!("{:?} matches none of its declared checksums", path);
            return true;
        }
    }

    if let Some(probe) = expectation.probe {
        if let Err(reason) = probe.check(path) {
            debug!("{:?} failed its {:?} probe: {}", path, probe, reason);
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

    fn write_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("a.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"payload").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn hashes_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(hash_file_sync(&path, HashAlgorithm::Sha1).unwrap(), HELLO_SHA1);
        assert_eq!(
            hash_file_sync(&path, HashAlgorithm::Md5).unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn algorithm_names_parse() {
        assert_eq!(HashAlgorithm::parse("SHA-256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::parse("sha512"), Some(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::parse("crc32"), None);
    }

    #[test]
    fn untrusted_digests_must_be_hex_of_the_right_length() {
        assert_eq!(
            Checksum::parse(HashAlgorithm::Sha1, HELLO_SHA1.to_uppercase()),
            Some(Checksum::sha1(HELLO_SHA1))
        );
        assert!(Checksum::parse(HashAlgorithm::Sha1, "../victim.txt").is_none());
        assert!(Checksum::parse(HashAlgorithm::Sha1, "abcd").is_none());
        assert!(Checksum::parse(HashAlgorithm::Md5, HELLO_SHA1).is_none());
        assert!(!Checksum::sha1("00/../../etc").is_well_formed());
    }

    #[tokio::test]
    async fn missing_file_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let expectation = ArtifactExpectation::new();
        assert!(should_refetch(&dir.path().join("nope.jar"), &expectation).await);
    }

    #[tokio::test]
    async fn checksum_decides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();

        let good = ArtifactExpectation::new().with_checksum(Some(Checksum::sha1(HELLO_SHA1)));
        assert!(!should_refetch(&path, &good).await);

        let upper = ArtifactExpectation::new()
            .with_checksum(Some(Checksum::sha1(HELLO_SHA1.to_uppercase())));
        assert!(!should_refetch(&path, &upper).await);

        let bad = ArtifactExpectation::new().with_checksum(Some(Checksum::sha1("00")));
        assert!(should_refetch(&path, &bad).await);
    }

    #[tokio::test]
    async fn alternates_need_one_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();

        let none = ArtifactExpectation::new()
            .with_alternates(vec![Checksum::sha1("11"), Checksum::sha1("22")]);
        assert!(should_refetch(&path, &none).await);

        let one = ArtifactExpectation::new()
            .with_alternates(vec![Checksum::sha1("11"), Checksum::sha1(HELLO_SHA1)]);
        assert!(!should_refetch(&path, &one).await);
    }

    #[tokio::test]
    async fn zip_probe_rejects_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.jar");
        write_zip(&good);
        let bad = dir.path().join("bad.jar");
        std::fs::write(&bad, b"definitely not a zip").unwrap();

        let expectation = ArtifactExpectation::new().with_probe(IntegrityProbe::for_path(&good));
        assert!(!should_refetch(&good, &expectation).await);
        assert!(should_refetch(&bad, &expectation).await);
    }

    #[tokio::test]
    async fn verify_file_reports_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();

        verify_file(&path, &Checksum::sha1(HELLO_SHA1)).await.unwrap();
        let err = verify_file(&path, &Checksum::sha1("ff")).await.unwrap_err();
        assert!(matches!(err, LauncherError::ChecksumMismatch { .. }));
    }
}
