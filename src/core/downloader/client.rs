use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::integrity::HashAlgorithm;
use crate::core::state::LauncherSettings;
use crate::core::task::Progress;

/// Outcome of one streamed transfer.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub bytes: u64,
    /// Digest computed while streaming, lowercase hex.
    pub digest: String,
}

/// Shared HTTP client with a global cap on simultaneous transfers.
pub struct Downloader {
    client: Client,
    permits: Arc<Semaphore>,
    concurrency: usize,
    retries: u32,
    backoff: Duration,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(8)),
            concurrency: 8,
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn from_settings(settings: &LauncherSettings) -> LauncherResult<Self> {
        let client = build_http_client(&settings.user_agent)?;
        Ok(Self::new(client)
            .with_concurrency(settings.download_concurrency)
            .with_retries(settings.download_retries, settings.retry_backoff()))
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self.permits = Arc::new(Semaphore::new(self.concurrency));
        self
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    // ── Single transfer ─────────────────────────────────

    /// Stream `url` into `dest`, hashing with `algorithm` on the way.
    ///
    /// `dest` is created or truncated; its parent must exist. The file handle
    /// is closed before returning.
    pub async fn fetch_to(
        &self,
        url: &str,
        dest: &Path,
        algorithm: HashAlgorithm,
        progress: Option<&Progress>,
    ) -> LauncherResult<FetchedFile> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| LauncherError::Other(format!("Download queue closed: {}", e)))?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let (Some(progress), Some(length)) = (progress, response.content_length()) {
            progress.set_total(length);
        }

        let mut hasher = algorithm.hasher();
        let mut written = 0u64;
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;

            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| LauncherError::io(dest, e))?;
                written += chunk.len() as u64;
                if let Some(progress) = progress {
                    progress.advance_to(written);
                }
            }

            file.flush().await.map_err(|e| LauncherError::io(dest, e))?;
        }

        debug!("Fetched {} ({} bytes) -> {:?}", url, written, dest);
        Ok(FetchedFile {
            bytes: written,
            digest: hasher.finalize(),
        })
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> LauncherResult<T> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// GET `url` into memory.
    pub async fn get_bytes(&self, url: &str) -> LauncherResult<Vec<u8>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| LauncherError::Other(format!("Download queue closed: {}", e)))?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Whether another attempt against the same URL may succeed.
pub fn is_retryable(error: &LauncherError) -> bool {
    match error {
        LauncherError::Http(_) => true,
        LauncherError::DownloadFailed { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn streams_and_hashes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("hello.txt");
        let downloader = Downloader::new(Client::new());
        let progress = Progress::default();

        let fetched = downloader
            .fetch_to(
                &format!("{}/hello.txt", server.uri()),
                &dest,
                HashAlgorithm::Sha1,
                Some(&progress),
            )
            .await
            .unwrap();

        assert_eq!(fetched.bytes, 5);
        assert_eq!(fetched.digest, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert_eq!(progress.completed(), 5);
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "hello");
    }

    #[tokio::test]
    async fn repeated_transfer_is_not_counted_twice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("hello.txt");
        let downloader = Downloader::new(Client::new());
        let progress = Progress::default();
        let url = format!("{}/hello.txt", server.uri());

        for _ in 0..2 {
            downloader
                .fetch_to(&url, &dest, HashAlgorithm::Sha1, Some(&progress))
                .await
                .unwrap();
        }

        assert_eq!(progress.snapshot(), (5, 5));
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Client::new());
        let err = downloader
            .fetch_to(
                &format!("{}/missing.jar", server.uri()),
                &dir.path().join("missing.jar"),
                HashAlgorithm::Sha1,
                None,
            )
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(!is_retryable(&err));
    }

    #[test]
    fn backoff_is_linear() {
        let downloader =
            Downloader::new(Client::new()).with_retries(2, Duration::from_millis(100));
        assert_eq!(downloader.backoff_for(1), Duration::from_millis(100));
        assert_eq!(downloader.backoff_for(3), Duration::from_millis(300));
    }
}
