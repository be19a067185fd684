//! Archive downloader
//!
//! A download is skipped when its destination exists. Otherwise the body is
//! streamed into `<destination>.part` and renamed into place only after the
//! whole body arrived and matched the declared size, so the destination name
//! never refers to a partial file.

use async_trait::async_trait;
use futures::StreamExt;
use indicatif::ProgressBar;
use preloader_common::{ArchiveDescriptor, LocalArchive, PreloaderError, Result};
use reqwest::{Client, Response};
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::client::FetchError;
use crate::config::validate_token;
use crate::fsops::{self, PartFile};
use crate::progress::{format_bytes, ProgressReporter};
use crate::retry::RetryPolicy;

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Make sure `destination` holds the complete archive
    async fn download(
        &self,
        descriptor: &ArchiveDescriptor,
        destination: &Path,
    ) -> Result<LocalArchive>;
}

pub struct HttpDownloader {
    client: Client,
    token: String,
    chunk_size: usize,
    retry: RetryPolicy,
    progress: ProgressReporter,
}

impl HttpDownloader {
    pub fn new(
        client: Client,
        token: impl Into<String>,
        chunk_size: usize,
        retry: RetryPolicy,
        progress: ProgressReporter,
    ) -> Result<Self> {
        let token = token.into();
        validate_token("dump_token", &token)?;
        if chunk_size == 0 {
            return Err(PreloaderError::config("downloader.chunk_size must be greater than 0"));
        }
        Ok(Self {
            client,
            token,
            chunk_size,
            retry,
            progress,
        })
    }

    /// One complete attempt: request, stream into the part file, check, rename
    async fn attempt(
        &self,
        descriptor: &ArchiveDescriptor,
        destination: &Path,
    ) -> std::result::Result<u64, FetchError> {
        let part = PartFile::create(destination)?;

        let response = self
            .client
            .get(&descriptor.url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;

        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pb = self.progress.download_bar(descriptor.size_bytes, &name);
        let streamed = self.stream_to(response, part.part_path(), &pb).await;
        pb.finish_and_clear();
        let written = streamed?;

        if let Some(declared) = descriptor.size_bytes {
            if written != declared {
                return Err(FetchError::SizeMismatch { written, declared });
            }
        }

        part.commit_async().await?;
        Ok(written)
    }

    async fn stream_to(
        &self,
        response: Response,
        part_path: &Path,
        pb: &ProgressBar,
    ) -> std::result::Result<u64, FetchError> {
        let file = tokio::fs::File::create(part_path).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, descriptor: &ArchiveDescriptor, destination: &Path) -> Result<LocalArchive> {
        let archive = LocalArchive::new(destination, descriptor.checksum.clone());

        if fsops::exists(destination).await? {
            info!(archive = %archive.file_name(), "Archive already exists, skipping download");
            return Ok(archive);
        }

        info!(archive = %archive.file_name(), url = %descriptor.url, "Downloading archive");
        let operation = format!("download {}", archive.file_name());
        let written = self
            .retry
            .run(&operation, || self.attempt(descriptor, destination), FetchError::fault_kind)
            .await
            .map_err(|e| PreloaderError::download(&descriptor.url, e.to_string()))?;

        debug!(archive = %archive.file_name(), bytes = written, "Renamed part file into place");
        info!(archive = %archive.file_name(), size = %format_bytes(written), "Finished downloading archive");
        Ok(archive)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::RetrySettings;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    fn downloader() -> HttpDownloader {
        let retry = RetryPolicy::new(&RetrySettings {
            attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
        });
        HttpDownloader::new(Client::new(), "dump-token", 8, retry, ProgressReporter::hidden()).unwrap()
    }

    fn descriptor(server: &MockServer, size: Option<u64>) -> ArchiveDescriptor {
        ArchiveDescriptor::new(format!("{}/dumps/a.tsv.zst", server.uri()), "abc", size)
    }

    #[tokio::test]
    async fn test_second_download_is_a_no_op() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dumps/a.tsv.zst"))
            .and(header("authorization", "Bearer dump-token"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("cache/a.tsv.zst");
        let d = descriptor(&server, Some(BODY.len() as u64));
        let dl = downloader();

        let first = dl.download(&d, &destination).await.unwrap();
        let second = dl.download(&d, &destination).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.path, destination);
        assert_eq!(first.checksum, "abc");
        assert_eq!(std::fs::read(&destination).unwrap(), BODY);
        assert!(!dir.path().join("cache/a.tsv.zst.part").exists());
    }

    #[tokio::test]
    async fn test_short_body_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(&BODY[..10]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.tsv.zst");

        let err = downloader()
            .download(&descriptor(&server, Some(1000)), &destination)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "download");
        assert!(err.to_string().contains("size mismatch"));
        assert!(!destination.exists());
        assert!(!dir.path().join("a.tsv.zst.part").exists());
    }

    #[tokio::test]
    async fn test_undeclared_size_is_not_checked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.tsv.zst");
        downloader().download(&descriptor(&server, None), &destination).await.unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_transient_status_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.tsv.zst");
        downloader()
            .download(&descriptor(&server, Some(BODY.len() as u64)), &destination)
            .await
            .unwrap();
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn test_not_found_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.tsv.zst");
        let err = downloader()
            .download(&descriptor(&server, None), &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, PreloaderError::Download { .. }));
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_stale_part_file_does_not_count_as_downloaded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a.tsv.zst");
        std::fs::write(dir.path().join("a.tsv.zst.part"), b"0123").unwrap();

        downloader()
            .download(&descriptor(&server, Some(BODY.len() as u64)), &destination)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), BODY);
    }
}
