//! Archive checksum verification
//!
//! A successful check leaves an empty `<archive>.verified` marker next to the
//! archive. While the marker exists the archive bytes are not read again
//! unless `force_check` is set.

use async_trait::async_trait;
use preloader_common::checksum::{checksums_match, compute_file_checksum};
use preloader_common::{LocalArchive, PreloaderError, Result};
use tracing::info;

use crate::fsops;

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, archive: &LocalArchive) -> Result<()>;
}

/// SHA-256 verifier hashing on the blocking pool
#[derive(Debug, Clone)]
pub struct Sha256Verifier {
    chunk_size: usize,
    force_check: bool,
}

impl Sha256Verifier {
    pub fn new(chunk_size: usize, force_check: bool) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            force_check,
        }
    }

    async fn digest(&self, archive: &LocalArchive) -> Result<String> {
        let path = archive.path.clone();
        let chunk_size = self.chunk_size;
        tokio::task::spawn_blocking(move || compute_file_checksum(&path, chunk_size))
            .await
            .map_err(|e| PreloaderError::Io(std::io::Error::other(format!("hashing task failed: {e}"))))?
    }
}

#[async_trait]
impl Verifier for Sha256Verifier {
    async fn verify(&self, archive: &LocalArchive) -> Result<()> {
        let name = archive.file_name();
        let marker = archive.marker_path();

        if !self.force_check && fsops::exists(&marker).await? {
            info!(archive = %name, "Checksum already verified, skipping");
            return Ok(());
        }

        info!(archive = %name, "Computing checksum");
        let actual = self.digest(archive).await?;

        if !checksums_match(&archive.checksum, &actual) {
            return Err(PreloaderError::Verification {
                path: archive.path.clone(),
                expected: archive.checksum.trim().to_lowercase(),
                actual,
            });
        }

        tokio::fs::File::create(&marker).await?;
        info!(archive = %name, "Checksum verified");
        Ok(())
    }
}
