//! Per-archive stage pipeline: download, verify, transform
//!
//! Stages run strictly in order and the first failure ends the run for that
//! archive. Every path a pipeline touches is derived from its own archive
//! name, so pipelines for different archives never share files.

use preloader_common::{ArchiveDescriptor, PreloaderError, TransformedOutput};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::download::Downloader;
use crate::transform::Transformer;
use crate::verify::Verifier;

/// A stage failure tagged with the archive it happened to
#[derive(Debug, Error)]
#[error("{archive}: {error}")]
pub struct PipelineFailure {
    pub archive: String,
    #[source]
    pub error: PreloaderError,
}

impl PipelineFailure {
    pub fn new(archive: impl Into<String>, error: PreloaderError) -> Self {
        Self {
            archive: archive.into(),
            error,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

#[derive(Clone)]
pub struct ArchivePipeline {
    downloader: Arc<dyn Downloader>,
    verifier: Arc<dyn Verifier>,
    transformer: Arc<dyn Transformer>,
    download_cache_dir: PathBuf,
    raw_data_dir: PathBuf,
    discard_corrupt: bool,
}

impl ArchivePipeline {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        verifier: Arc<dyn Verifier>,
        transformer: Arc<dyn Transformer>,
        download_cache_dir: impl Into<PathBuf>,
        raw_data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            verifier,
            transformer,
            download_cache_dir: download_cache_dir.into(),
            raw_data_dir: raw_data_dir.into(),
            discard_corrupt: true,
        }
    }

    /// Whether an archive failing verification is deleted so a later run refetches it
    pub fn with_discard_corrupt(mut self, discard: bool) -> Self {
        self.discard_corrupt = discard;
        self
    }

    pub fn archive_path(&self, archive_name: &str) -> PathBuf {
        self.download_cache_dir.join(archive_name)
    }

    pub fn output_path(&self, descriptor: &ArchiveDescriptor) -> Option<PathBuf> {
        descriptor.output_name().map(|name| self.raw_data_dir.join(name))
    }

    pub async fn run(&self, descriptor: &ArchiveDescriptor) -> Result<TransformedOutput, PipelineFailure> {
        let (Some(name), Some(output_path)) = (descriptor.archive_name(), self.output_path(descriptor)) else {
            return Err(PipelineFailure::new(
                descriptor.url.clone(),
                PreloaderError::download(&descriptor.url, "URL has no file name"),
            ));
        };
        let fail = |error: PreloaderError| PipelineFailure::new(name.clone(), error);

        info!(archive = %name, "Starting pipeline");
        let archive_path = self.archive_path(&name);

        let archive = self
            .downloader
            .download(descriptor, &archive_path)
            .await
            .map_err(fail)?;

        if let Err(error) = self.verifier.verify(&archive).await {
            if self.discard_corrupt && matches!(error, PreloaderError::Verification { .. }) {
                discard(&archive.path, &archive.marker_path()).await;
            }
            return Err(fail(error));
        }

        let output = self
            .transformer
            .transform(&archive, &output_path)
            .await
            .map_err(fail)?;

        info!(archive = %name, output = %output.path.display(), "Pipeline finished");
        Ok(output)
    }
}

async fn discard(archive: &Path, marker: &Path) {
    for path in [marker, archive] {
        match tokio::fs::remove_file(path).await {
            Ok(()) => warn!(path = %path.display(), "Removed corrupt archive file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove corrupt archive file"),
        }
    }
}
