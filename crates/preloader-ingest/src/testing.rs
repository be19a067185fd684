//! In-memory stage doubles for pipeline and orchestrator tests

use async_trait::async_trait;
use preloader_common::{ArchiveDescriptor, LocalArchive, PreloaderError, Result, TransformedOutput};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::catalog::{CatalogSource, DownloadMode};
use crate::download::Downloader;
use crate::transform::Transformer;
use crate::verify::Verifier;

/// Ordered record of `stage:file` entries across all doubles
#[derive(Debug, Clone, Default)]
pub struct StageLog(Arc<Mutex<Vec<String>>>);

impl StageLog {
    fn push(&self, stage: &str, path: &Path) {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if let Ok(mut entries) = self.0.lock() {
            entries.push(format!("{stage}:{name}"));
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

/// Tracks how many callers are inside a section at once
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct StubCatalog {
    archives: Option<Vec<ArchiveDescriptor>>,
}

impl StubCatalog {
    pub fn new(archives: Vec<ArchiveDescriptor>) -> Self {
        Self {
            archives: Some(archives),
        }
    }

    pub fn failing() -> Self {
        Self { archives: None }
    }
}

#[async_trait]
impl CatalogSource for StubCatalog {
    async fn list_archives(&self, _modules: &[String], _mode: DownloadMode) -> Result<Vec<ArchiveDescriptor>> {
        self.archives
            .clone()
            .ok_or_else(|| PreloaderError::catalog("catalog unavailable"))
    }
}

pub struct StubDownloader {
    log: StageLog,
    failing: HashSet<String>,
    delay: Duration,
    gauge: Gauge,
}

impl StubDownloader {
    pub fn new(log: StageLog) -> Self {
        Self {
            log,
            failing: HashSet::new(),
            delay: Duration::ZERO,
            gauge: Gauge::default(),
        }
    }

    /// Fail permanently for the archive with this file name
    pub fn failing(mut self, archive_name: &str) -> Self {
        self.failing.insert(archive_name.to_string());
        self
    }

    /// Hold each download for `delay`, measured by `gauge`
    pub fn slow(mut self, delay: Duration, gauge: Gauge) -> Self {
        self.delay = delay;
        self.gauge = gauge;
        self
    }
}

#[async_trait]
impl Downloader for StubDownloader {
    async fn download(&self, descriptor: &ArchiveDescriptor, destination: &Path) -> Result<LocalArchive> {
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.exit();

        self.log.push("download", destination);
        let name = destination.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if self.failing.contains(&name) {
            return Err(PreloaderError::download(&descriptor.url, "404 Not Found"));
        }
        Ok(LocalArchive::new(destination, descriptor.checksum.clone()))
    }
}

pub struct StubVerifier {
    log: StageLog,
}

impl StubVerifier {
    pub fn new(log: StageLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Verifier for StubVerifier {
    async fn verify(&self, archive: &LocalArchive) -> Result<()> {
        self.log.push("verify", &archive.path);
        Ok(())
    }
}

pub struct StubTransformer {
    log: StageLog,
}

impl StubTransformer {
    pub fn new(log: StageLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Transformer for StubTransformer {
    async fn transform(&self, _archive: &LocalArchive, destination: &Path) -> Result<TransformedOutput> {
        self.log.push("transform", destination);
        Ok(TransformedOutput {
            path: destination.to_path_buf(),
        })
    }
}
