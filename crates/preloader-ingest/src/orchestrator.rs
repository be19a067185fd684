//! Run orchestration
//!
//! Queries the catalog once, then drives one [`ArchivePipeline`] per archive
//! with at most `concurrency` pipelines in flight. Pipelines are
//! fail-independent: every archive reaches a terminal state before the run
//! reports, and only catalog errors abort the run itself.

use futures::stream::{self, StreamExt};
use preloader_common::{ArchiveDescriptor, Result, TransformedOutput};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::catalog::{CatalogSource, DownloadMode};
use crate::pipeline::{ArchivePipeline, PipelineFailure};
use crate::progress::ProgressReporter;

/// Outcome of every pipeline in one run
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<TransformedOutput>,
    pub failed: Vec<PipelineFailure>,
    pub duration: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Human-readable counts plus one line per failure
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Processed {} archives in {:.1}s: {} succeeded, {} failed",
            self.total(),
            self.duration.as_secs_f64(),
            self.succeeded.len(),
            self.failed.len()
        );
        for failure in &self.failed {
            let _ = write!(out, "\n  [{}] {}: {}", failure.kind(), failure.archive, failure.error);
        }
        out
    }
}

pub struct Orchestrator {
    catalog: Arc<dyn CatalogSource>,
    pipeline: ArchivePipeline,
    concurrency: usize,
    progress: ProgressReporter,
}

impl Orchestrator {
    pub fn new(catalog: Arc<dyn CatalogSource>, pipeline: ArchivePipeline, concurrency: usize) -> Self {
        Self {
            catalog,
            pipeline,
            concurrency: concurrency.max(1),
            progress: ProgressReporter::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Process every archive the catalog lists for `modules`
    ///
    /// Fails only when the catalog cannot be read. Pipeline failures are
    /// returned inside the report.
    pub async fn run(&self, modules: &[String], mode: DownloadMode) -> Result<RunReport> {
        let start = Instant::now();
        info!(modules = ?modules, %mode, "Starting preloader");

        let descriptors = dedup_by_archive_name(self.catalog.list_archives(modules, mode).await?);
        if descriptors.is_empty() {
            info!("No dumps found to process");
            return Ok(RunReport {
                duration: start.elapsed(),
                ..RunReport::default()
            });
        }

        info!(
            archives = descriptors.len(),
            concurrency = self.concurrency,
            "Starting processing pipelines"
        );
        let overall = self.progress.overall_bar(descriptors.len() as u64);

        let outcomes: Vec<std::result::Result<TransformedOutput, PipelineFailure>> = stream::iter(descriptors.iter())
            .map(|descriptor| {
                let overall = &overall;
                async move {
                    let outcome = self.pipeline.run(descriptor).await;
                    if let Err(failure) = &outcome {
                        error!(
                            archive = %failure.archive,
                            kind = failure.kind(),
                            error = %failure.error,
                            "Pipeline failed"
                        );
                    }
                    overall.inc(1);
                    outcome
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        overall.finish_and_clear();

        let mut report = RunReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(output) => report.succeeded.push(output),
                Err(failure) => report.failed.push(failure),
            }
        }
        report.duration = start.elapsed();

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "All processing tasks completed"
        );
        Ok(report)
    }
}

/// Keep the first descriptor for each archive file name
///
/// Two descriptors with one name would share cache and output paths.
fn dedup_by_archive_name(descriptors: Vec<ArchiveDescriptor>) -> Vec<ArchiveDescriptor> {
    let mut seen = HashSet::new();
    descriptors
        .into_iter()
        .filter(|d| {
            let key = d.archive_name().unwrap_or_else(|| d.url.clone());
            let fresh = seen.insert(key);
            if !fresh {
                warn!(url = %d.url, "Skipping duplicate archive name");
            }
            fresh
        })
        .collect()
}
