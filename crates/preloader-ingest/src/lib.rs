//! Preloader Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Bulk ingestion of remote dump archives: the catalog lists archives, and each
//! one is downloaded, checksum-verified and converted to Parquet by its own
//! pipeline. Every stage is idempotent, so a rerun only redoes work that did
//! not finish before.
//!
//! # Layout
//!
//! - [`catalog`]: catalog port and its HTTP implementation
//! - [`download`], [`verify`], [`transform`]: the three stages
//! - [`pipeline`]: stages composed for a single archive
//! - [`orchestrator`]: bounded-concurrency driver over all archives
//! - [`retry`], [`fsops`], [`client`]: shared plumbing
//!
//! # Example
//!
//! ```no_run
//! use preloader_ingest::{build_orchestrator, catalog::DownloadMode, config::Settings};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(
//!         Path::new("config/settings.toml"),
//!         Path::new("config/.secrets.toml"),
//!     )?;
//!     let report = build_orchestrator(&settings, false)?
//!         .run(&["bitcoin".to_string()], DownloadMode::Latest)
//!         .await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod download;
pub mod fsops;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod transform;
pub mod verify;

#[cfg(test)]
mod testing;

use preloader_common::Result;
use std::sync::Arc;

use crate::catalog::HttpCatalog;
use crate::config::Settings;
use crate::download::HttpDownloader;
use crate::orchestrator::Orchestrator;
use crate::pipeline::ArchivePipeline;
use crate::progress::ProgressReporter;
use crate::retry::RetryPolicy;
use crate::transform::TsvToParquetTransformer;
use crate::verify::Sha256Verifier;

pub use orchestrator::RunReport;
pub use pipeline::PipelineFailure;

/// Wire the production components from validated settings
pub fn build_orchestrator(settings: &Settings, force_check: bool) -> Result<Orchestrator> {
    let p = &settings.preloader;
    let client = client::build_http_client(p.timeout())?;
    let retry = RetryPolicy::new(&p.retry);
    let progress = ProgressReporter::new(p.show_progress);

    let catalog = HttpCatalog::new(client.clone(), &p.api_base_url, p.api_token.clone(), retry.clone())?;
    let downloader = HttpDownloader::new(
        client,
        p.dump_token.clone(),
        p.downloader.chunk_size,
        retry,
        progress.clone(),
    )?;
    let verifier = Sha256Verifier::new(p.hasher.chunk_size, force_check);
    let transformer = TsvToParquetTransformer::new(p.processor.required_columns.clone(), p.processor.chunk_size)?;

    let pipeline = ArchivePipeline::new(
        Arc::new(downloader),
        Arc::new(verifier),
        Arc::new(transformer),
        &settings.paths.download_cache_dir,
        &settings.paths.raw_data_dir,
    )
    .with_discard_corrupt(p.discard_corrupt_archives);

    Ok(Orchestrator::new(Arc::new(catalog), pipeline, p.concurrent_downloads).with_progress(progress))
}
