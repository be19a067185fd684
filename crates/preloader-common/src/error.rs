//! Error types for the preloader
//!
//! `Config` and `Catalog` abort a whole run. The remaining variants are scoped
//! to a single archive's pipeline and are collected by the orchestrator.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for preloader operations
pub type Result<T> = std::result::Result<T, PreloaderError>;

/// Main error type for the preloader
#[derive(Error, Debug)]
pub enum PreloaderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    Verification {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Failed to process {}: {message}", path.display())]
    Processing { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PreloaderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn processing(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Processing {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Short stable name of the failure class, used in run summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::Catalog(_) => "catalog",
            Self::Download { .. } => "download",
            Self::Verification { .. } => "verification",
            Self::Processing { .. } => "processing",
            Self::Io(_) => "io",
        }
    }

    /// Whether this error aborts the whole run rather than one archive
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Catalog(_))
    }
}
