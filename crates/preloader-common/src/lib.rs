//! Preloader Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the preloader workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the run-wide error taxonomy
//! - **Checksums**: streaming SHA-256 helpers for archive verification
//! - **Types**: archive descriptors and the on-disk artifacts derived from them
//! - **Logging**: tracing subscriber setup shared by binaries
//!
//! # Example
//!
//! ```no_run
//! use preloader_common::checksum::compute_file_checksum;
//!
//! fn print_digest(path: &str) -> preloader_common::Result<()> {
//!     let digest = compute_file_checksum(path, 64 * 1024)?;
//!     println!("{digest}");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PreloaderError, Result};
pub use types::{ArchiveDescriptor, LocalArchive, TransformedOutput};
