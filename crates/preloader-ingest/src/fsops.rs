//! Crash-safe file materialization
//!
//! Content is written to `<target>.part` in the target's directory and only
//! renamed onto `<target>` once complete. A [`PartFile`] dropped without
//! [`PartFile::commit`] removes its partial file, which covers errors, panics
//! and cancelled futures alike. A process kill can still leave a `.part`
//! behind; the next [`PartFile::create`] for the same target clears it.

use preloader_common::types::{with_appended_suffix, PART_SUFFIX};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Guard over an in-flight file
#[derive(Debug)]
pub struct PartFile {
    target: PathBuf,
    part: PathBuf,
    committed: bool,
}

impl PartFile {
    /// Reserve the partial path for `target`, creating its directory
    pub fn create(target: impl Into<PathBuf>) -> io::Result<Self> {
        let target = target.into();
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let part = with_appended_suffix(&target, PART_SUFFIX);
        match std::fs::remove_file(&part) {
            Ok(()) => debug!(path = %part.display(), "Removed stale partial file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => return Err(e),
        }
        Ok(Self {
            target,
            part,
            committed: false,
        })
    }

    pub fn part_path(&self) -> &Path {
        &self.part
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Promote the partial file to the target name
    pub fn commit(mut self) -> io::Result<PathBuf> {
        std::fs::rename(&self.part, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }

    /// Async variant of [`PartFile::commit`] for use on the runtime
    pub async fn commit_async(mut self) -> io::Result<PathBuf> {
        tokio::fs::rename(&self.part, &self.target).await?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.part) {
            Ok(()) => debug!(path = %self.part.display(), "Discarded partial file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.part.display(), error = %e, "Failed to remove partial file"),
        }
    }
}

/// `Ok(true)` if `path` exists, without blocking the runtime
pub async fn exists(path: &Path) -> io::Result<bool> {
    tokio::fs::try_exists(path).await
}
