//! Domain types shared by the preloader crates

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix of in-flight files written next to their final target
pub const PART_SUFFIX: &str = ".part";

/// Suffix of the marker recording a successful checksum verification
pub const VERIFIED_SUFFIX: &str = ".verified";

/// Extension of transformed columnar outputs
pub const OUTPUT_EXTENSION: &str = "parquet";

/// Remote archive as advertised by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    pub url: String,
    pub checksum: String,
    /// Declared compressed size; `None` when the catalog does not know it
    pub size_bytes: Option<u64>,
}

impl ArchiveDescriptor {
    pub fn new(url: impl Into<String>, checksum: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            url: url.into(),
            checksum: checksum.into(),
            size_bytes: size_bytes.filter(|size| *size > 0),
        }
    }

    /// File name of the archive: the last non-empty segment of the URL path
    ///
    /// Returns `None` when the URL cannot be parsed or has no file component.
    pub fn archive_name(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        let name = parsed.path_segments()?.next_back()?;
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }
        Some(name.to_string())
    }

    /// File name of the columnar output derived from [`Self::archive_name`]
    pub fn output_name(&self) -> Option<String> {
        self.archive_name().map(|name| output_name_for(&name))
    }
}

/// Derive the output name from an archive name
///
/// `a.tsv.zst` and `a.tsv` become `a.parquet`; other names drop their last
/// extension.
pub fn output_name_for(archive_name: &str) -> String {
    let mut stem = archive_name;
    if let Some(stripped) = stem.strip_suffix(".zst") {
        stem = stripped;
        for row_ext in [".tsv", ".csv"] {
            if let Some(stripped) = stem.strip_suffix(row_ext) {
                stem = stripped;
                break;
            }
        }
    } else if let Some(stripped) = stem.strip_suffix(".tsv").or_else(|| stem.strip_suffix(".csv")) {
        stem = stripped;
    } else if let Some(file_stem) = Path::new(stem).file_stem().and_then(|s| s.to_str()) {
        stem = file_stem;
    }
    format!("{stem}.{OUTPUT_EXTENSION}")
}

/// `path` with `suffix` appended to its file name (`a.zst` -> `a.zst.part`)
pub fn with_appended_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// A complete, byte-identical local copy of a remote archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArchive {
    pub path: PathBuf,
    pub checksum: String,
}

impl LocalArchive {
    pub fn new(path: impl Into<PathBuf>, checksum: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checksum: checksum.into(),
        }
    }

    /// Sibling marker whose presence means the archive was verified
    pub fn marker_path(&self) -> PathBuf {
        with_appended_suffix(&self.path, VERIFIED_SUFFIX)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A fully written columnar output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedOutput {
    pub path: PathBuf,
}
