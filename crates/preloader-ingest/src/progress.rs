//! Progress bars for downloads and the overall run
//!
//! Bars are drawn on stderr through a shared [`MultiProgress`]. With progress
//! disabled every bar is hidden, so callers never branch on the setting.

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};

const DOWNLOAD_TEMPLATE: &str =
    "{msg:30!} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const DOWNLOAD_UNSIZED_TEMPLATE: &str = "{spinner:.green} {msg:30!} {bytes} ({bytes_per_sec})";
const OVERALL_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{wide_bar:.green}] {pos}/{len}";

#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    multi: Option<MultiProgress>,
}

impl ProgressReporter {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: enabled.then(MultiProgress::new),
        }
    }

    pub fn hidden() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.multi.is_some()
    }

    /// Byte counter for one archive; a spinner when the size is unknown
    pub fn download_bar(&self, size: Option<u64>, name: &str) -> ProgressBar {
        let Some(multi) = &self.multi else {
            return ProgressBar::hidden();
        };
        let pb = match size {
            Some(total) => {
                let pb = ProgressBar::new(total);
                pb.set_style(style(DOWNLOAD_TEMPLATE, ProgressStyle::default_bar()).progress_chars("#>-"));
                pb
            },
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(style(DOWNLOAD_UNSIZED_TEMPLATE, ProgressStyle::default_spinner()));
                pb
            },
        };
        pb.set_message(name.to_string());
        multi.add(pb)
    }

    /// Count of archives that reached a terminal state
    pub fn overall_bar(&self, total: u64) -> ProgressBar {
        let Some(multi) = &self.multi else {
            return ProgressBar::hidden();
        };
        let pb = ProgressBar::new(total);
        pb.set_style(style(OVERALL_TEMPLATE, ProgressStyle::default_bar()).progress_chars("=> "));
        pb.set_message("archives");
        multi.add(pb)
    }
}

fn style(template: &str, fallback: ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or(fallback)
}

/// Binary-prefixed size for log fields, e.g. `1.50 KiB`
pub fn format_bytes(bytes: u64) -> String {
    HumanBytes(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(1_073_741_824), "1.00 GiB");
    }

    #[test]
    fn test_disabled_reporter_hides_bars() {
        let reporter = ProgressReporter::hidden();
        assert!(!reporter.is_enabled());
        assert!(reporter.download_bar(Some(10), "a.tsv.zst").is_hidden());
        assert!(reporter.overall_bar(3).is_hidden());
    }

    #[test]
    fn test_sized_download_bar() {
        let reporter = ProgressReporter::new(true);
        let pb = reporter.download_bar(Some(1024), "a.tsv.zst");
        assert_eq!(pb.length(), Some(1024));
        pb.finish_and_clear();
    }
}
