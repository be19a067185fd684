//! Preloader configuration
//!
//! Settings are layered: `config/settings.toml`, then the optional
//! `config/.secrets.toml`, then `PRELOADER__SECTION__KEY` environment
//! variables. The result is validated once and passed by value to every
//! component at construction.

use preloader_common::{PreloaderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_SETTINGS_FILE: &str = "config/settings.toml";
pub const DEFAULT_SECRETS_FILE: &str = "config/.secrets.toml";
pub const ENV_PREFIX: &str = "PRELOADER";

pub const DEFAULT_API_BASE_URL: &str = "https://api.3xpl.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 4;
pub const DEFAULT_DOWNLOAD_CHUNK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_HASH_CHUNK_SIZE: usize = preloader_common::checksum::DEFAULT_HASH_CHUNK_SIZE;
pub const DEFAULT_PROCESS_CHUNK_ROWS: usize = 1_000_000;

/// Top-level settings document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingSettings,
    pub paths: PathSettings,
    pub preloader: PreloaderSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root for downloaded archives and their markers
    pub download_cache_dir: PathBuf,
    /// Root for transformed columnar files
    pub raw_data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloaderSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub dump_token: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(default)]
    pub show_progress: bool,
    /// Delete an archive whose checksum does not match so the next run refetches it
    #[serde(default = "default_true")]
    pub discard_corrupt_archives: bool,
    #[serde(default)]
    pub downloader: DownloaderSettings,
    #[serde(default)]
    pub hasher: HasherSettings,
    pub processor: ProcessorSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl PreloaderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderSettings {
    /// Bytes buffered before each disk write
    #[serde(default = "default_download_chunk_size")]
    pub chunk_size: usize,
}

impl Default for DownloaderSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_DOWNLOAD_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasherSettings {
    /// Bytes read per digest update
    #[serde(default = "default_hash_chunk_size")]
    pub chunk_size: usize,
}

impl Default for HasherSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_HASH_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorSettings {
    /// Rows per columnar batch
    #[serde(default = "default_process_chunk_rows")]
    pub chunk_size: usize,
    /// Ordered column names of every input row
    pub required_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_concurrent_downloads() -> usize {
    DEFAULT_CONCURRENT_DOWNLOADS
}

fn default_download_chunk_size() -> usize {
    DEFAULT_DOWNLOAD_CHUNK_SIZE
}

fn default_hash_chunk_size() -> usize {
    DEFAULT_HASH_CHUNK_SIZE
}

fn default_process_chunk_rows() -> usize {
    DEFAULT_PROCESS_CHUNK_ROWS
}

fn default_true() -> bool {
    true
}

/// Reject empty tokens and unedited template placeholders
pub fn validate_token(name: &str, token: &str) -> Result<()> {
    if token.trim().is_empty() || token.to_uppercase().contains("YOUR_") {
        return Err(PreloaderError::config(format!(
            "{name} is missing or is a placeholder; set it in {DEFAULT_SECRETS_FILE} or {ENV_PREFIX}__PRELOADER__{}",
            name.to_uppercase()
        )));
    }
    Ok(())
}

impl Settings {
    /// Load and validate settings from the given files plus the environment
    pub fn load(settings_file: &Path, secrets_file: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let raw = config::Config::builder()
            .add_source(config::File::from(settings_file).required(true))
            .add_source(config::File::from(secrets_file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("preloader.processor.required_columns")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PreloaderError::config(e.to_string()))?;

        let settings: Settings = raw
            .try_deserialize()
            .map_err(|e| PreloaderError::config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every invariant components rely on
    pub fn validate(&self) -> Result<()> {
        let p = &self.preloader;

        for (name, value) in [
            ("concurrent_downloads", p.concurrent_downloads),
            ("downloader.chunk_size", p.downloader.chunk_size),
            ("hasher.chunk_size", p.hasher.chunk_size),
            ("processor.chunk_size", p.processor.chunk_size),
        ] {
            if value == 0 {
                return Err(PreloaderError::config(format!("{name} must be greater than 0")));
            }
        }
        if p.timeout == 0 {
            return Err(PreloaderError::config("timeout must be greater than 0"));
        }

        if p.processor.required_columns.is_empty() {
            return Err(PreloaderError::config("processor.required_columns cannot be empty"));
        }
        let mut seen = HashSet::new();
        for column in &p.processor.required_columns {
            if column.trim().is_empty() {
                return Err(PreloaderError::config("column names cannot be empty"));
            }
            if !seen.insert(column.as_str()) {
                return Err(PreloaderError::config(format!("duplicate column '{column}'")));
            }
        }

        if p.retry.attempts == 0 {
            return Err(PreloaderError::config("retry.attempts must be at least 1"));
        }
        if p.retry.max_delay_ms < p.retry.base_delay_ms {
            return Err(PreloaderError::config(
                "retry.max_delay_ms cannot be lower than retry.base_delay_ms",
            ));
        }
        if !(p.retry.multiplier >= 1.0 && p.retry.multiplier.is_finite()) {
            return Err(PreloaderError::config("retry.multiplier must be a finite value >= 1"));
        }

        if self.paths.download_cache_dir == self.paths.raw_data_dir {
            return Err(PreloaderError::config(
                "download_cache_dir and raw_data_dir must be different directories",
            ));
        }

        url::Url::parse(&p.api_base_url)
            .map_err(|e| PreloaderError::config(format!("invalid api_base_url: {e}")))?;
        validate_token("api_token", &p.api_token)?;
        validate_token("dump_token", &p.dump_token)?;

        if self.logging.level.parse::<preloader_common::logging::LogLevel>().is_err() {
            return Err(PreloaderError::config(format!(
                "invalid logging.level '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;

    const SETTINGS: &str = r#"
[logging]
level = "debug"

[paths]
download_cache_dir = "data/cache"
raw_data_dir = "data/raw"

[preloader]
api_token = "YOUR_API_TOKEN"
dump_token = "YOUR_DUMP_TOKEN"
concurrent_downloads = 2

[preloader.downloader]
chunk_size = 4096

[preloader.processor]
chunk_size = 10
required_columns = ["block", "hash", "amount"]
"#;

    const SECRETS: &str = r#"
[preloader]
api_token = "real-api"
dump_token = "real-dump"
"#;

    fn write_files(dir: &tempfile::TempDir, secrets: Option<&str>) -> (PathBuf, PathBuf) {
        let settings = dir.path().join("settings.toml");
        let secrets_path = dir.path().join(".secrets.toml");
        fs::write(&settings, SETTINGS).unwrap();
        if let Some(body) = secrets {
            fs::write(&secrets_path, body).unwrap();
        }
        (settings, secrets_path)
    }

    #[test]
    fn test_secrets_override_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, secrets) = write_files(&dir, Some(SECRETS));

        let loaded = Settings::load(&settings, &secrets).unwrap();
        assert_eq!(loaded.preloader.api_token, "real-api");
        assert_eq!(loaded.preloader.concurrent_downloads, 2);
        assert_eq!(loaded.preloader.downloader.chunk_size, 4096);
        assert_eq!(loaded.preloader.hasher.chunk_size, DEFAULT_HASH_CHUNK_SIZE);
        assert_eq!(loaded.preloader.retry, RetrySettings::default());
        assert!(loaded.preloader.discard_corrupt_archives);
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_placeholder_tokens_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, secrets) = write_files(&dir, None);

        let err = Settings::load(&settings, &secrets).unwrap_err();
        assert!(matches!(err, PreloaderError::Config(_)));
        assert!(err.to_string().contains("api_token"));
    }

    #[test]
    fn test_missing_settings_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("nope.toml"), &dir.path().join("x.toml"))
            .unwrap_err();
        assert!(matches!(err, PreloaderError::Config(_)));
    }

    fn valid() -> Settings {
        let dir = tempfile::tempdir().unwrap();
        let (settings, secrets) = write_files(&dir, Some(SECRETS));
        Settings::load(&settings, &secrets).unwrap()
    }

    #[test]
    fn test_validation_rules() {
        let mut s = valid();
        s.preloader.concurrent_downloads = 0;
        assert!(s.validate().is_err());

        let mut s = valid();
        s.preloader.processor.required_columns.push("hash".into());
        assert!(s.validate().unwrap_err().to_string().contains("duplicate"));

        let mut s = valid();
        s.preloader.processor.required_columns.clear();
        assert!(s.validate().is_err());

        let mut s = valid();
        s.paths.raw_data_dir = s.paths.download_cache_dir.clone();
        assert!(s.validate().is_err());

        let mut s = valid();
        s.preloader.retry.max_delay_ms = 10;
        assert!(s.validate().is_err());

        let mut s = valid();
        s.preloader.retry.multiplier = 0.5;
        assert!(s.validate().is_err());
    }
}
