//! Tracing setup for the preloader binary
//!
//! Logs go to stderr, to a daily-rotated file, or to both, as text or JSON.
//! The level comes from the settings file and `LOG_*` variables override it.
//! stdout stays free for the run summary.
//!
//! Log with fields rather than formatted messages:
//!
//! ```rust
//! use tracing::warn;
//!
//! let (attempt, delay_ms) = (2, 2000);
//! warn!(archive = "a.tsv.zst", attempt, delay_ms, fault = "timeout", "Transient failure, retrying");
//! ```

use crate::error::{PreloaderError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self as tracing_fmt, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Parse `value` case-insensitively against a table of accepted spellings
fn parse_choice<T: Copy>(what: &str, value: &str, choices: &[(&str, T)]) -> Result<T> {
    let needle = value.trim().to_ascii_lowercase();
    choices
        .iter()
        .find(|(name, _)| *name == needle)
        .map(|(_, choice)| *choice)
        .ok_or_else(|| {
            let accepted: Vec<&str> = choices.iter().map(|(name, _)| *name).collect();
            PreloaderError::config(format!(
                "invalid {what} '{value}', expected one of: {}",
                accepted.join(", ")
            ))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const CHOICES: [(&'static str, LogLevel); 6] = [
        ("trace", LogLevel::Trace),
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("warning", LogLevel::Warn),
        ("error", LogLevel::Error),
    ];

    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = PreloaderError;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice("log level", s, &Self::CHOICES)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // tracing's Level prints upper-case; settings use lower-case
        let level = self.to_tracing_level().to_string().to_ascii_lowercase();
        f.write_str(&level)
    }
}

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl FromStr for LogOutput {
    type Err = PreloaderError;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(
            "log output",
            s,
            &[
                ("console", LogOutput::Console),
                ("stderr", LogOutput::Console),
                ("file", LogOutput::File),
                ("both", LogOutput::Both),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = PreloaderError;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice("log format", s, &[("text", LogFormat::Text), ("json", LogFormat::Json)])
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,
    /// Used only when output includes a file
    pub log_dir: PathBuf,
    /// Daily files are named `<prefix>.<date>`
    pub log_file_prefix: String,
    /// Extra directives such as `reqwest=warn`
    pub filter_directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "preloader".to_string(),
            filter_directives: None,
        }
    }
}

impl LogConfig {
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Override fields from `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`,
    /// `LOG_FILE_PREFIX` and `LOG_FILTER`
    pub fn merge_env(self) -> Result<Self> {
        self.merge_from(|key| std::env::var(key).ok())
    }

    fn merge_from(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(level) = var("LOG_LEVEL") {
            self.level = level.parse()?;
        }
        if let Some(output) = var("LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = var("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = var("LOG_FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }
        if let Some(filter) = var("LOG_FILTER") {
            self.filter_directives = Some(filter);
        }
        Ok(self)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::default().add_directive(self.level.to_tracing_level().into());
        let extra = self.filter_directives.as_deref().unwrap_or_default();
        for directive in extra.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let parsed = directive
                .parse()
                .map_err(|e| PreloaderError::config(format!("bad log filter '{directive}': {e}")))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    pub fn filter_directives(mut self, filter: impl Into<String>) -> Self {
        self.config.filter_directives = Some(filter.into());
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

type PlainLayer<W> =
    tracing_fmt::Layer<Registry, tracing_fmt::format::DefaultFields, tracing_fmt::format::Format, W>;

fn formatted<W>(layer: PlainLayer<W>, format: LogFormat) -> BoxedLayer
where
    W: for<'w> tracing_fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn layers(config: &LogConfig) -> Result<Vec<BoxedLayer>> {
    let mut out = Vec::new();

    if matches!(config.output, LogOutput::Console | LogOutput::Both) {
        let console = tracing_fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE);
        out.push(formatted(console, config.format));
    }

    if matches!(config.output, LogOutput::File | LogOutput::Both) {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Flushes on drop; the subscriber lives until exit.
        std::mem::forget(guard);
        let file = tracing_fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE);
        out.push(formatted(file, config.format));
    }

    Ok(out)
}

/// Install the global subscriber; fails if one is already set
pub fn init_logging(config: &LogConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(layers(config)?)
        .with(config.env_filter()?)
        .try_init()
        .map_err(|e| PreloaderError::config(format!("failed to install tracing subscriber: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_choices() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" warning ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("both".parse::<LogOutput>().unwrap(), LogOutput::Both);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);

        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert!(matches!(err, PreloaderError::Config(_)));
        assert!(err.to_string().contains("expected one of: trace, debug"));
    }

    #[test]
    fn test_level_display_is_lowercase() {
        assert_eq!(LogLevel::Error.to_string(), "error");
        assert_eq!(LogLevel::Info.to_string(), "info");
    }

    #[test]
    fn test_env_overrides_builder() {
        let vars: HashMap<&str, &str> = [
            ("LOG_LEVEL", "trace"),
            ("LOG_FORMAT", "json"),
            ("LOG_FILTER", "hyper=warn"),
        ]
        .into_iter()
        .collect();

        let config = LogConfig::builder()
            .level(LogLevel::Warn)
            .log_file_prefix("preloader-test")
            .build()
            .merge_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Console);
        assert_eq!(config.log_file_prefix, "preloader-test");
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_invalid_env_value_is_config_error() {
        let err = LogConfig::default()
            .merge_from(|key| (key == "LOG_OUTPUT").then(|| "syslog".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_bad_filter_directive_is_rejected() {
        let config = LogConfig::builder().filter_directives("reqwest=[[").build();
        assert!(config.env_filter().is_err());
    }
}
