//! Preloader - bulk dump ingestion tool

use anyhow::Result;
use clap::Parser;
use preloader_common::logging::{init_logging, LogConfig, LogLevel};
use preloader_ingest::build_orchestrator;
use preloader_ingest::catalog::DownloadMode;
use preloader_ingest::config::{Settings, DEFAULT_SECRETS_FILE, DEFAULT_SETTINGS_FILE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "preloader")]
#[command(author, version, about = "Download, verify and convert blockchain dumps to Parquet")]
struct Cli {
    /// Modules (blockchains) to fetch dumps for
    #[arg(short, long, num_args = 1.., value_delimiter = ',', required = true)]
    modules: Vec<String>,

    /// Which dumps to fetch per module
    #[arg(long, value_enum, default_value_t = DownloadMode::Latest)]
    mode: DownloadMode,

    /// Re-hash archives even when a verification marker exists
    #[arg(long)]
    force_check: bool,

    /// Settings file
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE, env = "PRELOADER_SETTINGS")]
    config: PathBuf,

    /// Secrets file layered over the settings
    #[arg(long, default_value = DEFAULT_SECRETS_FILE, env = "PRELOADER_SECRETS")]
    secrets: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config, &cli.secrets);

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        settings
            .as_ref()
            .ok()
            .and_then(|s| s.logging.level.parse().ok())
            .unwrap_or(LogLevel::Info)
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("preloader")
        .filter_directives("hyper=warn,reqwest=warn")
        .build()
        .merge_env()?;
    init_logging(&log_config)?;

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Ok(ExitCode::FAILURE);
        },
    };

    let orchestrator = match build_orchestrator(&settings, cli.force_check) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!(error = %e, "Failed to initialize components");
            return Ok(ExitCode::FAILURE);
        },
    };

    let report = match orchestrator.run(&cli.modules, cli.mode).await {
        Ok(report) => report,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Run aborted");
            return Ok(ExitCode::FAILURE);
        },
    };

    println!("{}", report.summary());
    if report.is_success() {
        info!("Preloading complete");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(failed = report.failed.len(), "Preloading finished with failures");
        Ok(ExitCode::FAILURE)
    }
}
