//! Catalog of remote dumps
//!
//! The catalog is queried once per run. Its answer is flattened into
//! [`ArchiveDescriptor`]s; entries the pipeline cannot act on are dropped here.

use async_trait::async_trait;
use preloader_common::{ArchiveDescriptor, PreloaderError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::client::FetchError;
use crate::config::validate_token;
use crate::retry::RetryPolicy;

const DUMPS_ENDPOINT: &str = "/dumps";

/// Which dumps the catalog should return per module
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DownloadMode {
    /// Only the most recent dump of each module
    Latest,
    /// Every dump the catalog still serves
    All,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadMode::Latest => "latest",
            DownloadMode::All => "all",
        }
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the archives a run should process
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_archives(
        &self,
        modules: &[String],
        mode: DownloadMode,
    ) -> Result<Vec<ArchiveDescriptor>>;
}

// ============================================================================
// API models
// ============================================================================

/// One dump entry; historical entries may carry nulls
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DumpDetails {
    pub link: Option<String>,
    pub checksum: Option<String>,
    pub compressed_size: Option<u64>,
    pub uncompressed_size: Option<u64>,
    pub checksum_algo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DumpsData {
    /// date -> dump name -> details
    dumps: BTreeMap<String, BTreeMap<String, DumpDetails>>,
}

#[derive(Debug, Deserialize)]
struct ApiContext {
    code: i64,
    notice: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: DumpsData,
    context: ApiContext,
}

// ============================================================================
// HTTP catalog
// ============================================================================

pub struct HttpCatalog {
    client: Client,
    endpoint: String,
    token: String,
    retry: RetryPolicy,
}

impl HttpCatalog {
    pub fn new(
        client: Client,
        base_url: &str,
        token: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let token = token.into();
        validate_token("api_token", &token)?;
        Ok(Self {
            client,
            endpoint: format!("{}{DUMPS_ENDPOINT}", base_url.trim_end_matches('/')),
            token,
            retry,
        })
    }

    async fn fetch(
        &self,
        from: &str,
        mode: DownloadMode,
    ) -> std::result::Result<ApiResponse, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.token)
            .query(&[("from", from), ("mode", mode.as_str())])
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn list_archives(
        &self,
        modules: &[String],
        mode: DownloadMode,
    ) -> Result<Vec<ArchiveDescriptor>> {
        let from = modules.join(",");
        info!(modules = %from, %mode, "Fetching dump catalog");

        let response = self
            .retry
            .run("catalog", || self.fetch(&from, mode), FetchError::fault_kind)
            .await
            .map_err(|e| PreloaderError::catalog(format!("failed to fetch dump catalog: {e}")))?;

        if response.context.code != 200 {
            let notice = response
                .context
                .notice
                .unwrap_or_else(|| "Unknown API error".to_string());
            return Err(PreloaderError::catalog(format!(
                "API code {}: {notice}",
                response.context.code
            )));
        }

        let descriptors = flatten_dumps(response.data.dumps);
        info!(count = descriptors.len(), "Catalog listed archives");
        Ok(descriptors)
    }
}

/// Map catalog entries to descriptors, skipping unusable ones
fn flatten_dumps(dumps: BTreeMap<String, BTreeMap<String, DumpDetails>>) -> Vec<ArchiveDescriptor> {
    let mut descriptors = Vec::new();
    for (date, entries) in dumps {
        for (name, details) in entries {
            let Some(link) = details.link.filter(|l| !l.is_empty()) else {
                debug!(%date, dump = %name, "Skipping dump without link");
                continue;
            };
            let Some(checksum) = details.checksum.filter(|c| !c.trim().is_empty()) else {
                warn!(%date, dump = %name, url = %link, "Skipping dump without checksum");
                continue;
            };
            if let Some(algo) = details.checksum_algo.as_deref() {
                if !algo.eq_ignore_ascii_case("sha256") && !algo.eq_ignore_ascii_case("sha-256") {
                    warn!(%date, dump = %name, algo, "Unexpected checksum algorithm, verifying as SHA-256");
                }
            }
            descriptors.push(ArchiveDescriptor::new(link, checksum, details.compressed_size));
        }
    }
    descriptors
}
