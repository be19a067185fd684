//! HTTP plumbing shared by the catalog client and the downloader

use preloader_common::{PreloaderError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

use crate::retry::FaultKind;

pub const USER_AGENT: &str = concat!("preloader/", env!("CARGO_PKG_VERSION"));

/// Failure of one network attempt, before retry classification
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("size mismatch: wrote {written} bytes, expected {declared}")]
    SizeMismatch { written: u64, declared: u64 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Transient class of this error, or `None` if retrying cannot help
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            FetchError::Http(err) => classify_reqwest(err),
            FetchError::SizeMismatch { .. } | FetchError::Malformed(_) | FetchError::Io(_) => None,
        }
    }
}

/// Statuses worth retrying: server errors, request timeout, rate limiting
pub fn is_retriable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify_reqwest(err: &reqwest::Error) -> Option<FaultKind> {
    if err.is_timeout() {
        return Some(FaultKind::Timeout);
    }
    if err.is_connect() {
        return Some(FaultKind::Connect);
    }
    if let Some(status) = err.status() {
        return is_retriable_status(status).then_some(FaultKind::Status(status.as_u16()));
    }
    if err.is_body() {
        return Some(FaultKind::Stream);
    }
    if err.is_request() {
        return Some(FaultKind::Connect);
    }
    None
}

/// Build the shared client with the configured per-request timeout
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PreloaderError::config(format!("failed to build HTTP client: {e}")))
}
