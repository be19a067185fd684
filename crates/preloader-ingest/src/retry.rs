//! Bounded exponential-backoff retry for transient network faults

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetrySettings;

/// Class of a transient fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Connect,
    Timeout,
    /// Retriable HTTP status (5xx, 408, 429)
    Status(u16),
    /// Response body broke off mid-stream
    Stream,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Connect => f.write_str("connect"),
            FaultKind::Timeout => f.write_str("timeout"),
            FaultKind::Status(code) => write!(f, "status {code}"),
            FaultKind::Stream => f.write_str("stream"),
        }
    }
}

/// Emitted before each backoff sleep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEvent {
    pub operation: String,
    /// Number of the attempt that just failed, starting at 1
    pub attempt: u32,
    pub delay: Duration,
    pub fault: FaultKind,
}

pub type RetryObserver = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

/// Retry combinator shared by the catalog client and the downloader
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    observer: Option<RetryObserver>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier.max(1.0),
            observer: None,
        }
    }

    /// Attach a callback invoked for every retry, in addition to the log event
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the given failed attempt (1-based), capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let delay_ms = (base_ms * self.multiplier.powi(exponent)).min(max_ms);
        Duration::from_millis(delay_ms.max(0.0).round() as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// `classify` returns `Some(kind)` for transient errors. Permanent errors
    /// and the error of the final attempt are returned unchanged.
    pub async fn run<T, E, F, Fut, C>(&self, operation: &str, mut op: F, classify: C) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Option<FaultKind>,
        E: fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(fault) = classify(&err) else {
                        debug!(operation, attempt, error = %err, "Permanent failure, not retrying");
                        return Err(err);
                    };
                    if attempt >= self.max_attempts {
                        warn!(operation, attempt, %fault, error = %err, "Retries exhausted");
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %fault,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    if let Some(observer) = &self.observer {
                        observer(&RetryEvent {
                            operation: operation.to_string(),
                            attempt,
                            delay,
                            fault,
                        });
                    }

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
            }
        }
    }
}
