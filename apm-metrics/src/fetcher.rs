//! Snapshot sources polled by the [`Poller`](crate::poller::Poller).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::ApmConfig;
use crate::error::{Error, Result};
use crate::model::Snapshot;
use crate::openmetrics::parse_text;

/// A capability that produces one decoded snapshot per call.
///
/// Errors are opaque to the poller: they are logged and the tick is skipped.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot>;
}

/// Retry schedule for transient fetch failures.
///
/// The wait before retry `n` (0-based) is `wait_min * (n + 1)`, capped at
/// `wait_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub wait_min: Duration,
    pub wait_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub(crate) fn backoff(&self, retry: u32) -> Duration {
        self.wait_min
            .saturating_mul(retry.saturating_add(1))
            .min(self.wait_max)
    }
}

/// Fetches the text exposition over HTTP GET.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    retry: RetryPolicy,
}

impl HttpFetcher {
    /// Builds a fetcher for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a header cannot be encoded or the HTTP
    /// client cannot be built.
    pub fn new(config: &ApmConfig, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("invalid header name {:?}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("invalid value for header {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("could not build http client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            headers,
            retry,
        })
    }

    async fn fetch_body(&self) -> Result<String> {
        let mut retry = 0;
        loop {
            let result = self
                .client
                .get(&self.url)
                .headers(self.headers.clone())
                .send()
                .await;

            let failure = match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp.text().await?),
                Ok(resp) if is_retryable_status(resp.status()) => {
                    Error::Fetch(format!("unexpected http status {}", resp.status()))
                }
                Ok(resp) => {
                    return Err(Error::Fetch(format!(
                        "unexpected http status {}",
                        resp.status()
                    )));
                }
                Err(e) => Error::from(e),
            };

            if retry >= self.retry.max_retries {
                return Err(failure);
            }
            let wait = self.retry.backoff(retry);
            tracing::debug!(
                url = %self.url,
                retry = retry + 1,
                "request failed, retrying in {:?}: {}",
                wait,
                failure
            );
            tokio::time::sleep(wait).await;
            retry += 1;
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<Snapshot> {
        let body = self.fetch_body().await?;
        parse_text(&body)
    }
}
