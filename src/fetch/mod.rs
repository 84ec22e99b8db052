//! Concurrent bulletin fetching.
//!
//! At most `max_workers` requests are in flight at any instant; results flow
//! into a bounded channel (capacity 2 × workers) so a slow consumer throttles
//! the fetch stream instead of buffering unboundedly. Failures are reified as
//! [`FetchOutcome`] values; nothing here aborts the pipeline.

pub mod retry;

use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::config::HttpConfig;
use crate::domain::{BulletinError, Result};
use crate::planner::{MonthLabel, PlannedUrl};

pub use retry::RetryPolicy;

/// One fetched (or failed) bulletin page.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success {
        label: MonthLabel,
        url: String,
        status: u16,
        body: String,
        retries: u32,
    },
    /// 404 on a candidate URL: the bulletin does not exist. Not an error.
    NotFound { label: MonthLabel, url: String },
    Failed {
        label: MonthLabel,
        url: String,
        error: String,
        retries: u32,
    },
    Cancelled { label: MonthLabel, url: String },
}

impl FetchOutcome {
    pub fn label(&self) -> MonthLabel {
        match self {
            FetchOutcome::Success { label, .. }
            | FetchOutcome::NotFound { label, .. }
            | FetchOutcome::Failed { label, .. }
            | FetchOutcome::Cancelled { label, .. } => *label,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchOutcome::Success { url, .. }
            | FetchOutcome::NotFound { url, .. }
            | FetchOutcome::Failed { url, .. }
            | FetchOutcome::Cancelled { url, .. } => url,
        }
    }
}

/// HTTP fetcher around a shared connection pool.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
    max_workers: usize,
    bulletin_budget: Duration,
}

impl Fetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.max_workers)
            .build()
            .map_err(|e| BulletinError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy: RetryPolicy {
                max_retries: config.retries,
                base_backoff: Duration::from_millis(config.retry_base_ms),
                ..RetryPolicy::default()
            },
            max_workers: config.max_workers.max(1),
            bulletin_budget: Duration::from_secs(config.bulletin_budget_seconds),
        })
    }

    /// Shared client handle for callers that issue one-off requests
    /// (current-bulletin discovery).
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Fetch every planned URL with bounded parallelism. Output order is
    /// unspecified; labels preserve input identity.
    pub fn fetch_all(
        &self,
        jobs: Vec<PlannedUrl>,
        cancel: &CancellationToken,
    ) -> mpsc::Receiver<FetchOutcome> {
        let (tx, rx) = mpsc::channel(self.max_workers * 2);
        let fetcher = self.clone();
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let mut results = stream::iter(jobs.into_iter().map(|job| {
                let fetcher = fetcher.clone();
                let cancel = cancel.clone();
                async move { fetcher.fetch_one(job, &cancel).await }
            }))
            .buffer_unordered(fetcher.max_workers);

            while let Some(outcome) = results.next().await {
                // Receiver dropped: consumer is gone, stop fetching.
                if tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    /// Fetch one URL with retries, per-bulletin budget, and cancellation.
    #[instrument(skip(self, cancel), fields(url = %job.url))]
    pub async fn fetch_one(&self, job: PlannedUrl, cancel: &CancellationToken) -> FetchOutcome {
        let PlannedUrl { label, url } = job;

        let attempt_all = {
            let client = self.client.clone();
            let policy = self.policy.clone();
            let target = url.clone();
            async move {
                policy
                    .execute(|| {
                        let client = client.clone();
                        let url = target.clone();
                        async move { request_once(&client, &url).await }
                    })
                    .await
            }
        };

        let budgeted = tokio::time::timeout(self.bulletin_budget, attempt_all);

        let (result, retries) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                trace!("fetch cancelled");
                return FetchOutcome::Cancelled { label, url };
            }
            outcome = budgeted => match outcome {
                Ok(pair) => pair,
                Err(_) => {
                    return FetchOutcome::Failed {
                        label,
                        url,
                        error: format!(
                            "bulletin budget of {:?} exhausted",
                            self.bulletin_budget
                        ),
                        retries: self.policy.max_retries,
                    };
                }
            },
        };

        match result {
            Ok((status, body)) => {
                debug!("Fetched {} ({} bytes)", url, body.len());
                FetchOutcome::Success {
                    label,
                    url,
                    status,
                    body,
                    retries,
                }
            }
            Err(BulletinError::NotFound(_)) => FetchOutcome::NotFound { label, url },
            Err(err) => FetchOutcome::Failed {
                label,
                url,
                error: err.to_string(),
                retries,
            },
        }
    }

    /// Cheap reachability probe (HEAD). Reports whether the URL answers with
    /// a success status without downloading the body.
    pub async fn verify(&self, url: &str) -> Result<bool> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| BulletinError::network(format!("verify {url}: {e}")))?;
        Ok(response.status().is_success())
    }
}

/// One HTTP attempt, classified into the error taxonomy: transport errors and
/// 5xx are retryable `Network`; 404 is `NotFound`; other 4xx are terminal.
async fn request_once(client: &reqwest::Client, url: &str) -> Result<(u16, String)> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| BulletinError::network(format!("transport error: {e}")))?;

    let status = response.status();
    if status.is_success() {
        let body = response
            .text()
            .await
            .map_err(|e| BulletinError::network(format!("body read error: {e}")))?;
        return Ok((status.as_u16(), body));
    }

    if status.as_u16() == 404 {
        return Err(BulletinError::NotFound(url.to_string()));
    }
    if status.is_server_error() {
        return Err(BulletinError::network(format!("HTTP {status}")));
    }
    Err(BulletinError::Internal(format!("HTTP {status} (terminal)")))
}
