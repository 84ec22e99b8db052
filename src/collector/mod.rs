//! Orchestration of the ingestion pipeline.
//!
//! The collector is the single funnel into the repository: fetch workers
//! return values, and this module alone decides per-bulletin and run-level
//! outcomes. Failures are isolated per bulletin; a run always ends with a
//! [`RunReport`].

pub mod report;

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::domain::{BulletinError, Result};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::normalizer::{self, NormalizedBulletin};
use crate::parser;
use crate::planner::{self, MonthLabel, PlannedUrl};
use crate::storage::{gzip_bytes, BulletinRepository};

pub use report::{FailedBulletin, FailureKind, QuarantinedBulletin, RunReport};

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    /// Re-ingest months that are already stored.
    pub force: bool,
    /// Probe candidate URLs with HEAD before downloading.
    pub verify: bool,
}

/// Re-normalization summary produced by [`Collector::validate_stored`].
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checked: usize,
    /// Months whose stored entries differ from a fresh parse of the retained
    /// document.
    pub mismatched: Vec<MonthLabel>,
    /// Months rewritten because `fix` was requested.
    pub fixed: usize,
    pub errors: Vec<(MonthLabel, String)>,
}

pub struct Collector {
    repo: Arc<dyn BulletinRepository>,
    fetcher: Fetcher,
    config: Config,
}

impl Collector {
    pub fn new(repo: Arc<dyn BulletinRepository>, config: Config) -> Result<Self> {
        let fetcher = Fetcher::new(&config.http)?;
        Ok(Self {
            repo,
            fetcher,
            config,
        })
    }

    /// Historical backfill over a fiscal-year range.
    #[instrument(skip(self, cancel))]
    pub async fn collect(
        &self,
        fy_from: i32,
        fy_to: i32,
        opts: CollectOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let mut run = RunReport::new();
        info!(run_id = %run.run_id, "Starting backfill FY{fy_from}..FY{fy_to}");

        let planned: Vec<PlannedUrl> =
            planner::plan_range(&self.config.source.base_url, fy_from, fy_to)?.collect();
        run.attempted = planned.len();

        // Resume: skip months the repository already holds.
        let existing: HashSet<(i32, u32)> = if opts.force {
            HashSet::new()
        } else {
            self.repo.existing_months(fy_from, fy_to).await?
        };

        let mut jobs = Vec::with_capacity(planned.len());
        for job in planned {
            if existing.contains(&(job.label.year, job.label.month)) {
                run.skipped += 1;
            } else {
                jobs.push(job);
            }
        }

        if opts.verify {
            self.verify_urls(&jobs).await;
        }

        let mut rx = self.fetcher.fetch_all(jobs, cancel);
        while let Some(outcome) = rx.recv().await {
            self.handle_outcome(outcome, &mut run).await;
            // Cancellation check between bulletins: in-flight work already
            // committed stays committed.
            if cancel.is_cancelled() {
                run.cancelled = true;
                break;
            }
        }
        if cancel.is_cancelled() {
            run.cancelled = true;
        }

        run.finish();
        info!(
            run_id = %run.run_id,
            stored = run.stored,
            skipped = run.skipped,
            failed = run.failed.len(),
            quarantined = run.quarantined.len(),
            cancelled = run.cancelled,
            "Backfill finished"
        );
        Ok(run)
    }

    /// Monthly refresh: discover and ingest the current bulletin. At most one
    /// bulletin is ingested; repeated invocations within a month are
    /// idempotent by upsert semantics.
    #[instrument(skip(self, cancel))]
    pub async fn fetch_current(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let mut run = RunReport::new();
        info!(run_id = %run.run_id, "Fetching current bulletin");

        let job = planner::discover_current(self.fetcher.client(), &self.config.source.base_url)
            .await?;
        run.attempted = 1;

        let outcome = self.fetcher.fetch_one(job, cancel).await;
        self.handle_outcome(outcome, &mut run).await;
        if cancel.is_cancelled() {
            run.cancelled = true;
        }

        run.finish();
        Ok(run)
    }

    /// Re-run the normalization pipeline over retained raw documents and
    /// compare against what is stored. With `fix`, mismatched months are
    /// rewritten.
    pub async fn validate_stored(&self, fix: bool) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        for (year, month) in self.repo.months_with_raw_html().await? {
            let label = MonthLabel::new(year, month);
            report.checked += 1;

            let result = self.revalidate_month(label, fix).await;
            match result {
                Ok(None) => {}
                Ok(Some(fixed)) => {
                    report.mismatched.push(label);
                    if fixed {
                        report.fixed += 1;
                    }
                }
                Err(err) => report.errors.push((label, err.to_string())),
            }
        }

        Ok(report)
    }

    /// Returns `Ok(None)` when stored entries match a fresh parse,
    /// `Ok(Some(fixed))` on mismatch.
    async fn revalidate_month(&self, label: MonthLabel, fix: bool) -> Result<Option<bool>> {
        let compressed = self
            .repo
            .get_raw_html(label.year, label.month)
            .await?
            .ok_or_else(|| BulletinError::NotFound(label.to_string()))?;
        let html = String::from_utf8_lossy(&crate::storage::gunzip_bytes(&compressed)?).into_owned();

        let stored_bulletin = self
            .repo
            .get_bulletin(label.year, label.month)
            .await?
            .ok_or_else(|| BulletinError::NotFound(label.to_string()))?;

        let parsed = parser::parse_bulletin(&html, label, &stored_bulletin.source_url)?;
        let normalized = normalizer::normalize(parsed, &self.config.quality)?;

        let stored = self.repo.get_entries(label.year, label.month).await?;
        if entries_match(&stored, &normalized.entries) {
            return Ok(None);
        }

        warn!(bulletin = %label, "stored entries differ from re-normalized parse");
        if fix {
            self.repo
                .upsert_bulletin(&normalized.bulletin, &normalized.entries, None)
                .await?;
            return Ok(Some(true));
        }
        Ok(Some(false))
    }

    async fn verify_urls(&self, jobs: &[PlannedUrl]) {
        let concurrency = self.fetcher.max_workers();
        stream::iter(jobs)
            .for_each_concurrent(concurrency, |job| async move {
                match self.fetcher.verify(&job.url).await {
                    Ok(true) => {}
                    Ok(false) => info!(bulletin = %job.label, url = %job.url, "URL probe: unreachable"),
                    Err(err) => warn!(bulletin = %job.label, "URL probe failed: {err}"),
                }
            })
            .await;
    }

    async fn handle_outcome(&self, outcome: FetchOutcome, run: &mut RunReport) {
        match outcome {
            FetchOutcome::Success {
                label,
                url,
                body,
                retries,
                ..
            } => {
                run.fetched += 1;
                let budget = Duration::from_secs(self.config.http.bulletin_budget_seconds);
                let timed_out = {
                    let ingest = self.ingest_one(label, &url, &body, run);
                    tokio::time::timeout(budget, ingest).await.is_err()
                };
                if timed_out {
                    run.failed.push(FailedBulletin {
                        label,
                        url,
                        error: format!("per-bulletin budget of {budget:?} exhausted"),
                        retries,
                        kind: FailureKind::Storage,
                    });
                }
            }
            FetchOutcome::NotFound { label, url } => {
                info!(bulletin = %label, url = %url, "bulletin does not exist (404)");
                run.missing += 1;
            }
            FetchOutcome::Failed {
                label,
                url,
                error,
                retries,
            } => {
                warn!(bulletin = %label, retries, "fetch failed: {error}");
                run.failed.push(FailedBulletin {
                    label,
                    url,
                    error,
                    retries,
                    kind: FailureKind::Network,
                });
            }
            FetchOutcome::Cancelled { .. } => {
                run.cancelled = true;
            }
        }
    }

    /// Parse → normalize → persist one fetched document. Failures land in
    /// the report; nothing propagates.
    async fn ingest_one(&self, label: MonthLabel, url: &str, body: &str, run: &mut RunReport) {
        let parsed = match parser::parse_bulletin(body, label, url) {
            Ok(parsed) => parsed,
            Err(err) => {
                run.failed.push(FailedBulletin {
                    label,
                    url: url.to_string(),
                    error: err.to_string(),
                    retries: 0,
                    kind: FailureKind::Parse,
                });
                return;
            }
        };
        run.parsed += 1;

        let rate = parsed.date_parse_rate;
        let normalized: NormalizedBulletin =
            match normalizer::normalize(parsed, &self.config.quality) {
                Ok(normalized) => normalized,
                Err(BulletinError::Quality { reason, rate }) => {
                    run.quarantined.push(QuarantinedBulletin {
                        label,
                        reason,
                        date_parse_rate: rate,
                    });
                    return;
                }
                Err(err) => {
                    run.failed.push(FailedBulletin {
                        label,
                        url: url.to_string(),
                        error: err.to_string(),
                        retries: 0,
                        kind: FailureKind::Parse,
                    });
                    return;
                }
            };

        let raw = match gzip_bytes(body.as_bytes()) {
            Ok(compressed) => Some(compressed),
            Err(err) => {
                warn!(bulletin = %label, "raw HTML compression failed: {err}; storing without it");
                None
            }
        };

        match self
            .repo
            .upsert_bulletin(&normalized.bulletin, &normalized.entries, raw.as_deref())
            .await
        {
            Ok(_) => {
                run.stored += 1;
                info!(
                    bulletin = %label,
                    entries = normalized.entries.len(),
                    rate,
                    "bulletin stored"
                );
            }
            Err(err) => {
                run.failed.push(FailedBulletin {
                    label,
                    url: url.to_string(),
                    error: err.to_string(),
                    retries: 0,
                    kind: FailureKind::Storage,
                });
            }
        }
    }
}

fn entries_match(
    stored: &[crate::domain::CategoryEntry],
    fresh: &[crate::domain::CategoryEntry],
) -> bool {
    let project = |entries: &[crate::domain::CategoryEntry]| {
        let mut keys: Vec<_> = entries
            .iter()
            .map(|e| (e.category, e.country, e.chart, e.status, e.priority_date))
            .collect();
        keys.sort_unstable();
        keys
    };
    project(stored) == project(fresh)
}
