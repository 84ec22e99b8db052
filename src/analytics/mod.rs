//! Movement statistics over stored series.
//!
//! Pure computation lives in [`summarize`]; [`Analytics`] binds it to the
//! repository. Ordering comes from the repository contract (`get_series` is
//! ascending by bulletin date), but the summary sorts defensively so it can
//! also run over ad-hoc point sets.

use chrono::{Datelike, Months};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{
    EntryStatus, Result, SeriesKey, SeriesPoint, TrendDirection, TrendSummary,
};
use crate::storage::BulletinRepository;

// Trend classification constants: fraction of non-negative deltas for
// ADVANCING, fraction of strictly negative deltas for RETROGRESSING, the
// days-per-month band and volatility ceiling for STABLE.
const ADVANCING_NONNEG_SHARE: f64 = 0.7;
const ADVANCING_MIN_MEAN_DAYS: f64 = 5.0;
const RETROGRESSING_NEG_SHARE: f64 = 0.4;
const STABLE_MEAN_BAND_DAYS: f64 = 5.0;
const STABLE_MAX_VOLATILITY: f64 = 10.0;

/// Widest fiscal-year range the planner accepts; used when a caller wants the
/// full history.
pub const FULL_HISTORY: (i32, i32) = (1990, 2100);

/// Compute a [`TrendSummary`] over one series.
///
/// Only `DATED` observations participate. An empty (or all-Current) series
/// yields the zero summary with a `STABLE` direction; this never errors.
pub fn summarize(
    key: SeriesKey,
    points: &[SeriesPoint],
    window_months: Option<u32>,
) -> TrendSummary {
    let mut dated: Vec<&SeriesPoint> = points
        .iter()
        .filter(|p| p.status == EntryStatus::Dated && p.priority_date.is_some())
        .collect();
    dated.sort_by_key(|p| p.bulletin_date);

    if let (Some(window), Some(last)) = (window_months, dated.last()) {
        let cutoff = last
            .bulletin_date
            .checked_sub_months(Months::new(window))
            .unwrap_or(chrono::NaiveDate::MIN);
        dated.retain(|p| p.bulletin_date > cutoff);
    }

    if dated.is_empty() {
        return TrendSummary::empty(key, window_months);
    }

    // Consecutive priority-date deltas in days; negative on retrogression.
    let deltas: Vec<i64> = dated
        .windows(2)
        .filter_map(|pair| {
            let earlier = pair[0].priority_date?;
            let later = pair[1].priority_date?;
            Some((later - earlier).num_days())
        })
        .collect();

    let total: i64 = deltas.iter().sum();
    let months_observed = deltas.len();
    let mean = if months_observed == 0 {
        0.0
    } else {
        total as f64 / months_observed as f64
    };
    let volatility = population_std_dev(&deltas, mean);

    TrendSummary {
        key,
        window_months,
        start_date: dated.first().map(|p| p.bulletin_date),
        end_date: dated.last().map(|p| p.bulletin_date),
        observations: dated.len(),
        total_advancement_days: total,
        mean_monthly_days: mean,
        volatility,
        trend_direction: classify(&deltas, mean, volatility),
        seasonal_factors: seasonal_factors(&dated, &deltas, mean),
    }
}

fn population_std_dev(deltas: &[i64], mean: f64) -> f64 {
    if deltas.is_empty() {
        return 0.0;
    }
    let variance = deltas
        .iter()
        .map(|d| {
            let diff = *d as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / deltas.len() as f64;
    variance.sqrt()
}

fn classify(deltas: &[i64], mean: f64, volatility: f64) -> TrendDirection {
    if deltas.is_empty() {
        return TrendDirection::Stable;
    }

    let n = deltas.len() as f64;
    let nonneg_share = deltas.iter().filter(|d| **d >= 0).count() as f64 / n;
    let neg_share = deltas.iter().filter(|d| **d < 0).count() as f64 / n;

    if nonneg_share > ADVANCING_NONNEG_SHARE && mean > ADVANCING_MIN_MEAN_DAYS {
        TrendDirection::Advancing
    } else if neg_share > RETROGRESSING_NEG_SHARE {
        TrendDirection::Retrogressing
    } else if mean.abs() <= STABLE_MEAN_BAND_DAYS && volatility < STABLE_MAX_VOLATILITY {
        TrendDirection::Stable
    } else {
        TrendDirection::Mixed
    }
}

/// Ratio of mean-delta-in-month-m to the overall mean, per calendar month.
/// A delta is attributed to the month of the bulletin that announced it.
/// Undefined (`None`) with fewer than two observations in a month, or when
/// the overall mean is zero.
fn seasonal_factors(dated: &[&SeriesPoint], deltas: &[i64], overall_mean: f64) -> Vec<Option<f64>> {
    let mut sums = [0i64; 12];
    let mut counts = [0usize; 12];

    for (i, delta) in deltas.iter().enumerate() {
        let month_index = dated[i + 1].bulletin_date.month0() as usize;
        sums[month_index] += delta;
        counts[month_index] += 1;
    }

    (0..12)
        .map(|m| {
            if counts[m] < 2 || overall_mean == 0.0 {
                None
            } else {
                Some((sums[m] as f64 / counts[m] as f64) / overall_mean)
            }
        })
        .collect()
}

/// Repository-backed analytics facade.
pub struct Analytics {
    repo: Arc<dyn BulletinRepository>,
}

impl Analytics {
    pub fn new(repo: Arc<dyn BulletinRepository>) -> Self {
        Self { repo }
    }

    pub async fn analyze_series(
        &self,
        key: SeriesKey,
        window_months: Option<u32>,
    ) -> Result<TrendSummary> {
        let (fy_from, fy_to) = FULL_HISTORY;
        let points = self.repo.get_series(&key, fy_from, fy_to).await?;
        debug!(series = %key, points = points.len(), "analyzing series");
        Ok(summarize(key, &points, window_months))
    }

    /// Concurrent fan-out of [`Self::analyze_series`] over several keys.
    pub async fn compare_categories(
        &self,
        keys: &[SeriesKey],
        window_months: Option<u32>,
    ) -> Result<Vec<TrendSummary>> {
        try_join_all(
            keys.iter()
                .map(|key| self.analyze_series(*key, window_months)),
        )
        .await
    }
}
