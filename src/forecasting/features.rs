//! Feature extraction for the regressors.
//!
//! The feature layout is versioned; artifacts carry the version and refuse to
//! load across incompatible layouts. The country and category scalars are
//! documented constants of the domain model, not hyperparameters: training
//! never changes them.

use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};

use crate::analytics;
use crate::domain::{
    fiscal_year_for, Country, EntryStatus, SeriesKey, SeriesPoint, VisaCategory,
};

/// Bump when the feature layout changes.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Minimum DATED observations before a real model is consulted.
pub const MIN_OBS: usize = 12;

/// Model id reported when a series is too thin to forecast.
pub const NULL_MODEL_ID: &str = "null-forecaster";

/// Total feature-vector length: fiscal year, 12 month one-hots, days since
/// epoch, two trailing means, volatility, trend ordinal, seasonal factor,
/// country factor, employment indicator, category scalar.
pub const FEATURE_LEN: usize = 22;

/// Fixed chargeability-country scalars.
pub fn country_factor(country: Country) -> f64 {
    match country {
        Country::India => 0.3,
        Country::China => 0.5,
        Country::Mexico => 0.7,
        Country::Philippines => 0.7,
        Country::Worldwide => 1.0,
    }
}

/// Fixed per-category scalars, ordered by queue pressure within each track.
pub fn category_factor(category: VisaCategory) -> f64 {
    match category {
        VisaCategory::Eb1 => 0.9,
        VisaCategory::Eb2 => 0.6,
        VisaCategory::Eb3 => 0.5,
        VisaCategory::Eb3OtherWorkers => 0.4,
        VisaCategory::Eb4 => 0.7,
        VisaCategory::Eb5 => 0.8,
        VisaCategory::F1 => 0.5,
        VisaCategory::F2A => 0.8,
        VisaCategory::F2B => 0.5,
        VisaCategory::F3 => 0.4,
        VisaCategory::F4 => 0.3,
    }
}

/// One supervised example: features at some point in the series, labeled with
/// the next month's priority-date delta in days.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub features: Vec<f64>,
    pub target_delta_days: f64,
}

/// Build the feature vector for predicting `(target_year, target_month)`
/// given the DATED history observed so far.
pub fn build_features(
    key: &SeriesKey,
    target_year: i32,
    target_month: u32,
    history: &[SeriesPoint],
) -> Vec<f64> {
    let summary = analytics::summarize(*key, history, None);
    let summary_12 = analytics::summarize(*key, history, Some(12));
    let summary_3 = analytics::summarize(*key, history, Some(3));

    let last_observed_days = history
        .iter()
        .filter(|p| p.status == EntryStatus::Dated)
        .last()
        .map(|p| days_since_epoch(p.bulletin_date))
        .unwrap_or(0.0);

    let mut features = Vec::with_capacity(FEATURE_LEN);
    features.push(fiscal_year_for(target_year, target_month) as f64);
    for month in 1..=12u32 {
        features.push(if month == target_month { 1.0 } else { 0.0 });
    }
    features.push(last_observed_days);
    features.push(summary_3.mean_monthly_days);
    features.push(summary_12.mean_monthly_days);
    features.push(summary.volatility);
    features.push(summary.trend_direction.ordinal());
    features.push(
        summary
            .seasonal_factors
            .get((target_month - 1) as usize)
            .copied()
            .flatten()
            .unwrap_or(1.0),
    );
    features.push(country_factor(key.country));
    features.push(if key.category.is_employment() { 1.0 } else { 0.0 });
    features.push(category_factor(key.category));

    debug_assert_eq!(features.len(), FEATURE_LEN);
    features
}

/// Sliding supervised examples over a DATED series: features from each
/// prefix, labeled with the delta to the next observation.
pub fn training_examples(key: &SeriesKey, points: &[SeriesPoint]) -> Vec<TrainingExample> {
    let dated: Vec<SeriesPoint> = points
        .iter()
        .filter(|p| p.status == EntryStatus::Dated && p.priority_date.is_some())
        .copied()
        .collect();

    let mut examples = Vec::new();
    for i in 1..dated.len() {
        let prefix = &dated[..i];
        let target = dated[i];
        let previous = dated[i - 1];

        let (Some(prev_date), Some(next_date)) = (previous.priority_date, target.priority_date)
        else {
            continue;
        };

        let features = build_features(
            key,
            target.bulletin_date.year(),
            target.bulletin_date.month(),
            prefix,
        );
        examples.push(TrainingExample {
            features,
            target_delta_days: (next_date - prev_date).num_days() as f64,
        });
    }
    examples
}

fn days_since_epoch(date: NaiveDate) -> f64 {
    (date - NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch")).num_days() as f64
}

/// Hex SHA-256 over the feature schema version and the feature vector, used
/// for staleness detection on stored forecasts.
pub fn features_hash(features: &[f64]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FEATURE_SCHEMA_VERSION.to_le_bytes());
    for value in features {
        hasher.update(value.to_le_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
