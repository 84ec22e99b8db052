//! Priority-date forecasting.
//!
//! Two interchangeable regressors sit behind the [`Regressor`] trait; the
//! [`Forecaster`] facade binds one to the repository, builds features from
//! stored series, and produces [`Forecast`] values. Artifacts are
//! deterministic JSON carrying the feature schema version; loading an
//! incompatible artifact fails loudly.

pub mod ensemble;
pub mod features;
pub mod logistic;
pub mod metrics;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::analytics::FULL_HISTORY;
use crate::domain::{
    BulletinError, EntryStatus, Forecast, ForecastKey, Result, SeriesKey,
};
use crate::storage::BulletinRepository;

pub use ensemble::{TreeEnsembleRegressor, TREE_ENSEMBLE_MODEL_ID};
pub use features::{
    build_features, features_hash, training_examples, TrainingExample, FEATURE_LEN,
    FEATURE_SCHEMA_VERSION, MIN_OBS, NULL_MODEL_ID,
};
pub use logistic::{ClassifyThenMagnitude, CLASSIFY_MAGNITUDE_MODEL_ID};
pub use metrics::TrainMetrics;

/// Predicted deltas are clamped to one year in either direction.
pub const MAX_DELTA_DAYS: f64 = 365.0;

/// Fraction of examples held out (chronologically last) for training metrics.
const HOLDOUT_SPLIT: f64 = 0.2;

/// A model's raw output for one target month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub delta_days: f64,
    pub confidence: f64,
}

/// The single contract both model variants implement.
pub trait Regressor: Send + Sync {
    fn model_id(&self) -> &'static str;
    fn fit(&mut self, examples: &[TrainingExample]) -> Result<()>;
    fn predict(&self, features: &[f64]) -> Result<Prediction>;
}

/// Closed set of model variants, so artifacts round-trip through serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ModelKind {
    TreeEnsemble(TreeEnsembleRegressor),
    ClassifyMagnitude(ClassifyThenMagnitude),
}

impl Regressor for ModelKind {
    fn model_id(&self) -> &'static str {
        match self {
            ModelKind::TreeEnsemble(model) => model.model_id(),
            ModelKind::ClassifyMagnitude(model) => model.model_id(),
        }
    }

    fn fit(&mut self, examples: &[TrainingExample]) -> Result<()> {
        match self {
            ModelKind::TreeEnsemble(model) => model.fit(examples),
            ModelKind::ClassifyMagnitude(model) => model.fit(examples),
        }
    }

    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        match self {
            ModelKind::TreeEnsemble(model) => model.predict(features),
            ModelKind::ClassifyMagnitude(model) => model.predict(features),
        }
    }
}

/// On-disk model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArtifact {
    pub feature_schema_version: u32,
    pub model_id: String,
    pub model: ModelKind,
}

impl ModelArtifact {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let artifact: ModelArtifact = serde_json::from_str(&contents)?;
        if artifact.feature_schema_version != FEATURE_SCHEMA_VERSION {
            return Err(BulletinError::ModelArtifact(format!(
                "feature schema version {} does not match expected {}",
                artifact.feature_schema_version, FEATURE_SCHEMA_VERSION
            )));
        }
        Ok(artifact)
    }
}

/// Repository-backed forecasting facade.
pub struct Forecaster {
    repo: Arc<dyn BulletinRepository>,
    model: ModelKind,
}

impl Forecaster {
    pub fn new(repo: Arc<dyn BulletinRepository>, model: ModelKind) -> Self {
        Self { repo, model }
    }

    pub fn with_tree_ensemble(repo: Arc<dyn BulletinRepository>) -> Self {
        Self::new(repo, ModelKind::TreeEnsemble(TreeEnsembleRegressor::default()))
    }

    pub fn with_classify_magnitude(repo: Arc<dyn BulletinRepository>) -> Self {
        Self::new(repo, ModelKind::ClassifyMagnitude(ClassifyThenMagnitude::default()))
    }

    pub fn model_id(&self) -> &'static str {
        self.model.model_id()
    }

    /// Train on one stored series with a chronological holdout for metrics.
    pub async fn train(&mut self, key: &SeriesKey) -> Result<TrainMetrics> {
        let (fy_from, fy_to) = FULL_HISTORY;
        let points = self.repo.get_series(key, fy_from, fy_to).await?;
        let examples = training_examples(key, &points);

        if examples.len() < MIN_OBS {
            return Err(BulletinError::InsufficientData {
                have: examples.len(),
                need: MIN_OBS,
            });
        }

        let holdout_n = ((examples.len() as f64 * HOLDOUT_SPLIT).round() as usize).max(1);
        let train_n = examples.len() - holdout_n;

        self.model.fit(&examples[..train_n])?;

        let mut predictions = Vec::with_capacity(holdout_n);
        let mut targets = Vec::with_capacity(holdout_n);
        for example in &examples[train_n..] {
            predictions.push(self.model.predict(&example.features)?.delta_days);
            targets.push(example.target_delta_days);
        }
        let (mae_days, rmse_days) = metrics::evaluate(&predictions, &targets);

        info!(
            series = %key,
            model = self.model.model_id(),
            mae_days,
            rmse_days,
            "trained forecaster"
        );
        Ok(TrainMetrics {
            mae_days,
            rmse_days,
            held_out_split: holdout_n as f64 / examples.len() as f64,
            train_examples: train_n,
            holdout_examples: holdout_n,
        })
    }

    /// Produce a forecast for one target month.
    ///
    /// With fewer than [`MIN_OBS`] DATED observations the null forecaster
    /// answers: zero confidence, predicted date pinned to the last
    /// observation.
    pub async fn predict(
        &self,
        key: &SeriesKey,
        target_year: i32,
        target_month: u32,
    ) -> Result<Forecast> {
        let (fy_from, fy_to) = FULL_HISTORY;
        let points = self.repo.get_series(key, fy_from, fy_to).await?;

        let dated: Vec<_> = points
            .iter()
            .filter(|p| p.status == EntryStatus::Dated && p.priority_date.is_some())
            .collect();
        let last_observed: NaiveDate = dated
            .last()
            .and_then(|p| p.priority_date)
            .ok_or(BulletinError::InsufficientData {
                have: 0,
                need: MIN_OBS,
            })?;

        let forecast_key = ForecastKey {
            category: key.category,
            country: key.country,
            chart: key.chart,
            target_year,
            target_month,
        };
        let features = build_features(key, target_year, target_month, &points);
        let hash = features_hash(&features);

        if dated.len() < MIN_OBS {
            debug!(series = %key, observations = dated.len(), "null forecast");
            return Ok(Forecast {
                key: forecast_key,
                predicted_date: last_observed,
                confidence: 0.0,
                model_id: NULL_MODEL_ID.to_string(),
                produced_at: Utc::now(),
                features_hash: hash,
            });
        }

        let prediction = self.model.predict(&features)?;
        let delta = prediction
            .delta_days
            .clamp(-MAX_DELTA_DAYS, MAX_DELTA_DAYS)
            .round() as i64;

        Ok(Forecast {
            key: forecast_key,
            predicted_date: last_observed + Duration::days(delta),
            confidence: prediction.confidence.clamp(0.0, 1.0),
            model_id: self.model.model_id().to_string(),
            produced_at: Utc::now(),
            features_hash: hash,
        })
    }

    /// Persist the trained model as a deterministic artifact.
    pub fn save(&self, path: &Path) -> Result<()> {
        ModelArtifact {
            feature_schema_version: FEATURE_SCHEMA_VERSION,
            model_id: self.model.model_id().to_string(),
            model: self.model.clone(),
        }
        .save(path)
    }

    /// Load an artifact saved by [`Self::save`]. Schema mismatches fail.
    pub fn load(repo: Arc<dyn BulletinRepository>, path: &Path) -> Result<Self> {
        let artifact = ModelArtifact::load(path)?;
        Ok(Self::new(repo, artifact.model))
    }
}
