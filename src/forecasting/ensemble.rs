//! Bagged regression-stump ensemble.
//!
//! Each member is a single-split tree fit on a bootstrap sample over a random
//! feature subset. Prediction is the ensemble mean; confidence shrinks as
//! member predictions disagree. Training is deterministic for a fixed seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{BulletinError, Result};
use super::features::TrainingExample;
use super::{Prediction, Regressor};

pub const TREE_ENSEMBLE_MODEL_ID: &str = "tree-ensemble-v1";

const DEFAULT_TREES: usize = 25;
const FEATURES_PER_STUMP: usize = 6;
/// Variance (days²) at which confidence halves; 30 days of ensemble
/// disagreement is treated as an even bet.
const VARIANCE_SCALE: f64 = 900.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stump {
    feature: usize,
    threshold: f64,
    left_value: f64,
    right_value: f64,
}

impl Stump {
    fn predict(&self, features: &[f64]) -> f64 {
        let value = features.get(self.feature).copied().unwrap_or(0.0);
        if value <= self.threshold {
            self.left_value
        } else {
            self.right_value
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsembleRegressor {
    stumps: Vec<Stump>,
    n_trees: usize,
    seed: u64,
}

impl Default for TreeEnsembleRegressor {
    fn default() -> Self {
        Self::new(DEFAULT_TREES, 42)
    }
}

impl TreeEnsembleRegressor {
    pub fn new(n_trees: usize, seed: u64) -> Self {
        Self {
            stumps: Vec::new(),
            n_trees: n_trees.max(1),
            seed,
        }
    }
}

impl Regressor for TreeEnsembleRegressor {
    fn model_id(&self) -> &'static str {
        TREE_ENSEMBLE_MODEL_ID
    }

    fn fit(&mut self, examples: &[TrainingExample]) -> Result<()> {
        if examples.is_empty() {
            return Err(BulletinError::InsufficientData { have: 0, need: 1 });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let feature_len = examples[0].features.len();

        self.stumps = (0..self.n_trees)
            .map(|_| {
                let sample: Vec<&TrainingExample> = (0..examples.len())
                    .map(|_| &examples[rng.gen_range(0..examples.len())])
                    .collect();
                fit_stump(&sample, feature_len, &mut rng)
            })
            .collect();

        debug!(trees = self.stumps.len(), "fit tree ensemble");
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        if self.stumps.is_empty() {
            return Err(BulletinError::internal("tree ensemble is not trained"));
        }

        let outputs: Vec<f64> = self.stumps.iter().map(|s| s.predict(features)).collect();
        let n = outputs.len() as f64;
        let mean = outputs.iter().sum::<f64>() / n;
        let variance = outputs.iter().map(|o| (o - mean) * (o - mean)).sum::<f64>() / n;

        Ok(Prediction {
            delta_days: mean,
            confidence: (1.0 / (1.0 + variance / VARIANCE_SCALE)).clamp(0.0, 1.0),
        })
    }
}

/// Best single split over a random feature subset, by sum of squared errors.
fn fit_stump(sample: &[&TrainingExample], feature_len: usize, rng: &mut StdRng) -> Stump {
    let overall_mean =
        sample.iter().map(|e| e.target_delta_days).sum::<f64>() / sample.len() as f64;

    let mut best: Option<(f64, Stump)> = None;

    for _ in 0..FEATURES_PER_STUMP.min(feature_len) {
        let feature = rng.gen_range(0..feature_len);

        let mut values: Vec<f64> = sample
            .iter()
            .map(|e| e.features.get(feature).copied().unwrap_or(0.0))
            .collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();

        for window in values.windows(2) {
            let threshold = (window[0] + window[1]) / 2.0;

            let (mut left_sum, mut left_n, mut right_sum, mut right_n) = (0.0, 0usize, 0.0, 0usize);
            for example in sample {
                let v = example.features.get(feature).copied().unwrap_or(0.0);
                if v <= threshold {
                    left_sum += example.target_delta_days;
                    left_n += 1;
                } else {
                    right_sum += example.target_delta_days;
                    right_n += 1;
                }
            }
            if left_n == 0 || right_n == 0 {
                continue;
            }

            let left_mean = left_sum / left_n as f64;
            let right_mean = right_sum / right_n as f64;

            let sse: f64 = sample
                .iter()
                .map(|example| {
                    let v = example.features.get(feature).copied().unwrap_or(0.0);
                    let predicted = if v <= threshold { left_mean } else { right_mean };
                    let err = example.target_delta_days - predicted;
                    err * err
                })
                .sum();

            if best.as_ref().map(|(b, _)| sse < *b).unwrap_or(true) {
                best = Some((
                    sse,
                    Stump {
                        feature,
                        threshold,
                        left_value: left_mean,
                        right_value: right_mean,
                    },
                ));
            }
        }
    }

    // Degenerate sample (constant features): fall back to the mean.
    best.map(|(_, stump)| stump).unwrap_or(Stump {
        feature: 0,
        threshold: f64::INFINITY,
        left_value: overall_mean,
        right_value: overall_mean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(features: Vec<f64>, target: f64) -> TrainingExample {
        TrainingExample {
            features,
            target_delta_days: target,
        }
    }

    fn split_dataset() -> Vec<TrainingExample> {
        // Feature 0 cleanly separates small deltas from large ones.
        (0..40)
            .map(|i| {
                if i % 2 == 0 {
                    example(vec![0.0, 1.0], 10.0)
                } else {
                    example(vec![1.0, 1.0], 50.0)
                }
            })
            .collect()
    }

    #[test]
    fn test_learns_a_clean_split() {
        let mut model = TreeEnsembleRegressor::default();
        model.fit(&split_dataset()).unwrap();

        let low = model.predict(&[0.0, 1.0]).unwrap();
        let high = model.predict(&[1.0, 1.0]).unwrap();
        assert!(low.delta_days < 25.0, "low side predicted {}", low.delta_days);
        assert!(high.delta_days > 35.0, "high side predicted {}", high.delta_days);
    }

    #[test]
    fn test_agreement_gives_high_confidence() {
        let mut model = TreeEnsembleRegressor::default();
        let constant: Vec<TrainingExample> =
            (0..20).map(|_| example(vec![1.0, 2.0], 30.0)).collect();
        model.fit(&constant).unwrap();

        let prediction = model.predict(&[1.0, 2.0]).unwrap();
        assert!((prediction.delta_days - 30.0).abs() < 1e-9);
        assert!(prediction.confidence > 0.99);
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let data = split_dataset();
        let mut a = TreeEnsembleRegressor::new(25, 7);
        let mut b = TreeEnsembleRegressor::new(25, 7);
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();

        let pa = a.predict(&[0.5, 1.0]).unwrap();
        let pb = b.predict(&[0.5, 1.0]).unwrap();
        assert_eq!(pa.delta_days, pb.delta_days);
        assert_eq!(pa.confidence, pb.confidence);
    }

    #[test]
    fn test_untrained_predict_fails() {
        let model = TreeEnsembleRegressor::default();
        assert!(model.predict(&[0.0]).is_err());
    }

    #[test]
    fn test_empty_fit_fails() {
        let mut model = TreeEnsembleRegressor::default();
        assert!(model.fit(&[]).is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut model = TreeEnsembleRegressor::default();
        model.fit(&split_dataset()).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: TreeEnsembleRegressor = serde_json::from_str(&json).unwrap();
        assert_eq!(
            model.predict(&[0.0, 1.0]).unwrap().delta_days,
            restored.predict(&[0.0, 1.0]).unwrap().delta_days
        );
    }
}
