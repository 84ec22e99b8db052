//! Classify-then-magnitude regressor.
//!
//! A softmax classifier first labels the target month ADVANCING / STABLE /
//! RETROGRESSING; a per-class magnitude model then supplies the day delta.
//! Confidence is the class probability discounted by the class's magnitude
//! error: `p × (1 − min(1, mae / MAG_ERROR_SCALE))`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{BulletinError, Result};
use super::features::TrainingExample;
use super::{Prediction, Regressor};

pub const CLASSIFY_MAGNITUDE_MODEL_ID: &str = "classify-magnitude-v1";

/// Days of class-conditional MAE at which magnitude credibility reaches zero.
const MAG_ERROR_SCALE: f64 = 45.0;

/// Deltas within ±5 days/month are the STABLE class, aligned with the trend
/// classifier's band.
const STABLE_BAND_DAYS: f64 = 5.0;

const CLASSES: usize = 3;
const EPOCHS: usize = 300;
const LEARNING_RATE: f64 = 0.1;

const RETROGRESSING: usize = 0;
const STABLE: usize = 1;
const ADVANCING: usize = 2;

fn class_of(delta: f64) -> usize {
    if delta < -STABLE_BAND_DAYS {
        RETROGRESSING
    } else if delta > STABLE_BAND_DAYS {
        ADVANCING
    } else {
        STABLE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyThenMagnitude {
    /// Per-class weight rows, each `feature_len + 1` long (bias last).
    weights: Vec<Vec<f64>>,
    /// Feature standardization parameters captured at fit time.
    feature_means: Vec<f64>,
    feature_stds: Vec<f64>,
    /// Mean signed delta per class.
    class_mean_delta: [f64; CLASSES],
    /// Mean absolute deviation from the class mean, per class.
    class_mae: [f64; CLASSES],
}

impl Default for ClassifyThenMagnitude {
    fn default() -> Self {
        Self {
            weights: Vec::new(),
            feature_means: Vec::new(),
            feature_stds: Vec::new(),
            class_mean_delta: [0.0; CLASSES],
            class_mae: [0.0; CLASSES],
        }
    }
}

impl ClassifyThenMagnitude {
    fn standardize(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mean = self.feature_means.get(i).copied().unwrap_or(0.0);
                let std = self.feature_stds.get(i).copied().unwrap_or(1.0);
                (v - mean) / std
            })
            .collect()
    }

    fn class_probabilities(&self, standardized: &[f64]) -> Vec<f64> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .map(|row| {
                let bias = row.last().copied().unwrap_or(0.0);
                standardized
                    .iter()
                    .zip(row.iter())
                    .map(|(x, w)| x * w)
                    .sum::<f64>()
                    + bias
            })
            .collect();
        softmax(&logits)
    }
}

impl Regressor for ClassifyThenMagnitude {
    fn model_id(&self) -> &'static str {
        CLASSIFY_MAGNITUDE_MODEL_ID
    }

    fn fit(&mut self, examples: &[TrainingExample]) -> Result<()> {
        if examples.is_empty() {
            return Err(BulletinError::InsufficientData { have: 0, need: 1 });
        }
        let feature_len = examples[0].features.len();

        // Standardization parameters.
        self.feature_means = (0..feature_len)
            .map(|i| {
                examples.iter().map(|e| e.features[i]).sum::<f64>() / examples.len() as f64
            })
            .collect();
        self.feature_stds = (0..feature_len)
            .map(|i| {
                let mean = self.feature_means[i];
                let variance = examples
                    .iter()
                    .map(|e| {
                        let d = e.features[i] - mean;
                        d * d
                    })
                    .sum::<f64>()
                    / examples.len() as f64;
                let std = variance.sqrt();
                if std < 1e-9 {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        let standardized: Vec<Vec<f64>> = examples
            .iter()
            .map(|e| self.standardize(&e.features))
            .collect();
        let labels: Vec<usize> = examples
            .iter()
            .map(|e| class_of(e.target_delta_days))
            .collect();

        // Softmax regression by batch gradient descent from a zero init.
        self.weights = vec![vec![0.0; feature_len + 1]; CLASSES];
        let n = examples.len() as f64;

        for _ in 0..EPOCHS {
            let mut gradients = vec![vec![0.0; feature_len + 1]; CLASSES];

            for (x, label) in standardized.iter().zip(&labels) {
                let probs = self.class_probabilities(x);
                for class in 0..CLASSES {
                    let error = probs[class] - if class == *label { 1.0 } else { 0.0 };
                    for (j, value) in x.iter().enumerate() {
                        gradients[class][j] += error * value;
                    }
                    gradients[class][feature_len] += error;
                }
            }

            for class in 0..CLASSES {
                for j in 0..=feature_len {
                    self.weights[class][j] -= LEARNING_RATE * gradients[class][j] / n;
                }
            }
        }

        // Class-conditional magnitude model.
        let mut sums = [0.0; CLASSES];
        let mut counts = [0usize; CLASSES];
        for (example, label) in examples.iter().zip(&labels) {
            sums[*label] += example.target_delta_days;
            counts[*label] += 1;
        }
        for class in 0..CLASSES {
            self.class_mean_delta[class] = if counts[class] == 0 {
                0.0
            } else {
                sums[class] / counts[class] as f64
            };
        }

        let mut abs_devs = [0.0; CLASSES];
        for (example, label) in examples.iter().zip(&labels) {
            abs_devs[*label] +=
                (example.target_delta_days - self.class_mean_delta[*label]).abs();
        }
        for class in 0..CLASSES {
            self.class_mae[class] = if counts[class] == 0 {
                0.0
            } else {
                abs_devs[class] / counts[class] as f64
            };
        }

        debug!(
            examples = examples.len(),
            advancing = counts[ADVANCING],
            stable = counts[STABLE],
            retrogressing = counts[RETROGRESSING],
            "fit classify-then-magnitude model"
        );
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        if self.weights.is_empty() {
            return Err(BulletinError::internal(
                "classify-then-magnitude model is not trained",
            ));
        }

        let standardized = self.standardize(features);
        let probs = self.class_probabilities(&standardized);
        let (class, prob) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, p)| (i, *p))
            .unwrap_or((STABLE, 1.0 / CLASSES as f64));

        let magnitude_credibility = 1.0 - (self.class_mae[class] / MAG_ERROR_SCALE).min(1.0);

        Ok(Prediction {
            delta_days: self.class_mean_delta[class],
            confidence: (prob * magnitude_credibility).clamp(0.0, 1.0),
        })
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}
