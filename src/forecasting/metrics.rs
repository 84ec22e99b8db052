//! Training accuracy metrics.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainMetrics {
    pub mae_days: f64,
    pub rmse_days: f64,
    /// Fraction of examples held out chronologically for evaluation.
    pub held_out_split: f64,
    pub train_examples: usize,
    pub holdout_examples: usize,
}

/// Mean absolute error and root-mean-square error over paired predictions.
pub fn evaluate(predictions: &[f64], targets: &[f64]) -> (f64, f64) {
    debug_assert_eq!(predictions.len(), targets.len());
    if predictions.is_empty() {
        return (0.0, 0.0);
    }

    let n = predictions.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    for (prediction, target) in predictions.iter().zip(targets) {
        let err = prediction - target;
        abs_sum += err.abs();
        sq_sum += err * err;
    }
    (abs_sum / n, (sq_sum / n).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_perfect() {
        let (mae, rmse) = evaluate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(mae, 0.0);
        assert_eq!(rmse, 0.0);
    }

    #[test]
    fn test_evaluate_known_errors() {
        let (mae, rmse) = evaluate(&[2.0, 2.0], &[0.0, 0.0]);
        assert_eq!(mae, 2.0);
        assert_eq!(rmse, 2.0);

        let (mae, rmse) = evaluate(&[3.0, -1.0], &[0.0, 0.0]);
        assert_eq!(mae, 2.0);
        assert!(rmse > mae);
    }

    #[test]
    fn test_evaluate_empty() {
        assert_eq!(evaluate(&[], &[]), (0.0, 0.0));
    }
}
