mod helpers;

use tempfile::tempdir;

use visa_bulletin_ops::domain::BulletinError;
use visa_bulletin_ops::forecasting::{
    Forecaster, CLASSIFY_MAGNITUDE_MODEL_ID, NULL_MODEL_ID, TREE_ENSEMBLE_MODEL_ID,
};
use visa_bulletin_ops::storage::BulletinRepository;

use helpers::{date, eb2_india_key, memory_repo, seed_series};

#[tokio::test]
async fn test_thin_series_gets_null_forecast() {
    let repo = memory_repo().await;
    let key = eb2_india_key();
    // 5 observations, below the 12 minimum.
    seed_series(&repo, &key, 2023, 1, 5, 30).await;

    let forecaster = Forecaster::with_tree_ensemble(repo);
    let forecast = forecaster.predict(&key, 2024, 1).await.unwrap();

    assert_eq!(forecast.model_id, NULL_MODEL_ID);
    assert_eq!(forecast.confidence, 0.0);
    // Pinned to the last observed priority date: 4 steps of 30 days.
    assert_eq!(forecast.predicted_date, date(2012, 1, 1) + chrono::Duration::days(120));
    assert_eq!(forecast.features_hash.len(), 64);
}

#[tokio::test]
async fn test_empty_series_is_an_error() {
    let repo = memory_repo().await;
    let forecaster = Forecaster::with_tree_ensemble(repo);

    let err = forecaster.predict(&eb2_india_key(), 2024, 1).await.unwrap_err();
    assert!(matches!(err, BulletinError::InsufficientData { .. }));
}

#[tokio::test]
async fn test_tree_ensemble_trains_and_predicts() {
    let repo = memory_repo().await;
    let key = eb2_india_key();
    // Three years of steady 30-day advancement.
    seed_series(&repo, &key, 2021, 1, 36, 30).await;

    let mut forecaster = Forecaster::with_tree_ensemble(repo.clone());
    let metrics = forecaster.train(&key).await.unwrap();
    assert!(metrics.train_examples > metrics.holdout_examples);
    assert!(metrics.held_out_split > 0.1 && metrics.held_out_split < 0.3);
    // A perfectly regular series should be easy.
    assert!(metrics.mae_days < 20.0, "mae was {}", metrics.mae_days);

    let forecast = forecaster.predict(&key, 2024, 1).await.unwrap();
    assert_eq!(forecast.model_id, TREE_ENSEMBLE_MODEL_ID);
    assert!(forecast.confidence > 0.0 && forecast.confidence <= 1.0);

    // Last observed priority date is 35 steps in; the clamp bounds the
    // prediction to a year either side of it.
    let last_observed = date(2012, 1, 1) + chrono::Duration::days(35 * 30);
    let delta = (forecast.predicted_date - last_observed).num_days();
    assert!(delta.abs() <= 365, "delta was {delta}");

    repo.put_forecast(&forecast).await.unwrap();
    let stored = repo.get_forecast(&forecast.key).await.unwrap().unwrap();
    assert_eq!(stored.features_hash, forecast.features_hash);
}

#[tokio::test]
async fn test_classify_magnitude_variant() {
    let repo = memory_repo().await;
    let key = eb2_india_key();
    seed_series(&repo, &key, 2021, 1, 36, 30).await;

    let mut forecaster = Forecaster::with_classify_magnitude(repo);
    forecaster.train(&key).await.unwrap();

    let forecast = forecaster.predict(&key, 2024, 1).await.unwrap();
    assert_eq!(forecast.model_id, CLASSIFY_MAGNITUDE_MODEL_ID);
    assert!(forecast.confidence >= 0.0 && forecast.confidence <= 1.0);

    // A steadily advancing series must not be predicted to retrogress.
    let last_observed = date(2012, 1, 1) + chrono::Duration::days(35 * 30);
    assert!(forecast.predicted_date >= last_observed);
}

#[tokio::test]
async fn test_save_load_round_trip() {
    let repo = memory_repo().await;
    let key = eb2_india_key();
    seed_series(&repo, &key, 2021, 1, 36, 30).await;

    let mut forecaster = Forecaster::with_tree_ensemble(repo.clone());
    forecaster.train(&key).await.unwrap();
    let original = forecaster.predict(&key, 2024, 1).await.unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    forecaster.save(&path).unwrap();

    let restored = Forecaster::load(repo, &path).unwrap();
    let replayed = restored.predict(&key, 2024, 1).await.unwrap();

    assert_eq!(replayed.model_id, original.model_id);
    assert_eq!(replayed.predicted_date, original.predicted_date);
    assert_eq!(replayed.features_hash, original.features_hash);
}

#[tokio::test]
async fn test_train_rejects_thin_series() {
    let repo = memory_repo().await;
    let key = eb2_india_key();
    seed_series(&repo, &key, 2023, 1, 6, 30).await;

    let mut forecaster = Forecaster::with_tree_ensemble(repo);
    let err = forecaster.train(&key).await.unwrap_err();
    assert!(matches!(err, BulletinError::InsufficientData { .. }));
}
