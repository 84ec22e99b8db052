mod helpers;

use visa_bulletin_ops::analytics::Analytics;
use visa_bulletin_ops::domain::{ChartType, Country, SeriesKey, TrendDirection, VisaCategory};

use helpers::{eb2_india_key, memory_repo, seed_series};

#[tokio::test]
async fn test_analyze_seeded_series_advances() {
    let repo = memory_repo().await;
    let key = eb2_india_key();
    seed_series(&repo, &key, 2022, 1, 13, 30).await;

    let analytics = Analytics::new(repo);
    let summary = analytics.analyze_series(key, None).await.unwrap();

    assert_eq!(summary.observations, 13);
    assert_eq!(summary.trend_direction, TrendDirection::Advancing);
    assert_eq!(summary.total_advancement_days, 360);
    assert!((summary.mean_monthly_days - 30.0).abs() < 1e-9);
    assert_eq!(summary.volatility, 0.0);
}

#[tokio::test]
async fn test_analyze_empty_series_is_stable_zeros() {
    let repo = memory_repo().await;
    let analytics = Analytics::new(repo);

    let summary = analytics
        .analyze_series(eb2_india_key(), Some(12))
        .await
        .unwrap();

    assert_eq!(summary.observations, 0);
    assert_eq!(summary.trend_direction, TrendDirection::Stable);
    assert_eq!(summary.total_advancement_days, 0);
    assert_eq!(summary.mean_monthly_days, 0.0);
    assert_eq!(summary.volatility, 0.0);
}

#[tokio::test]
async fn test_compare_categories_fans_out() {
    let repo = memory_repo().await;
    let advancing = eb2_india_key();
    seed_series(&repo, &advancing, 2022, 1, 13, 30).await;

    let untouched = SeriesKey::new(VisaCategory::F4, Country::Mexico, ChartType::FinalAction);

    let analytics = Analytics::new(repo);
    let summaries = analytics
        .compare_categories(&[advancing, untouched], None)
        .await
        .unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].key, advancing);
    assert_eq!(summaries[0].trend_direction, TrendDirection::Advancing);
    assert_eq!(summaries[1].key, untouched);
    assert_eq!(summaries[1].observations, 0);
}
