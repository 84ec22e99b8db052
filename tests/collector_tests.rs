mod helpers;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use visa_bulletin_ops::collector::{CollectOptions, Collector, FailureKind};
use visa_bulletin_ops::domain::{ChartType, Country, EntryStatus, VisaCategory};
use visa_bulletin_ops::planner::MonthLabel;
use visa_bulletin_ops::storage::BulletinRepository;

use helpers::{
    bulletin_html, date, ddmmmyy, garbage_bulletin_html, memory_repo, monthly_path, test_config,
};
use std::sync::Arc;

/// Mount all 12 monthly pages of one fiscal year with advancing EB cutoffs.
async fn mount_fiscal_year(server: &MockServer, fiscal_year: i32) {
    for fiscal_month in 1..=12u32 {
        let (year, month) = if fiscal_month <= 3 {
            (fiscal_year - 1, fiscal_month + 9)
        } else {
            (fiscal_year, fiscal_month - 3)
        };

        let china = ddmmmyy(date(2020, 1, 1) + chrono::Duration::days(30 * fiscal_month as i64));
        let india = ddmmmyy(date(2012, 1, 1) + chrono::Duration::days(15 * fiscal_month as i64));
        let eb3 = ddmmmyy(date(2019, 6, 1) + chrono::Duration::days(20 * fiscal_month as i64));

        Mock::given(method("GET"))
            .and(path(monthly_path(fiscal_year, year, month)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(bulletin_html(year, month, &china, &india, &eb3)),
            )
            .mount(server)
            .await;
    }
}

fn collector_for(server: &MockServer, repo: Arc<dyn BulletinRepository>) -> Collector {
    let base = format!("{}/visa-bulletin", server.uri());
    Collector::new(repo, test_config(&base)).expect("collector")
}

#[tokio::test]
async fn test_backfill_stores_fiscal_year() {
    let server = MockServer::start().await;
    mount_fiscal_year(&server, 2023).await;

    let repo = memory_repo().await;
    let collector = collector_for(&server, repo.clone());

    let report = collector
        .collect(2023, 2023, CollectOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempted, 12);
    assert_eq!(report.fetched, 12);
    assert_eq!(report.parsed, 12);
    assert_eq!(report.stored, 12);
    assert_eq!(report.skipped, 0);
    assert!(report.failed.is_empty());
    assert!(report.quarantined.is_empty());
    assert!(!report.cancelled);

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.bulletin_count, 12);

    // Spot-check one stored bulletin.
    let entries = repo.get_entries(2022, 10).await.unwrap();
    assert!(entries
        .iter()
        .any(|e| e.category == VisaCategory::Eb2
            && e.country == Country::India
            && e.chart == ChartType::FinalAction
            && e.status == EntryStatus::Dated));
    // Raw HTML retained for validate.
    assert!(repo.get_raw_html(2022, 10).await.unwrap().is_some());
}

#[tokio::test]
async fn test_second_backfill_skips_everything() {
    let server = MockServer::start().await;
    mount_fiscal_year(&server, 2023).await;

    let repo = memory_repo().await;
    let collector = collector_for(&server, repo.clone());

    let first = collector
        .collect(2023, 2023, CollectOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    let stored_before = first.stored;
    assert_eq!(stored_before, 12);

    let second = collector
        .collect(2023, 2023, CollectOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.attempted, stored_before);
    assert_eq!(second.fetched, 0);
    assert_eq!(second.stored, 0);
    assert_eq!(second.skipped, stored_before);

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.bulletin_count, 12);
}

#[tokio::test]
async fn test_force_reingests_without_duplicates() {
    let server = MockServer::start().await;
    mount_fiscal_year(&server, 2023).await;

    let repo = memory_repo().await;
    let collector = collector_for(&server, repo.clone());

    collector
        .collect(2023, 2023, CollectOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    let counts_before = repo.get_stats().await.unwrap();
    let created_before = repo
        .get_bulletin(2022, 10)
        .await
        .unwrap()
        .unwrap()
        .created_at;

    let report = collector
        .collect(
            2023,
            2023,
            CollectOptions {
                force: true,
                verify: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.stored, 12);

    // Identical content: entity counts and created_at are untouched.
    let counts_after = repo.get_stats().await.unwrap();
    assert_eq!(counts_after.bulletin_count, counts_before.bulletin_count);
    assert_eq!(counts_after.entry_count, counts_before.entry_count);
    let created_after = repo
        .get_bulletin(2022, 10)
        .await
        .unwrap()
        .unwrap()
        .created_at;
    assert_eq!(created_after, created_before);
}

#[tokio::test]
async fn test_missing_months_are_not_failures() {
    let server = MockServer::start().await;
    // Only October exists; the other 11 candidate URLs answer 404.
    let china = ddmmmyy(date(2020, 1, 1));
    Mock::given(method("GET"))
        .and(path(monthly_path(2023, 2022, 10)))
        .respond_with(ResponseTemplate::new(200).set_body_string(bulletin_html(
            2022,
            10,
            &china,
            "01JAN12",
            "01JUN19",
        )))
        .mount(&server)
        .await;

    let repo = memory_repo().await;
    let collector = collector_for(&server, repo.clone());

    let report = collector
        .collect(2023, 2023, CollectOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stored, 1);
    assert_eq!(report.missing, 11);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_retry_exhaustion_is_isolated() {
    // One month permanently answers 500; the other eleven serve normally.
    let failing_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(monthly_path(2023, 2023, 1)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&failing_server)
        .await;
    for fiscal_month in 1..=12u32 {
        let (year, month) = if fiscal_month <= 3 {
            (2022, fiscal_month + 9)
        } else {
            (2023, fiscal_month - 3)
        };
        if (year, month) == (2023, 1) {
            continue;
        }
        let china = ddmmmyy(date(2020, 1, 1) + chrono::Duration::days(30 * fiscal_month as i64));
        Mock::given(method("GET"))
            .and(path(monthly_path(2023, year, month)))
            .respond_with(ResponseTemplate::new(200).set_body_string(bulletin_html(
                year, month, &china, "01JAN12", "01JUN19",
            )))
            .mount(&failing_server)
            .await;
    }

    let repo = memory_repo().await;
    let collector = collector_for(&failing_server, repo.clone());

    let report = collector
        .collect(2023, 2023, CollectOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    // The failing URL appears exactly once, with the full retry count; the
    // rest of the batch proceeds normally.
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].retries, 3);
    assert_eq!(report.failed[0].kind, FailureKind::Network);
    assert_eq!(report.failed[0].label, MonthLabel::new(2023, 1));
    assert_eq!(report.stored, 11);
    assert!(!report.network_exhausted());
}

#[tokio::test]
async fn test_quarantined_bulletin_not_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(monthly_path(2023, 2022, 10)))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(garbage_bulletin_html(2022, 10)),
        )
        .mount(&server)
        .await;

    let repo = memory_repo().await;
    let collector = collector_for(&server, repo.clone());

    let report = collector
        .collect(2023, 2023, CollectOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.quarantined.len(), 1);
    assert_eq!(report.quarantined[0].reason, "date_parse_rate_below_floor");
    assert!(report.quarantined[0].date_parse_rate < 0.5);
    assert_eq!(report.stored, 0);

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.bulletin_count, 0);
}

#[tokio::test]
async fn test_cancellation_returns_partial_report() {
    let server = MockServer::start().await;
    mount_fiscal_year(&server, 2023).await;

    let repo = memory_repo().await;
    let collector = collector_for(&server, repo.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = collector
        .collect(2023, 2023, CollectOptions::default(), &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    // Whatever the report says was stored is exactly what the repository
    // holds.
    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.bulletin_count as usize, report.stored);
}

#[tokio::test]
async fn test_fetch_current_ingests_one_bulletin() {
    let server = MockServer::start().await;
    let base = format!("{}/visa-bulletin", server.uri());

    let index_html = format!(
        r#"<html><body>
        <a href="{base}/2025/visa-bulletin-for-june-2025.html">Visa Bulletin June 2025</a>
        <a href="{base}/2025/visa-bulletin-for-may-2025.html">Visa Bulletin May 2025</a>
        </body></html>"#
    );
    Mock::given(method("GET"))
        .and(path("/visa-bulletin.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_html))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/visa-bulletin/2025/visa-bulletin-for-june-2025.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bulletin_html(
            2025, 6, "01AUG20", "15FEB13", "01SEP20",
        )))
        .mount(&server)
        .await;

    let repo = memory_repo().await;
    let collector = collector_for(&server, repo.clone());

    let report = collector.fetch_current(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.stored, 1);

    let stored = repo.get_bulletin(2025, 6).await.unwrap().unwrap();
    assert_eq!(stored.fiscal_year, 2025);

    // Idempotent within the month.
    let again = collector.fetch_current(&CancellationToken::new()).await.unwrap();
    assert_eq!(again.stored, 1);
    assert_eq!(repo.get_stats().await.unwrap().bulletin_count, 1);
}

#[tokio::test]
async fn test_validate_detects_and_fixes_drift() {
    let server = MockServer::start().await;
    mount_fiscal_year(&server, 2023).await;

    let repo = memory_repo().await;
    let collector = collector_for(&server, repo.clone());
    collector
        .collect(2023, 2023, CollectOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    // Clean store validates clean.
    let clean = collector.validate_stored(false).await.unwrap();
    assert_eq!(clean.checked, 12);
    assert!(clean.mismatched.is_empty());
    assert!(clean.errors.is_empty());

    // Corrupt one month's entries behind the collector's back.
    let bulletin = repo.get_bulletin(2022, 10).await.unwrap().unwrap();
    repo.upsert_bulletin(&bulletin, &[], None).await.unwrap();

    let detected = collector.validate_stored(false).await.unwrap();
    assert_eq!(detected.mismatched.len(), 1);
    assert_eq!(detected.fixed, 0);

    let fixed = collector.validate_stored(true).await.unwrap();
    assert_eq!(fixed.fixed, 1);

    let after = collector.validate_stored(false).await.unwrap();
    assert!(after.mismatched.is_empty());
    assert!(!repo.get_entries(2022, 10).await.unwrap().is_empty());
}
