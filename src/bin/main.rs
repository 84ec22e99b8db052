use std::process::ExitCode;
use std::str::FromStr;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use visa_bulletin_ops::cli::output;
use visa_bulletin_ops::cli::{Cli, Commands};
use visa_bulletin_ops::collector::{CollectOptions, Collector};
use visa_bulletin_ops::config::Config;
use visa_bulletin_ops::domain::{BulletinError, ChartType, Country, SeriesKey, VisaCategory};
use visa_bulletin_ops::forecasting::Forecaster;
use visa_bulletin_ops::storage::BulletinRepository;
use visa_bulletin_ops::{analytics::Analytics, collector::RunReport, storage};

// Exit codes: 0 success, 2 partial success, 3 configuration error,
// 4 storage error, 5 network exhaustion.
const EXIT_PARTIAL: u8 = 2;
const EXIT_CONFIG: u8 = 3;
const EXIT_STORAGE: u8 = 4;
const EXIT_NETWORK: u8 = 5;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            exit_code_for(&err)
        }
    };
    ExitCode::from(code)
}

fn exit_code_for(err: &BulletinError) -> u8 {
    match err {
        BulletinError::Config(_) | BulletinError::UrlTemplate(_) | BulletinError::TomlDe(_) => {
            EXIT_CONFIG
        }
        BulletinError::Storage(_)
        | BulletinError::Migration(_)
        | BulletinError::SchemaVersion { .. } => EXIT_STORAGE,
        BulletinError::Network(_) => EXIT_NETWORK,
        _ => 1,
    }
}

fn report_exit_code(report: &RunReport) -> u8 {
    if report.network_exhausted() {
        EXIT_NETWORK
    } else if report.has_failures() || report.cancelled {
        EXIT_PARTIAL
    } else {
        0
    }
}

/// Cancellation token wired to Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested");
            trigger.cancel();
        }
    });
    cancel
}

fn parse_series_key(category: &str, country: &str, chart: &str) -> Result<SeriesKey, BulletinError> {
    let category = VisaCategory::from_str(category).map_err(BulletinError::Config)?;
    let country = Country::from_str(country).map_err(BulletinError::Config)?;
    let chart = ChartType::from_str(chart).map_err(BulletinError::Config)?;
    Ok(SeriesKey::new(category, country, chart))
}

async fn run(cli: Cli) -> Result<u8, BulletinError> {
    let mut config = Config::load(cli.config.as_deref())?;
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
    visa_bulletin_ops::observability::init_tracing_with(&config.logging);

    info!("visa-bulletin-ops v{}", visa_bulletin_ops::VERSION);

    match cli.command {
        Commands::Init { database_url } => {
            if let Some(url) = database_url {
                config.storage.dsn = url;
            }
            let repo = storage::create_repository(&config.storage).await?;
            let stats = repo.get_stats().await?;
            output::print_stats(&stats);
            println!("store initialized");
            Ok(0)
        }

        Commands::Collect {
            start_year,
            end_year,
            workers,
            force,
            verify,
        } => {
            if let Some(workers) = workers {
                if workers == 0 {
                    return Err(BulletinError::config("--workers must be greater than 0"));
                }
                config.http.max_workers = workers;
            }
            let repo = storage::create_repository(&config.storage).await?;
            let collector = Collector::new(repo, config)?;

            let spinner = collection_spinner(format!(
                "collecting bulletins FY{start_year}..FY{end_year}"
            ));
            let report = collector
                .collect(
                    start_year,
                    end_year,
                    CollectOptions { force, verify },
                    &cancel_on_ctrl_c(),
                )
                .await?;
            spinner.finish_and_clear();

            output::print_run_report(&report);
            Ok(report_exit_code(&report))
        }

        Commands::Fetch => {
            let repo = storage::create_repository(&config.storage).await?;
            let collector = Collector::new(repo, config)?;

            let report = collector.fetch_current(&cancel_on_ctrl_c()).await?;
            output::print_run_report(&report);
            Ok(report_exit_code(&report))
        }

        Commands::Validate { fix } => {
            let repo = storage::create_repository(&config.storage).await?;
            let collector = Collector::new(repo, config)?;

            let report = collector.validate_stored(fix).await?;
            output::print_validation_report(&report);

            let clean = report.errors.is_empty() && (fix || report.mismatched.is_empty());
            Ok(if clean { 0 } else { EXIT_PARTIAL })
        }

        Commands::Analyze {
            category,
            country,
            chart,
            window,
        } => {
            let key = parse_series_key(&category, &country, &chart)?;
            let repo = storage::create_repository(&config.storage).await?;

            let summary = Analytics::new(repo).analyze_series(key, window).await?;
            output::print_trend_summary(&summary);
            Ok(0)
        }

        Commands::Forecast {
            category,
            country,
            chart,
            target_year,
            target_month,
            model,
            save,
        } => {
            if !(1..=12).contains(&target_month) {
                return Err(BulletinError::config("--target-month must be 1-12"));
            }
            let key = parse_series_key(&category, &country, &chart)?;
            let repo = storage::create_repository(&config.storage).await?;

            let mut forecaster = match model.as_str() {
                "tree" => Forecaster::with_tree_ensemble(repo.clone()),
                "logistic" => Forecaster::with_classify_magnitude(repo.clone()),
                other => {
                    return Err(BulletinError::config(format!(
                        "unknown model '{other}': expected tree or logistic"
                    )))
                }
            };

            let metrics = forecaster.train(&key).await?;
            println!(
                "trained {}: mae {:.1}d rmse {:.1}d (holdout {:.0}%)",
                forecaster.model_id(),
                metrics.mae_days,
                metrics.rmse_days,
                metrics.held_out_split * 100.0
            );

            let forecast = forecaster.predict(&key, target_year, target_month).await?;
            repo.put_forecast(&forecast).await?;
            println!(
                "forecast for {} {target_year}-{target_month:02}: {} (confidence {:.2})",
                key, forecast.predicted_date, forecast.confidence
            );

            if let Some(path) = save {
                forecaster.save(&path)?;
                println!("model artifact saved to {}", path.display());
            }
            Ok(0)
        }

        Commands::Stats => {
            let repo = storage::create_repository(&config.storage).await?;
            let stats = repo.get_stats().await?;
            output::print_stats(&stats);
            Ok(0)
        }
    }
}

fn collection_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    spinner
}
