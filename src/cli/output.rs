//! Console rendering of reports and summaries.

use console::style;

use crate::collector::{RunReport, ValidationReport};
use crate::domain::{RepositoryStats, TrendSummary};

pub fn print_run_report(report: &RunReport) {
    println!();
    println!("{}", style("Run report").bold());
    println!("  run id       {}", report.run_id);
    println!("  attempted    {}", report.attempted);
    println!("  fetched      {}", report.fetched);
    println!("  parsed       {}", report.parsed);
    println!("  stored       {}", style(report.stored).green());
    println!("  skipped      {}", report.skipped);
    println!("  missing      {}", report.missing);
    println!("  quarantined  {}", style(report.quarantined.len()).yellow());
    println!("  failed       {}", style(report.failed.len()).red());
    if report.cancelled {
        println!("  {}", style("cancelled: partial results above").yellow());
    }

    if !report.quarantined.is_empty() {
        println!();
        println!("{}", style("Quarantined").yellow().bold());
        for q in &report.quarantined {
            println!(
                "  {}  {}  (rate {:.2})",
                q.label, q.reason, q.date_parse_rate
            );
        }
    }

    if !report.failed.is_empty() {
        println!();
        println!("{}", style("Failed").red().bold());
        for f in &report.failed {
            println!("  {}  retries={}  {}", f.label, f.retries, f.error);
        }
    }
}

pub fn print_trend_summary(summary: &TrendSummary) {
    println!();
    println!(
        "{} {}",
        style("Trend for").bold(),
        style(summary.key.to_string()).cyan()
    );
    match summary.window_months {
        Some(window) => println!("  window          last {window} months"),
        None => println!("  window          full history"),
    }
    if let (Some(start), Some(end)) = (summary.start_date, summary.end_date) {
        println!("  span            {start} .. {end}");
    }
    println!("  observations    {}", summary.observations);
    println!("  total advance   {} days", summary.total_advancement_days);
    println!("  mean            {:.1} days/month", summary.mean_monthly_days);
    println!("  volatility      {:.1} days", summary.volatility);
    println!("  direction       {}", style(summary.trend_direction).bold());

    let defined: Vec<(usize, f64)> = summary
        .seasonal_factors
        .iter()
        .enumerate()
        .filter_map(|(i, f)| f.map(|f| (i + 1, f)))
        .collect();
    if !defined.is_empty() {
        println!("  seasonal factors:");
        for (month, factor) in defined {
            println!("    month {month:>2}  {factor:.2}");
        }
    }
}

pub fn print_stats(stats: &RepositoryStats) {
    println!();
    println!("{}", style("Repository").bold());
    println!("  bulletins    {}", stats.bulletin_count);
    println!("  entries      {}", stats.entry_count);
    if let (Some(earliest), Some(latest)) = (stats.earliest, stats.latest) {
        println!("  span         {earliest} .. {latest}");
    }
    if let Some(at) = stats.last_ingest_at {
        println!("  last ingest  {at}");
    }
}

pub fn print_validation_report(report: &ValidationReport) {
    println!();
    println!("{}", style("Validation").bold());
    println!("  checked     {}", report.checked);
    println!("  mismatched  {}", report.mismatched.len());
    println!("  fixed       {}", report.fixed);
    for label in &report.mismatched {
        println!("    {label}");
    }
    for (label, error) in &report.errors {
        println!("  {} {}", style(label).red(), error);
    }
}
