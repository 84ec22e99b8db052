//! Post-parse validation and canonicalization.
//!
//! Runs between the parser and the repository. Individual bad entries are
//! dropped (the bulletin continues); a date-parse rate below the configured
//! floor quarantines the whole bulletin.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::QualityConfig;
use crate::domain::{Bulletin, BulletinError, CategoryEntry, Result};
use crate::parser::ParsedBulletin;

/// Reason string surfaced in run reports for quarantined bulletins.
pub const QUARANTINE_REASON_PARSE_RATE: &str = "date_parse_rate_below_floor";

/// Per-bulletin data quality summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub date_parse_rate: f64,
}

/// A bulletin that cleared validation and is ready to persist.
#[derive(Debug)]
pub struct NormalizedBulletin {
    pub bulletin: Bulletin,
    pub entries: Vec<CategoryEntry>,
    pub report: QualityReport,
}

/// Validate and canonicalize parser output.
///
/// Returns `Err(Quality { .. })` when the bulletin must be quarantined; the
/// caller records it and does not persist. Entry-level problems never fail
/// the bulletin.
pub fn normalize(parsed: ParsedBulletin, quality: &QualityConfig) -> Result<NormalizedBulletin> {
    let ParsedBulletin {
        bulletin,
        entries,
        warnings,
        date_parse_rate,
    } = parsed;

    if date_parse_rate < quality.date_parse_min_rate {
        let month = format!("{}-{:02}", bulletin.year, bulletin.month);
        warn!(
            bulletin = %month,
            rate = date_parse_rate,
            floor = quality.date_parse_min_rate,
            "quarantining bulletin"
        );
        return Err(BulletinError::Quality {
            reason: QUARANTINE_REASON_PARSE_RATE.to_string(),
            rate: date_parse_rate,
        });
    }

    bulletin.validate()?;

    let rows_in = entries.len();
    let mut report = QualityReport {
        rows_in,
        rows_out: 0,
        warnings,
        errors: Vec::new(),
        date_parse_rate,
    };

    let mut kept: Vec<CategoryEntry> = Vec::with_capacity(rows_in);
    let mut index_by_key: HashMap<_, usize> = HashMap::new();

    for entry in entries {
        if let Err(err) = entry.validate() {
            report.errors.push(err.to_string());
            continue;
        }
        if let Some(date) = entry.priority_date {
            let drift_years = (date.year() - bulletin.bulletin_date.year()).abs();
            if drift_years > quality.max_drift_years {
                report.errors.push(format!(
                    "{}/{}/{}: priority date {} is {} years from bulletin date; dropped as a parse error",
                    entry.category, entry.country, entry.chart, date, drift_years
                ));
                continue;
            }
        }

        match index_by_key.get(&entry.key()) {
            Some(&index) => {
                // Duplicate within one bulletin: last occurrence wins.
                report.warnings.push(format!(
                    "duplicate entry for {}/{}/{}; keeping the last occurrence",
                    entry.category, entry.country, entry.chart
                ));
                kept[index] = entry;
            }
            None => {
                index_by_key.insert(entry.key(), kept.len());
                kept.push(entry);
            }
        }
    }

    report.rows_out = kept.len();
    debug!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        errors = report.errors.len(),
        "normalized bulletin"
    );

    Ok(NormalizedBulletin {
        bulletin,
        entries: kept,
        report,
    })
}
