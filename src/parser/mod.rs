//! HTML-to-records parsing for one bulletin document.
//!
//! CPU-only; never performs I/O. Structural problems (no cutoff tables at
//! all) abort the bulletin with a `Parse` error; everything softer is a
//! warning carried on the output.

pub mod dates;
pub mod tables;

use scraper::Html;
use tracing::{debug, warn};

use crate::domain::{Bulletin, CategoryEntry, Result};
use crate::domain::BulletinError;
use crate::planner::MonthLabel;

use tables::{CellValue, TableScan};

/// Parser output for one document: the bulletin, its entries, and the
/// quality signals the normalizer needs.
#[derive(Debug)]
pub struct ParsedBulletin {
    pub bulletin: Bulletin,
    pub entries: Vec<CategoryEntry>,
    pub warnings: Vec<String>,
    pub date_parse_rate: f64,
}

/// Parse one bulletin document.
///
/// The publication date is scanned from the document text; when absent the
/// first of the labeled month is used. The fiscal year is always derived from
/// the label, never read from the page.
pub fn parse_bulletin(html: &str, label: MonthLabel, source_url: &str) -> Result<ParsedBulletin> {
    let document = Html::parse_document(html);

    let scan = tables::scan_tables(&document);
    if scan.tables_seen == 0 {
        return Err(BulletinError::parse(format!(
            "no visa cutoff tables found in {label}"
        )));
    }

    let bulletin_date = extract_bulletin_date(&document, label);
    let bulletin = Bulletin::new(label.year, label.month, bulletin_date, source_url.to_string());

    let entries = assemble_entries(&scan);
    for warning in &scan.warnings {
        warn!(bulletin = %label, "{}", warning);
    }
    debug!(
        bulletin = %label,
        entries = entries.len(),
        rate = scan.date_parse_rate(),
        "parsed bulletin"
    );

    Ok(ParsedBulletin {
        bulletin,
        entries,
        date_parse_rate: scan.date_parse_rate(),
        warnings: scan.warnings,
    })
}

fn extract_bulletin_date(document: &Html, label: MonthLabel) -> chrono::NaiveDate {
    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    dates::scan_publication_date(&text).unwrap_or_else(|| {
        // Publication line missing; anchor to the bulletin month itself.
        chrono::NaiveDate::from_ymd_opt(label.year, label.month, 1)
            .unwrap_or_else(|| chrono::NaiveDate::from_ymd_opt(label.year, 1, 1).expect("valid date"))
    })
}

fn assemble_entries(scan: &TableScan) -> Vec<CategoryEntry> {
    scan.entries
        .iter()
        .map(|raw| match raw.cell {
            CellValue::Current => CategoryEntry::current(raw.category, raw.country, raw.chart),
            CellValue::Unavailable => {
                CategoryEntry::unavailable(raw.category, raw.country, raw.chart)
            }
            CellValue::Date(date) => {
                CategoryEntry::dated(raw.category, raw.country, raw.chart, date)
            }
        })
        .collect()
}
