//! Visa-table location and row extraction.
//!
//! Bulletins carry several HTML tables; only those whose header row shows
//! both a category signal and a country signal are cutoff tables. The chart a
//! table belongs to (Final Action vs Dates for Filing) is decided by the
//! nearest preceding heading text in document order.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::trace;

use crate::domain::{ChartType, Country, VisaCategory};
use super::dates::parse_cell_date;

static TR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("valid selector"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th, td").expect("valid selector"));

/// One classified cell of a cutoff table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub category: VisaCategory,
    pub country: Country,
    pub chart: ChartType,
    pub cell: CellValue,
}

/// What a cutoff cell said.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValue {
    Current,
    Unavailable,
    Date(NaiveDate),
}

/// Everything extracted from one document's tables, plus the per-run date
/// parse metric inputs.
#[derive(Debug, Default)]
pub struct TableScan {
    pub entries: Vec<RawEntry>,
    pub warnings: Vec<String>,
    /// Number of cells that had to be dates (neither C nor U).
    pub date_cells_total: usize,
    /// How many of those parsed.
    pub date_cells_parsed: usize,
    /// Number of relevant cutoff tables seen.
    pub tables_seen: usize,
}

impl TableScan {
    /// Fraction of date-bearing cells that parsed. A document with no
    /// date-bearing cells (all Current, e.g.) has a perfect rate.
    pub fn date_parse_rate(&self) -> f64 {
        if self.date_cells_total == 0 {
            1.0
        } else {
            self.date_cells_parsed as f64 / self.date_cells_total as f64
        }
    }
}

/// Walk the document in order, tracking chart headings and extracting rows
/// from every relevant table.
pub fn scan_tables(document: &Html) -> TableScan {
    let mut scan = TableScan::default();
    let mut current_chart: Option<ChartType> = None;

    for node in document.root_element().descendants() {
        if let Some(element) = ElementRef::wrap(node) {
            if element.value().name() == "table" && !has_table_ancestor(node) {
                scan_one_table(element, current_chart, &mut scan);
            }
            continue;
        }

        if let Some(text) = node.value().as_text() {
            if has_table_ancestor(node) {
                continue;
            }
            if let Some(chart) = chart_from_heading(text) {
                current_chart = Some(chart);
            }
        }
    }

    scan
}

fn has_table_ancestor(node: ego_tree::NodeRef<'_, scraper::Node>) -> bool {
    node.ancestors().any(|a| {
        a.value()
            .as_element()
            .map(|e| e.name() == "table")
            .unwrap_or(false)
    })
}

/// Chart signal from free text between tables.
fn chart_from_heading(text: &str) -> Option<ChartType> {
    let upper = text.replace('\u{a0}', " ").to_uppercase();
    if upper.contains("DATES FOR FILING") {
        return Some(ChartType::DatesForFiling);
    }
    if upper.contains("FINAL ACTION") {
        return Some(ChartType::FinalAction);
    }
    None
}

fn scan_one_table(table: ElementRef<'_>, chart: Option<ChartType>, scan: &mut TableScan) {
    let rows: Vec<ElementRef<'_>> = table.select(&TR_SELECTOR).collect();
    let Some(header_row) = rows.first() else {
        return;
    };

    let header_cells: Vec<String> = header_row
        .select(&CELL_SELECTOR)
        .map(|c| cell_text(&c))
        .collect();

    if !is_cutoff_header(&header_cells) {
        trace!("Skipping non-cutoff table: {:?}", header_cells.first());
        return;
    }
    scan.tables_seen += 1;

    let Some(chart) = chart else {
        scan.warnings.push(
            "cutoff table without a preceding Final Action / Dates for Filing heading; rows dropped"
                .to_string(),
        );
        return;
    };

    // Column index -> chargeability country, from the header row.
    let columns: Vec<Option<Country>> = header_cells
        .iter()
        .map(|h| Country::from_header(h))
        .collect();

    for row in rows.iter().skip(1) {
        let cells: Vec<String> = row.select(&CELL_SELECTOR).map(|c| cell_text(&c)).collect();
        if cells.len() < 2 {
            continue;
        }

        let label = &cells[0];
        let Some(category) = VisaCategory::from_raw_label(label) else {
            scan.warnings
                .push(format!("unrecognized category label '{}'; row dropped", label.trim()));
            continue;
        };

        for (index, raw_cell) in cells.iter().enumerate().skip(1) {
            let Some(country) = columns.get(index).copied().flatten() else {
                continue;
            };

            match classify_cell(raw_cell) {
                Some(CellValue::Date(date)) => {
                    scan.date_cells_total += 1;
                    scan.date_cells_parsed += 1;
                    scan.entries.push(RawEntry {
                        category,
                        country,
                        chart,
                        cell: CellValue::Date(date),
                    });
                }
                Some(cell) => {
                    scan.entries.push(RawEntry {
                        category,
                        country,
                        chart,
                        cell,
                    });
                }
                None => {
                    scan.date_cells_total += 1;
                    scan.warnings.push(format!(
                        "unparseable cell '{}' for {}/{}; entry dropped",
                        raw_cell.trim(),
                        category,
                        country
                    ));
                }
            }
        }
    }
}

/// A header row is a cutoff header iff it carries at least one category
/// signal and at least one country signal.
fn is_cutoff_header(cells: &[String]) -> bool {
    let joined = cells.join(" ").replace('\u{a0}', " ").to_uppercase();

    let category_signal = ["EMPLOYMENT", "FAMILY", "EB-", "1ST", "2ND", "OTHER WORKERS"]
        .iter()
        .any(|kw| joined.contains(kw))
        || ["F1", "F2A", "F2B", "F3", "F4"].iter().any(|kw| joined.contains(kw));

    let country_signal = [
        "WORLDWIDE",
        "ALL CHARGEABILITY",
        "CHINA",
        "INDIA",
        "MEXICO",
        "PHILIPPINES",
    ]
    .iter()
    .any(|kw| joined.contains(kw));

    category_signal && country_signal
}

/// C → Current, U → Unavailable, date literal → Date; anything else is a
/// parse warning surfaced by the caller.
fn classify_cell(raw: &str) -> Option<CellValue> {
    let cleaned = raw.replace('\u{a0}', " ").replace('*', "");
    let cleaned = cleaned.trim();

    match cleaned.to_uppercase().as_str() {
        "C" | "CURRENT" => return Some(CellValue::Current),
        "U" | "UNAVAILABLE" => return Some(CellValue::Unavailable),
        _ => {}
    }

    parse_cell_date(cleaned).map(CellValue::Date)
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(html: &str) -> TableScan {
        scan_tables(&Html::parse_document(html))
    }

    const EMPLOYMENT_TABLE: &str = r#"
        <h2>A. Final Action Dates for Employment-Based Preference Cases</h2>
        <table>
          <tr><td>Employment-based</td><td>All Chargeability Areas Except Those Listed</td>
              <td>CHINA-mainland born</td><td>INDIA</td><td>MEXICO</td><td>PHILIPPINES</td></tr>
          <tr><td>2nd</td><td>C</td><td>15JAN23</td><td>01JAN12</td><td>C</td><td>C</td></tr>
          <tr><td>Other Workers</td><td>01DEC21</td><td>01JUN15</td><td>01JAN12</td><td>01DEC21</td><td>01DEC21</td></tr>
        </table>
    "#;

    #[test]
    fn test_canonical_cell_parse() {
        let scan = scan(EMPLOYMENT_TABLE);
        assert!(scan.warnings.is_empty(), "warnings: {:?}", scan.warnings);
        assert_eq!(scan.tables_seen, 1);

        let eb2: Vec<&RawEntry> = scan
            .entries
            .iter()
            .filter(|e| e.category == VisaCategory::Eb2)
            .collect();
        assert_eq!(eb2.len(), 5);

        let by_country = |c: Country| eb2.iter().find(|e| e.country == c).unwrap();
        assert_eq!(by_country(Country::Worldwide).cell, CellValue::Current);
        assert_eq!(
            by_country(Country::China).cell,
            CellValue::Date(NaiveDate::from_ymd_opt(2023, 1, 15).unwrap())
        );
        assert_eq!(
            by_country(Country::India).cell,
            CellValue::Date(NaiveDate::from_ymd_opt(2012, 1, 1).unwrap())
        );
        assert_eq!(by_country(Country::Mexico).cell, CellValue::Current);
        assert_eq!(by_country(Country::Philippines).cell, CellValue::Current);

        assert!(eb2.iter().all(|e| e.chart == ChartType::FinalAction));
    }

    #[test]
    fn test_other_workers_row() {
        let scan = scan(EMPLOYMENT_TABLE);
        let ow: Vec<&RawEntry> = scan
            .entries
            .iter()
            .filter(|e| e.category == VisaCategory::Eb3OtherWorkers)
            .collect();
        assert_eq!(ow.len(), 5);
        assert_eq!(
            ow.iter().find(|e| e.country == Country::China).unwrap().cell,
            CellValue::Date(NaiveDate::from_ymd_opt(2015, 6, 1).unwrap())
        );
    }

    #[test]
    fn test_filing_chart_heading() {
        let html = r#"
            <p>B. Dates for Filing of Employment-Based Visa Applications</p>
            <table>
              <tr><th>Employment-based</th><th>All Chargeability Areas Except Those Listed</th><th>INDIA</th></tr>
              <tr><td>1st</td><td>C</td><td>01FEB22</td></tr>
            </table>
        "#;
        let scan = scan(html);
        assert_eq!(scan.entries.len(), 2);
        assert!(scan.entries.iter().all(|e| e.chart == ChartType::DatesForFiling));
    }

    #[test]
    fn test_irrelevant_table_skipped() {
        let html = r#"
            <h2>Final Action Dates</h2>
            <table><tr><td>Contact</td><td>Phone</td></tr><tr><td>Office</td><td>555</td></tr></table>
        "#;
        let scan = scan(html);
        assert_eq!(scan.tables_seen, 0);
        assert!(scan.entries.is_empty());
    }

    #[test]
    fn test_unheaded_cutoff_table_dropped_with_warning() {
        let html = r#"
            <table>
              <tr><th>Employment-based</th><th>INDIA</th></tr>
              <tr><td>1st</td><td>C</td></tr>
            </table>
        "#;
        let scan = scan(html);
        assert_eq!(scan.tables_seen, 1);
        assert!(scan.entries.is_empty());
        assert_eq!(scan.warnings.len(), 1);
    }

    #[test]
    fn test_unknown_category_row_dropped() {
        let html = r#"
            <h2>Final Action Dates</h2>
            <table>
              <tr><th>Family-Sponsored</th><th>WORLDWIDE</th></tr>
              <tr><td>Diversity</td><td>C</td></tr>
              <tr><td>F1</td><td>01JAN20</td></tr>
            </table>
        "#;
        let scan = scan(html);
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.entries[0].category, VisaCategory::F1);
        assert!(scan.warnings.iter().any(|w| w.contains("Diversity")));
    }

    #[test]
    fn test_garbage_cell_counts_against_parse_rate() {
        let html = r#"
            <h2>Final Action Dates</h2>
            <table>
              <tr><th>Employment-based</th><th>CHINA</th><th>INDIA</th></tr>
              <tr><td>2nd</td><td>15JAN23</td><td>pending</td></tr>
            </table>
        "#;
        let scan = scan(html);
        assert_eq!(scan.date_cells_total, 2);
        assert_eq!(scan.date_cells_parsed, 1);
        assert!((scan.date_parse_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(scan.entries.len(), 1);
    }

    #[test]
    fn test_nbsp_markup_tolerated() {
        let html = "<h2>Final\u{a0}Action Dates</h2>\
            <table><tr><th>Employment-based</th><th>CHINA\u{a0}- mainland born</th></tr>\
            <tr><td>3rd</td><td>\u{a0}01JUN15\u{a0}</td></tr></table>";
        let scan = scan(html);
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(
            scan.entries[0].cell,
            CellValue::Date(NaiveDate::from_ymd_opt(2015, 6, 1).unwrap())
        );
    }
}
