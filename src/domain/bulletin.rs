use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::category::{ChartType, Country, EntryStatus, VisaCategory};
use super::error::{BulletinError, Result};

/// US federal fiscal year for a calendar (year, month): FY N runs October of
/// N-1 through September of N.
pub fn fiscal_year_for(year: i32, month: u32) -> i32 {
    if month >= 10 {
        year + 1
    } else {
        year
    }
}

/// Calendar (year, month) of a fiscal month. `fiscal_month` is 1-based
/// starting at October.
pub fn calendar_month_of(fiscal_year: i32, fiscal_month: u32) -> (i32, u32) {
    debug_assert!((1..=12).contains(&fiscal_month));
    if fiscal_month <= 3 {
        (fiscal_year - 1, fiscal_month + 9)
    } else {
        (fiscal_year, fiscal_month - 3)
    }
}

/// One monthly Visa Bulletin publication.
///
/// Identity is `(year, month)`; `fiscal_year` is always derived, never trusted
/// from the source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bulletin {
    /// Database id; `None` until persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Calendar year of the bulletin month.
    pub year: i32,

    /// Calendar month, 1-12.
    pub month: u32,

    /// Derived US federal fiscal year.
    pub fiscal_year: i32,

    /// Publication date extracted from the document, or the first of the
    /// bulletin month when the document carries none.
    pub bulletin_date: NaiveDate,

    pub source_url: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bulletin {
    pub fn new(year: i32, month: u32, bulletin_date: NaiveDate, source_url: String) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            year,
            month,
            fiscal_year: fiscal_year_for(year, month),
            bulletin_date,
            source_url,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.month) {
            return Err(BulletinError::validation(format!(
                "month out of range: {}",
                self.month
            )));
        }
        if self.fiscal_year != fiscal_year_for(self.year, self.month) {
            return Err(BulletinError::validation(format!(
                "fiscal year {} inconsistent with {}-{:02}",
                self.fiscal_year, self.year, self.month
            )));
        }
        Ok(())
    }
}

/// One (category, country, chart) cell of a bulletin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Parent bulletin id; `None` until persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulletin_id: Option<i64>,

    pub category: VisaCategory,
    pub country: Country,
    pub chart: ChartType,
    pub status: EntryStatus,

    /// Present iff `status == Dated`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CategoryEntry {
    pub fn current(category: VisaCategory, country: Country, chart: ChartType) -> Self {
        Self {
            id: None,
            bulletin_id: None,
            category,
            country,
            chart,
            status: EntryStatus::Current,
            priority_date: None,
            notes: None,
        }
    }

    pub fn unavailable(category: VisaCategory, country: Country, chart: ChartType) -> Self {
        Self {
            status: EntryStatus::Unavailable,
            ..Self::current(category, country, chart)
        }
    }

    pub fn dated(
        category: VisaCategory,
        country: Country,
        chart: ChartType,
        priority_date: NaiveDate,
    ) -> Self {
        Self {
            status: EntryStatus::Dated,
            priority_date: Some(priority_date),
            ..Self::current(category, country, chart)
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Identity key within one bulletin.
    pub fn key(&self) -> (VisaCategory, Country, ChartType) {
        (self.category, self.country, self.chart)
    }

    /// Enforce the status/priority-date invariant.
    pub fn validate(&self) -> Result<()> {
        match (self.status, self.priority_date) {
            (EntryStatus::Dated, None) => Err(BulletinError::validation(format!(
                "{}/{}/{}: DATED entry missing priority date",
                self.category, self.country, self.chart
            ))),
            (EntryStatus::Current, Some(_)) | (EntryStatus::Unavailable, Some(_)) => {
                Err(BulletinError::validation(format!(
                    "{}/{}/{}: {} entry carries a priority date",
                    self.category, self.country, self.chart, self.status
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiscal_year_boundary() {
        // October belongs to the next fiscal year.
        assert_eq!(fiscal_year_for(2024, 10), 2025);
        assert_eq!(fiscal_year_for(2024, 9), 2024);
        assert_eq!(fiscal_year_for(2024, 12), 2025);
        assert_eq!(fiscal_year_for(2025, 1), 2025);
    }

    #[test]
    fn test_calendar_month_of() {
        assert_eq!(calendar_month_of(2025, 1), (2024, 10));
        assert_eq!(calendar_month_of(2025, 3), (2024, 12));
        assert_eq!(calendar_month_of(2025, 4), (2025, 1));
        assert_eq!(calendar_month_of(2025, 12), (2025, 9));
    }

    #[test]
    fn test_bulletin_derives_fiscal_year() {
        let date = NaiveDate::from_ymd_opt(2024, 9, 12).unwrap();
        let b = Bulletin::new(2024, 10, date, "https://example.gov".to_string());
        assert_eq!(b.fiscal_year, 2025);
        assert!(b.validate().is_ok());
    }

    #[test]
    fn test_bulletin_rejects_bad_month() {
        let date = NaiveDate::from_ymd_opt(2024, 9, 12).unwrap();
        let mut b = Bulletin::new(2024, 10, date, String::new());
        b.month = 13;
        assert!(b.validate().is_err());
    }

    #[test]
    fn test_entry_invariants() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();

        let ok = CategoryEntry::dated(
            VisaCategory::Eb2,
            Country::China,
            ChartType::FinalAction,
            date,
        );
        assert!(ok.validate().is_ok());

        let mut bad = CategoryEntry::current(
            VisaCategory::Eb2,
            Country::China,
            ChartType::FinalAction,
        );
        bad.priority_date = Some(date);
        assert!(bad.validate().is_err());

        let mut bad = CategoryEntry::dated(
            VisaCategory::Eb2,
            Country::China,
            ChartType::FinalAction,
            date,
        );
        bad.priority_date = None;
        assert!(bad.validate().is_err());
    }
}
