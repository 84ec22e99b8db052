use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical visa preference categories tracked across bulletins.
///
/// Raw bulletin labels ("1st", "Other Workers", "Employment 5th", ...) are
/// resolved to these variants by [`VisaCategory::from_raw_label`]; unknown
/// labels are rejected so downstream stages only ever see closed variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VisaCategory {
    #[serde(rename = "EB1")]
    Eb1,
    #[serde(rename = "EB2")]
    Eb2,
    #[serde(rename = "EB3")]
    Eb3,
    #[serde(rename = "EB3_OTHER_WORKERS")]
    Eb3OtherWorkers,
    #[serde(rename = "EB4")]
    Eb4,
    #[serde(rename = "EB5")]
    Eb5,
    F1,
    F2A,
    F2B,
    F3,
    F4,
}

impl VisaCategory {
    pub const ALL: [VisaCategory; 11] = [
        VisaCategory::Eb1,
        VisaCategory::Eb2,
        VisaCategory::Eb3,
        VisaCategory::Eb3OtherWorkers,
        VisaCategory::Eb4,
        VisaCategory::Eb5,
        VisaCategory::F1,
        VisaCategory::F2A,
        VisaCategory::F2B,
        VisaCategory::F3,
        VisaCategory::F4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisaCategory::Eb1 => "EB1",
            VisaCategory::Eb2 => "EB2",
            VisaCategory::Eb3 => "EB3",
            VisaCategory::Eb3OtherWorkers => "EB3_OTHER_WORKERS",
            VisaCategory::Eb4 => "EB4",
            VisaCategory::Eb5 => "EB5",
            VisaCategory::F1 => "F1",
            VisaCategory::F2A => "F2A",
            VisaCategory::F2B => "F2B",
            VisaCategory::F3 => "F3",
            VisaCategory::F4 => "F4",
        }
    }

    pub fn is_employment(&self) -> bool {
        matches!(
            self,
            VisaCategory::Eb1
                | VisaCategory::Eb2
                | VisaCategory::Eb3
                | VisaCategory::Eb3OtherWorkers
                | VisaCategory::Eb4
                | VisaCategory::Eb5
        )
    }

    pub fn is_family(&self) -> bool {
        !self.is_employment()
    }

    /// Resolve a raw first-column label from a bulletin table.
    ///
    /// Handles the ordinal forms the State Department has used over two
    /// decades ("1st", "EB-3", "Professionals and Skilled Workers", ...).
    /// Returns `None` for labels outside the closed set; the caller drops the
    /// row with a warning.
    pub fn from_raw_label(raw: &str) -> Option<Self> {
        let label = normalize_label(raw);
        if label.is_empty() {
            return None;
        }

        // "Other Workers" must win over the generic 3rd-preference match.
        if label.contains("OTHER WORKER") {
            return Some(VisaCategory::Eb3OtherWorkers);
        }

        match label.as_str() {
            "1ST" | "EB1" | "EB-1" | "EMPLOYMENT 1ST" => return Some(VisaCategory::Eb1),
            "2ND" | "EB2" | "EB-2" | "EMPLOYMENT 2ND" => return Some(VisaCategory::Eb2),
            "3RD" | "EB3" | "EB-3" | "EMPLOYMENT 3RD" => return Some(VisaCategory::Eb3),
            "4TH" | "EB4" | "EB-4" | "EMPLOYMENT 4TH" => return Some(VisaCategory::Eb4),
            "5TH" | "EB5" | "EB-5" | "EMPLOYMENT 5TH" => return Some(VisaCategory::Eb5),
            "F1" => return Some(VisaCategory::F1),
            "F2A" => return Some(VisaCategory::F2A),
            "F2B" => return Some(VisaCategory::F2B),
            "F3" => return Some(VisaCategory::F3),
            "F4" => return Some(VisaCategory::F4),
            _ => {}
        }

        if label.contains("PRIORITY WORKER") {
            return Some(VisaCategory::Eb1);
        }
        if label.contains("ADVANCED DEGREE") || label.contains("EXCEPTIONAL ABILITY") {
            return Some(VisaCategory::Eb2);
        }
        if label.contains("SKILLED WORKER") || label.contains("PROFESSIONALS") {
            return Some(VisaCategory::Eb3);
        }
        if label.contains("SPECIAL IMMIGRANT") || label.contains("RELIGIOUS WORKER") {
            return Some(VisaCategory::Eb4);
        }
        if label.contains("INVESTOR") || label.contains("REGIONAL CENTER") {
            return Some(VisaCategory::Eb5);
        }
        // EB-5 set-aside rows ("5th Unreserved", "5th Set Aside: Rural") all
        // start with the ordinal.
        if label.starts_with("5TH") {
            return Some(VisaCategory::Eb5);
        }
        if label.starts_with("F2A") {
            return Some(VisaCategory::F2A);
        }
        if label.starts_with("F2B") {
            return Some(VisaCategory::F2B);
        }

        None
    }
}

impl fmt::Display for VisaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VisaCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "EB1" | "EB-1" => Ok(VisaCategory::Eb1),
            "EB2" | "EB-2" => Ok(VisaCategory::Eb2),
            "EB3" | "EB-3" => Ok(VisaCategory::Eb3),
            "EB3_OTHER_WORKERS" | "OTHER_WORKERS" | "OTHER-WORKERS" => {
                Ok(VisaCategory::Eb3OtherWorkers)
            }
            "EB4" | "EB-4" => Ok(VisaCategory::Eb4),
            "EB5" | "EB-5" => Ok(VisaCategory::Eb5),
            "F1" => Ok(VisaCategory::F1),
            "F2A" => Ok(VisaCategory::F2A),
            "F2B" => Ok(VisaCategory::F2B),
            "F3" => Ok(VisaCategory::F3),
            "F4" => Ok(VisaCategory::F4),
            other => Err(format!("unknown visa category: {other}")),
        }
    }
}

/// Chargeability countries with per-country caps broken out in bulletins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Country {
    Worldwide,
    China,
    India,
    Mexico,
    Philippines,
}

impl Country {
    pub const ALL: [Country; 5] = [
        Country::Worldwide,
        Country::China,
        Country::India,
        Country::Mexico,
        Country::Philippines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Country::Worldwide => "WORLDWIDE",
            Country::China => "CHINA",
            Country::India => "INDIA",
            Country::Mexico => "MEXICO",
            Country::Philippines => "PHILIPPINES",
        }
    }

    /// Resolve a column header ("CHINA-mainland born", "All Chargeability
    /// Areas Except Those Listed", ...) to a chargeability country.
    pub fn from_header(raw: &str) -> Option<Self> {
        let header = normalize_label(raw);
        if header.is_empty() {
            return None;
        }
        if header.contains("CHINA") {
            return Some(Country::China);
        }
        if header.contains("INDIA") {
            return Some(Country::India);
        }
        if header.contains("MEXICO") {
            return Some(Country::Mexico);
        }
        if header.contains("PHILIPPINES") {
            return Some(Country::Philippines);
        }
        if header.contains("WORLDWIDE") || header.contains("ALL CHARGEABILITY") {
            return Some(Country::Worldwide);
        }
        None
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Country {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "WORLDWIDE" | "ALL" => Ok(Country::Worldwide),
            "CHINA" => Ok(Country::China),
            "INDIA" => Ok(Country::India),
            "MEXICO" => Ok(Country::Mexico),
            "PHILIPPINES" => Ok(Country::Philippines),
            other => Err(format!("unknown chargeability country: {other}")),
        }
    }
}

/// Which of the two monthly charts an entry belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChartType {
    FinalAction,
    DatesForFiling,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::FinalAction => "FINAL_ACTION",
            ChartType::DatesForFiling => "DATES_FOR_FILING",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "FINAL_ACTION" | "FINAL" => Ok(ChartType::FinalAction),
            "DATES_FOR_FILING" | "FILING" => Ok(ChartType::DatesForFiling),
            other => Err(format!("unknown chart type: {other}")),
        }
    }
}

/// Status of a single (category, country) cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Current,
    Unavailable,
    Dated,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Current => "CURRENT",
            EntryStatus::Unavailable => "UNAVAILABLE",
            EntryStatus::Dated => "DATED",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CURRENT" => Ok(EntryStatus::Current),
            "UNAVAILABLE" => Ok(EntryStatus::Unavailable),
            "DATED" => Ok(EntryStatus::Dated),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

/// Uppercase, strip NBSPs, collapse interior whitespace.
fn normalize_label(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
