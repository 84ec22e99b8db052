//! Date grammar for bulletin cells and publication lines.
//!
//! All accepted patterns live in one ordered list; parsing never raises into
//! the pipeline. A cell that matches nothing yields `None` and the caller
//! decides what that means.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Two-digit years at or above this pivot are 19xx; below it, 20xx.
pub const TWO_DIGIT_YEAR_PIVOT: u32 = 50;

// Canonical State Department cell form: 15JAN23.
static DDMMMYY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})([A-Z]{3})(\d{2})$").expect("valid regex"));

// 01/15/23 and 01/15/2023.
static SLASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})$").expect("valid regex"));

// "January 15, 2023" / "Jan 15, 2023" scanned out of running text.
static TEXTUAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)\.?\s+(\d{1,2}),?\s+(\d{4})\b",
    )
    .expect("valid regex")
});

fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    let month = match abbrev.to_uppercase().as_str() {
        "JAN" | "JANUARY" => 1,
        "FEB" | "FEBRUARY" => 2,
        "MAR" | "MARCH" => 3,
        "APR" | "APRIL" => 4,
        "MAY" => 5,
        "JUN" | "JUNE" => 6,
        "JUL" | "JULY" => 7,
        "AUG" | "AUGUST" => 8,
        "SEP" | "SEPT" | "SEPTEMBER" => 9,
        "OCT" | "OCTOBER" => 10,
        "NOV" | "NOVEMBER" => 11,
        "DEC" | "DECEMBER" => 12,
        _ => return None,
    };
    Some(month)
}

/// Apply the fixed two-digit-year pivot: 49 → 2049, 50 → 1950.
pub fn expand_two_digit_year(yy: u32) -> i32 {
    if yy >= TWO_DIGIT_YEAR_PIVOT {
        1900 + yy as i32
    } else {
        2000 + yy as i32
    }
}

/// Parse a priority-date cell. Accepted forms, attempted in order:
/// `DDMMMYY`, `MMM DD, YYYY`, `DD MMM YYYY`, `MM/DD/YY`, `MM/DD/YYYY`.
pub fn parse_cell_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.replace('\u{a0}', " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let upper = cleaned.to_uppercase();

    // 15JAN23
    if let Some(caps) = DDMMMYY_RE.captures(&upper) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_from_abbrev(&caps[2])?;
        let yy: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(expand_two_digit_year(yy), month, day);
    }

    // Jan 15, 2023 / 15 Jan 2023 (four-digit years go through chrono).
    for format in ["%b %d, %Y", "%b %d %Y", "%d %b %Y", "%B %d, %Y", "%d %B %Y"] {
        // chrono's %b is case-sensitive about "Jan" vs "JAN"; normalize.
        if let Ok(date) = NaiveDate::parse_from_str(&titlecase_months(cleaned), format) {
            return Some(date);
        }
    }

    // 01/15/23 and 01/15/2023
    if let Some(caps) = SLASH_RE.captures(cleaned) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year_str = &caps[3];
        let year = if year_str.len() == 2 {
            expand_two_digit_year(year_str.parse().ok()?)
        } else {
            year_str.parse().ok()?
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Scan running text for the first publication-date pattern
/// ("October 12, 2023").
pub fn scan_publication_date(text: &str) -> Option<NaiveDate> {
    let caps = TEXTUAL_RE.captures(text)?;
    let month = month_from_abbrev(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

// chrono parses "%b" against "Jan", not "JAN"; bulletins use both.
fn titlecase_months(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_ascii_alphabetic() {
            if at_word_start {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c.to_ascii_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
