//! Candidate-URL enumeration for bulletin pages.
//!
//! Deterministic: the same fiscal-year range always yields the same sequence,
//! in fiscal-month order (October first). Only "current" mode touches the
//! network, via [`discover_current`].

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use url::Url;

use crate::domain::{calendar_month_of, fiscal_year_for, BulletinError, Result};

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

static BULLETIN_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"visa-bulletin-for-([a-z]+)-(\d{4})\.html").expect("valid regex")
});

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Identity of one bulletin month as planned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct MonthLabel {
    pub fiscal_year: i32,
    pub year: i32,
    pub month: u32,
}

impl MonthLabel {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            fiscal_year: fiscal_year_for(year, month),
            year,
            month,
        }
    }
}

impl fmt::Display for MonthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02} (FY{})", self.year, self.month, self.fiscal_year)
    }
}

/// A candidate bulletin URL with its identity label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedUrl {
    pub label: MonthLabel,
    pub url: String,
}

/// Enumerate candidate URLs for every fiscal month in `[fy_from, fy_to]`.
///
/// The sequence is lazy and restartable; no network I/O happens here.
pub fn plan_range(
    base_url: &str,
    fy_from: i32,
    fy_to: i32,
) -> Result<impl Iterator<Item = PlannedUrl>> {
    if fy_from > fy_to {
        return Err(BulletinError::UrlTemplate(format!(
            "fiscal year range is inverted: {fy_from} > {fy_to}"
        )));
    }
    if !(1990..=2100).contains(&fy_from) || !(1990..=2100).contains(&fy_to) {
        return Err(BulletinError::UrlTemplate(format!(
            "fiscal years out of range: {fy_from}..{fy_to}"
        )));
    }

    let base = base_url.trim_end_matches('/').to_string();
    Ok((fy_from..=fy_to).flat_map(move |fy| {
        let base = base.clone();
        (1..=12u32).map(move |fiscal_month| {
            let (year, month) = calendar_month_of(fy, fiscal_month);
            PlannedUrl {
                label: MonthLabel::new(year, month),
                url: monthly_url(&base, fy, year, month),
            }
        })
    }))
}

/// Canonical monthly page URL under the State Department template.
pub fn monthly_url(base_url: &str, fiscal_year: i32, year: i32, month: u32) -> String {
    let name = MONTH_NAMES[(month - 1) as usize];
    format!(
        "{}/{}/visa-bulletin-for-{}-{}.html",
        base_url.trim_end_matches('/'),
        fiscal_year,
        name,
        year
    )
}

/// Index page listing published bulletins.
pub fn index_url(base_url: &str) -> String {
    format!("{}.html", base_url.trim_end_matches('/'))
}

/// Fetch the index page and return the topmost published bulletin link.
pub async fn discover_current(client: &reqwest::Client, base_url: &str) -> Result<PlannedUrl> {
    let index = index_url(base_url);
    debug!("Discovering current bulletin from {}", index);

    let response = client
        .get(&index)
        .send()
        .await
        .map_err(|e| BulletinError::Network(format!("index fetch failed: {e}")))?;
    if !response.status().is_success() {
        return Err(BulletinError::Network(format!(
            "index fetch failed: HTTP {}",
            response.status()
        )));
    }
    let body = response
        .text()
        .await
        .map_err(|e| BulletinError::Network(format!("index body read failed: {e}")))?;

    extract_current_link(&body, &index).ok_or_else(|| {
        BulletinError::parse(format!("no bulletin link found on index page {index}"))
    })
}

/// Pure extraction of the first bulletin link from index-page HTML.
/// Relative hrefs are resolved against `page_url`.
pub fn extract_current_link(html: &str, page_url: &str) -> Option<PlannedUrl> {
    let document = Html::parse_document(html);
    let page = Url::parse(page_url).ok();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = anchor.value().attr("href")?;
        let captures = match BULLETIN_HREF_RE.captures(href) {
            Some(c) => c,
            None => continue,
        };

        let month_name = captures.get(1).map(|m| m.as_str())?;
        let month = MONTH_NAMES.iter().position(|m| *m == month_name)? as u32 + 1;
        let year: i32 = captures.get(2)?.as_str().parse().ok()?;

        let absolute = match &page {
            Some(p) => p.join(href).map(String::from).unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        };

        return Some(PlannedUrl {
            label: MonthLabel::new(year, month),
            url: absolute,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://travel.state.gov/content/travel/en/legal/visa-law0/visa-bulletin";

    #[test]
    fn test_plan_range_fiscal_order() {
        let urls: Vec<PlannedUrl> = plan_range(BASE, 2024, 2024).unwrap().collect();
        assert_eq!(urls.len(), 12);

        // FY2024 starts October 2023.
        assert_eq!(urls[0].label.year, 2023);
        assert_eq!(urls[0].label.month, 10);
        assert_eq!(urls[0].label.fiscal_year, 2024);
        assert_eq!(
            urls[0].url,
            format!("{BASE}/2024/visa-bulletin-for-october-2023.html")
        );

        // ... and ends September 2024.
        assert_eq!(urls[11].label.year, 2024);
        assert_eq!(urls[11].label.month, 9);
        assert_eq!(
            urls[11].url,
            format!("{BASE}/2024/visa-bulletin-for-september-2024.html")
        );
    }

    #[test]
    fn test_plan_range_is_deterministic() {
        let a: Vec<PlannedUrl> = plan_range(BASE, 2022, 2023).unwrap().collect();
        let b: Vec<PlannedUrl> = plan_range(BASE, 2022, 2023).unwrap().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 24);
    }

    #[test]
    fn test_plan_range_rejects_inverted_range() {
        assert!(plan_range(BASE, 2024, 2020).is_err());
        assert!(plan_range(BASE, 1800, 2024).is_err());
    }

    #[test]
    fn test_extract_current_link() {
        let html = r#"
            <html><body>
            <div class="recent-bulletins">
              <a href="/content/travel/en/legal/visa-law0/visa-bulletin/2025/visa-bulletin-for-june-2025.html">June 2025</a>
              <a href="/content/travel/en/legal/visa-law0/visa-bulletin/2025/visa-bulletin-for-may-2025.html">May 2025</a>
            </div>
            </body></html>
        "#;
        let found = extract_current_link(html, &index_url(BASE)).unwrap();
        assert_eq!(found.label.year, 2025);
        assert_eq!(found.label.month, 6);
        assert_eq!(found.label.fiscal_year, 2025);
        assert!(found.url.starts_with("https://travel.state.gov/"));
        assert!(found.url.ends_with("visa-bulletin-for-june-2025.html"));
    }

    #[test]
    fn test_extract_current_link_ignores_unrelated_anchors() {
        let html = r#"<html><body><a href="/somewhere-else.html">nope</a></body></html>"#;
        assert!(extract_current_link(html, &index_url(BASE)).is_none());
    }
}
