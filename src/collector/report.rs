//! Run reporting for backfills and monthly refreshes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::planner::MonthLabel;

/// Why a bulletin ended up in `failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Network,
    Parse,
    Storage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedBulletin {
    pub label: MonthLabel,
    pub url: String,
    pub error: String,
    pub retries: u32,
    pub kind: FailureKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantinedBulletin {
    pub label: MonthLabel,
    pub reason: String,
    pub date_parse_rate: f64,
}

/// Outcome summary of one collector run. The collector is the only layer
/// that decides run-level outcomes; everything below it reports values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Planned (fiscal month, URL) pairs.
    pub attempted: usize,
    /// Successfully downloaded documents.
    pub fetched: usize,
    /// Documents that produced a bulletin value.
    pub parsed: usize,
    /// Bulletins committed to the repository.
    pub stored: usize,
    /// Months skipped because they were already stored (resume).
    pub skipped: usize,
    /// Candidate URLs answering 404: the bulletin does not exist.
    pub missing: usize,

    pub quarantined: Vec<QuarantinedBulletin>,
    pub failed: Vec<FailedBulletin>,

    /// True when the run stopped on a cancellation signal; counts above
    /// reflect the partial progress that remains committed.
    pub cancelled: bool,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            attempted: 0,
            fetched: 0,
            parsed: 0,
            stored: 0,
            skipped: 0,
            missing: 0,
            quarantined: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Something went wrong for at least one bulletin.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.quarantined.is_empty()
    }

    /// Every non-skipped bulletin failed at the network layer and nothing was
    /// stored: retries are exhausted across the board.
    pub fn network_exhausted(&self) -> bool {
        !self.failed.is_empty()
            && self.stored == 0
            && self.fetched == 0
            && self
                .failed
                .iter()
                .all(|f| f.kind == FailureKind::Network)
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(kind: FailureKind) -> FailedBulletin {
        FailedBulletin {
            label: MonthLabel::new(2024, 1),
            url: "https://example.gov".to_string(),
            error: "boom".to_string(),
            retries: 3,
            kind,
        }
    }

    #[test]
    fn test_network_exhaustion_detection() {
        let mut report = RunReport::new();
        report.attempted = 2;
        report.failed.push(failed(FailureKind::Network));
        report.failed.push(failed(FailureKind::Network));
        assert!(report.network_exhausted());

        report.fetched = 1;
        assert!(!report.network_exhausted());
    }

    #[test]
    fn test_partial_failure_detection() {
        let mut report = RunReport::new();
        assert!(!report.has_failures());
        report.quarantined.push(QuarantinedBulletin {
            label: MonthLabel::new(2024, 2),
            reason: "date_parse_rate_below_floor".to_string(),
            date_parse_rate: 0.2,
        });
        assert!(report.has_failures());
    }
}
