//! Summary of one update run.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A coordinate that failed, with the first cause recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedCoordinate {
    pub time: DateTime<Utc>,
    pub cause: String,
}

/// What an update did. Coordinate lists are sorted by time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub dataset_id: String,
    /// Coordinates newly committed by this run.
    pub committed: Vec<DateTime<Utc>>,
    pub pending: Vec<DateTime<Utc>>,
    pub failed: Vec<FailedCoordinate>,
    pub watermark_before: Option<DateTime<Utc>>,
    pub watermark_after: Option<DateTime<Utc>>,
}

impl UpdateReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub(crate) fn sort(&mut self) {
        self.committed.sort();
        self.pending.sort();
        self.failed.sort_by_key(|f| f.time);
    }
}
