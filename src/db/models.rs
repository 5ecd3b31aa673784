//! Database model types.

use crate::calendar::Snapshot;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A monitored restaurant calendar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Watch {
    pub id: i64,
    /// Page the restaurant id is resolved from.
    pub target_ref: String,
    /// Cached restaurant id; `None` until the first successful resolution.
    pub resolved_id: Option<String>,
    pub notify_endpoint: String,
    /// Last baseline; `None` until the first successful fetch.
    pub last_state: Option<Snapshot>,
    pub check_interval_seconds: u32,
    /// Time of the last fully processed check.
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Watch {
    /// Whether the watch's interval has elapsed since its last successful check.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked_at {
            None => true,
            Some(last) => now - last >= Duration::seconds(i64::from(self.check_interval_seconds)),
        }
    }
}

/// Fields supplied when creating a watch.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWatch {
    pub target_ref: String,
    pub notify_endpoint: String,
    #[serde(default)]
    pub check_interval_seconds: Option<u32>,
}

/// One batch of changes recorded for a watch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub watch_id: i64,
    pub timestamp: DateTime<Utc>,
    pub details: Vec<String>,
}

/// Everything a completed check writes for one watch, applied atomically.
#[derive(Debug, Clone)]
pub struct CycleCommit<'a> {
    pub watch_id: i64,
    pub checked_at: DateTime<Utc>,
    /// Replacement baseline, if it changed.
    pub new_state: Option<&'a Snapshot>,
    /// Change lines to append as a history entry.
    pub changes: Option<&'a [String]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn watch(interval: u32, last: Option<DateTime<Utc>>) -> Watch {
        Watch {
            id: 1,
            target_ref: "https://example.com/rst".to_string(),
            resolved_id: None,
            notify_endpoint: String::new(),
            last_state: None,
            check_interval_seconds: interval,
            last_checked_at: last,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_is_due() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        assert!(watch(300, None).is_due(t0));

        let w = watch(300, Some(t0));
        assert!(!w.is_due(t0));
        assert!(!w.is_due(t0 + Duration::seconds(299)));
        assert!(w.is_due(t0 + Duration::seconds(300)));
        assert!(w.is_due(t0 + Duration::seconds(3600)));
    }
}
