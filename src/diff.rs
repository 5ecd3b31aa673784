//! Snapshot comparison.

use crate::calendar::{Availability, Snapshot};

use chrono::NaiveDate;
use std::collections::BTreeSet;

/// One reportable difference between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A date not seen before, showing a notable code.
    Appeared { date: NaiveDate, code: Availability },
    /// A date whose code changed.
    Transitioned {
        date: NaiveDate,
        from: Availability,
        to: Availability,
    },
}

impl ChangeEvent {
    pub fn date(&self) -> NaiveDate {
        match self {
            ChangeEvent::Appeared { date, .. } | ChangeEvent::Transitioned { date, .. } => *date,
        }
    }
}

/// Compare two snapshots and list what changed, ordered by date.
///
/// Without a previous snapshot there is nothing to compare against and the
/// result is empty. Dates that drop out of the current snapshot are the
/// calendar window rolling forward and produce no event; dates that appear
/// are only reported when their code is notable.
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<ChangeEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    let dates: BTreeSet<&NaiveDate> = previous.dates().chain(current.dates()).collect();

    dates
        .into_iter()
        .filter_map(|date| match (previous.get(date), current.get(date)) {
            (None, Some(code)) if code.is_notable() => Some(ChangeEvent::Appeared {
                date: *date,
                code,
            }),
            (Some(from), Some(to)) if from != to => Some(ChangeEvent::Transitioned {
                date: *date,
                from,
                to,
            }),
            _ => None,
        })
        .collect()
}
