//! Calendar module: availability snapshots and the collaborators that
//! produce them.
//!
//! The scheduler only sees the two traits defined here; the HTTP adapter
//! for the reservation site lives in [`tabelog`].

mod tabelog;

pub use tabelog::*;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Identifier resolution errors.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("resolution timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("no identifier found on {0}")]
    NotFound(String),
}

/// Snapshot fetch errors.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("invalid payload: {0}")]
    Payload(String),
}

/// Availability of a single calendar date.
///
/// Stored and transmitted as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Availability {
    Unavailable,
    CallRequired,
    FewLeft,
    Unknown,
    Available,
}

impl Availability {
    pub fn code(self) -> u8 {
        match self {
            Availability::Unavailable => 0,
            Availability::CallRequired => 1,
            Availability::FewLeft => 2,
            Availability::Unknown => 3,
            Availability::Available => 4,
        }
    }

    /// Whether a date newly showing up with this code is worth reporting.
    pub fn is_notable(self) -> bool {
        matches!(
            self,
            Availability::CallRequired | Availability::FewLeft | Availability::Available
        )
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Availability::Unavailable => "❌",
            Availability::CallRequired => "📞",
            Availability::FewLeft => "⚠️",
            Availability::Unknown => "❓",
            Availability::Available => "⭕",
        }
    }
}

impl TryFrom<u8> for Availability {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Availability::Unavailable),
            1 => Ok(Availability::CallRequired),
            2 => Ok(Availability::FewLeft),
            3 => Ok(Availability::Unknown),
            4 => Ok(Availability::Available),
            other => Err(format!("unknown availability code {}", other)),
        }
    }
}

impl From<Availability> for u8 {
    fn from(a: Availability) -> u8 {
        a.code()
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glyph())
    }
}

/// Point-in-time availability for one restaurant, keyed by calendar date.
///
/// Serializes as `{"YYYY-MM-DD": code, ...}` in date order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<NaiveDate, Availability>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, availability: Availability) {
        self.0.insert(date, availability);
    }

    pub fn get(&self, date: &NaiveDate) -> Option<Availability> {
        self.0.get(date).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.0.keys()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl FromIterator<(NaiveDate, Availability)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, Availability)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Maps a page reference (e.g. a restaurant URL) to the stable id used for
/// vacancy fetches.
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    async fn resolve(&self, target_ref: &str) -> Result<String, ResolveError>;
}

/// Fetches the current availability snapshot for a resolved id.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch(&self, resolved_id: &str) -> Result<Snapshot, FetchError>;
}
