//! Fakes shared by unit tests.

use crate::calendar::{FetchError, IdentifierResolver, ResolveError, Snapshot, SnapshotProvider};
use crate::db::{CycleCommit, DbError, HistoryEntry, NewWatch, Store, Watch, WatchStore};
use crate::notify::{Notifier, NotifyError};
use crate::scheduler::Clock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Resolver answering from a fixed table; unknown targets fail.
#[derive(Default)]
pub struct FakeResolver {
    ids: Mutex<HashMap<String, String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn with(self, target_ref: &str, id: &str) -> Self {
        self.ids
            .lock()
            .unwrap()
            .insert(target_ref.to_string(), id.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl IdentifierResolver for FakeResolver {
    async fn resolve(&self, target_ref: &str) -> Result<String, ResolveError> {
        self.calls.lock().unwrap().push(target_ref.to_string());
        self.ids
            .lock()
            .unwrap()
            .get(target_ref)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(target_ref.to_string()))
    }
}

/// Provider serving whatever snapshot is currently set per id.
///
/// Ids without a snapshot fail with a network error; ids marked as hanging
/// never answer and ids marked as crashing panic.
#[derive(Default)]
pub struct FakeProvider {
    snapshots: Mutex<HashMap<String, Snapshot>>,
    hanging: Mutex<HashSet<String>>,
    crashing: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn set(&self, resolved_id: &str, snapshot: Snapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(resolved_id.to_string(), snapshot);
    }

    pub fn fail(&self, resolved_id: &str) {
        self.snapshots.lock().unwrap().remove(resolved_id);
    }

    pub fn hang(&self, resolved_id: &str) {
        self.hanging.lock().unwrap().insert(resolved_id.to_string());
    }

    pub fn crash(&self, resolved_id: &str) {
        self.crashing.lock().unwrap().insert(resolved_id.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SnapshotProvider for FakeProvider {
    async fn fetch(&self, resolved_id: &str) -> Result<Snapshot, FetchError> {
        self.calls.lock().unwrap().push(resolved_id.to_string());
        let hanging = self.hanging.lock().unwrap().contains(resolved_id);
        if hanging {
            std::future::pending::<()>().await;
        }
        let crashing = self.crashing.lock().unwrap().contains(resolved_id);
        if crashing {
            panic!("calendar payload for {} blew up", resolved_id);
        }
        self.snapshots
            .lock()
            .unwrap()
            .get(resolved_id)
            .cloned()
            .ok_or_else(|| FetchError::Network(format!("no route to {}", resolved_id)))
    }
}

/// Notifier that records every message and can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, endpoint: &str, message: &str) -> Result<(), NotifyError> {
        let failing = *self.failing.lock().unwrap();
        if failing {
            return Err(NotifyError::Rejected(500));
        }
        self.sent
            .lock()
            .unwrap()
            .push((endpoint.to_string(), message.to_string()));
        Ok(())
    }
}

/// Store wrapper that fails cycle commits for selected watches.
pub struct FlakyStore {
    pub inner: Store,
    pub broken: Mutex<HashSet<i64>>,
}

impl FlakyStore {
    pub fn new(inner: Store) -> Self {
        Self {
            inner,
            broken: Mutex::default(),
        }
    }

    pub fn break_watch(&self, id: i64) {
        self.broken.lock().unwrap().insert(id);
    }
}

impl WatchStore for FlakyStore {
    fn add_watch(
        &self,
        watch: &NewWatch,
        check_interval: u32,
        created_at: DateTime<Utc>,
        resolved_id: Option<&str>,
    ) -> Result<Watch, DbError> {
        self.inner
            .add_watch(watch, check_interval, created_at, resolved_id)
    }

    fn get_watches(&self) -> Result<Vec<Watch>, DbError> {
        self.inner.get_watches()
    }

    fn get_watch(&self, id: i64) -> Result<Watch, DbError> {
        self.inner.get_watch(id)
    }

    fn delete_watch(&self, id: i64) -> Result<(), DbError> {
        self.inner.delete_watch(id)
    }

    fn set_resolved_id(&self, id: i64, resolved_id: &str) -> Result<(), DbError> {
        self.inner.set_resolved_id(id, resolved_id)
    }

    fn commit_cycle(&self, commit: &CycleCommit<'_>) -> Result<(), DbError> {
        if self.broken.lock().unwrap().contains(&commit.watch_id) {
            return Err(DbError::Poisoned);
        }
        self.inner.commit_cycle(commit)
    }

    fn get_history(&self, watch_id: i64) -> Result<Vec<HistoryEntry>, DbError> {
        self.inner.get_history(watch_id)
    }
}

/// Fresh on-disk store; keep the temp file alive for the test's duration.
pub fn temp_store() -> (NamedTempFile, Store) {
    let tmp = NamedTempFile::new().unwrap();
    let store = Store::new(tmp.path()).unwrap();
    (tmp, store)
}

pub fn new_watch(target_ref: &str) -> NewWatch {
    NewWatch {
        target_ref: target_ref.to_string(),
        notify_endpoint: format!("{}#hook", target_ref),
        check_interval_seconds: None,
    }
}
