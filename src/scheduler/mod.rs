//! Scheduler module: the poll loop that checks due watches.
//!
//! Every tick loads all watches and walks them one at a time. A watch is
//! only marked as checked once its whole cycle went through; any failure is
//! logged against that watch and the loop moves on to the next one.

mod clock;

pub use clock::*;

use crate::calendar::{FetchError, IdentifierResolver, ResolveError, Snapshot, SnapshotProvider};
use crate::db::{CycleCommit, DbError, Watch, WatchStore};
use crate::diff::diff;
use crate::notify::{describe, format_change_message, format_started_message, Notifier, NotifyError};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{timeout, MissedTickBehavior};

/// Why a single watch's cycle was abandoned.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("resolve failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("store failed: {0}")]
    Store(#[from] DbError),
}

/// What a completed cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    NotDue,
    Baselined,
    Unchanged,
    Changed(usize),
}

/// Per-tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub not_due: usize,
    pub due: usize,
    pub baselined: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub failed: usize,
    /// Change events across all changed watches.
    pub events: usize,
}

/// The poll loop and its collaborators.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn WatchStore>,
    resolver: Arc<dyn IdentifierResolver>,
    provider: Arc<dyn SnapshotProvider>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    call_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn WatchStore>,
        resolver: Arc<dyn IdentifierResolver>,
        provider: Arc<dyn SnapshotProvider>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        tick: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            provider,
            notifier,
            clock,
            tick,
            call_timeout,
        }
    }

    /// Run ticks until `stop_rx` fires or its sender goes away.
    pub async fn run(self, mut stop_rx: broadcast::Receiver<()>) {
        tracing::info!("Scheduler started with a {:?} tick", self.tick);

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.run_tick().await {
                        Ok(report) if report.due > 0 => tracing::info!(
                            due = report.due,
                            baselined = report.baselined,
                            changed = report.changed,
                            events = report.events,
                            unchanged = report.unchanged,
                            failed = report.failed,
                            "Tick complete"
                        ),
                        Ok(_) => {}
                        Err(e) => tracing::error!("Scheduler tick failed: {}", e),
                    }
                }
            }
        }
    }

    /// Check every due watch once.
    ///
    /// Only failing to load the watch list fails the tick as a whole.
    pub async fn run_tick(&self) -> Result<TickReport, DbError> {
        let watches = self.store.get_watches()?;
        let mut report = TickReport::default();

        for watch in watches {
            let now = self.clock.now();
            let (watch_id, target) = (watch.id, watch.target_ref.clone());

            // Each cycle runs in its own task so a panic stays with its watch.
            let this = self.clone();
            let cycle = tokio::spawn(async move { this.process_watch(&watch, now).await });

            match cycle.await {
                Ok(Ok(CycleOutcome::NotDue)) => report.not_due += 1,
                Ok(Ok(outcome)) => {
                    report.due += 1;
                    match outcome {
                        CycleOutcome::Baselined => report.baselined += 1,
                        CycleOutcome::Unchanged => report.unchanged += 1,
                        CycleOutcome::Changed(n) => {
                            report.changed += 1;
                            report.events += n;
                        }
                        CycleOutcome::NotDue => {}
                    }
                }
                Ok(Err(e)) => {
                    report.due += 1;
                    report.failed += 1;
                    tracing::warn!(watch_id, target = %target, "Check failed: {}", e);
                }
                Err(e) => {
                    report.due += 1;
                    report.failed += 1;
                    if e.is_panic() {
                        tracing::error!(watch_id, target = %target, "Check panicked: {}", e);
                    } else {
                        tracing::error!(watch_id, target = %target, "Check aborted: {}", e);
                    }
                }
            }
        }

        Ok(report)
    }

    /// One watch's cycle: resolve, fetch, compare, commit, notify.
    async fn process_watch(
        &self,
        watch: &Watch,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome, CycleError> {
        if !watch.is_due(now) {
            return Ok(CycleOutcome::NotDue);
        }

        let resolved_id = match &watch.resolved_id {
            Some(id) => id.clone(),
            None => {
                let id = self.resolve(&watch.target_ref).await?;
                // Kept even if the rest of this cycle fails.
                self.store.set_resolved_id(watch.id, &id)?;
                tracing::info!(watch_id = watch.id, resolved_id = %id, "Resolved target");
                id
            }
        };

        let current = self.fetch(&resolved_id).await?;

        let Some(previous) = &watch.last_state else {
            self.store.commit_cycle(&CycleCommit {
                watch_id: watch.id,
                checked_at: now,
                new_state: Some(&current),
                changes: None,
            })?;
            tracing::info!(watch_id = watch.id, dates = current.len(), "Baseline recorded");

            let message = format_started_message(&watch.target_ref, &current);
            self.deliver(watch, &message).await;
            return Ok(CycleOutcome::Baselined);
        };

        let events = diff(Some(previous), &current);
        if events.is_empty() {
            self.store.commit_cycle(&CycleCommit {
                watch_id: watch.id,
                checked_at: now,
                new_state: None,
                changes: None,
            })?;
            tracing::debug!(watch_id = watch.id, "No changes");
            return Ok(CycleOutcome::Unchanged);
        }

        let lines: Vec<String> = events.iter().map(describe).collect();
        self.store.commit_cycle(&CycleCommit {
            watch_id: watch.id,
            checked_at: now,
            new_state: Some(&current),
            changes: Some(lines.as_slice()),
        })?;
        tracing::info!(watch_id = watch.id, changes = lines.len(), "Changes detected");

        let message = format_change_message(&watch.target_ref, &lines);
        self.deliver(watch, &message).await;
        Ok(CycleOutcome::Changed(lines.len()))
    }

    async fn resolve(&self, target_ref: &str) -> Result<String, ResolveError> {
        timeout(self.call_timeout, self.resolver.resolve(target_ref))
            .await
            .unwrap_or(Err(ResolveError::Timeout(self.call_timeout)))
    }

    async fn fetch(&self, resolved_id: &str) -> Result<Snapshot, FetchError> {
        timeout(self.call_timeout, self.provider.fetch(resolved_id))
            .await
            .unwrap_or(Err(FetchError::Timeout(self.call_timeout)))
    }

    /// Fire-and-forget: a failed delivery is logged and otherwise ignored.
    async fn deliver(&self, watch: &Watch, message: &str) {
        let result = timeout(
            self.call_timeout,
            self.notifier.deliver(&watch.notify_endpoint, message),
        )
        .await
        .unwrap_or(Err(NotifyError::Timeout(self.call_timeout)));

        if let Err(e) = result {
            tracing::warn!(watch_id = watch.id, "Notification failed: {}", e);
        }
    }
}
