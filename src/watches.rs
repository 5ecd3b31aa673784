//! Watch lifecycle operations used by the web layer.

use crate::calendar::IdentifierResolver;
use crate::db::{DbError, HistoryEntry, NewWatch, Watch, WatchStore};

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("invalid watch: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] DbError),
}

/// Validate and store a new watch.
///
/// The restaurant id is looked up right away when possible; a failed lookup
/// is left for the scheduler to retry.
pub async fn create_watch(
    store: &dyn WatchStore,
    resolver: &dyn IdentifierResolver,
    mut new: NewWatch,
    default_interval: u32,
    lookup_timeout: Duration,
    now: DateTime<Utc>,
) -> Result<Watch, WatchError> {
    new.target_ref = new.target_ref.trim().to_string();
    new.notify_endpoint = new.notify_endpoint.trim().to_string();

    if new.target_ref.is_empty() {
        return Err(WatchError::Invalid("target is required".to_string()));
    }
    if new.notify_endpoint.is_empty() {
        return Err(WatchError::Invalid("notification endpoint is required".to_string()));
    }
    let interval = new.check_interval_seconds.unwrap_or(default_interval);
    if interval == 0 {
        return Err(WatchError::Invalid("check interval must be positive".to_string()));
    }

    let resolved = match tokio::time::timeout(lookup_timeout, resolver.resolve(&new.target_ref)).await {
        Ok(Ok(id)) => Some(id),
        Ok(Err(e)) => {
            tracing::warn!(target = %new.target_ref, "Could not resolve new watch yet: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!(target = %new.target_ref, "Resolving new watch timed out");
            None
        }
    };

    let watch = store.add_watch(&new, interval, now, resolved.as_deref())?;
    tracing::info!(watch_id = watch.id, target = %watch.target_ref, "Watch created");
    Ok(watch)
}

/// All watches, newest first.
pub fn list_watches(store: &dyn WatchStore) -> Result<Vec<Watch>, WatchError> {
    Ok(store.get_watches()?)
}

/// Remove a watch and its history.
pub fn delete_watch(store: &dyn WatchStore, id: i64) -> Result<(), WatchError> {
    store.delete_watch(id)?;
    tracing::info!(watch_id = id, "Watch deleted");
    Ok(())
}

/// Change batches recorded for a watch, newest first.
pub fn watch_history(store: &dyn WatchStore, id: i64) -> Result<Vec<HistoryEntry>, WatchError> {
    // Distinguish "no such watch" from "no history yet".
    store.get_watch(id)?;
    Ok(store.get_history(id)?)
}
