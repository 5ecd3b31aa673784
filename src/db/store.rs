//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use crate::calendar::Snapshot;

mod embedded {
    refinery::embed_migrations!("migrations");
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("Connection lock poisoned")]
    Poisoned,
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Persistence contract for watches and their change history.
///
/// Resolved ids are committed on their own; everything else a check
/// produces goes through [`WatchStore::commit_cycle`] as one unit.
pub trait WatchStore: Send + Sync {
    fn add_watch(
        &self,
        watch: &NewWatch,
        check_interval: u32,
        created_at: DateTime<Utc>,
        resolved_id: Option<&str>,
    ) -> Result<Watch, DbError>;
    /// All watches, newest first.
    fn get_watches(&self) -> Result<Vec<Watch>, DbError>;
    fn get_watch(&self, id: i64) -> Result<Watch, DbError>;
    /// Delete a watch together with its history.
    fn delete_watch(&self, id: i64) -> Result<(), DbError>;
    fn set_resolved_id(&self, id: i64, resolved_id: &str) -> Result<(), DbError>;
    fn commit_cycle(&self, commit: &CycleCommit<'_>) -> Result<(), DbError>;
    /// History for one watch, newest first.
    fn get_history(&self, watch_id: i64) -> Result<Vec<HistoryEntry>, DbError>;
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        embedded::migrations::runner()
            .run(&mut conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }
}

const WATCH_COLUMNS: &str = "id, target_ref, resolved_id, notify_endpoint, last_state, check_interval, last_checked_at, created_at";

impl WatchStore for Store {
    fn add_watch(
        &self,
        watch: &NewWatch,
        check_interval: u32,
        created_at: DateTime<Utc>,
        resolved_id: Option<&str>,
    ) -> Result<Watch, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO watches (target_ref, resolved_id, notify_endpoint, check_interval, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                watch.target_ref,
                resolved_id,
                watch.notify_endpoint,
                check_interval,
                format_db_time(created_at),
            ],
        )?;

        Ok(Watch {
            id: conn.last_insert_rowid(),
            target_ref: watch.target_ref.clone(),
            resolved_id: resolved_id.map(str::to_string),
            notify_endpoint: watch.notify_endpoint.clone(),
            last_state: None,
            check_interval_seconds: check_interval,
            last_checked_at: None,
            created_at,
        })
    }

    fn get_watches(&self) -> Result<Vec<Watch>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM watches ORDER BY created_at DESC, id DESC",
            WATCH_COLUMNS
        ))?;

        let watches = stmt
            .query_map([], watch_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(watches)
    }

    fn get_watch(&self, id: i64) -> Result<Watch, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM watches WHERE id = ?1", WATCH_COLUMNS),
            params![id],
            watch_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    fn delete_watch(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM watch_history WHERE watch_id = ?1", params![id])?;
        let n = tx.execute("DELETE FROM watches WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(DbError::NotFound);
        }
        tx.commit()?;
        Ok(())
    }

    fn set_resolved_id(&self, id: i64, resolved_id: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE watches SET resolved_id = ?1 WHERE id = ?2",
            params![resolved_id, id],
        )?;
        if n == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    fn commit_cycle(&self, commit: &CycleCommit<'_>) -> Result<(), DbError> {
        let state_json = commit
            .new_state
            .map(Snapshot::to_json)
            .transpose()
            .map_err(|e| DbError::Corrupt(e.to_string()))?;
        let details_json = commit
            .changes
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DbError::Corrupt(e.to_string()))?;
        let checked_at = format_db_time(commit.checked_at);

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let n = match &state_json {
            Some(state) => tx.execute(
                "UPDATE watches SET last_state = ?1, last_checked_at = ?2 WHERE id = ?3",
                params![state, checked_at, commit.watch_id],
            )?,
            None => tx.execute(
                "UPDATE watches SET last_checked_at = ?1 WHERE id = ?2",
                params![checked_at, commit.watch_id],
            )?,
        };
        if n == 0 {
            return Err(DbError::NotFound);
        }

        if let Some(details) = &details_json {
            tx.execute(
                "INSERT INTO watch_history (watch_id, timestamp, details) VALUES (?1, ?2, ?3)",
                params![commit.watch_id, checked_at, details],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_history(&self, watch_id: i64) -> Result<Vec<HistoryEntry>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, watch_id, timestamp, details FROM watch_history
             WHERE watch_id = ?1 ORDER BY timestamp DESC, id DESC",
        )?;

        let rows = stmt
            .query_map(params![watch_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, watch_id, timestamp, details)| {
                let timestamp = parse_db_time(&timestamp)
                    .ok_or_else(|| DbError::Corrupt(format!("history {} timestamp", id)))?;
                let details: Vec<String> = serde_json::from_str(&details)
                    .map_err(|e| DbError::Corrupt(format!("history {} details: {}", id, e)))?;
                Ok(HistoryEntry {
                    id,
                    watch_id,
                    timestamp,
                    details,
                })
            })
            .collect()
    }
}

fn watch_from_row(row: &Row<'_>) -> SqlResult<Watch> {
    let id: i64 = row.get(0)?;
    let last_state: Option<String> = row.get(4)?;
    let last_checked_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;

    // An undecodable baseline is dropped so the watch re-baselines instead
    // of failing every listing.
    let last_state = last_state.and_then(|s| match Snapshot::from_json(&s) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!(watch_id = id, "Discarding unreadable stored state: {}", e);
            None
        }
    });

    Ok(Watch {
        id,
        target_ref: row.get(1)?,
        resolved_id: row.get(2)?,
        notify_endpoint: row.get(3)?,
        last_state,
        check_interval_seconds: row.get(5)?,
        last_checked_at: last_checked_at
            .as_deref()
            .map(|s| time_column(6, s))
            .transpose()?,
        created_at: time_column(7, &created_at)?,
    })
}

/// Timestamps are never guessed: an unreadable one fails the row.
fn time_column(idx: usize, raw: &str) -> SqlResult<DateTime<Utc>> {
    parse_db_time(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unreadable timestamp {:?}", raw).into(),
        )
    })
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        TIME_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.fZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
