//! Configuration module for calwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Vacancy calendar endpoint queried for each resolved restaurant id.
pub const DEFAULT_CALENDAR_URL: &str =
    "https://tabelog.com/booking/calendar/find_vacancy_date_with_status/";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "calwatch.db")
    pub db_path: String,
    /// Fixed wall-clock tick of the poll loop, in seconds (default: 10)
    pub tick_secs: u64,
    /// Check interval given to new watches that don't specify one (default: 300)
    pub default_check_interval: u32,
    /// Upper bound for every resolve/fetch/deliver call, in seconds (default: 10)
    pub request_timeout_secs: u64,
    /// Optional proxy for calendar requests
    pub proxy: Option<String>,
    /// Vacancy calendar endpoint
    pub calendar_url: String,
    /// Seating time sent with vacancy queries (`svt`)
    pub seating_time: String,
    /// Party size sent with vacancy queries (`svps`)
    pub party_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "calwatch.db".to_string(),
            tick_secs: 10,
            default_check_interval: 300,
            request_timeout_secs: 10,
            proxy: None,
            calendar_url: DEFAULT_CALENDAR_URL.to_string(),
            seating_time: "1900".to_string(),
            party_size: 2,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CALWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `CALWATCH_DB_PATH`: Database file path (default: "calwatch.db")
    /// - `CALWATCH_TICK_SECS`: Poll loop tick (default: 10)
    /// - `CALWATCH_CHECK_INTERVAL`: Default per-watch interval (default: 300)
    /// - `CALWATCH_REQUEST_TIMEOUT`: Network call bound (default: 10)
    /// - `CALWATCH_PROXY` or `PROXY`: Proxy URL for calendar requests
    /// - `CALWATCH_CALENDAR_URL`: Vacancy endpoint
    /// - `CALWATCH_SEATING_TIME`: Seating time, e.g. "1900"
    /// - `CALWATCH_PARTY_SIZE`: Party size (default: 2)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_positive(lookup("CALWATCH_HTTP_PORT")) {
            cfg.http_port = port;
        }

        if let Some(db_path) = non_empty(lookup("CALWATCH_DB_PATH")) {
            cfg.db_path = db_path;
        }

        if let Some(tick) = parse_positive(lookup("CALWATCH_TICK_SECS")) {
            cfg.tick_secs = tick;
        }

        if let Some(interval) = parse_positive(lookup("CALWATCH_CHECK_INTERVAL")) {
            cfg.default_check_interval = interval;
        }

        if let Some(timeout) = parse_positive(lookup("CALWATCH_REQUEST_TIMEOUT")) {
            cfg.request_timeout_secs = timeout;
        }

        cfg.proxy = non_empty(lookup("CALWATCH_PROXY")).or_else(|| non_empty(lookup("PROXY")));

        if let Some(url) = non_empty(lookup("CALWATCH_CALENDAR_URL")) {
            cfg.calendar_url = url;
        }

        if let Some(time) = non_empty(lookup("CALWATCH_SEATING_TIME")) {
            cfg.seating_time = time;
        }

        if let Some(size) = parse_positive(lookup("CALWATCH_PARTY_SIZE")) {
            cfg.party_size = size;
        }

        cfg
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_positive<T>(value: Option<String>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    non_empty(value)?
        .parse::<T>()
        .ok()
        .filter(|v| *v > T::default())
}
