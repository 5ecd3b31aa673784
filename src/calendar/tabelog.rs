//! Reservation-site adapter: resolves restaurant ids from their pages and
//! reads the vacancy calendar.

use super::{Availability, FetchError, IdentifierResolver, ResolveError, Snapshot, SnapshotProvider};
use crate::config::ServerConfig;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// HTTP client for the reservation calendar.
///
/// One instance owns one connection pool, shared by every watch on every tick.
#[derive(Clone)]
pub struct TabelogClient {
    client: reqwest::Client,
    calendar_url: String,
    seating_time: String,
    party_size: u32,
    timeout: Duration,
}

impl TabelogClient {
    pub fn new(cfg: &ServerConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(cfg.request_timeout());

        if let Some(proxy) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            calendar_url: cfg.calendar_url.clone(),
            seating_time: cfg.seating_time.clone(),
            party_size: cfg.party_size,
            timeout: cfg.request_timeout(),
        })
    }
}

#[async_trait]
impl IdentifierResolver for TabelogClient {
    async fn resolve(&self, target_ref: &str) -> Result<String, ResolveError> {
        let response = self.client.get(target_ref).send().await.map_err(|e| {
            if e.is_timeout() {
                ResolveError::Timeout(self.timeout)
            } else {
                ResolveError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        extract_restaurant_id(&body).ok_or_else(|| ResolveError::NotFound(target_ref.to_string()))
    }
}

#[async_trait]
impl SnapshotProvider for TabelogClient {
    async fn fetch(&self, resolved_id: &str) -> Result<Snapshot, FetchError> {
        let search_date = Local::now().format("%Y%m%d").to_string();
        let party_size = self.party_size.to_string();

        let response = self
            .client
            .get(&self.calendar_url)
            .query(&[
                ("rst_id", resolved_id),
                ("svd", search_date.as_str()),
                ("svt", self.seating_time.as_str()),
                ("svps", party_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let snapshot = parse_vacancy(&body)?;
        if snapshot.is_empty() {
            tracing::debug!(resolved_id, "Calendar returned no dates");
        }
        Ok(snapshot)
    }
}

/// Pull the numeric restaurant id out of a restaurant page.
pub fn extract_restaurant_id(html: &str) -> Option<String> {
    static RST_ID: OnceLock<Regex> = OnceLock::new();
    let re = RST_ID.get_or_init(|| Regex::new(r#"data-rst-id="(\d+)""#).expect("valid regex"));

    re.captures(html).map(|c| c[1].to_string())
}

#[derive(Debug, Deserialize)]
struct VacancyResponse {
    #[serde(default)]
    list: Option<Vec<VacancyDay>>,
}

#[derive(Debug, Deserialize)]
struct VacancyDay {
    year: i32,
    month: u32,
    day: u32,
    available: u8,
}

/// Decode a vacancy payload into a snapshot.
///
/// A payload without a `list` is an empty calendar, not an error. Unknown
/// codes and impossible dates are rejected here so nothing downstream ever
/// sees raw values.
pub fn parse_vacancy(body: &str) -> Result<Snapshot, FetchError> {
    let payload: Option<VacancyResponse> =
        serde_json::from_str(body).map_err(|e| FetchError::Payload(e.to_string()))?;

    let days = payload.and_then(|p| p.list).unwrap_or_default();

    let mut snapshot = Snapshot::new();
    for item in days {
        let date = NaiveDate::from_ymd_opt(item.year, item.month, item.day).ok_or_else(|| {
            FetchError::Payload(format!(
                "invalid date {}-{}-{}",
                item.year, item.month, item.day
            ))
        })?;
        let availability = Availability::try_from(item.available).map_err(FetchError::Payload)?;
        snapshot.insert(date, availability);
    }

    Ok(snapshot)
}
