//! HTTP request handlers.

use super::AppState;
use crate::db::{DbError, NewWatch, Watch};
use crate::watches::{self, WatchError};

use askama::Template;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use rust_embed::RustEmbed;
use serde::Deserialize;

#[derive(RustEmbed)]
#[folder = "static/"]
struct Assets;

fn error_response(e: WatchError) -> Response {
    match e {
        WatchError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        WatchError::Store(DbError::NotFound) => {
            (StatusCode::NOT_FOUND, "Watch not found").into_response()
        }
        WatchError::Store(e) => {
            tracing::error!("Store error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn create(state: &AppState, new: NewWatch) -> Result<Watch, WatchError> {
    watches::create_watch(
        state.store.as_ref(),
        state.resolver.as_ref(),
        new,
        state.config.default_check_interval,
        state.config.request_timeout(),
        state.clock.now(),
    )
    .await
}

// ============================================================================
// Dashboard
// ============================================================================

struct WatchRow {
    id: i64,
    target_ref: String,
    resolved_id: String,
    check_interval: u32,
    tracked_dates: usize,
    last_checked: String,
    created_at: String,
}

impl From<&Watch> for WatchRow {
    fn from(w: &Watch) -> Self {
        Self {
            id: w.id,
            target_ref: w.target_ref.clone(),
            resolved_id: w.resolved_id.clone().unwrap_or_else(|| "pending".to_string()),
            check_interval: w.check_interval_seconds,
            tracked_dates: w.last_state.as_ref().map(|s| s.len()).unwrap_or(0),
            last_checked: w
                .last_checked_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string()),
            created_at: w.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    watches: Vec<WatchRow>,
    default_interval: u32,
}

pub async fn handle_dashboard(State(state): State<AppState>) -> Response {
    let watches = match watches::list_watches(state.store.as_ref()) {
        Ok(w) => w,
        Err(e) => return error_response(e),
    };

    let page = IndexTemplate {
        watches: watches.iter().map(WatchRow::from).collect(),
        default_interval: state.config.default_check_interval,
    };

    match page.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddWatchForm {
    pub target_ref: String,
    pub notify_endpoint: String,
    #[serde(default)]
    pub check_interval: Option<String>,
}

pub async fn handle_add_form(
    State(state): State<AppState>,
    Form(form): Form<AddWatchForm>,
) -> Response {
    let check_interval_seconds = match form.check_interval.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "Invalid check interval").into_response();
            }
        },
    };

    let new = NewWatch {
        target_ref: form.target_ref,
        notify_endpoint: form.notify_endpoint,
        check_interval_seconds,
    };

    match create(&state, new).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_delete_form(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match watches::delete_watch(state.store.as_ref(), id) {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// API: Watches
// ============================================================================

pub async fn handle_get_watches(State(state): State<AppState>) -> Response {
    match watches::list_watches(state.store.as_ref()) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_create_watch(
    State(state): State<AppState>,
    Json(req): Json<NewWatch>,
) -> Response {
    match create(&state, req).await {
        Ok(watch) => (StatusCode::CREATED, Json(watch)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_delete_watch(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match watches::delete_watch(state.store.as_ref(), id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_history(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match watches::watch_history(state.store.as_ref(), id) {
        Ok(history) => Json(history).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_static(Path(path): Path<String>) -> Response {
    match Assets::get(&path) {
        Some(file) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref().to_string())], file.data).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn handle_favicon() -> Response {
    handle_static(Path("favicon.svg".to_string())).await
}

#[cfg(test)]
mod tests {
    use crate::calendar::{Availability, Snapshot};
    use crate::config::ServerConfig;
    use crate::db::{CycleCommit, WatchStore};
    use crate::scheduler::SystemClock;
    use crate::testutil::*;
    use crate::web::Server;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use chrono::{NaiveDate, Utc};
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    fn app() -> (NamedTempFile, Arc<crate::db::Store>, Router) {
        let (tmp, store) = temp_store();
        let store = Arc::new(store);
        let resolver = Arc::new(FakeResolver::default().with("https://a", "42"));
        let server = Server::new(
            ServerConfig::default(),
            store.clone(),
            resolver,
            Arc::new(SystemClock),
        );
        (tmp, store, server.routes())
    }

    async fn body_string(resp: axum::response::Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_api_create_list_delete() {
        let (_tmp, _store, router) = app();

        let resp = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/watches",
                serde_json::json!({
                    "target_ref": "https://a",
                    "notify_endpoint": "https://hook",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(created["resolved_id"], "42");
        assert_eq!(created["check_interval_seconds"], 300);
        let id = created["id"].as_i64().unwrap();

        let resp = router
            .clone()
            .oneshot(Request::get("/api/watches").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let list: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);

        let uri = format!("/api/watches/{}", id);
        let resp = router
            .clone()
            .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = router
            .oneshot(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_rejects_invalid_watch() {
        let (_tmp, _store, router) = app();

        let resp = router
            .oneshot(json_request(
                "POST",
                "/api/watches",
                serde_json::json!({ "target_ref": "", "notify_endpoint": "https://hook" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_endpoint() {
        let (_tmp, store, router) = app();
        let w = store
            .add_watch(&new_watch("https://a"), 300, Utc::now(), Some("42"))
            .unwrap();
        let snap: Snapshot = [(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(), Availability::FewLeft)]
            .into_iter()
            .collect();
        let lines = vec!["🆕 2024-01-06: ⚠️".to_string()];
        store
            .commit_cycle(&CycleCommit {
                watch_id: w.id,
                checked_at: Utc::now(),
                new_state: Some(&snap),
                changes: Some(lines.as_slice()),
            })
            .unwrap();

        let resp = router
            .clone()
            .oneshot(
                Request::get(format!("/api/watches/{}/history", w.id).as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let history: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(history[0]["details"][0], "🆕 2024-01-06: ⚠️");

        let resp = router
            .oneshot(Request::get("/api/watches/999/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_form_add_and_dashboard() {
        let (_tmp, store, router) = app();

        let resp = router
            .clone()
            .oneshot(
                Request::post("/add")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(
                        "target_ref=https%3A%2F%2Fa&notify_endpoint=https%3A%2F%2Fhook&check_interval=",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp.status().is_redirection());
        assert_eq!(store.get_watches().unwrap().len(), 1);

        let resp = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_string(resp).await;
        assert!(html.contains("https:"));
        assert!(html.contains("42"));
    }

    #[tokio::test]
    async fn test_form_rejects_bad_interval() {
        let (_tmp, store, router) = app();

        let resp = router
            .oneshot(
                Request::post("/add")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(
                        "target_ref=https%3A%2F%2Fa&notify_endpoint=https%3A%2F%2Fhook&check_interval=soon",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(store.get_watches().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_assets() {
        let (_tmp, _store, router) = app();

        let resp = router
            .clone()
            .oneshot(Request::get("/static/style.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/css");

        let resp = router
            .oneshot(Request::get("/static/missing.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
