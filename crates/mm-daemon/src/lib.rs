// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Control-plane HTTP surface for mockmesh (C10, §4.10).
//!
//! [`build_app`] carries no pipeline logic of its own: every route
//! delegates straight to the crate that owns the behavior it's asking
//! about.

use axum::extract::{Path as AxPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use mm_backup::BackupStore;
use mm_core::{CancellationToken, Stub};
use mm_mockclient::MockClient;
use mm_rules::PreFilters;
use mm_telemetry::Counters;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared state for the control-surface router.
pub struct AppState {
    mock_client: MockClient,
    backup: Option<BackupStore>,
    counters: Arc<Counters>,
    filters: Arc<PreFilters>,
    cancel: CancellationToken,
    applier_alive: Arc<AtomicBool>,
    started_at: Instant,
}

impl AppState {
    /// Builds the control surface's state from the pieces `main.rs` wires
    /// together: the mock client (for the direct bypass and passthrough
    /// routes), the optional backup store (absent only if backups are
    /// disabled), the shared counters, the pre-filter chain (for `GET
    /// /stats`), and `applier_alive`, flipped to `false` by `main.rs` if the
    /// delivery loop (§4.7) exits unexpectedly so `GET /ready` can fail.
    pub fn new(
        mock_client: MockClient,
        backup: Option<BackupStore>,
        counters: Arc<Counters>,
        filters: Arc<PreFilters>,
        cancel: CancellationToken,
        applier_alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            mock_client,
            backup,
            counters,
            filters,
            cancel,
            applier_alive,
            started_at: Instant::now(),
        }
    }
}

/// Control-plane error, rendered as `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<mm_mockclient::MockClientError> for ApiError {
    fn from(err: mm_mockclient::MockClientError) -> Self {
        use mm_mockclient::MockClientError::*;
        match err {
            InvalidStub { reason } => ApiError::bad_request(reason),
            NotFound(id) => ApiError::not_found(format!("mapping {id} not found")),
            Transient(reason) | Permanent(reason) | MalformedResponse(reason) => ApiError::upstream(reason),
        }
    }
}

impl From<mm_backup::BackupError> for ApiError {
    fn from(err: mm_backup::BackupError) -> Self {
        match err {
            mm_backup::BackupError::NotFound(path) => ApiError::not_found(format!("backup {} not found", path.display())),
            other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

/// Builds the control-surface router.
///
/// Routes follow §6's control-plane surface: liveness/readiness, metrics
/// and stats, mapping CRUD (the direct bypass, §6 "or register a mapping
/// directly"), backup listing/restore/cleanup, and the two read-only
/// mock-server passthroughs.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/stats", get(stats))
        .route("/mappings", get(list_mappings).post(create_mapping).delete(reset_mappings))
        .route("/mappings/{id}", get(get_mapping).delete(delete_mapping))
        .route("/backups", get(list_backups))
        .route("/backups/{file}/restore", post(restore_backup))
        .route("/backups/cleanup", delete(cleanup_backups))
        .route("/wiremock/requests", get(recent_requests))
        .route("/wiremock/requests/unmatched", get(unmatched_requests))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "contract_version": mm_core::CONTRACT_VERSION }))
}

/// `GET /ready`: not-cancelled, the mock server reachable, and the
/// delivery loop (§4.7) still running, per §4.10's readiness contract.
async fn ready(State(state): State<Arc<AppState>>) -> Response {
    if state.cancel.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "shutting_down" }))).into_response();
    }
    if !state.applier_alive.load(Ordering::Relaxed) {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "delivery_loop_stopped" }))).into_response();
    }
    if !state.mock_client.health().await {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "mock_server_unreachable" }))).into_response();
    }
    Json(json!({ "status": "ready" })).into_response()
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.counters.render_prometheus(),
    )
        .into_response()
}

#[derive(Serialize)]
struct StatsResponse {
    counters: mm_telemetry::CountersSnapshot,
    drops: mm_rules::DropCountersSnapshot,
    uptime_seconds: u64,
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatsResponse {
        counters: state.counters.snapshot(),
        drops: state.filters.stats(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

async fn list_mappings(Query(q): Query<PageQuery>, State(state): State<Arc<AppState>>) -> Result<Json<Vec<Stub>>, ApiError> {
    let stubs = state.mock_client.list_stubs(q.limit.unwrap_or(100), q.offset.unwrap_or(0)).await?;
    Ok(Json(stubs))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

/// `POST /mappings`: the §6 direct bypass, registering a caller-supplied
/// [`Stub`] with the mock server without going through the collector at all.
async fn create_mapping(State(state): State<Arc<AppState>>, Json(stub): Json<Stub>) -> Result<StatusCode, ApiError> {
    state.mock_client.create_stub(&stub).await?;
    Ok(StatusCode::CREATED)
}

async fn get_mapping(AxPath(id): AxPath<String>, State(state): State<Arc<AppState>>) -> Result<Json<Stub>, ApiError> {
    let stub = state.mock_client.get_stub(&id).await?;
    Ok(Json(stub))
}

async fn delete_mapping(AxPath(id): AxPath<String>, State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.mock_client.delete_stub(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_mappings(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.mock_client.reset_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct BackupListQuery {
    mapping_id: Option<String>,
    #[serde(default = "default_backup_days")]
    days: u32,
}

fn default_backup_days() -> u32 {
    30
}

async fn list_backups(Query(q): Query<BackupListQuery>, State(state): State<Arc<AppState>>) -> Result<Json<Vec<mm_core::BackupRecord>>, ApiError> {
    let store = state.backup.as_ref().ok_or_else(|| ApiError::new(StatusCode::NOT_IMPLEMENTED, "backups are disabled"))?;
    let records = store.list_backups(q.mapping_id.as_deref(), q.days).await?;
    Ok(Json(records))
}

async fn restore_backup(AxPath(file): AxPath<String>, State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.backup.as_ref().ok_or_else(|| ApiError::new(StatusCode::NOT_IMPLEMENTED, "backups are disabled"))?;
    let path = store.root().join(&file);
    let restored = store.restore(&path).await?;
    let stubs = match restored {
        mm_backup::RestoredBackup::Single(stub) => vec![stub],
        mm_backup::RestoredBackup::Batch(stubs) => stubs,
    };
    let result = state.mock_client.apply_batch(stubs).await;
    Ok(Json(serde_json::to_value(result).expect("ApplyBatchResult serializes")))
}

async fn cleanup_backups(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.backup.as_ref().ok_or_else(|| ApiError::new(StatusCode::NOT_IMPLEMENTED, "backups are disabled"))?;
    let removed = store.cleanup_expired().await?;
    Ok(Json(json!({ "removed": removed })))
}

#[derive(Debug, Deserialize)]
struct RequestsQuery {
    limit: Option<u32>,
}

async fn recent_requests(Query(q): Query<RequestsQuery>, State(state): State<Arc<AppState>>) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let requests = state.mock_client.list_recent_requests(q.limit.unwrap_or(50)).await?;
    Ok(Json(requests))
}

async fn unmatched_requests(State(state): State<Arc<AppState>>) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let requests = state.mock_client.list_unmatched_requests().await?;
    Ok(Json(requests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_mockclient::MockClientConfig;
    use mm_rules::SamplingRules;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_state(mock_server: &MockServer) -> Arc<AppState> {
        let client = MockClient::new(MockClientConfig {
            base_url: mock_server.uri(),
            ..MockClientConfig::default()
        });
        let filters = Arc::new(PreFilters::new(
            mm_glob::DenyList::new(&[]).unwrap(),
            mm_glob::DenyList::new(&[]).unwrap(),
            SamplingRules::new(vec![], 1.0),
        ));
        Arc::new(AppState::new(
            client,
            None,
            Arc::new(Counters::default()),
            filters,
            CancellationToken::new(),
            Arc::new(AtomicBool::new(true)),
        ))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let mock_server = MockServer::start().await;
        let state = test_state(&mock_server).await;
        let app = build_app(state);
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_reports_unavailable_once_cancelled() {
        let mock_server = MockServer::start().await;
        let state = test_state(&mock_server).await;
        state.cancel.cancel();
        let app = build_app(state);
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/ready").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_renders_prometheus_text() {
        let mock_server = MockServer::start().await;
        let state = test_state(&mock_server).await;
        state.counters.requests_received.fetch_add(2, Ordering::Relaxed);
        let app = build_app(state);
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/metrics").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("mockmesh_requests_received_total 2"));
    }

    #[tokio::test]
    async fn create_mapping_delegates_to_mock_client() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/__admin/mappings"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&mock_server)
            .await;
        let state = test_state(&mock_server).await;
        let app = build_app(state);

        let stub = mm_core::Stub {
            id: "abc".to_string(),
            name: "n".to_string(),
            match_spec: mm_core::MatchSpec {
                method: "GET".to_string(),
                url_path: "/a".to_string(),
                query_parameters: None,
                headers: None,
                body_patterns: None,
            },
            response_spec: mm_core::ResponseSpec {
                status: 200,
                headers: None,
                json_body: None,
                body: None,
            },
            metadata: mm_core::Provenance {
                generated_by: "test".to_string(),
                generated_at: chrono::Utc::now(),
                request_hash: "abc".to_string(),
                original_path: "/a".to_string(),
            },
        };
        let body = serde_json::to_vec(&stub).unwrap();
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/mappings")
                    .header("content-type", "application/json")
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }
}
