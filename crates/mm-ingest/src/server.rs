// SPDX-License-Identifier: MIT OR Apache-2.0
//! The §4.4 capture endpoint: `POST /v1/capture`, newline-delimited JSON,
//! one [`TrafficEvent`] per line — this crate's chosen framing for "message
//! boundary" over the opaque tap transport the contract describes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use mm_core::{header_get, CancellationToken, TrafficEvent};
use mm_rules::{DropReason, FilterDecision, PreFilters};
use mm_telemetry::Counters;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Shared state for the capture router.
pub struct AppState {
    tx: mpsc::Sender<TrafficEvent>,
    filters: Arc<PreFilters>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl AppState {
    /// Builds the ingest server's state: `tx` feeds the processor's inbound
    /// channel, `filters` is the C4 pre-filter chain (shared with the
    /// control surface so `GET /stats` reports the same drop counts this
    /// handler increments), `counters` is the pipeline-wide telemetry
    /// shared with the control surface, `cancel` lets an in-flight capture
    /// stop early on shutdown.
    pub fn new(tx: mpsc::Sender<TrafficEvent>, filters: Arc<PreFilters>, counters: Arc<Counters>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            filters,
            counters,
            cancel,
        }
    }
}

/// Builds the ingest router: `POST /v1/capture`.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new().route("/v1/capture", post(capture)).with_state(state)
}

/// Handles one capture POST: one line of the body per [`TrafficEvent`],
/// filtered and handed to the processor.
///
/// Stops early (without a partial-body error) on shutdown or once the
/// processor's channel reports backpressure, answering `503` with
/// `Retry-After` so the caller knows to stop sending or drop (§4.4 "c").
async fn capture(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let mut rng = rand::thread_rng();

    for line in body.split(|&b| b == b'\n') {
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        if state.cancel.is_cancelled() {
            break;
        }

        state.counters.requests_received.fetch_add(1, Ordering::Relaxed);

        let event: TrafficEvent = match serde_json::from_slice(line) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "malformed capture line, skipping");
                state.counters.requests_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        let host = header_get(&event.request.headers, "host").unwrap_or_default();
        match state.filters.decide(host, &event.request.path, &event.request.method, &mut rng) {
            FilterDecision::Drop(DropReason::IgnoredHost) => {
                state.counters.requests_dropped_host.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            FilterDecision::Drop(DropReason::IgnoredPath) => {
                state.counters.requests_dropped_path.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            FilterDecision::Drop(DropReason::Sampled) => {
                state.counters.requests_dropped_sampled.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            FilterDecision::Admit => {}
        }

        match state.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                state.counters.requests_dropped_backpressure.fetch_add(1, Ordering::Relaxed);
                return backpressure_response();
            }
            Err(TrySendError::Closed(_)) => {
                warn!("processor channel closed, rejecting capture");
                return backpressure_response();
            }
        }
    }

    StatusCode::ACCEPTED.into_response()
}

fn backpressure_response() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, [(header::RETRY_AFTER, "1")], "processor buffer full").into_response()
}
