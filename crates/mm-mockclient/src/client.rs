// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::error::MockClientError;
use futures::stream::{self, StreamExt};
use mm_core::Stub;
use mm_retry::{retry, ExponentialBackoff, Outcome, RetryError};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Construction parameters for [`MockClient`].
#[derive(Debug, Clone)]
pub struct MockClientConfig {
    /// Base URL of the mock server, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum attempts per request, including the first (§4.8: 3 attempts).
    pub max_attempts: u32,
    /// Upper bound on requests in flight at once, across every call
    /// (including a single [`MockClient::apply_batch`]).
    pub max_concurrent_requests: usize,
}

impl Default for MockClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            max_concurrent_requests: 20,
        }
    }
}

/// The outcome of a [`MockClient::apply_batch`] call: every stub is
/// attempted independently, so a batch never fails collectively (§4.8
/// "Batched apply ... reports (success_count, error_count) without failing
/// the whole batch").
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyBatchResult {
    /// Number of stubs registered successfully.
    pub success_count: usize,
    /// Number of stubs that failed (validation, permanent, or exhausted-retry).
    pub error_count: usize,
    /// `(stub_id, error message)` for every failure, in completion order.
    pub errors: Vec<(String, String)>,
}

/// HTTP client for the mock server's WireMock-compatible admin API.
///
/// Cheap to clone: the underlying [`reqwest::Client`] and semaphore are both
/// reference-counted, so [`MockClient::apply_batch`] clones `self` once per
/// in-flight stub rather than sharing a `&self` across spawned futures.
#[derive(Clone)]
pub struct MockClient {
    http: Client,
    admin_url: String,
    timeout: Duration,
    policy: ExponentialBackoff,
    max_attempts: u32,
    semaphore: Arc<Semaphore>,
    max_concurrent_requests: usize,
}

#[derive(Debug, Deserialize, Default)]
struct MappingsPage {
    #[serde(default)]
    mappings: Vec<Stub>,
}

#[derive(Debug, Deserialize, Default)]
struct RequestsPage {
    #[serde(default)]
    requests: Vec<serde_json::Value>,
}

impl MockClient {
    /// Builds a client from `config`. The retry/backoff policy is fixed to
    /// [`ExponentialBackoff::mock_client_default`] (§4.8).
    pub fn new(config: MockClientConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            admin_url: format!("{base_url}/__admin"),
            http: Client::new(),
            timeout: config.timeout,
            policy: ExponentialBackoff::mock_client_default(),
            max_attempts: config.max_attempts.max(1),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            max_concurrent_requests: config.max_concurrent_requests.max(1),
        }
    }

    fn build_request(&self, method: Method, url: &str, body: Option<serde_json::Value>) -> RequestBuilder {
        let builder = self.http.request(method, url).timeout(self.timeout);
        match body {
            Some(b) => builder.json(&b),
            None => builder,
        }
    }

    /// Sends a request, retrying transient (connect/timeout/5xx) failures up
    /// to `max_attempts` times and failing immediately on a 4xx (§4.8
    /// "never retried").
    async fn send(&self, method: Method, path: &str, json_body: Option<serde_json::Value>) -> Result<reqwest::Response, MockClientError> {
        let _permit = self.semaphore.acquire().await.expect("semaphore is never closed");
        let url = format!("{}{}", self.admin_url, path);
        retry(&self.policy, self.max_attempts, |_attempt| {
            let builder = self.build_request(method.clone(), &url, json_body.clone());
            async move {
                match builder.send().await {
                    Ok(resp) if resp.status().is_success() => Outcome::Success(resp),
                    Ok(resp) if resp.status().is_client_error() => Outcome::Permanent(format!("http {}", resp.status())),
                    Ok(resp) => Outcome::Retryable(format!("http {}", resp.status())),
                    Err(err) => Outcome::Retryable(err.to_string()),
                }
            }
        })
        .await
        .map_err(|err| match err {
            RetryError::Permanent(reason) => MockClientError::Permanent(reason),
            RetryError::Exhausted { last_error, .. } => MockClientError::Transient(last_error),
        })
    }

    fn validate(&self, stub: &Stub) -> Result<(), MockClientError> {
        if stub.is_well_formed() {
            Ok(())
        } else {
            Err(MockClientError::InvalidStub {
                reason: format!("stub {} failed pre-send validation (method/urlPath/status)", stub.id),
            })
        }
    }

    fn promote_not_found(err: MockClientError, id: &str) -> MockClientError {
        match &err {
            MockClientError::Permanent(reason) if reason.contains("404") => MockClientError::NotFound(id.to_string()),
            _ => err,
        }
    }

    /// `GET /__admin/health`. Never propagates an error: a failed check
    /// (network error, non-2xx, exhausted retries) is logged and reported as
    /// `false`, matching `wiremock_client.py`'s `health_check`.
    pub async fn health(&self) -> bool {
        match self.send(Method::GET, "/health", None).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "mock server health check failed");
                false
            }
        }
    }

    /// `POST /__admin/mappings`. Rejects an ill-formed stub without sending
    /// a request.
    pub async fn create_stub(&self, stub: &Stub) -> Result<(), MockClientError> {
        self.validate(stub)?;
        let body = serde_json::to_value(stub).map_err(|err| MockClientError::MalformedResponse(err.to_string()))?;
        self.send(Method::POST, "/mappings", Some(body)).await?;
        Ok(())
    }

    /// `PUT /__admin/mappings/{id}`.
    pub async fn update_stub(&self, id: &str, stub: &Stub) -> Result<(), MockClientError> {
        self.validate(stub)?;
        let body = serde_json::to_value(stub).map_err(|err| MockClientError::MalformedResponse(err.to_string()))?;
        self.send(Method::PUT, &format!("/mappings/{id}"), Some(body))
            .await
            .map_err(|err| Self::promote_not_found(err, id))?;
        Ok(())
    }

    /// `DELETE /__admin/mappings/{id}`.
    pub async fn delete_stub(&self, id: &str) -> Result<(), MockClientError> {
        self.send(Method::DELETE, &format!("/mappings/{id}"), None)
            .await
            .map_err(|err| Self::promote_not_found(err, id))?;
        Ok(())
    }

    /// `GET /__admin/mappings/{id}`.
    pub async fn get_stub(&self, id: &str) -> Result<Stub, MockClientError> {
        let resp = self
            .send(Method::GET, &format!("/mappings/{id}"), None)
            .await
            .map_err(|err| Self::promote_not_found(err, id))?;
        resp.json::<Stub>().await.map_err(|err| MockClientError::MalformedResponse(err.to_string()))
    }

    /// `GET /__admin/mappings?limit=&offset=`.
    pub async fn list_stubs(&self, limit: u32, offset: u32) -> Result<Vec<Stub>, MockClientError> {
        let path = format!("/mappings?limit={limit}&offset={offset}");
        let resp = self.send(Method::GET, &path, None).await?;
        let page: MappingsPage = resp.json().await.map_err(|err| MockClientError::MalformedResponse(err.to_string()))?;
        Ok(page.mappings)
    }

    /// `DELETE /__admin/mappings`. Removes every stub; used by `mm-cli`'s
    /// reset tooling, never by the applier itself.
    pub async fn reset_all(&self) -> Result<(), MockClientError> {
        self.send(Method::DELETE, "/mappings", None).await?;
        Ok(())
    }

    /// `GET /__admin/requests?limit=`.
    pub async fn list_recent_requests(&self, limit: u32) -> Result<Vec<serde_json::Value>, MockClientError> {
        let path = format!("/requests?limit={limit}");
        let resp = self.send(Method::GET, &path, None).await?;
        let page: RequestsPage = resp.json().await.map_err(|err| MockClientError::MalformedResponse(err.to_string()))?;
        Ok(page.requests)
    }

    /// `GET /__admin/requests/unmatched`.
    pub async fn list_unmatched_requests(&self) -> Result<Vec<serde_json::Value>, MockClientError> {
        let resp = self.send(Method::GET, "/requests/unmatched", None).await?;
        let page: RequestsPage = resp.json().await.map_err(|err| MockClientError::MalformedResponse(err.to_string()))?;
        Ok(page.requests)
    }

    /// Applies every stub independently and concurrently (bounded by
    /// `max_concurrent_requests`), isolating one stub's failure from the
    /// rest (mirrors `BatchWireMockClient.flush_batch`'s
    /// `asyncio.gather(..., return_exceptions=True)`).
    pub async fn apply_batch(&self, stubs: Vec<Stub>) -> ApplyBatchResult {
        let results = stream::iter(stubs.into_iter().map(|stub| {
            let client = self.clone();
            async move {
                let id = stub.id.clone();
                (id, client.create_stub(&stub).await)
            }
        }))
        .buffer_unordered(self.max_concurrent_requests)
        .collect::<Vec<_>>()
        .await;

        let mut success_count = 0usize;
        let mut errors = Vec::new();
        for (id, outcome) in results {
            match outcome {
                Ok(()) => success_count += 1,
                Err(err) => {
                    tracing::warn!(stub_id = %id, error = %err, "apply_batch: stub rejected");
                    errors.push((id, err.to_string()));
                }
            }
        }
        let error_count = errors.len();
        ApplyBatchResult { success_count, error_count, errors }
    }
}
