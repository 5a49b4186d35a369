// SPDX-License-Identifier: MIT OR Apache-2.0
use thiserror::Error;

/// Errors surfaced by [`crate::MockClient`].
#[derive(Debug, Error)]
pub enum MockClientError {
    /// The stub failed pre-send validation (§4.8: "Invalid stubs are
    /// rejected without a network call").
    #[error("stub is not well-formed: {reason}")]
    InvalidStub {
        /// Human-readable reason, for logging/DLQ context.
        reason: String,
    },
    /// Every retry attempt failed with a transient error (connect/timeout/5xx).
    #[error("transient failure after retries: {0}")]
    Transient(String),
    /// The mock server rejected the request in a way retrying cannot fix (4xx).
    #[error("permanent failure: {0}")]
    Permanent(String),
    /// The requested resource does not exist (e.g. `get_stub` on an unknown id).
    #[error("not found: {0}")]
    NotFound(String),
    /// The response body could not be decoded as the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl MockClientError {
    /// True for errors where a retry (by the caller, e.g. the queue
    /// consumer's `handle_failure`) could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MockClientError::Transient(_))
    }
}
