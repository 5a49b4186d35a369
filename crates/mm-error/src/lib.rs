// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for mockmesh.
//!
//! Every mockmesh error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag from §7), a human-readable message, an optional cause chain,
//! and arbitrary key-value context. Use the builder returned by
//! [`MockmeshError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error kind, one per §7.
///
/// Each variant serializes to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Ingest or stub payload failed to parse or is missing required fields.
    MalformedInput,
    /// Sanitizer hit an unrecoverable parse failure and replaced a body with
    /// an error sentinel rather than pattern-scanning it.
    SanitizeFail,
    /// Dedup index backend (Redis or equivalent) errored on `seen`/`mark`.
    DedupBackendError,
    /// Appending a stub to the stub queue failed.
    QueueEnqueueError,
    /// Reading from the stub queue failed.
    QueueReadError,
    /// Mock-server apply failed transiently (5xx, timeout, connect error).
    ApplyTransient,
    /// Mock-server apply failed permanently (4xx, validation rejection).
    ApplyPermanent,
    /// Writing a backup file failed.
    BackupWriteError,
    /// Not a true error: a loop observed the shutdown signal.
    Shutdown,
}

impl ErrorCode {
    /// Whether this error kind should be retried by its owning loop.
    ///
    /// Mirrors §7's propagation table: only [`ErrorCode::ApplyTransient`],
    /// [`ErrorCode::QueueEnqueueError`], and [`ErrorCode::QueueReadError`]
    /// are retried; everything else is either terminal or a non-error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ApplyTransient | Self::QueueEnqueueError | Self::QueueReadError
        )
    }

    /// Stable `&'static str` representation (e.g. `"APPLY_TRANSIENT"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedInput => "MALFORMED_INPUT",
            Self::SanitizeFail => "SANITIZE_FAIL",
            Self::DedupBackendError => "DEDUP_BACKEND_ERROR",
            Self::QueueEnqueueError => "QUEUE_ENQUEUE_ERROR",
            Self::QueueReadError => "QUEUE_READ_ERROR",
            Self::ApplyTransient => "APPLY_TRANSIENT",
            Self::ApplyPermanent => "APPLY_PERMANENT",
            Self::BackupWriteError => "BACKUP_WRITE_ERROR",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// MockmeshError
// ---------------------------------------------------------------------------

/// Unified mockmesh error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use mm_error::{MockmeshError, ErrorCode};
///
/// let err = MockmeshError::new(ErrorCode::ApplyTransient, "mock server timed out")
///     .with_context("stub_id", "abc123")
///     .with_context("timeout_ms", 5000);
/// ```
pub struct MockmeshError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl MockmeshError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attaches a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialization
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attaches an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Debug for MockmeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("MockmeshError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for MockmeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for MockmeshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serializable snapshot of a [`MockmeshError`] (without the opaque source).
///
/// Used by the control surface (C10) to expose recent errors in `GET
/// /stats` without leaking non-serializable boxed causes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MockmeshErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&MockmeshError> for MockmeshErrorDto {
    fn from(err: &MockmeshError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::MalformedInput,
        ErrorCode::SanitizeFail,
        ErrorCode::DedupBackendError,
        ErrorCode::QueueEnqueueError,
        ErrorCode::QueueReadError,
        ErrorCode::ApplyTransient,
        ErrorCode::ApplyPermanent,
        ErrorCode::BackupWriteError,
        ErrorCode::Shutdown,
    ];

    #[test]
    fn basic_construction() {
        let err = MockmeshError::new(ErrorCode::MalformedInput, "bad json");
        assert_eq!(err.code, ErrorCode::MalformedInput);
        assert_eq!(err.message, "bad json");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = MockmeshError::new(ErrorCode::ApplyPermanent, "400 from mock server");
        assert_eq!(err.to_string(), "[APPLY_PERMANENT] 400 from mock server");
    }

    #[test]
    fn display_with_context() {
        let err = MockmeshError::new(ErrorCode::ApplyTransient, "timed out")
            .with_context("timeout_ms", 5000);
        let s = err.to_string();
        assert!(s.starts_with("[APPLY_TRANSIENT] timed out"));
        assert!(s.contains("timeout_ms"));
        assert!(s.contains("5000"));
    }

    #[test]
    fn with_source_chains_correctly() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "connect timed out");
        let err = MockmeshError::new(ErrorCode::ApplyTransient, "apply failed").with_source(io_err);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn retryable_codes() {
        assert!(ErrorCode::ApplyTransient.is_retryable());
        assert!(ErrorCode::QueueEnqueueError.is_retryable());
        assert!(ErrorCode::QueueReadError.is_retryable());
        assert!(!ErrorCode::ApplyPermanent.is_retryable());
        assert!(!ErrorCode::MalformedInput.is_retryable());
        assert!(!ErrorCode::Shutdown.is_retryable());
    }

    #[test]
    fn all_codes_roundtrip_through_serde() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(*code, back);
        }
    }

    #[test]
    fn codes_serialize_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::DedupBackendError).unwrap(),
            "\"DEDUP_BACKEND_ERROR\""
        );
    }

    #[test]
    fn dto_conversion_drops_source_but_keeps_message() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err = MockmeshError::new(ErrorCode::BackupWriteError, "disk full").with_source(io_err);
        let dto: MockmeshErrorDto = (&err).into();
        assert_eq!(dto.code, ErrorCode::BackupWriteError);
        assert_eq!(dto.source_message.as_deref(), Some("boom"));
    }
}
