// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Sensitive-data redaction for captured HTTP traffic (mockmesh C1).
//!
//! [`Sanitizer`] is the sole entry point: it masks sensitive headers, walks
//! and redacts bodies according to their content type, and computes the
//! canonical body digest that [`mm_fingerprint`](../mm_fingerprint) fingerprints
//! are built from. Redaction pattern matching lives in [`patterns`]; body and
//! header handling are split into their own modules so each can be tested
//! against realistic payloads in isolation.

mod body;
mod header;
mod patterns;

pub use body::{body_digest, sanitize_body, SanitizedBody};
pub use header::{mask_header_value, sanitize_headers};
pub use patterns::{is_sensitive, mask_structured, redact_text};

use mm_core::{header_get, RequestData, ResponseData};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while constructing a [`Sanitizer`].
///
/// Sanitization itself never fails outward — a body that cannot be safely
/// parsed degrades to the error sentinel and a `sanitize_failed` flag rather
/// than propagating an error (§4.1, §7 `SANITIZE_FAIL`). This type only
/// covers misconfiguration caught at construction time.
#[derive(Debug, Error)]
pub enum SanitizeError {
    /// A sensitive-header or sensitive-field name in the configuration was
    /// empty, which would match nothing and silently defeat the rule.
    #[error("sensitive field list contains an empty name")]
    EmptyFieldName,
}

/// Redacts sensitive headers, query strings, and bodies from captured
/// traffic, per the configured sensitive-header and sensitive-field names.
///
/// Field and header name matching is case-insensitive; names are lowercased
/// once at construction so the hot path never re-allocates.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    sensitive_headers: HashSet<String>,
    sensitive_fields: HashSet<String>,
}

impl Sanitizer {
    /// Builds a sanitizer from the configured sensitive header and field
    /// name lists (see `mm-config`'s `sensitive_headers` / `sensitive_fields`).
    pub fn new(sensitive_headers: &[String], sensitive_fields: &[String]) -> Result<Self, SanitizeError> {
        if sensitive_headers.iter().any(|h| h.is_empty()) || sensitive_fields.iter().any(|f| f.is_empty()) {
            return Err(SanitizeError::EmptyFieldName);
        }
        Ok(Self {
            sensitive_headers: sensitive_headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
            sensitive_fields: sensitive_fields.iter().map(|f| f.to_ascii_lowercase()).collect(),
        })
    }

    /// Sanitizes a request's headers, query string, and body, returning the
    /// sanitized copy and whether body sanitization hit the failure path.
    pub fn sanitize_request(&self, req: &RequestData) -> (RequestData, bool) {
        let headers = sanitize_headers(&req.headers, &self.sensitive_headers);
        let content_type = header_get(&req.headers, "content-type").unwrap_or_default();
        let outcome = sanitize_body(&req.body.bytes, content_type, &self.sensitive_fields);
        let mut body = mm_core::BodyData::new(outcome.bytes);
        body.charset = req.body.charset.clone();
        let sanitized = RequestData {
            method: req.method.clone(),
            path: req.path.clone(),
            query: redact_text(&req.query),
            headers,
            body,
        };
        (sanitized, outcome.failed)
    }

    /// Sanitizes a response's headers and body in place, returning the
    /// sanitized copy and whether body sanitization hit the failure path.
    pub fn sanitize_response(&self, resp: &ResponseData) -> (ResponseData, bool) {
        let headers = sanitize_headers(&resp.headers, &self.sensitive_headers);
        let content_type = header_get(&resp.headers, "content-type").unwrap_or_default();
        let outcome = sanitize_body(&resp.body.bytes, content_type, &self.sensitive_fields);
        let mut body = mm_core::BodyData::new(outcome.bytes);
        body.charset = resp.body.charset.clone();
        let sanitized = ResponseData {
            status: resp.status,
            headers,
            body,
        };
        (sanitized, outcome.failed)
    }
}
