// SPDX-License-Identifier: MIT OR Apache-2.0
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A captured HTTP body: raw bytes plus an optional declared charset.
///
/// The charset is carried but never trusted blindly — sanitizers decode as
/// UTF-8 with lossy substitution rather than honoring an attacker-controlled
/// charset header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BodyData {
    /// Raw body bytes as captured, prior to any truncation or sanitization.
    pub bytes: Vec<u8>,
    /// Declared charset, if the source supplied one (e.g. from `Content-Type`).
    pub charset: Option<String>,
}

impl BodyData {
    /// Builds a body from raw bytes with no declared charset.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            charset: None,
        }
    }

    /// True when the body carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// An ordered, case-preserving header list.
///
/// Header names are matched case-insensitively by every consumer, but the
/// original casing is preserved on output — mirrored from how the original
/// tap framing (§6) describes headers as "an ordered list of (name, value)
/// pairs".
pub type HeaderList = Vec<(String, String)>;

/// Looks up the first header value whose name matches `name`, case-insensitively.
pub fn header_get<'a>(headers: &'a HeaderList, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// The request half of a captured HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RequestData {
    /// HTTP method as captured (e.g. `GET`, case as observed on the wire).
    pub method: String,
    /// Request path, without query string.
    pub path: String,
    /// Raw query string, without the leading `?` (empty if none).
    #[serde(default)]
    pub query: String,
    /// Request headers, order preserved.
    pub headers: HeaderList,
    /// Request body.
    pub body: BodyData,
}

/// The response half of a captured HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseData {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, order preserved.
    pub headers: HeaderList,
    /// Response body.
    pub body: BodyData,
}

/// Optional service-mesh identity labels carried alongside a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceIdentity {
    /// Name of the source service, if the mesh supplied one.
    pub service: Option<String>,
    /// Namespace of the source service, if the mesh supplied one.
    pub namespace: Option<String>,
}

/// A single captured request/response pair, produced by the ingest server
/// (C4) and consumed by the processor (C5).
///
/// Lifecycle: created per capture, destroyed after successful enqueue to the
/// stub queue (C6) or explicit drop (pre-filter rejection, sampling, parse
/// failure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TrafficEvent {
    /// Wall-clock capture time (no monotonic source is available upstream).
    pub captured_at: DateTime<Utc>,
    /// Opaque trace identifier, carried through for correlation in logs.
    pub trace_id: String,
    /// The observed request.
    pub request: RequestData,
    /// The observed response.
    pub response: ResponseData,
    /// Optional mesh-supplied source identity.
    #[serde(default)]
    pub source_identity: Option<SourceIdentity>,
}

/// A [`TrafficEvent`] with sensitive content replaced by the sanitizer (C1).
///
/// Invariant: no field value matches any configured sensitive pattern unless
/// the match was inside an opaque-binary body the sanitizer declined to
/// parse, in which case the body is dropped entirely (see
/// [`mm_sanitizer`](https://docs.rs/mm-sanitizer)'s body-failure policy) —
/// never passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SanitizedEvent {
    /// Capture time, carried over from the source event.
    pub captured_at: DateTime<Utc>,
    /// Trace identifier, carried over from the source event.
    pub trace_id: String,
    /// Sanitized request.
    pub request: RequestData,
    /// Sanitized response.
    pub response: ResponseData,
    /// Source identity, carried over from the source event.
    #[serde(default)]
    pub source_identity: Option<SourceIdentity>,
    /// Set when sanitization hit an unrecoverable parse failure and replaced
    /// a body wholesale with an error sentinel rather than pattern-scanning it.
    #[serde(default)]
    pub sanitize_failed: bool,
    /// Set when the request body was truncated to the configured body-size
    /// limit before sanitization ran.
    #[serde(default)]
    pub body_truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_get_is_case_insensitive() {
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        assert_eq!(header_get(&headers, "content-type"), Some("application/json"));
        assert_eq!(header_get(&headers, "CONTENT-TYPE"), Some("application/json"));
        assert_eq!(header_get(&headers, "accept"), None);
    }

    #[test]
    fn body_data_empty() {
        assert!(BodyData::new(vec![]).is_empty());
        assert!(!BodyData::new(vec![1]).is_empty());
    }
}
