// SPDX-License-Identifier: MIT OR Apache-2.0
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single query-parameter matcher: `equalTo` for single-valued keys,
/// `matches` (regex alternation) for multi-valued keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum QueryMatcher {
    /// Exact-match a single observed value.
    EqualTo(String),
    /// Regex-match against a set of observed values, alternated.
    Matches(String),
}

/// A header matcher. Only `equalTo` is emitted (§4.3): header matchers are
/// added only for projection-set headers whose value is not a sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatcher {
    /// The exact value to match.
    pub equal_to: String,
}

/// A body-content matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum BodyPattern {
    /// Structural JSON equality.
    EqualToJson(serde_json::Value),
    /// Exact string equality (used when the body did not parse as JSON).
    EqualTo(String),
}

/// The request-matching half of a [`Stub`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchSpec {
    /// HTTP method to match.
    pub method: String,
    /// Path to match, without query string.
    pub url_path: String,
    /// Per-key query-parameter matchers, present only if the request had any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query_parameters: Option<BTreeMap<String, QueryMatcher>>,
    /// Header matchers for projection-set headers only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub headers: Option<BTreeMap<String, HeaderMatcher>>,
    /// Body matchers, at most one entry per §4.3.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body_patterns: Option<Vec<BodyPattern>>,
}

/// The response half of a [`Stub`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSpec {
    /// HTTP status code, always in `100..=599`.
    pub status: u16,
    /// Filtered response headers (hop-by-hop and sentinel-prefixed values dropped).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub headers: Option<BTreeMap<String, String>>,
    /// Parsed JSON response body, if the response was JSON.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub json_body: Option<serde_json::Value>,
    /// Raw response body, if it was not JSON.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<String>,
}

/// Provenance metadata attached to every generated stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Provenance {
    /// Identifier of the generating component (e.g. `mockmesh-collector`).
    pub generated_by: String,
    /// When this stub was generated.
    pub generated_at: DateTime<Utc>,
    /// Hex fingerprint this stub was generated from.
    pub request_hash: String,
    /// Original request path, kept for human inspection in the control surface.
    pub original_path: String,
}

/// The canonical mock-server stub document emitted by the stub builder (C3)
/// and carried through the stub queue (C6) to the mock-server client (C8).
///
/// Invariants: `id` is stable for equal (sanitized, canonicalized) inputs;
/// `match_spec.method` and `match_spec.url_path` are always present;
/// `response_spec.status` is in `100..=599`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Stub {
    /// Fingerprint hex — stable identity for this stub.
    pub id: String,
    /// Human label derived from method + path.
    pub name: String,
    /// Request-matching rules.
    #[serde(rename = "request")]
    pub match_spec: MatchSpec,
    /// Canned response.
    #[serde(rename = "response")]
    pub response_spec: ResponseSpec,
    /// Generation provenance.
    pub metadata: Provenance,
}

impl Stub {
    /// True when the stub satisfies the mock-server client's pre-send
    /// validation contract (§4.8): method present, at least one of
    /// `url_path`/`url`/`url_pattern` present, status in range.
    pub fn is_well_formed(&self) -> bool {
        !self.match_spec.method.trim().is_empty()
            && !self.match_spec.url_path.trim().is_empty()
            && (100..=599).contains(&self.response_spec.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Stub {
        Stub {
            id: "abc123".into(),
            name: "GET /api/v1/users".into(),
            match_spec: MatchSpec {
                method: "GET".into(),
                url_path: "/api/v1/users".into(),
                query_parameters: None,
                headers: None,
                body_patterns: None,
            },
            response_spec: ResponseSpec {
                status: 200,
                headers: None,
                json_body: Some(serde_json::json!({"ok": true})),
                body: None,
            },
            metadata: Provenance {
                generated_by: "mockmesh-collector".into(),
                generated_at: Utc::now(),
                request_hash: "abc123".into(),
                original_path: "/api/v1/users".into(),
            },
        }
    }

    #[test]
    fn well_formed_stub_passes() {
        assert!(sample().is_well_formed());
    }

    #[test]
    fn missing_method_fails() {
        let mut s = sample();
        s.match_spec.method.clear();
        assert!(!s.is_well_formed());
    }

    #[test]
    fn missing_path_fails() {
        let mut s = sample();
        s.match_spec.url_path.clear();
        assert!(!s.is_well_formed());
    }

    #[test]
    fn out_of_range_status_fails() {
        let mut s = sample();
        s.response_spec.status = 999;
        assert!(!s.is_well_formed());
        s.response_spec.status = 0;
        assert!(!s.is_well_formed());
    }

    #[test]
    fn serializes_with_camel_case_wire_names() {
        let stub = sample();
        let json = serde_json::to_value(&stub).unwrap();
        assert_eq!(json["request"]["urlPath"], "/api/v1/users");
        assert_eq!(json["response"]["status"], 200);
        assert_eq!(json["response"]["jsonBody"], serde_json::json!({"ok": true}));
        assert!(json["response"].get("json_body").is_none());
    }
}
