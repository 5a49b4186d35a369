// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Stub builder (mockmesh C3): transforms a sanitized request/response pair
//! plus its fingerprint into the canonical mock-server [`Stub`] document
//! (§4.3).

use chrono::Utc;
use mm_core::{
    header_get, BodyPattern, Fingerprint, HeaderMatcher, MatchSpec, Provenance, QueryMatcher, RequestData,
    ResponseData, ResponseSpec, SanitizedEvent, Stub, SANITIZED_SENTINEL,
};
use mm_fingerprint::PROJECTION_HEADERS;
use std::collections::BTreeMap;

/// Response headers dropped unconditionally regardless of sanitization,
/// either exact names or, for `x-envoy-`, a prefix (§4.3, mirroring
/// `processor.py`'s `skip_headers`).
const SKIP_RESPONSE_HEADERS: &[&str] = &["date", "server", "x-envoy-", "x-request-id"];

/// Identifier recorded in every stub's `metadata.generated_by` field.
pub const GENERATOR_ID: &str = "mockmesh-collector";

fn should_skip_response_header(name_lower: &str) -> bool {
    SKIP_RESPONSE_HEADERS.iter().any(|skip| {
        if *skip == "x-envoy-" {
            name_lower.starts_with(skip)
        } else {
            name_lower == *skip
        }
    })
}

fn is_sentinel_value(value: &str) -> bool {
    value.starts_with(SANITIZED_SENTINEL) || value.starts_with("***")
}

/// Parses a raw query string into key → observed-value-list, preserving the
/// order values were observed in (needed for the `matches` regex
/// alternation, which is not required to be sorted).
fn parse_query_preserving_order(query: &str) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if query.is_empty() {
        return params;
    }
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        };
        params.entry(key).or_default().push(value);
    }
    params
}

fn build_query_matchers(query: &str) -> Option<BTreeMap<String, QueryMatcher>> {
    let params = parse_query_preserving_order(query);
    if params.is_empty() {
        return None;
    }
    let mut matchers = BTreeMap::new();
    for (key, values) in params {
        let matcher = if values.len() == 1 {
            QueryMatcher::EqualTo(values.into_iter().next().unwrap())
        } else {
            QueryMatcher::Matches(format!(".*({}).*", values.join("|")))
        };
        matchers.insert(key, matcher);
    }
    Some(matchers)
}

fn build_header_matchers(headers: &[(String, String)]) -> Option<BTreeMap<String, HeaderMatcher>> {
    let mut matchers = BTreeMap::new();
    for name in PROJECTION_HEADERS {
        if let Some(value) = header_get(headers, name) {
            if !value.is_empty() && !is_sentinel_value(value) {
                matchers.insert((*name).to_string(), HeaderMatcher { equal_to: value.to_string() });
            }
        }
    }
    if matchers.is_empty() {
        None
    } else {
        Some(matchers)
    }
}

fn build_request_body_pattern(body_text: Option<&str>) -> Option<Vec<BodyPattern>> {
    let text = body_text?;
    if text.is_empty() || is_sentinel_value(text) {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => Some(vec![BodyPattern::EqualToJson(json)]),
        Err(_) => Some(vec![BodyPattern::EqualTo(text.to_string())]),
    }
}

fn build_response_headers(headers: &[(String, String)]) -> Option<BTreeMap<String, String>> {
    let mut filtered = BTreeMap::new();
    for (name, value) in headers {
        let name_lower = name.to_ascii_lowercase();
        if should_skip_response_header(&name_lower) || is_sentinel_value(value) {
            continue;
        }
        filtered.insert(name.clone(), value.clone());
    }
    if filtered.is_empty() {
        None
    } else {
        Some(filtered)
    }
}

fn decode_body_text(req: &RequestData) -> Option<String> {
    if req.body.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&req.body.bytes).into_owned())
}

fn decode_response_body_text(resp: &ResponseData) -> Option<String> {
    if resp.body.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&resp.body.bytes).into_owned())
}

fn build_response_spec(resp: &ResponseData) -> ResponseSpec {
    let headers = build_response_headers(&resp.headers);
    let (json_body, body) = match decode_response_body_text(resp) {
        Some(text) if !is_sentinel_value(&text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => (Some(json), None),
            Err(_) => (None, Some(text)),
        },
        _ => (None, None),
    };
    ResponseSpec {
        status: resp.status,
        headers,
        json_body,
        body,
    }
}

/// Builds a [`Stub`] from a sanitized event and its fingerprint.
///
/// Returns `None` when the resulting document would not be well-formed
/// (§4.3 "the builder rejects the pair"); the processor counts this as a
/// drop rather than treating it as an error.
pub fn build_stub(event: &SanitizedEvent, fingerprint: Fingerprint) -> Option<Stub> {
    let path = event.request.path.clone();
    let stub = Stub {
        id: fingerprint.to_hex(),
        name: format!("Auto-generated mock for {} {}", event.request.method, path),
        match_spec: MatchSpec {
            method: event.request.method.clone(),
            url_path: path.clone(),
            query_parameters: build_query_matchers(&event.request.query),
            headers: build_header_matchers(&event.request.headers),
            body_patterns: build_request_body_pattern(decode_body_text(&event.request).as_deref()),
        },
        response_spec: build_response_spec(&event.response),
        metadata: Provenance {
            generated_by: GENERATOR_ID.to_string(),
            generated_at: Utc::now(),
            request_hash: fingerprint.to_hex(),
            original_path: path,
        },
    };
    stub.is_well_formed().then_some(stub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::{BodyData, SourceIdentity};

    fn event(method: &str, path: &str, query: &str, req_headers: &[(&str, &str)], body: &[u8]) -> SanitizedEvent {
        SanitizedEvent {
            captured_at: Utc::now(),
            trace_id: "trace-1".to_string(),
            request: RequestData {
                method: method.to_string(),
                path: path.to_string(),
                query: query.to_string(),
                headers: req_headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                body: BodyData::new(body.to_vec()),
            },
            response: ResponseData {
                status: 200,
                headers: vec![
                    ("Date".to_string(), "Tue, 01 Jan 2030".to_string()),
                    ("X-Envoy-Upstream-Service-Time".to_string(), "3".to_string()),
                    ("Content-Type".to_string(), "application/json".to_string()),
                ],
                body: BodyData::new(br#"{"ok":true}"#.to_vec()),
            },
            source_identity: None::<SourceIdentity>,
            sanitize_failed: false,
            body_truncated: false,
        }
    }

    fn fp() -> Fingerprint {
        Fingerprint::from_bytes([9u8; 32])
    }

    #[test]
    fn builds_well_formed_stub_with_json_body_and_response() {
        let e = event("POST", "/api/v1/users", "", &[("content-type", "application/json")], br#"{"name":"a"}"#);
        let stub = build_stub(&e, fp()).expect("well-formed stub");
        assert_eq!(stub.id, fp().to_hex());
        assert_eq!(stub.match_spec.method, "POST");
        assert_eq!(stub.match_spec.url_path, "/api/v1/users");
        assert!(matches!(
            stub.match_spec.body_patterns.as_ref().unwrap()[0],
            BodyPattern::EqualToJson(_)
        ));
        assert_eq!(stub.response_spec.json_body, Some(serde_json::json!({"ok": true})));
    }

    #[test]
    fn skips_envoy_and_date_and_server_response_headers() {
        let e = event("GET", "/a", "", &[], b"");
        let stub = build_stub(&e, fp()).unwrap();
        let headers = stub.response_spec.headers.unwrap();
        assert!(!headers.contains_key("Date"));
        assert!(!headers.contains_key("X-Envoy-Upstream-Service-Time"));
        assert!(headers.contains_key("Content-Type"));
    }

    #[test]
    fn single_valued_query_param_becomes_equal_to() {
        let e = event("GET", "/search", "q=rust", &[], b"");
        let stub = build_stub(&e, fp()).unwrap();
        let params = stub.match_spec.query_parameters.unwrap();
        assert_eq!(params["q"], QueryMatcher::EqualTo("rust".to_string()));
    }

    #[test]
    fn multi_valued_query_param_becomes_matches_alternation() {
        let e = event("GET", "/search", "tag=a&tag=b", &[], b"");
        let stub = build_stub(&e, fp()).unwrap();
        let params = stub.match_spec.query_parameters.unwrap();
        assert_eq!(params["tag"], QueryMatcher::Matches(".*(a|b).*".to_string()));
    }

    #[test]
    fn sentinel_header_values_are_not_emitted_as_matchers() {
        let e = event("GET", "/a", "", &[("accept", "SANITIZED")], b"");
        let stub = build_stub(&e, fp()).unwrap();
        assert!(stub.match_spec.headers.is_none());
    }

    #[test]
    fn sentinel_body_is_omitted_from_match_spec() {
        let e = event("POST", "/a", "", &[], b"SANITIZED");
        let stub = build_stub(&e, fp()).unwrap();
        assert!(stub.match_spec.body_patterns.is_none());
    }

    #[test]
    fn non_json_body_becomes_equal_to_string() {
        let e = event("POST", "/a", "", &[], b"plain text body");
        let stub = build_stub(&e, fp()).unwrap();
        assert_eq!(
            stub.match_spec.body_patterns.unwrap()[0],
            BodyPattern::EqualTo("plain text body".to_string())
        );
    }

    #[test]
    fn out_of_range_status_is_rejected() {
        let mut e = event("GET", "/a", "", &[], b"");
        e.response.status = 0;
        assert!(build_stub(&e, fp()).is_none());
    }
}
