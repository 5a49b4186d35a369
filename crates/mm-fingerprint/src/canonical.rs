// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical form and fingerprint computation (spec §4.2).

use mm_core::{header_get, Fingerprint, RequestData};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Request headers that materially affect response selection and therefore
/// participate in the fingerprint projection (spec §4.2 step 5).
pub const PROJECTION_HEADERS: &[&str] = &[
    "content-type",
    "accept",
    "accept-language",
    "user-agent",
    "x-api-version",
    "x-client-version",
];

/// Percent-decodes a query string component, treating `+` as a literal (this
/// is a raw query string, not a form-encoded body).
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Percent-encodes a string with a fixed, stable rule: alphanumerics and
/// `-_.~` pass through unescaped; everything else becomes `%XX` uppercase hex.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Parses a raw query string (no leading `?`) into key → sorted-value-list
/// pairs, sorted by key. Mirrors `deduplicator.py`'s
/// `parse_qs` + sort-keys-and-values normalization.
pub fn parse_sorted_query(query: &str) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if query.is_empty() {
        return params;
    }
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        };
        params.entry(key).or_default().push(value);
    }
    for values in params.values_mut() {
        values.sort();
    }
    params
}

/// Re-encodes a sorted query parameter map back into a canonical query
/// string: keys in sorted order, each value percent-encoded, multi-valued
/// keys repeated (`k=v1&k=v2`).
pub fn encode_sorted_query(params: &BTreeMap<String, Vec<String>>) -> String {
    let mut parts = Vec::new();
    for (key, values) in params {
        for value in values {
            parts.push(format!("{}={}", percent_encode(key), percent_encode(value)));
        }
    }
    parts.join("&")
}

/// Canonicalizes the method: uppercased.
pub fn canonical_method(method: &str) -> String {
    method.to_ascii_uppercase()
}

/// Canonicalizes the path: lowercased, single trailing `/` stripped (root
/// `/` is preserved as-is — there is nothing to strip it down to).
pub fn canonical_path(path: &str) -> String {
    let lower = path.to_ascii_lowercase();
    if lower.len() > 1 && lower.ends_with('/') {
        lower[..lower.len() - 1].to_string()
    } else {
        lower
    }
}

/// Builds the sorted-key JSON projection of headers that participate in
/// fingerprinting (§4.2 step 5). Returns an empty string when no
/// projection header is present ("empty projection ⇒ empty string").
pub fn header_projection(headers: &[(String, String)]) -> String {
    let mut map = Map::new();
    for name in PROJECTION_HEADERS {
        if let Some(value) = header_get(headers, name) {
            map.insert((*name).to_string(), Value::String(value.to_lowercase()));
        }
    }
    if map.is_empty() {
        return String::new();
    }
    // `Map` here is a `BTreeMap` under serde_json's default feature set,
    // so keys are already sorted; `to_string` is therefore deterministic.
    Value::Object(map).to_string()
}

/// Builds the canonical string for a (sanitized) request, given its
/// precomputed body digest (spec §4.1 `body_digest`).
///
/// Concatenates method, path, sorted query, body digest, and header
/// projection with `|`, per spec §4.2.
pub fn canonicalize(req: &RequestData, body_digest_hex16: &str) -> String {
    let method = canonical_method(&req.method);
    let path = canonical_path(&req.path);
    let query = encode_sorted_query(&parse_sorted_query(&req.query));
    let headers = header_projection(&req.headers);
    [method, path, query, body_digest_hex16.to_string(), headers].join("|")
}

/// Computes the SHA-256 fingerprint of a (sanitized) request's canonical form.
pub fn fingerprint(req: &RequestData, body_digest_hex16: &str) -> Fingerprint {
    let canonical = canonicalize(req, body_digest_hex16);
    let digest = Sha256::digest(canonical.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Fingerprint::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::BodyData;

    fn req(method: &str, path: &str, query: &str, headers: &[(&str, &str)]) -> RequestData {
        RequestData {
            method: method.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: BodyData::new(Vec::new()),
        }
    }

    #[test]
    fn method_is_uppercased() {
        assert_eq!(canonical_method("get"), "GET");
        assert_eq!(canonical_method("PoSt"), "POST");
    }

    #[test]
    fn path_is_lowercased_and_trailing_slash_stripped() {
        assert_eq!(canonical_path("/API/Users/"), "/api/users");
        assert_eq!(canonical_path("/"), "/");
        assert_eq!(canonical_path("/a//"), "/a/");
    }

    #[test]
    fn query_params_sorted_by_key_and_value() {
        let parsed = parse_sorted_query("b=2&a=3&a=1");
        assert_eq!(parsed["a"], vec!["1".to_string(), "3".to_string()]);
        assert_eq!(parsed["b"], vec!["2".to_string()]);
        let encoded = encode_sorted_query(&parsed);
        assert_eq!(encoded, "a=1&a=3&b=2");
    }

    #[test]
    fn equal_canonical_requests_share_fingerprint() {
        let r1 = req("get", "/api/users/", "b=2&a=1", &[("Content-Type", "application/json")]);
        let r2 = req("GET", "/api/users", "a=1&b=2", &[("content-type", "application/json")]);
        assert_eq!(fingerprint(&r1, "deadbeef"), fingerprint(&r2, "deadbeef"));
    }

    #[test]
    fn different_paths_produce_different_fingerprints() {
        let r1 = req("GET", "/a", "", &[]);
        let r2 = req("GET", "/b", "", &[]);
        assert_ne!(fingerprint(&r1, "x"), fingerprint(&r2, "x"));
    }

    #[test]
    fn empty_header_projection_is_empty_string() {
        assert_eq!(header_projection(&[("x-unrelated".to_string(), "v".to_string())]), "");
    }

    #[test]
    fn header_projection_is_sorted_and_lowercased() {
        let headers = vec![
            ("User-Agent".to_string(), "Mozilla".to_string()),
            ("Accept".to_string(), "APPLICATION/JSON".to_string()),
        ];
        let projection = header_projection(&headers);
        assert_eq!(
            projection,
            r#"{"accept":"application/json","user-agent":"mozilla"}"#
        );
    }

    #[test]
    fn canonicalize_differs_only_by_body_digest() {
        let r = req("GET", "/a", "", &[]);
        assert_ne!(canonicalize(&r, "aaaa"), canonicalize(&r, "bbbb"));
    }

    #[test]
    fn percent_encode_roundtrips_through_decode() {
        let encoded = percent_encode("a b&c=d");
        let decoded = percent_decode(&encoded);
        assert_eq!(decoded, "a b&c=d");
    }
}
