// SPDX-License-Identifier: MIT OR Apache-2.0
//! Body sanitization, branching on `Content-Type` (§4.1).

use crate::patterns::redact_text;
use mm_core::SANITIZED_SENTINEL;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Outcome of sanitizing one body.
pub struct SanitizedBody {
    /// The sanitized bytes, ready to be placed back on the event.
    pub bytes: Vec<u8>,
    /// Set when the body could not be safely parsed/scanned at all and was
    /// replaced wholesale with the error sentinel (§7 `SANITIZE_FAIL`).
    pub failed: bool,
}

/// Sanitizes a body according to its declared content type.
///
/// Content-type branching exactly mirrors §4.1:
/// - `application/json`: parse, walk recursively, mask sensitive keys.
/// - `application/x-www-form-urlencoded`: parse key→values, mask by key.
/// - `multipart/form-data`: opaque text, pattern-scan only.
/// - `text/*`, `application/xml`: pattern-scan.
/// - anything else: pattern-scan on lossily-decoded UTF-8.
pub fn sanitize_body(bytes: &[u8], content_type: &str, sensitive_fields: &HashSet<String>) -> SanitizedBody {
    if bytes.is_empty() {
        return SanitizedBody {
            bytes: Vec::new(),
            failed: false,
        };
    }

    let ct = content_type.to_ascii_lowercase();

    if ct.contains("application/json") {
        return sanitize_json_body(bytes, sensitive_fields);
    }
    if ct.contains("application/x-www-form-urlencoded") {
        return sanitize_form_body(bytes, sensitive_fields);
    }
    if ct.contains("multipart/form-data") {
        return sanitize_as_text(bytes, /* strict_utf8 */ false);
    }
    if ct.starts_with("text/") || ct.contains("application/xml") {
        return sanitize_as_text(bytes, /* strict_utf8 */ true);
    }
    sanitize_as_text(bytes, /* strict_utf8 */ false)
}

fn sanitize_json_body(bytes: &[u8], sensitive_fields: &HashSet<String>) -> SanitizedBody {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => {
            let masked = mask_json_value(value, sensitive_fields);
            match serde_json::to_vec(&masked) {
                Ok(bytes) => SanitizedBody {
                    bytes,
                    failed: false,
                },
                Err(_) => sentinel_body(),
            }
        }
        Err(_) => sanitize_as_text(bytes, false),
    }
}

fn mask_json_value(value: Value, sensitive_fields: &HashSet<String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                if sensitive_fields.contains(&k.to_ascii_lowercase()) {
                    out.insert(k, Value::String(SANITIZED_SENTINEL.to_string()));
                } else {
                    out.insert(k, mask_json_value(v, sensitive_fields));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| mask_json_value(v, sensitive_fields))
                .collect(),
        ),
        Value::String(s) => Value::String(redact_text(&s)),
        other => other,
    }
}

fn sanitize_form_body(bytes: &[u8], sensitive_fields: &HashSet<String>) -> SanitizedBody {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return sanitize_as_text(bytes, false);
    };

    let mut pairs: Vec<(String, String)> = Vec::new();
    for segment in text.split('&').filter(|s| !s.is_empty()) {
        let mut parts = segment.splitn(2, '=');
        let key = form_decode(parts.next().unwrap_or_default());
        let value = form_decode(parts.next().unwrap_or_default());
        pairs.push((key, value));
    }

    let mut out = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        let masked_value = if sensitive_fields.contains(&key.to_ascii_lowercase()) {
            SANITIZED_SENTINEL.to_string()
        } else {
            redact_text(&value)
        };
        out.push(format!("{}={}", form_encode(&key), form_encode(&masked_value)));
    }

    SanitizedBody {
        bytes: out.join("&").into_bytes(),
        failed: false,
    }
}

fn form_decode(s: &str) -> String {
    let replaced = s.replace('+', " ");
    let mut out = String::with_capacity(replaced.len());
    let mut chars = replaced.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hi = chars.next();
            let lo = chars.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let Ok(byte) = u8::from_str_radix(&format!("{hi}{lo}"), 16) {
                    out.push(byte as char);
                    continue;
                }
            }
            out.push('%');
        } else {
            out.push(c);
        }
    }
    out
}

fn form_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn sanitize_as_text(bytes: &[u8], strict_utf8: bool) -> SanitizedBody {
    if strict_utf8 {
        match std::str::from_utf8(bytes) {
            Ok(text) => SanitizedBody {
                bytes: redact_text(text).into_bytes(),
                failed: false,
            },
            // genuinely invalid bytes where valid UTF-8 was expected: the raw
            // scan path itself is unsafe here, so fall back to the sentinel
            // rather than guessing at a lossy decode (§4.1 "never pass raw
            // bytes through on a failure path").
            Err(_) => sentinel_body(),
        }
    } else {
        let text = String::from_utf8_lossy(bytes);
        SanitizedBody {
            bytes: redact_text(&text).into_bytes(),
            failed: false,
        }
    }
}

fn sentinel_body() -> SanitizedBody {
    SanitizedBody {
        bytes: SANITIZED_SENTINEL.as_bytes().to_vec(),
        failed: true,
    }
}

/// Computes the SHA-256 digest of a body's canonical form, truncated to 16
/// hex characters (§4.1 "Body digest").
///
/// JSON bodies are canonicalized (keys sorted recursively, arrays
/// order-preserving) before hashing; non-JSON bodies are hashed as raw
/// bytes. Used only for fingerprinting — never exposed as a stored value.
pub fn body_digest(bytes: &[u8]) -> String {
    let canonical: Vec<u8> = match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => {
            let canon = canonicalize_json(&value);
            serde_json::to_vec(&canon).unwrap_or_else(|_| bytes.to_vec())
        }
        Err(_) => bytes.to_vec(),
    };
    let digest = Sha256::digest(&canonical);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), canonicalize_json(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(xs: &[&str]) -> HashSet<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn json_masks_sensitive_keys_and_scans_strings() {
        let body = br#"{"password":"hunter2","email":"a@b.co","ok":true}"#;
        let out = sanitize_body(body, "application/json", &fields(&["password"]));
        let value: Value = serde_json::from_slice(&out.bytes).unwrap();
        assert_eq!(value["password"], "SANITIZED");
        assert_eq!(value["email"], "SANITIZED");
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn json_recurses_into_nested_objects_and_arrays() {
        let body = br#"{"user":{"token":"abc"},"list":[{"password":"x"}]}"#;
        let out = sanitize_body(body, "application/json", &fields(&["password"]));
        let value: Value = serde_json::from_slice(&out.bytes).unwrap();
        assert_eq!(value["list"][0]["password"], "SANITIZED");
    }

    #[test]
    fn form_urlencoded_masks_by_key_preserving_order() {
        let body = b"name=alice&password=hunter2&age=30";
        let out = sanitize_body(body, "application/x-www-form-urlencoded", &fields(&["password"]));
        let text = String::from_utf8(out.bytes).unwrap();
        assert_eq!(text, "name=alice&password=SANITIZED&age=30");
    }

    #[test]
    fn multipart_is_treated_as_opaque_text() {
        let body = b"--boundary\r\nContent-Disposition: form-data\r\n\r\na@b.co\r\n--boundary--";
        let out = sanitize_body(body, "multipart/form-data; boundary=boundary", &fields(&[]));
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(!text.contains("a@b.co"));
    }

    #[test]
    fn text_plain_is_pattern_scanned() {
        let out = sanitize_body(b"email me at a@b.co", "text/plain", &fields(&[]));
        assert!(!String::from_utf8(out.bytes).unwrap().contains("a@b.co"));
    }

    #[test]
    fn invalid_json_degrades_to_text_scan() {
        let out = sanitize_body(b"{not valid json a@b.co", "application/json", &fields(&[]));
        assert!(!out.failed);
        assert!(!String::from_utf8(out.bytes).unwrap().contains("a@b.co"));
    }

    #[test]
    fn invalid_utf8_in_strict_content_type_sentinels_whole_body() {
        let bad = vec![0xff, 0xfe, 0x00, 0x01];
        let out = sanitize_body(&bad, "text/plain", &fields(&[]));
        assert!(out.failed);
        assert_eq!(out.bytes, SANITIZED_SENTINEL.as_bytes());
    }

    #[test]
    fn empty_body_is_not_a_failure() {
        let out = sanitize_body(b"", "application/json", &fields(&[]));
        assert!(!out.failed);
        assert!(out.bytes.is_empty());
    }

    #[test]
    fn digest_is_16_hex_chars() {
        let digest = body_digest(b"{\"a\":1}");
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_is_key_order_independent_for_json() {
        let a = body_digest(br#"{"a":1,"b":2}"#);
        let b = body_digest(br#"{"b":2,"a":1}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn digest_is_stable_for_non_json_bytes() {
        let a = body_digest(b"plain text body");
        let b = body_digest(b"plain text body");
        assert_eq!(a, b);
    }
}
