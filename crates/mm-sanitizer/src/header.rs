// SPDX-License-Identifier: MIT OR Apache-2.0
//! Header sanitization (§4.1 "Header masking").

use crate::patterns::redact_text;
use mm_core::SANITIZED_SENTINEL;
use std::collections::HashSet;

/// Sanitizes one header list in place, masking names present in
/// `sensitive_headers` and pattern-scanning every other value.
pub fn sanitize_headers(
    headers: &[(String, String)],
    sensitive_headers: &HashSet<String>,
) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked = if sensitive_headers.contains(&name.to_ascii_lowercase()) {
                mask_header_value(value)
            } else {
                redact_text(value)
            };
            (name.clone(), masked)
        })
        .collect()
}

/// Masks a single header value: `first4***last4` when longer than 8
/// characters, otherwise the full sentinel (§4.1).
pub fn mask_header_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let first: String = chars[..4].iter().collect();
        let last: String = chars[chars.len() - 4..].iter().collect();
        format!("{first}***{last}")
    } else {
        SANITIZED_SENTINEL.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(name: &str) -> HashSet<String> {
        [name.to_string()].into_iter().collect()
    }

    #[test]
    fn long_value_keeps_first_and_last_four() {
        assert_eq!(mask_header_value("sk_live_abcdef123456"), "sk_l***3456");
    }

    #[test]
    fn short_value_uses_sentinel() {
        assert_eq!(mask_header_value("short"), "SANITIZED");
        assert_eq!(mask_header_value("12345678"), "SANITIZED");
    }

    #[test]
    fn sensitive_header_name_is_masked_regardless_of_pattern() {
        let input = vec![("Authorization".to_string(), "plain-opaque-value".to_string())];
        let out = sanitize_headers(&input, &headers("authorization"));
        assert_eq!(out[0].1, "plai***alue");
    }

    #[test]
    fn header_name_matching_is_case_insensitive() {
        let input = vec![("X-API-KEY".to_string(), "abcdefghijklmnop".to_string())];
        let out = sanitize_headers(&input, &headers("x-api-key"));
        assert!(out[0].1.contains("***"));
    }

    #[test]
    fn non_sensitive_header_is_still_pattern_scanned() {
        let input = vec![("X-Forwarded-For".to_string(), "contact a@b.co".to_string())];
        let out = sanitize_headers(&input, &HashSet::new());
        assert!(!out[0].1.contains("a@b.co"));
    }
}
