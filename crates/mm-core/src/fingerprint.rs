// SPDX-License-Identifier: MIT OR Apache-2.0
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-length SHA-256 digest identifying a request's canonical form.
///
/// Invariant: equal fingerprints iff canonically equal requests (canonical
/// form is defined by `mm_fingerprint::canonicalize`). The fingerprint is
/// computed over the *sanitized* request, so two requests differing only in
/// redacted content collide by design.
///
/// Serializes as its lowercase hex string (see [`Fingerprint::to_hex`]); the
/// schema below documents it as an opaque string rather than a byte array.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&hex).ok_or_else(|| serde::de::Error::custom("invalid fingerprint hex"))
    }
}


impl Fingerprint {
    /// Wraps a raw 32-byte SHA-256 digest.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Renders the fingerprint as a lowercase hex string.
    ///
    /// This is the value used as `Stub::id` and as the dedup-index key
    /// suffix (`mock:dedup:<hex>`).
    pub fn to_hex(self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Parses a lowercase hex string back into a fingerprint.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let s = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(s, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A dedup-index entry: `{fingerprint, first_seen_at, metadata}`.
///
/// Created when a new fingerprint is processed; expires `ttl_seconds` after
/// `first_seen_at` in the backing store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DedupEntry {
    /// The fingerprint this entry marks as seen.
    #[schemars(with = "String")]
    pub fingerprint: Fingerprint,
    /// When this fingerprint was first observed.
    pub first_seen_at: DateTime<Utc>,
    /// Free-form metadata attached at mark time (e.g. original path, for
    /// forensic inspection via the control surface's stats endpoint).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let fp = Fingerprint::from_bytes([7u8; 32]);
        let hex = fp.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Fingerprint::from_hex(&hex), Some(fp));
    }

    #[test]
    fn from_hex_rejects_bad_length() {
        assert_eq!(Fingerprint::from_hex("deadbeef"), None);
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let bad = "z".repeat(64);
        assert_eq!(Fingerprint::from_hex(&bad), None);
    }

    #[test]
    fn display_matches_hex() {
        let fp = Fingerprint::from_bytes([0xab; 32]);
        assert_eq!(format!("{fp}"), fp.to_hex());
    }
}
