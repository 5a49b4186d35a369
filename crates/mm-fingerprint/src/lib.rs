// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Canonical request fingerprinting and the dedup index (mockmesh C2).
//!
//! [`canonicalize`]/[`fingerprint`] implement the canonical form and
//! SHA-256 digest from spec §4.2. [`DedupIndex`] is the backend-agnostic
//! "seen it before?" contract, with [`InMemoryDedupIndex`] for development
//! and tests and [`RedisDedupIndex`] for a real deployment.

mod canonical;
mod index;
mod redis;

pub use canonical::{canonical_method, canonical_path, canonicalize, fingerprint, header_projection, PROJECTION_HEADERS};
pub use index::{DedupIndex, DedupStats, InMemoryDedupIndex, KEY_PREFIX};
pub use redis::{RespClient, RespError, RespValue};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mm_core::Fingerprint;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Wire shape stored at `mock:dedup:<hex>` (spec §6: `{processed_at, hash, metadata}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    processed_at: DateTime<Utc>,
    hash: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// Redis-streams-adjacent dedup index, speaking RESP directly over a
/// hand-rolled client (see [`RespClient`]).
///
/// Implements the §6 contract: `GET`, `SETEX`, `EXISTS`, `KEYS`, `TTL`,
/// `DELETE`, namespaced under [`KEY_PREFIX`].
pub struct RedisDedupIndex {
    client: Arc<RespClient>,
    ttl_seconds: u64,
}

impl RedisDedupIndex {
    /// Builds an index against a Redis-compatible host:port, database index,
    /// and optional password, matching `mm-config`'s `dedup_backend_url` /
    /// `dedup_db` / `dedup_password` / `dedup_ttl` fields.
    pub fn new(addr: impl Into<String>, password: Option<String>, db: u32, ttl_seconds: u64) -> Self {
        Self {
            client: Arc::new(RespClient::new(addr, password, db)),
            ttl_seconds,
        }
    }

    fn key(fp: Fingerprint) -> String {
        format!("{KEY_PREFIX}{}", fp.to_hex())
    }
}

#[async_trait]
impl DedupIndex for RedisDedupIndex {
    async fn seen(&self, fp: Fingerprint) -> bool {
        let key = Self::key(fp);
        match self.client.call(&[b"EXISTS", key.as_bytes()]).await {
            Ok(RespValue::Integer(n)) => n > 0,
            Ok(_) => false,
            Err(e) => {
                // Fail open: §4.2 "on backend error, `seen` returns `false`".
                warn!(error = %e, "dedup backend error on EXISTS, failing open");
                false
            }
        }
    }

    async fn mark(&self, fp: Fingerprint, metadata: serde_json::Value) -> Result<(), String> {
        let key = Self::key(fp);
        let stored = StoredEntry {
            processed_at: Utc::now(),
            hash: fp.to_hex(),
            metadata,
        };
        let payload = serde_json::to_vec(&stored).map_err(|e| e.to_string())?;
        self.client
            .call(&[b"SETEX", key.as_bytes(), self.ttl_seconds.to_string().as_bytes(), &payload])
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn cleanup_expired(&self) -> usize {
        let pattern = format!("{KEY_PREFIX}*");
        let keys = match self.client.call(&[b"KEYS", pattern.as_bytes()]).await {
            Ok(v) => v.as_bulk_array(),
            Err(e) => {
                warn!(error = %e, "dedup backend error on KEYS during cleanup");
                return 0;
            }
        };
        let mut removed = 0;
        for key in keys {
            match self.client.call(&[b"TTL", &key]).await {
                Ok(RespValue::Integer(-1)) => {
                    if self.client.call(&[b"DEL", &key]).await.is_ok() {
                        removed += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "dedup backend error on TTL during cleanup"),
            }
        }
        removed
    }

    async fn stats(&self) -> DedupStats {
        let pattern = format!("{KEY_PREFIX}*");
        let keys = match self.client.call(&[b"KEYS", pattern.as_bytes()]).await {
            Ok(v) => v.as_bulk_array(),
            Err(e) => {
                warn!(error = %e, "dedup backend error on KEYS during stats");
                return DedupStats {
                    ttl_seconds: self.ttl_seconds,
                    ..Default::default()
                };
            }
        };
        let mut stats = DedupStats {
            ttl_seconds: self.ttl_seconds,
            total_entries: keys.len(),
            ..Default::default()
        };
        let now = Utc::now();
        // Sample at most 100 keys for the age breakdown, matching
        // `deduplicator.py`'s `get_stats` performance cap.
        for key in keys.iter().take(100) {
            let Ok(RespValue::Bulk(Some(payload))) = self.client.call(&[b"GET", key]).await else {
                continue;
            };
            let Ok(stored) = serde_json::from_slice::<StoredEntry>(&payload) else {
                continue;
            };
            let age = now - stored.processed_at;
            if age < chrono::Duration::hours(1) {
                stats.last_hour += 1;
            } else if age < chrono::Duration::days(1) {
                stats.last_day += 1;
            } else {
                stats.older += 1;
            }
        }
        stats
    }
}
