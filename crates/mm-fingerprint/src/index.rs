// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dedup-index contract and an in-memory implementation (spec §4.2, §6).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mm_core::{DedupEntry, Fingerprint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Key namespace prefix for dedup entries, per spec §6 (`mock:dedup:<hex>`).
pub const KEY_PREFIX: &str = "mock:dedup:";

/// Aggregate statistics about the dedup index's current contents, mirroring
/// `deduplicator.py`'s `get_stats` age-bucket breakdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupStats {
    /// Total number of live entries.
    pub total_entries: usize,
    /// Entries first seen within the last hour.
    pub last_hour: usize,
    /// Entries first seen within the last day (but not the last hour).
    pub last_day: usize,
    /// Entries older than a day.
    pub older: usize,
    /// The TTL, in seconds, entries are stored with.
    pub ttl_seconds: u64,
}

/// Backend-agnostic "seen it before?" contract for fingerprint deduplication.
///
/// Implementations must fail open: a backend error from [`seen`](Self::seen)
/// returns `false` (prefer a duplicate stub over a dropped signal, per
/// §4.2 and §7 `DEDUP_BACKEND_ERROR`); a [`mark`](Self::mark) error is
/// logged by the caller and does not propagate as a pipeline failure.
#[async_trait]
pub trait DedupIndex: Send + Sync {
    /// Read: true if `fp` was marked within its TTL window.
    ///
    /// On backend error, implementations must return `Ok(false)` rather than
    /// an error — callers should never need to special-case failure here.
    async fn seen(&self, fp: Fingerprint) -> bool;

    /// Write: marks `fp` as processed with the configured TTL, attaching
    /// `metadata` for forensic inspection. Errors are the caller's to log
    /// and swallow; this method still surfaces them so the caller can do so.
    async fn mark(&self, fp: Fingerprint, metadata: serde_json::Value) -> Result<(), String>;

    /// Sweeps entries with no TTL assigned (defensive against corruption),
    /// returning the number removed.
    async fn cleanup_expired(&self) -> usize;

    /// Snapshot statistics about the index's current contents.
    async fn stats(&self) -> DedupStats;
}

struct InMemoryEntry {
    entry: DedupEntry,
    ttl: Duration,
}

/// In-memory dedup index for development and tests (spec §6: "missing
/// backend → fall back to an in-process map with the same semantics
/// (documented as development-only)").
///
/// Matches `InMemoryDeduplicator` exactly: eviction happens lazily, on
/// access, by comparing `first_seen_at + ttl` against the current time.
pub struct InMemoryDedupIndex {
    entries: Mutex<HashMap<Fingerprint, InMemoryEntry>>,
    ttl_seconds: u64,
}

impl InMemoryDedupIndex {
    /// Builds an empty index with the given TTL, in seconds.
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_seconds,
        }
    }

    fn evict_expired_locked(entries: &mut HashMap<Fingerprint, InMemoryEntry>, now: DateTime<Utc>) {
        entries.retain(|_, v| v.entry.first_seen_at + v.ttl > now);
    }
}

#[async_trait]
impl DedupIndex for InMemoryDedupIndex {
    async fn seen(&self, fp: Fingerprint) -> bool {
        let mut entries = self.entries.lock().unwrap();
        Self::evict_expired_locked(&mut entries, Utc::now());
        entries.contains_key(&fp)
    }

    async fn mark(&self, fp: Fingerprint, metadata: serde_json::Value) -> Result<(), String> {
        let mut entries = self.entries.lock().unwrap();
        let now = Utc::now();
        Self::evict_expired_locked(&mut entries, now);
        entries.insert(
            fp,
            InMemoryEntry {
                entry: DedupEntry {
                    fingerprint: fp,
                    first_seen_at: now,
                    metadata,
                },
                ttl: Duration::seconds(self.ttl_seconds.max(0) as i64),
            },
        );
        Ok(())
    }

    async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        Self::evict_expired_locked(&mut entries, Utc::now());
        before - entries.len()
    }

    async fn stats(&self) -> DedupStats {
        let mut entries = self.entries.lock().unwrap();
        let now = Utc::now();
        Self::evict_expired_locked(&mut entries, now);
        let mut stats = DedupStats {
            ttl_seconds: self.ttl_seconds,
            ..Default::default()
        };
        for v in entries.values() {
            let age = now - v.entry.first_seen_at;
            if age < Duration::hours(1) {
                stats.last_hour += 1;
            } else if age < Duration::days(1) {
                stats.last_day += 1;
            } else {
                stats.older += 1;
            }
        }
        stats.total_entries = entries.len();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn fresh_fingerprint_is_not_seen() {
        let idx = InMemoryDedupIndex::new(60);
        assert!(!idx.seen(fp(1)).await);
    }

    #[tokio::test]
    async fn marked_fingerprint_is_seen() {
        let idx = InMemoryDedupIndex::new(60);
        idx.mark(fp(1), json!({})).await.unwrap();
        assert!(idx.seen(fp(1)).await);
    }

    #[tokio::test]
    async fn ttl_zero_means_every_event_is_new() {
        let idx = InMemoryDedupIndex::new(0);
        idx.mark(fp(1), json!({})).await.unwrap();
        // TTL 0 expires immediately; a fresh read should not find it.
        assert!(!idx.seen(fp(1)).await);
    }

    #[tokio::test]
    async fn stats_report_total_entries() {
        let idx = InMemoryDedupIndex::new(60);
        idx.mark(fp(1), json!({})).await.unwrap();
        idx.mark(fp(2), json!({})).await.unwrap();
        let stats = idx.stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.ttl_seconds, 60);
    }

    #[tokio::test]
    async fn cleanup_expired_removes_nothing_when_ttl_alive() {
        let idx = InMemoryDedupIndex::new(60);
        idx.mark(fp(1), json!({})).await.unwrap();
        assert_eq!(idx.cleanup_expired().await, 0);
    }
}
