// SPDX-License-Identifier: MIT OR Apache-2.0
//! Development/test [`StreamQueue`] backend: an in-process map with the
//! same delivery semantics as the Redis-backed implementation (§6
//! "fall back to an in-process map with the same semantics (documented as
//! development-only)").

use crate::queue_trait::StreamQueue;
use crate::types::{PendingEntry, StreamEntryOut, StreamId, StreamQueueError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

struct PendingState {
    owner: String,
    delivered_at: Instant,
    delivery_count: u32,
}

#[derive(Default)]
struct GroupState {
    delivered_ids: BTreeSet<StreamId>,
    pending: HashMap<StreamId, PendingState>,
}

#[derive(Default)]
struct StreamState {
    entries: BTreeMap<StreamId, Vec<u8>>,
    groups: HashMap<String, GroupState>,
}

/// An in-memory [`StreamQueue`], good for tests and local development.
///
/// Not durable: entries and group state are lost on process restart. Does
/// not actually block on `read_as` — an empty stream returns immediately
/// rather than waiting `block_ms`, which is fine for a backend documented
/// as development-only.
pub struct InMemoryStreamQueue {
    streams: Mutex<HashMap<String, StreamState>>,
    seq: AtomicU64,
}

impl Default for InMemoryStreamQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStreamQueue {
    /// Builds an empty queue.
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> StreamId {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        // Zero-pad the sequence too: two ids sharing a millisecond must still
        // sort by numeric seq, not lexicographically (`"...-9"` would
        // otherwise sort after `"...-10"` in the `BTreeMap`).
        format!("{:020}-{seq:010}", Utc::now().timestamp_millis())
    }
}

#[async_trait]
impl StreamQueue for InMemoryStreamQueue {
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), StreamQueueError> {
        let mut streams = self.streams.lock().unwrap();
        let state = streams.entry(stream.to_string()).or_default();
        state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn append(&self, stream: &str, payload: Vec<u8>) -> Result<StreamId, StreamQueueError> {
        let id = self.next_id();
        let mut streams = self.streams.lock().unwrap();
        let state = streams.entry(stream.to_string()).or_default();
        state.entries.insert(id.clone(), payload);
        Ok(id)
    }

    async fn read_as(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        _block_ms: u64,
    ) -> Result<Vec<StreamEntryOut>, StreamQueueError> {
        let mut streams = self.streams.lock().unwrap();
        let state = streams.entry(stream.to_string()).or_default();
        let group_state = state.groups.entry(group.to_string()).or_default();
        let mut delivered = Vec::new();
        for (id, payload) in state.entries.iter() {
            if delivered.len() >= count {
                break;
            }
            if group_state.delivered_ids.contains(id) {
                continue;
            }
            group_state.delivered_ids.insert(id.clone());
            group_state.pending.insert(
                id.clone(),
                PendingState {
                    owner: consumer.to_string(),
                    delivered_at: Instant::now(),
                    delivery_count: 1,
                },
            );
            delivered.push((id.clone(), payload.clone()));
        }
        Ok(delivered)
    }

    async fn ack(&self, stream: &str, group: &str, id: &StreamId) -> Result<(), StreamQueueError> {
        let mut streams = self.streams.lock().unwrap();
        if let Some(state) = streams.get_mut(stream) {
            if let Some(group_state) = state.groups.get_mut(group) {
                group_state.pending.remove(id);
            }
        }
        Ok(())
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, StreamQueueError> {
        let streams = self.streams.lock().unwrap();
        let Some(state) = streams.get(stream) else {
            return Ok(Vec::new());
        };
        let Some(group_state) = state.groups.get(group) else {
            return Ok(Vec::new());
        };
        let now = Instant::now();
        Ok(group_state
            .pending
            .iter()
            .map(|(id, p)| PendingEntry {
                stream_id: id.clone(),
                owner: p.owner.clone(),
                idle_ms: now.duration_since(p.delivered_at).as_millis() as u64,
                delivery_count: p.delivery_count,
            })
            .collect())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        new_consumer: &str,
        min_idle_ms: u64,
        ids: &[StreamId],
    ) -> Result<Vec<StreamEntryOut>, StreamQueueError> {
        let mut streams = self.streams.lock().unwrap();
        let Some(state) = streams.get_mut(stream) else {
            return Ok(Vec::new());
        };
        let entries = state.entries.clone();
        let Some(group_state) = state.groups.get_mut(group) else {
            return Ok(Vec::new());
        };
        let now = Instant::now();
        let mut claimed = Vec::new();
        for id in ids {
            let Some(pending) = group_state.pending.get_mut(id) else {
                continue;
            };
            if now.duration_since(pending.delivered_at).as_millis() as u64 >= min_idle_ms {
                pending.owner = new_consumer.to_string();
                pending.delivered_at = now;
                pending.delivery_count += 1;
                if let Some(payload) = entries.get(id) {
                    claimed.push((id.clone(), payload.clone()));
                }
            }
        }
        Ok(claimed)
    }

    async fn trim(&self, stream: &str, min_id: &StreamId) -> Result<u64, StreamQueueError> {
        let mut streams = self.streams.lock().unwrap();
        let Some(state) = streams.get_mut(stream) else {
            return Ok(0);
        };
        let before = state.entries.len();
        state.entries = state.entries.split_off(min_id);
        Ok((before - state.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_read_delivers_in_order() {
        let q = InMemoryStreamQueue::new();
        q.create_group("s", "g").await.unwrap();
        q.append("s", b"one".to_vec()).await.unwrap();
        q.append("s", b"two".to_vec()).await.unwrap();
        let delivered = q.read_as("s", "g", "c1", 10, 0).await.unwrap();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].1, b"one");
        assert_eq!(delivered[1].1, b"two");
    }

    #[tokio::test]
    async fn read_as_never_redelivers_acked_or_in_flight_entries() {
        let q = InMemoryStreamQueue::new();
        q.create_group("s", "g").await.unwrap();
        q.append("s", b"one".to_vec()).await.unwrap();
        let first = q.read_as("s", "g", "c1", 10, 0).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = q.read_as("s", "g", "c1", 10, 0).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn ack_removes_entry_from_pending() {
        let q = InMemoryStreamQueue::new();
        q.create_group("s", "g").await.unwrap();
        let id = q.append("s", b"one".to_vec()).await.unwrap();
        q.read_as("s", "g", "c1", 10, 0).await.unwrap();
        assert_eq!(q.pending("s", "g").await.unwrap().len(), 1);
        q.ack("s", "g", &id).await.unwrap();
        assert!(q.pending("s", "g").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_transfers_ownership_when_idle_long_enough() {
        let q = InMemoryStreamQueue::new();
        q.create_group("s", "g").await.unwrap();
        let id = q.append("s", b"one".to_vec()).await.unwrap();
        q.read_as("s", "g", "c1", 10, 0).await.unwrap();
        let claimed = q.claim("s", "g", "c2", 0, &[id.clone()]).await.unwrap();
        assert_eq!(claimed.len(), 1);
        let pending = q.pending("s", "g").await.unwrap();
        assert_eq!(pending[0].owner, "c2");
        assert_eq!(pending[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn claim_skips_entries_not_idle_enough() {
        let q = InMemoryStreamQueue::new();
        q.create_group("s", "g").await.unwrap();
        let id = q.append("s", b"one".to_vec()).await.unwrap();
        q.read_as("s", "g", "c1", 10, 0).await.unwrap();
        let claimed = q.claim("s", "g", "c2", 300_000, &[id]).await.unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn trim_discards_entries_below_min_id_and_keeps_the_rest() {
        let q = InMemoryStreamQueue::new();
        let id1 = q.append("s", b"one".to_vec()).await.unwrap();
        let id2 = q.append("s", b"two".to_vec()).await.unwrap();
        // Nothing below id1 exists yet: trimming at id1 keeps both entries.
        assert_eq!(q.trim("s", &id1).await.unwrap(), 0);
        // Trimming at id2 discards id1 but keeps id2 (min_id is inclusive).
        assert_eq!(q.trim("s", &id2).await.unwrap(), 1);
        let remaining = q.read_as("s", "g", "c1", 10, 0).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, id2);
    }

    #[tokio::test]
    async fn create_group_is_idempotent() {
        let q = InMemoryStreamQueue::new();
        q.create_group("s", "g").await.unwrap();
        q.create_group("s", "g").await.unwrap();
    }

    #[test]
    fn ids_sharing_a_millisecond_sort_by_numeric_sequence_past_nine() {
        let q = InMemoryStreamQueue::new();
        let mut ids = Vec::new();
        for _ in 0..11 {
            ids.push(q.next_id());
        }
        // Same millisecond (or not, doesn't matter): sequence 9 must sort
        // before sequence 10 lexicographically, which only holds if both are
        // zero-padded to the same width.
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
