// SPDX-License-Identifier: MIT OR Apache-2.0
//! The [`StreamQueue`] contract (§4.6): an append-only ordered log with
//! consumer-group semantics, durable across process restarts for the
//! Redis-backed implementation.

use crate::types::{PendingEntry, StreamEntryOut, StreamId, StreamQueueError};
use async_trait::async_trait;

/// Durable, ordered stream of opaque payloads with consumer-group delivery.
///
/// Implementations must guarantee: total order by [`StreamId`] within a
/// stream; at-least-once delivery per group (a crashed consumer's
/// unacked entries remain claimable by [`claim`](Self::claim)); appends
/// surviving process restart (for the Redis-backed implementation — the
/// in-memory one is explicitly development-only, per §6 "Missing backend →
/// fall back to an in-process map").
#[async_trait]
pub trait StreamQueue: Send + Sync {
    /// Ensures `group` exists on `stream`, creating both if necessary.
    /// Idempotent: calling this when the group already exists is not an error.
    async fn create_group(&self, stream: &str, group: &str) -> Result<(), StreamQueueError>;

    /// Appends `payload` to `stream`, returning its assigned [`StreamId`].
    async fn append(&self, stream: &str, payload: Vec<u8>) -> Result<StreamId, StreamQueueError>;

    /// Delivers up to `count` entries on `stream` not yet delivered to
    /// `group`, assigning ownership to `consumer`. `block_ms` bounds how
    /// long to wait for new entries when none are immediately available.
    async fn read_as(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntryOut>, StreamQueueError>;

    /// Releases ownership of `id` within `group`, marking it consumed.
    async fn ack(&self, stream: &str, group: &str, id: &StreamId) -> Result<(), StreamQueueError>;

    /// Lists entries currently owned (delivered but unacked) by `group`.
    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, StreamQueueError>;

    /// Transfers ownership of `ids` idle for at least `min_idle_ms` to
    /// `new_consumer`, returning their payloads for reprocessing.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        new_consumer: &str,
        min_idle_ms: u64,
        ids: &[StreamId],
    ) -> Result<Vec<StreamEntryOut>, StreamQueueError>;

    /// Discards entries in `stream` with an id lower than `min_id`,
    /// returning the number removed.
    async fn trim(&self, stream: &str, min_id: &StreamId) -> Result<u64, StreamQueueError>;
}
