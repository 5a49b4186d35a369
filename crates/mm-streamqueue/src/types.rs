// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared types for the [`crate::StreamQueue`] contract (§4.6).

use thiserror::Error;

/// Opaque, totally-ordered entry identifier assigned by the stream backend
/// (Redis-style `"<millis>-<seq>"`, zero-padded so lexicographic order
/// matches delivery order).
pub type StreamId = String;

/// One entry as returned by `read_as`/`claim`: its id and raw payload bytes.
pub type StreamEntryOut = (StreamId, Vec<u8>);

/// A row from `pending(group)`: an entry currently owned by a consumer that
/// has not yet been acked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// The entry's stream id.
    pub stream_id: StreamId,
    /// Name of the consumer that currently owns it.
    pub owner: String,
    /// Milliseconds since this entry was last (re-)delivered.
    pub idle_ms: u64,
    /// Number of times this entry has been delivered (1 on first delivery).
    pub delivery_count: u32,
}

/// Errors raised by a [`crate::StreamQueue`] implementation.
#[derive(Debug, Error)]
pub enum StreamQueueError {
    /// The backend connection or I/O failed.
    #[error("stream queue I/O error: {0}")]
    Io(String),
    /// The backend returned a reply that does not match the expected shape.
    #[error("stream queue protocol error: {0}")]
    Protocol(String),
}
