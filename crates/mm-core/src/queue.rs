// SPDX-License-Identifier: MIT OR Apache-2.0
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Stub;

/// An entry in the stub queue (C6): `{stream_id, stub_payload, retry_count,
/// last_error?, retry_at?}`.
///
/// Created on enqueue; deleted on ack; moved to the DLQ stream when
/// `retry_count` exceeds the configured `max_retries`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueMessage {
    /// Opaque, totally-ordered identifier assigned by the stream backend.
    pub stream_id: String,
    /// The stub document this message carries.
    pub stub_payload: Stub,
    /// Number of redelivery attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Error from the most recent failed attempt, if any.
    #[serde(default)]
    pub last_error: Option<String>,
    /// When this message becomes eligible for redelivery, if it was retried.
    #[serde(default)]
    pub retry_at: Option<DateTime<Utc>>,
}

impl QueueMessage {
    /// Builds a fresh message for first delivery.
    pub fn new(stream_id: impl Into<String>, stub_payload: Stub) -> Self {
        Self {
            stream_id: stream_id.into(),
            stub_payload,
            retry_count: 0,
            last_error: None,
            retry_at: None,
        }
    }
}

/// A dead-letter record: what exhausted its retry budget, and why.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DlqRecord {
    /// Stream id of the original message that exhausted retries.
    pub original_stream_id: String,
    /// The terminal error that triggered dead-lettering.
    pub final_error: String,
    /// When the record was written to the DLQ.
    pub dlq_timestamp: DateTime<Utc>,
    /// The stub payload the original message carried.
    pub original_payload: Stub,
}
