// SPDX-License-Identifier: MIT OR Apache-2.0
//! The §4.7 delivery loop: read a batch, optionally back each entry up,
//! submit it to the mock server, then ack on success or `handle_failure`
//! on failure. Mirrors `wiremock-loader/queue_consumer.py`'s
//! `QueueConsumer.process_batch`.

use chrono::Utc;
use futures::future::join_all;
use mm_backup::BackupStore;
use mm_core::{DlqRecord, QueueMessage, Stub};
use mm_mockclient::MockClient;
use mm_retry::ExponentialBackoff;
use mm_streamqueue::{StreamId, StreamQueue};
use mm_telemetry::Counters;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, warn};

/// Stream/group naming and retry knobs for one [`Applier`].
#[derive(Debug, Clone)]
pub struct ApplierConfig {
    /// Stream stubs are delivered from.
    pub stream: String,
    /// Consumer group this applier reads as.
    pub group: String,
    /// This process's consumer name within `group`.
    pub consumer: String,
    /// Sibling stream dead-lettered entries are appended to (§4.6 `<queue>:dlq`).
    pub dlq_stream: String,
    /// Redelivery attempts allowed before an entry is dead-lettered.
    pub max_retries: u32,
    /// Max entries to request per `read_as` call.
    pub batch_size: usize,
    /// How long `read_as` may block waiting for new entries.
    pub block_ms: u64,
}

/// Parses a queue entry's raw payload into a [`QueueMessage`].
///
/// First delivery carries a bare [`Stub`] (what [`mm_processor`] enqueues);
/// a retried delivery carries the full envelope written by
/// [`Applier::handle_failure`]. Trying the envelope shape first is safe: a
/// bare stub has no `stub_payload` field, so it cannot be mistaken for one.
fn parse_entry(payload: &[u8]) -> Option<QueueMessage> {
    if let Ok(message) = serde_json::from_slice::<QueueMessage>(payload) {
        return Some(message);
    }
    serde_json::from_slice::<Stub>(payload)
        .ok()
        .map(|stub| QueueMessage::new(String::new(), stub))
}

/// Drains the stub queue into the mock server, one consumer group member.
///
/// Cheap to clone: every field is already an `Arc`, a `MockClient` (itself
/// `Arc`-backed), or a small value type.
#[derive(Clone)]
pub struct Applier {
    queue: Arc<dyn StreamQueue>,
    mock_client: MockClient,
    backup: Option<BackupStore>,
    counters: Arc<Counters>,
    config: ApplierConfig,
}

impl Applier {
    /// Builds an applier over the given stub queue, mock-server client, and
    /// optional backup store.
    pub fn new(
        queue: Arc<dyn StreamQueue>,
        mock_client: MockClient,
        backup: Option<BackupStore>,
        counters: Arc<Counters>,
        config: ApplierConfig,
    ) -> Self {
        Self {
            queue,
            mock_client,
            backup,
            counters,
            config,
        }
    }

    /// Ensures this applier's consumer group exists on its stream.
    pub async fn ensure_group(&self) -> Result<(), mm_streamqueue::StreamQueueError> {
        self.queue.create_group(&self.config.stream, &self.config.group).await
    }

    /// One pass of the delivery loop: reads up to `batch_size` entries and
    /// processes each independently, so one entry's failure never blocks
    /// another's delivery.
    pub async fn deliver_once(&self) {
        let entries = match self
            .queue
            .read_as(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer,
                self.config.batch_size,
                self.config.block_ms,
            )
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "read_as failed");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }
        let futures = entries.into_iter().map(|(id, payload)| self.deliver_one(id, payload));
        join_all(futures).await;
    }

    async fn deliver_one(&self, stream_id: StreamId, payload: Vec<u8>) {
        let mut message = match parse_entry(&payload) {
            Some(m) => m,
            None => {
                error!(stream_id = %stream_id, "queue entry is neither a stub nor a queue message, dropping");
                self.counters.apply_permanent_fail.fetch_add(1, Ordering::Relaxed);
                self.ack(&stream_id).await;
                return;
            }
        };
        message.stream_id = stream_id.clone();

        if !message.stub_payload.is_well_formed() {
            warn!(stream_id = %stream_id, "malformed stub, dropping without retry");
            self.counters.apply_permanent_fail.fetch_add(1, Ordering::Relaxed);
            self.ack(&stream_id).await;
            return;
        }

        if let Some(backup) = &self.backup {
            match backup.backup_single(&message.stub_payload).await {
                Ok(_) => {
                    self.counters.backup_written.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    warn!(stream_id = %stream_id, error = %err, "backup write failed, continuing");
                    self.counters.backup_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        match self.mock_client.create_stub(&message.stub_payload).await {
            Ok(()) => {
                self.counters.apply_success.fetch_add(1, Ordering::Relaxed);
                self.counters.queue_acked.fetch_add(1, Ordering::Relaxed);
                self.ack(&stream_id).await;
            }
            Err(err) => {
                let retryable = err.is_retryable();
                if retryable {
                    self.counters.apply_transient_fail.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.apply_permanent_fail.fetch_add(1, Ordering::Relaxed);
                }
                self.handle_failure(stream_id, message, err.to_string(), retryable).await;
            }
        }
    }

    /// §4.7 `handle_failure`: retry with a capped backoff, or dead-letter
    /// immediately. Either way the original entry is acked — the retried or
    /// dead-lettered copy is a fresh stream entry.
    ///
    /// `retryable` distinguishes `APPLY_TRANSIENT` from `APPLY_PERMANENT`
    /// (§7): a permanent failure (4xx, validation) goes straight to the DLQ
    /// regardless of `retry_count`, it is never retried.
    async fn handle_failure(&self, stream_id: StreamId, message: QueueMessage, reason: String, retryable: bool) {
        if retryable && message.retry_count < self.config.max_retries {
            self.retry(stream_id, message, reason).await;
        } else {
            self.dead_letter(stream_id, message, reason).await;
        }
    }

    async fn retry(&self, stream_id: StreamId, mut message: QueueMessage, reason: String) {
        let attempt = message.retry_count;
        ExponentialBackoff::queue_default().wait(attempt).await;

        message.retry_count += 1;
        message.last_error = Some(reason);
        message.retry_at = Some(Utc::now());

        let payload = match serde_json::to_vec(&message) {
            Ok(p) => p,
            Err(err) => {
                error!(stream_id = %stream_id, error = %err, "failed to serialize retry envelope, leaving entry for reclaim");
                return;
            }
        };
        if let Err(err) = self.queue.append(&self.config.stream, payload).await {
            error!(stream_id = %stream_id, error = %err, "failed to re-append retry, leaving original for reclaim");
            return;
        }
        self.counters.queue_retried.fetch_add(1, Ordering::Relaxed);
        self.ack(&stream_id).await;
    }

    async fn dead_letter(&self, stream_id: StreamId, message: QueueMessage, reason: String) {
        let record = DlqRecord {
            original_stream_id: stream_id.clone(),
            final_error: reason,
            dlq_timestamp: Utc::now(),
            original_payload: message.stub_payload,
        };
        let payload = match serde_json::to_vec(&record) {
            Ok(p) => p,
            Err(err) => {
                error!(stream_id = %stream_id, error = %err, "failed to serialize dlq record, leaving entry for reclaim");
                return;
            }
        };
        if let Err(err) = self.queue.append(&self.config.dlq_stream, payload).await {
            error!(stream_id = %stream_id, error = %err, "failed to append to dlq, leaving original for reclaim");
            return;
        }
        self.counters.queue_dlq.fetch_add(1, Ordering::Relaxed);
        self.ack(&stream_id).await;
    }

    async fn ack(&self, stream_id: &StreamId) {
        if let Err(err) = self.queue.ack(&self.config.stream, &self.config.group, stream_id).await {
            warn!(stream_id = %stream_id, error = %err, "ack failed");
        }
    }

    pub(crate) fn queue(&self) -> &Arc<dyn StreamQueue> {
        &self.queue
    }

    pub(crate) fn config(&self) -> &ApplierConfig {
        &self.config
    }

    pub(crate) fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }
}
