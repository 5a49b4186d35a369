// SPDX-License-Identifier: MIT OR Apache-2.0
//! The §4.5 batching policy: accumulate up to `batch_size` events, flush
//! early once `batch_timeout` has elapsed since the first event in the
//! batch, process every event in a flushed batch concurrently, and never
//! let one event's failure fail the rest (mirrors `BatchProcessor.add_event`
//! / `flush_batch` in `processor.py`).

use crate::processor::{ProcessOutcome, Processor};
use futures::future::join_all;
use mm_core::{CancellationToken, TrafficEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Batch size and flush-timeout knobs (spec §6 `batch_size`, `batch_timeout`,
/// §9 Open Question (b): "both flush triggers are OR'd").
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Flush once this many events have accumulated.
    pub batch_size: usize,
    /// Flush this long after the first event in the batch arrived, even if
    /// `batch_size` has not been reached.
    pub batch_timeout: Duration,
}

/// Tally of one flushed batch's outcomes, for logging — batches never fail
/// collectively, so this is informational rather than a `Result`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Events enqueued to the stub queue.
    pub enqueued: usize,
    /// Events discarded as dedup hits.
    pub duplicates: usize,
    /// Events the stub builder rejected as not well-formed.
    pub rejected: usize,
    /// Events that errored outright (dedup backend, enqueue failure, etc.).
    pub errored: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Enqueued { .. } => self.enqueued += 1,
            ProcessOutcome::Duplicate => self.duplicates += 1,
            ProcessOutcome::Rejected => self.rejected += 1,
            ProcessOutcome::Error(_) => self.errored += 1,
        }
    }
}

/// Drains a channel of captured events into a [`Processor`], batching by
/// size or timeout and processing each batch's events concurrently.
pub struct BatchProcessor {
    processor: Processor,
    config: BatchConfig,
}

impl BatchProcessor {
    /// Wraps `processor` with the given batching policy.
    pub fn new(processor: Processor, config: BatchConfig) -> Self {
        Self { processor, config }
    }

    /// Runs the drain loop until `rx` closes or `cancel` fires.
    ///
    /// On cancellation, any partially-filled batch is flushed before
    /// returning — no event that already reached the channel is dropped
    /// silently on shutdown.
    pub async fn run(&self, mut rx: mpsc::Receiver<TrafficEvent>, cancel: CancellationToken) {
        loop {
            let mut batch = Vec::with_capacity(self.config.batch_size);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.flush(batch).await;
                    return;
                }
                maybe = rx.recv() => {
                    match maybe {
                        Some(event) => batch.push(event),
                        None => return,
                    }
                }
            }

            let deadline = Instant::now() + self.config.batch_timeout;
            while batch.len() < self.config.batch_size {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(remaining) => break,
                    maybe = rx.recv() => {
                        match maybe {
                            Some(event) => batch.push(event),
                            None => {
                                self.flush(batch).await;
                                return;
                            }
                        }
                    }
                }
            }

            self.flush(batch).await;

            if cancel.is_cancelled() {
                return;
            }
        }
    }

    /// Processes every event in `batch` concurrently and logs the tally.
    ///
    /// Per-event failures never fail the batch (§4.5 "per-event failures do
    /// not fail the batch"): [`ProcessOutcome::Error`] is recorded, not
    /// propagated.
    async fn flush(&self, batch: Vec<TrafficEvent>) {
        if batch.is_empty() {
            return;
        }
        let size = batch.len();
        let futures = batch.into_iter().map(|event| self.processor.process_one(event));
        let outcomes = join_all(futures).await;

        let mut report = BatchReport::default();
        for outcome in &outcomes {
            report.record(outcome);
            if let ProcessOutcome::Error(reason) = outcome {
                warn!(reason = %reason, "batch event failed");
            }
        }
        info!(
            batch_size = size,
            enqueued = report.enqueued,
            duplicates = report.duplicates,
            rejected = report.rejected,
            errored = report.errored,
            "batch flushed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mm_core::{BodyData, RequestData, ResponseData, SourceIdentity};
    use mm_fingerprint::InMemoryDedupIndex;
    use mm_sanitizer::Sanitizer;
    use mm_streamqueue::InMemoryStreamQueue;
    use mm_telemetry::Counters;
    use std::sync::Arc;

    fn event(path: &str) -> TrafficEvent {
        TrafficEvent {
            captured_at: Utc::now(),
            trace_id: "t".to_string(),
            request: RequestData {
                method: "GET".to_string(),
                path: path.to_string(),
                query: String::new(),
                headers: vec![],
                body: BodyData::new(Vec::new()),
            },
            response: ResponseData {
                status: 200,
                headers: vec![],
                body: BodyData::new(br#"{"ok":true}"#.to_vec()),
            },
            source_identity: None::<SourceIdentity>,
        }
    }

    fn batch_processor(batch_size: usize, batch_timeout: Duration) -> BatchProcessor {
        let processor = Processor::new(
            Sanitizer::new(&[], &[]).unwrap(),
            Arc::new(InMemoryDedupIndex::new(300)),
            Arc::new(InMemoryStreamQueue::new()),
            Arc::new(Counters::default()),
            crate::ProcessorConfig {
                body_size_limit: 1024,
                queue_stream: "stubs".to_string(),
            },
        );
        BatchProcessor::new(
            processor,
            BatchConfig {
                batch_size,
                batch_timeout,
            },
        )
    }

    #[tokio::test]
    async fn flushes_on_batch_size() {
        let bp = batch_processor(2, Duration::from_secs(60));
        let (tx, rx) = mpsc::channel(8);
        tx.send(event("/a")).await.unwrap();
        tx.send(event("/b")).await.unwrap();
        drop(tx);
        bp.run(rx, CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn flushes_on_timeout_before_batch_is_full() {
        let bp = batch_processor(100, Duration::from_millis(20));
        let (tx, rx) = mpsc::channel(8);
        tx.send(event("/a")).await.unwrap();
        let cancel = CancellationToken::new();
        let cancel_for_run = cancel.clone();
        let handle = tokio::spawn(async move { bp.run(rx, cancel_for_run).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_flushes_partial_batch() {
        let bp = batch_processor(100, Duration::from_secs(60));
        let (tx, rx) = mpsc::channel(8);
        tx.send(event("/a")).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        bp.run(rx, cancel).await;
    }
}
