// SPDX-License-Identifier: MIT OR Apache-2.0
//! The §4.5 core loop: one [`TrafficEvent`] in, one pipeline outcome out.

use chrono::Utc;
use mm_core::{Fingerprint, SanitizedEvent, SourceIdentity, TrafficEvent};
use mm_fingerprint::fingerprint;
use mm_sanitizer::{body_digest, Sanitizer};
use mm_streamqueue::{StreamId, StreamQueue};
use mm_telemetry::Counters;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// What became of one event after running the full pipeline.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Sanitized, fingerprinted, built, and appended to the stub queue.
    Enqueued {
        /// The queue entry's assigned id.
        stream_id: StreamId,
        /// The request's canonical fingerprint, as hex.
        fingerprint: String,
    },
    /// The fingerprint was already marked seen; the event was discarded.
    Duplicate,
    /// The sanitized pair did not yield a well-formed stub (§4.3) and was
    /// dropped rather than enqueued.
    Rejected,
    /// A step failed outright (dedup backend error, enqueue failure).
    Error(String),
}

/// Fixed knobs the processor needs beyond what `Sanitizer`/`DedupIndex`/
/// `StreamQueue` already carry internally.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Request/response bodies larger than this are truncated before
    /// sanitization runs (§4.5 "Body size policy").
    pub body_size_limit: usize,
    /// Name of the stub-queue stream stubs are appended to (§4.6).
    pub queue_stream: String,
}

/// Runs the §4.5 core loop for one event at a time.
///
/// Cheap to clone: every field is already an `Arc` or a small value type, so
/// a `Processor` can be shared across the concurrent sub-tasks a
/// [`crate::BatchProcessor`] spawns for one batch.
#[derive(Clone)]
pub struct Processor {
    sanitizer: Sanitizer,
    dedup: Arc<dyn mm_fingerprint::DedupIndex>,
    queue: Arc<dyn StreamQueue>,
    counters: Arc<Counters>,
    config: ProcessorConfig,
}

/// Truncates `bytes` to `limit`, returning whether truncation occurred.
fn truncate(bytes: &mut Vec<u8>, limit: usize) -> bool {
    if bytes.len() > limit {
        bytes.truncate(limit);
        true
    } else {
        false
    }
}

impl Processor {
    /// Builds a processor over the given sanitizer, dedup backend, stub
    /// queue, and shared counters.
    pub fn new(
        sanitizer: Sanitizer,
        dedup: Arc<dyn mm_fingerprint::DedupIndex>,
        queue: Arc<dyn StreamQueue>,
        counters: Arc<Counters>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            sanitizer,
            dedup,
            queue,
            counters,
            config,
        }
    }

    /// Runs one event through sanitize → fingerprint → dedupe → build →
    /// enqueue, updating the shared counters as it goes.
    pub async fn process_one(&self, mut event: TrafficEvent) -> ProcessOutcome {
        let request_truncated = truncate(&mut event.request.body.bytes, self.config.body_size_limit);
        let response_truncated = truncate(&mut event.response.body.bytes, self.config.body_size_limit);
        let body_truncated = request_truncated || response_truncated;

        let (sanitized_request, request_failed) = self.sanitizer.sanitize_request(&event.request);
        let (sanitized_response, response_failed) = self.sanitizer.sanitize_response(&event.response);
        let sanitize_failed = request_failed || response_failed;

        let digest = body_digest(&sanitized_request.body.bytes);
        let fp = fingerprint(&sanitized_request, &digest);

        if self.dedup.seen(fp).await {
            self.counters.requests_duplicated.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %fp, "duplicate request, discarding");
            return ProcessOutcome::Duplicate;
        }

        let sanitized_event = SanitizedEvent {
            captured_at: event.captured_at,
            trace_id: event.trace_id.clone(),
            request: sanitized_request,
            response: sanitized_response,
            source_identity: event.source_identity.clone(),
            sanitize_failed,
            body_truncated,
        };

        let Some(stub) = mm_stub::build_stub(&sanitized_event, fp) else {
            self.counters.requests_errors.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %fp, "stub builder rejected sanitized pair, dropping");
            return ProcessOutcome::Rejected;
        };

        if let Err(e) = self
            .dedup
            .mark(
                fp,
                json!({
                    "method": sanitized_event.request.method,
                    "path": sanitized_event.request.path,
                    "status_code": sanitized_event.response.status,
                    "timestamp": event.captured_at,
                }),
            )
            .await
        {
            warn!(fingerprint = %fp, error = %e, "dedup backend error on mark, continuing anyway");
        }

        let payload = match serde_json::to_vec(&stub) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.counters.requests_errors.fetch_add(1, Ordering::Relaxed);
                return ProcessOutcome::Error(format!("stub serialization failed: {e}"));
            }
        };

        match self.queue.append(&self.config.queue_stream, payload).await {
            Ok(stream_id) => {
                self.counters.queue_enqueued.fetch_add(1, Ordering::Relaxed);
                self.counters.requests_processed.fetch_add(1, Ordering::Relaxed);
                ProcessOutcome::Enqueued {
                    stream_id,
                    fingerprint: fp.to_hex(),
                }
            }
            Err(e) => {
                self.counters.requests_errors.fetch_add(1, Ordering::Relaxed);
                ProcessOutcome::Error(format!("enqueue failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::{BodyData, RequestData, ResponseData};
    use mm_fingerprint::InMemoryDedupIndex;
    use mm_sanitizer::Sanitizer;
    use mm_streamqueue::InMemoryStreamQueue;

    fn event(body: &[u8]) -> TrafficEvent {
        TrafficEvent {
            captured_at: Utc::now(),
            trace_id: "t1".to_string(),
            request: RequestData {
                method: "POST".to_string(),
                path: "/api/v1/users".to_string(),
                query: String::new(),
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: BodyData::new(body.to_vec()),
            },
            response: ResponseData {
                status: 200,
                headers: vec![],
                body: BodyData::new(br#"{"ok":true}"#.to_vec()),
            },
            source_identity: None::<SourceIdentity>,
        }
    }

    fn processor(queue_stream: &str) -> Processor {
        Processor::new(
            Sanitizer::new(&[], &[]).unwrap(),
            Arc::new(InMemoryDedupIndex::new(300)),
            Arc::new(InMemoryStreamQueue::new()),
            Arc::new(Counters::default()),
            ProcessorConfig {
                body_size_limit: 1024,
                queue_stream: queue_stream.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn enqueues_a_well_formed_event() {
        let p = processor("stubs");
        let outcome = p.process_one(event(br#"{"name":"a"}"#)).await;
        assert!(matches!(outcome, ProcessOutcome::Enqueued { .. }));
        assert_eq!(p.counters.requests_processed.load(Ordering::Relaxed), 1);
        assert_eq!(p.counters.queue_enqueued.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn second_identical_event_is_a_duplicate() {
        let p = processor("stubs");
        p.process_one(event(br#"{"name":"a"}"#)).await;
        let outcome = p.process_one(event(br#"{"name":"a"}"#)).await;
        assert!(matches!(outcome, ProcessOutcome::Duplicate));
        assert_eq!(p.counters.requests_duplicated.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn oversized_body_is_truncated_before_fingerprinting() {
        let p = processor("stubs");
        let big = vec![b'a'; 2048];
        let outcome = p.process_one(event(&big)).await;
        assert!(matches!(outcome, ProcessOutcome::Enqueued { .. }));
    }

    #[tokio::test]
    async fn malformed_status_is_rejected_not_erred() {
        let p = processor("stubs");
        let mut e = event(b"");
        e.response.status = 0;
        let outcome = p.process_one(e).await;
        assert!(matches!(outcome, ProcessOutcome::Rejected));
        assert_eq!(p.counters.requests_errors.load(Ordering::Relaxed), 1);
    }
}
