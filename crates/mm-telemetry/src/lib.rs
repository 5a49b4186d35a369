// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Ambient metrics and `GET /stats` counters (§4.10, §5 "no lock held across
//! an I/O call").
//!
//! Counters are plain atomics: monotonic tallies read on demand, not a
//! growable per-run log, which keeps them simple and satisfies the
//! no-lock-across-I/O rule directly. [`Counters::render_prometheus`]
//! formats them into Prometheus text exposition by hand, mirroring
//! `collector/main.py`'s `collector_requests_received_total`-style metric
//! names.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

macro_rules! counters {
    ($($field:ident => $metric:literal, $help:literal;)*) => {
        /// Process-wide counters, one per pipeline outcome.
        #[derive(Debug, Default)]
        pub struct Counters {
            $(
                #[doc = $help]
                pub $field: AtomicU64,
            )*
            /// Current depth of the processor's inbound buffer (a gauge, not
            /// a monotonic counter).
            pub queue_depth: AtomicI64,
        }

        /// A point-in-time snapshot of [`Counters`], serializable for `GET /stats`.
        #[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
        pub struct CountersSnapshot {
            $(
                #[allow(missing_docs)]
                pub $field: u64,
            )*
            #[allow(missing_docs)]
            pub queue_depth: i64,
        }

        impl Counters {
            /// Takes a consistent-enough snapshot for reporting (each field
            /// loaded independently; a caller racing a writer may observe a
            /// slightly stale combination, which is acceptable for stats).
            pub fn snapshot(&self) -> CountersSnapshot {
                CountersSnapshot {
                    $(
                        $field: self.$field.load(Ordering::Relaxed),
                    )*
                    queue_depth: self.queue_depth.load(Ordering::Relaxed),
                }
            }

            /// Renders all counters as Prometheus text exposition format.
            pub fn render_prometheus(&self) -> String {
                let snap = self.snapshot();
                let mut out = String::new();
                $(
                    out.push_str(&format!("# HELP {} {}\n", $metric, $help));
                    out.push_str(&format!("# TYPE {} counter\n", $metric));
                    out.push_str(&format!("{} {}\n", $metric, snap.$field));
                )*
                out.push_str("# HELP mockmesh_queue_depth Current depth of the processor inbound buffer\n");
                out.push_str("# TYPE mockmesh_queue_depth gauge\n");
                out.push_str(&format!("mockmesh_queue_depth {}\n", snap.queue_depth));
                out
            }
        }
    };
}

counters! {
    requests_received => "mockmesh_requests_received_total", "Total traffic events received by the ingest server";
    requests_dropped_host => "mockmesh_requests_dropped_host_total", "Events dropped by the ignored_hosts pre-filter";
    requests_dropped_path => "mockmesh_requests_dropped_path_total", "Events dropped by the ignored_paths pre-filter";
    requests_dropped_sampled => "mockmesh_requests_dropped_sampled_total", "Events dropped by per-endpoint sampling";
    requests_dropped_backpressure => "mockmesh_requests_dropped_backpressure_total", "Events dropped because the processor buffer was full";
    requests_processed => "mockmesh_requests_processed_total", "Events successfully processed into a stub";
    requests_duplicated => "mockmesh_requests_duplicated_total", "Events discarded as a dedup hit";
    requests_errors => "mockmesh_requests_errors_total", "Events dropped due to a processing error";
    queue_enqueued => "mockmesh_queue_enqueued_total", "Stubs appended to the stub queue";
    queue_acked => "mockmesh_queue_acked_total", "Queue entries acked after a successful apply";
    queue_retried => "mockmesh_queue_retried_total", "Queue entries re-appended for retry";
    queue_reclaimed => "mockmesh_queue_reclaimed_total", "Queue entries reclaimed from a stalled consumer";
    queue_dlq => "mockmesh_queue_dlq_total", "Queue entries moved to the dead-letter stream";
    apply_success => "mockmesh_apply_success_total", "Stubs successfully registered with the mock server";
    apply_transient_fail => "mockmesh_apply_transient_fail_total", "Transient (5xx/timeout/connect) apply failures";
    apply_permanent_fail => "mockmesh_apply_permanent_fail_total", "Permanent (4xx/validation) apply failures";
    backup_written => "mockmesh_backup_written_total", "Backup files written";
    backup_failed => "mockmesh_backup_failed_total", "Backup writes that failed (best-effort, does not block apply)";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let counters = Counters::default();
        counters.requests_received.fetch_add(3, Ordering::Relaxed);
        counters.requests_duplicated.fetch_add(1, Ordering::Relaxed);
        let snap = counters.snapshot();
        assert_eq!(snap.requests_received, 3);
        assert_eq!(snap.requests_duplicated, 1);
        assert_eq!(snap.requests_processed, 0);
    }

    #[test]
    fn prometheus_output_contains_every_metric_name() {
        let counters = Counters::default();
        let text = counters.render_prometheus();
        assert!(text.contains("mockmesh_requests_received_total 0"));
        assert!(text.contains("mockmesh_apply_permanent_fail_total 0"));
        assert!(text.contains("mockmesh_queue_depth 0"));
        assert!(text.contains("# TYPE mockmesh_queue_depth gauge"));
    }

    #[test]
    fn queue_depth_gauge_can_go_negative_transiently() {
        let counters = Counters::default();
        counters.queue_depth.fetch_sub(1, Ordering::Relaxed);
        assert_eq!(counters.snapshot().queue_depth, -1);
    }
}
