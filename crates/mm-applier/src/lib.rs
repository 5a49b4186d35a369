// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! At-least-once stub-queue consumer (C7, §4.7).
//!
//! [`Applier`] implements the delivery loop: read a batch from the stub
//! queue, back each entry up, submit it to the mock server, and ack on
//! success or [`Applier`]'s internal `handle_failure` on failure (retry with
//! a capped backoff, or dead-letter once `max_retries` is exhausted). The
//! [`maintenance`] module runs alongside it: a reclaim loop recovers entries
//! stranded by a crashed consumer, and a retention loop bounds how much
//! acknowledged history the main stream retains. Grounded on
//! `wiremock-loader/queue_consumer.py`'s `QueueConsumer`.

mod applier;
mod maintenance;

pub use applier::{Applier, ApplierConfig};
pub use maintenance::{
    reclaim_once, retain_once, run_reclaim_loop, run_retention_loop, RECLAIM_IDLE, RECLAIM_INTERVAL, RETENTION_INTERVAL, RETENTION_MAX_AGE,
};

use mm_core::CancellationToken;
use std::time::Duration;
use tracing::warn;

/// How long the delivery loop waits for an in-flight [`Applier::deliver_once`]
/// call to finish once cancellation fires, before abandoning it (§4.7
/// "wait for in-flight applies up to a grace deadline, then abort").
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Runs the delivery loop until `cancel` fires.
///
/// Each iteration is one [`Applier::deliver_once`] call, which is already
/// atomic with respect to ownership: every entry it reads ends the call
/// either acked (success), re-appended-then-acked (retry), or
/// dlq'd-then-acked (exhausted) — so there is no separate in-memory batch to
/// flush on shutdown, unlike [`mm_processor::BatchProcessor`]. Cancellation
/// therefore only needs to stop starting new iterations and let whichever
/// iteration is already in flight finish, bounded by `grace`.
pub async fn run_delivery_loop(applier: Applier, cancel: CancellationToken, grace: Duration) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let in_flight = applier.deliver_once();
        tokio::pin!(in_flight);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if tokio::time::timeout(grace, &mut in_flight).await.is_err() {
                    warn!("delivery loop shutdown grace period elapsed with work in flight, aborting");
                }
                return;
            }
            _ = &mut in_flight => {}
        }
    }
}
