// SPDX-License-Identifier: MIT OR Apache-2.0
//! The §4.7 pending-reclaim and retention loops: recovery for a crashed
//! consumer, and a bound on how long acknowledged-but-untrimmed history
//! accumulates on the main stream.

use crate::applier::Applier;
use mm_core::CancellationToken;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the reclaim loop lists `pending(group)` (§4.7: "every 30 s").
pub const RECLAIM_INTERVAL: Duration = Duration::from_secs(30);
/// Minimum idle time before a pending entry is reclaimed (§4.7: "> 5 minutes").
pub const RECLAIM_IDLE: Duration = Duration::from_secs(5 * 60);
/// How often the retention loop trims the main stream (§4.7: "every hour").
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Entries older than this are trimmed from the main stream (§4.7: "24 hours").
pub const RETENTION_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Lists entries idle longer than [`RECLAIM_IDLE`] and claims them back onto
/// this consumer so [`Applier::deliver_once`]'s next pass can reprocess them.
///
/// This is the recovery path for consumer crashes mid-processing: a crashed
/// consumer leaves its deliveries permanently pending until another consumer
/// claims them.
pub async fn reclaim_once(applier: &Applier) {
    let config = applier.config();
    let pending = match applier.queue().pending(&config.stream, &config.group).await {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "pending() failed during reclaim");
            return;
        }
    };

    let stale: Vec<_> = pending
        .into_iter()
        .filter(|p| p.idle_ms >= RECLAIM_IDLE.as_millis() as u64)
        .map(|p| p.stream_id)
        .collect();
    if stale.is_empty() {
        return;
    }

    match applier
        .queue()
        .claim(&config.stream, &config.group, &config.consumer, RECLAIM_IDLE.as_millis() as u64, &stale)
        .await
    {
        Ok(claimed) => {
            if !claimed.is_empty() {
                info!(count = claimed.len(), "reclaimed stalled deliveries");
            }
        }
        Err(err) => warn!(error = %err, "claim() failed during reclaim"),
    }
}

/// Computes the stream id cutoff for `now - max_age` and trims everything
/// older than it from the main stream.
///
/// Stream ids are `"<millis>-<seq>"`, zero-padded so lexicographic order
/// matches chronological order — the same convention [`InMemoryStreamQueue`]
/// and the Redis-backed implementation both use, so a synthesized
/// `"<cutoff_millis>-0"` sorts correctly as a `min_id` argument regardless
/// of backend.
///
/// [`InMemoryStreamQueue`]: mm_streamqueue::InMemoryStreamQueue
pub async fn retain_once(applier: &Applier, now: chrono::DateTime<chrono::Utc>) {
    let config = applier.config();
    let cutoff = now - chrono::Duration::from_std(RETENTION_MAX_AGE).expect("fixed duration fits");
    let min_id = format!("{:020}-0", cutoff.timestamp_millis().max(0));
    match applier.queue().trim(&config.stream, &min_id).await {
        Ok(trimmed) => {
            if trimmed > 0 {
                info!(trimmed, "retention sweep trimmed aged stream entries");
            } else {
                debug!("retention sweep found nothing to trim");
            }
        }
        Err(err) => warn!(error = %err, "trim() failed during retention sweep"),
    }
}

/// Runs the reclaim loop on [`RECLAIM_INTERVAL`] until `cancel` fires.
pub async fn run_reclaim_loop(applier: Applier, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(RECLAIM_INTERVAL);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => reclaim_once(&applier).await,
        }
    }
}

/// Runs the retention loop on [`RETENTION_INTERVAL`] until `cancel` fires.
pub async fn run_retention_loop(applier: Applier, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(RETENTION_INTERVAL);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => retain_once(&applier, chrono::Utc::now()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_mockclient::{MockClient, MockClientConfig};
    use mm_streamqueue::{InMemoryStreamQueue, StreamQueue};
    use mm_telemetry::Counters;
    use std::sync::Arc;

    fn test_applier() -> Applier {
        let queue: Arc<dyn StreamQueue> = Arc::new(InMemoryStreamQueue::new());
        let client = MockClient::new(MockClientConfig::default());
        Applier::new(
            queue,
            client,
            None,
            Arc::new(Counters::default()),
            crate::ApplierConfig {
                stream: "stubs".to_string(),
                group: "applier".to_string(),
                consumer: "applier-1".to_string(),
                dlq_stream: "stubs:dlq".to_string(),
                max_retries: 3,
                batch_size: 10,
                block_ms: 0,
            },
        )
    }

    #[tokio::test]
    async fn reclaim_ignores_freshly_delivered_entries() {
        let applier = test_applier();
        let config = applier.config();
        applier.queue().create_group(&config.stream, &config.group).await.unwrap();
        applier.queue().append(&config.stream, b"payload".to_vec()).await.unwrap();
        applier
            .queue()
            .read_as(&config.stream, &config.group, "other-consumer", 10, 0)
            .await
            .unwrap();

        reclaim_once(&applier).await;

        let pending = applier.queue().pending(&config.stream, &config.group).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].owner, "other-consumer");
    }

    #[tokio::test]
    async fn retention_trims_entries_older_than_cutoff() {
        let applier = test_applier();
        let config = applier.config();
        let old_id = applier.queue().append(&config.stream, b"old".to_vec()).await.unwrap();
        let far_future = chrono::Utc::now() + chrono::Duration::days(2);

        retain_once(&applier, far_future).await;

        let remaining = applier
            .queue()
            .read_as(&config.stream, "inspect", "c", 10, 0)
            .await
            .unwrap();
        assert!(remaining.iter().all(|(id, _)| id != &old_id));
    }
}
