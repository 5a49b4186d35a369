// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Process entrypoint: loads configuration, wires every stage together,
//! and runs them side by side until a shutdown signal fans out to all of
//! them.

use anyhow::{Context, Result};
use clap::Parser;
use mm_applier::{run_delivery_loop, run_reclaim_loop, run_retention_loop, Applier, ApplierConfig, DEFAULT_SHUTDOWN_GRACE};
use mm_backup::BackupStore;
use mm_config::{load_config, MockmeshConfig};
use mm_core::{CancellationToken, TrafficEvent};
use mm_fingerprint::{DedupIndex, InMemoryDedupIndex, RedisDedupIndex};
use mm_glob::DenyList;
use mm_mockclient::{MockClient, MockClientConfig};
use mm_processor::{BatchConfig, BatchProcessor, Processor, ProcessorConfig};
use mm_rules::{PreFilters, SamplingRule, SamplingRules};
use mm_sanitizer::Sanitizer;
use mm_streamqueue::{InMemoryStreamQueue, RedisStreamQueue, StreamQueue};
use mm_telemetry::Counters;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// mockmesh: sidecar-mirrored traffic to WireMock-compatible stub, collected.
#[derive(Debug, Parser)]
#[command(name = "mockmesh", version)]
struct Args {
    /// Path to a TOML configuration file. Falls back to built-in defaults
    /// (overridable by `MOCKMESH_*` environment variables) when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing(config: &MockmeshConfig) {
    let filter = EnvFilter::try_new(config.log_level.to_ascii_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn build_dedup_index(config: &MockmeshConfig) -> Arc<dyn DedupIndex> {
    if config.dedup_backend_url.is_empty() {
        warn!("no dedup_backend_url configured, using in-memory dedup index (development only)");
        return Arc::new(InMemoryDedupIndex::new(config.dedup_ttl));
    }
    Arc::new(RedisDedupIndex::new(
        config.dedup_backend_addr().to_string(),
        config.dedup_password.clone(),
        config.dedup_db,
        config.dedup_ttl,
    ))
}

fn build_stream_queue(config: &MockmeshConfig) -> Arc<dyn StreamQueue> {
    // The stub queue and the dedup index share one Redis-compatible backend
    // address (§6: one `dedup_backend_url` in the configuration surface).
    if config.dedup_backend_url.is_empty() {
        warn!("no backend configured, using in-memory stub queue (development only)");
        return Arc::new(InMemoryStreamQueue::new());
    }
    Arc::new(RedisStreamQueue::new(
        config.dedup_backend_addr().to_string(),
        config.dedup_password.clone(),
        config.dedup_db,
    ))
}

fn build_pre_filters(config: &MockmeshConfig) -> Result<PreFilters> {
    let ignored_hosts = DenyList::new(&config.ignored_hosts).context("compiling ignored_hosts globs")?;
    let ignored_paths = DenyList::new(&config.ignored_paths).context("compiling ignored_paths globs")?;
    let default_rate = if config.enable_sampling { config.default_sample_rate } else { 1.0 };
    let rules = if config.enable_sampling {
        config
            .sampling_rules
            .iter()
            .map(|r| SamplingRule::new(&r.path_regex, r.sample_rate, r.method.clone()).context("compiling sampling_rules entry"))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };
    Ok(PreFilters::new(ignored_hosts, ignored_paths, SamplingRules::new(rules, default_rate)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("loading configuration")?;
    init_tracing(&config);
    info!(host = %config.host, port = config.port, ingest_port = config.ingest_port, "starting mockmesh");

    let cancel = CancellationToken::new();
    let counters = Arc::new(Counters::default());

    let dedup = build_dedup_index(&config);
    let queue = build_stream_queue(&config);
    queue
        .create_group(&config.queue_name, &config.queue_group)
        .await
        .context("creating stub queue consumer group")?;

    let sanitizer = Sanitizer::new(&config.sensitive_headers, &config.sensitive_fields).context("building sanitizer")?;
    let filters = Arc::new(build_pre_filters(&config)?);

    let backup = if config.backup_path.is_empty() {
        None
    } else {
        Some(BackupStore::new(config.backup_path.clone(), config.compress_backups, config.backup_retention_days))
    };

    let mock_client = MockClient::new(MockClientConfig {
        base_url: config.mock_server_url.clone(),
        timeout: Duration::from_secs(config.mock_server_timeout),
        max_attempts: config.mock_server_retry_attempts,
        max_concurrent_requests: config.max_concurrent_requests,
    });

    // Ingest server: captures mirrored traffic into a bounded channel the
    // batch processor drains (§4.4, §4.5).
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<TrafficEvent>(config.max_concurrent_requests.max(1) * 4);
    let ingest_state = Arc::new(mm_ingest::AppState::new(event_tx, filters.clone(), counters.clone(), cancel.clone()));
    let ingest_app = mm_ingest::build_app(ingest_state);
    let ingest_addr: SocketAddr = format!("{}:{}", config.host, config.ingest_port).parse().context("parsing ingest bind address")?;
    let ingest_listener = tokio::net::TcpListener::bind(ingest_addr).await.context("binding ingest server")?;
    info!(addr = %ingest_addr, "ingest server listening");
    let ingest_cancel = cancel.clone();
    let ingest_task = tokio::spawn(async move {
        axum::serve(ingest_listener, ingest_app)
            .with_graceful_shutdown(async move { ingest_cancel.cancelled().await })
            .await
    });

    // Batch processor: sanitize, dedup, build stub, enqueue (§4.2-§4.6).
    let processor = Processor::new(
        sanitizer,
        dedup,
        queue.clone(),
        counters.clone(),
        ProcessorConfig {
            body_size_limit: config.body_size_limit,
            queue_stream: config.queue_name.clone(),
        },
    );
    let batch_processor = BatchProcessor::new(
        processor,
        BatchConfig {
            batch_size: config.batch_size,
            batch_timeout: Duration::from_secs(config.batch_timeout),
        },
    );
    let processor_cancel = cancel.clone();
    let processor_task = tokio::spawn(async move { batch_processor.run(event_rx, processor_cancel).await });

    // Applier: delivery, reclaim, and retention loops (§4.7).
    let applier_alive = Arc::new(AtomicBool::new(true));
    let applier = Applier::new(
        queue.clone(),
        mock_client.clone(),
        backup.clone(),
        counters.clone(),
        ApplierConfig {
            stream: config.queue_name.clone(),
            group: config.queue_group.clone(),
            consumer: format!("mockmesh-{}", std::process::id()),
            dlq_stream: config.dlq_name(),
            max_retries: config.queue_max_retries,
            batch_size: config.batch_size,
            block_ms: 5_000,
        },
    );
    let delivery_alive = applier_alive.clone();
    let delivery_cancel = cancel.clone();
    let delivery_applier = applier.clone();
    let delivery_task = tokio::spawn(async move {
        run_delivery_loop(delivery_applier, delivery_cancel, DEFAULT_SHUTDOWN_GRACE).await;
        delivery_alive.store(false, Ordering::Relaxed);
    });
    let reclaim_task = tokio::spawn(run_reclaim_loop(applier.clone(), cancel.clone()));
    let retention_task = tokio::spawn(run_retention_loop(applier, cancel.clone()));

    // Control surface: liveness/readiness/stats/mappings/backups (§4.10).
    let control_state = Arc::new(mm_daemon::AppState::new(mock_client, backup, counters, filters, cancel.clone(), applier_alive));
    let control_app = mm_daemon::build_app(control_state);
    let control_addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().context("parsing control-surface bind address")?;
    let control_listener = tokio::net::TcpListener::bind(control_addr).await.context("binding control surface")?;
    info!(addr = %control_addr, "control surface listening");
    let control_cancel = cancel.clone();
    let control_task = tokio::spawn(async move {
        axum::serve(control_listener, control_app)
            .with_graceful_shutdown(async move { control_cancel.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping all stages");
    cancel.cancel();

    let _ = tokio::join!(ingest_task, processor_task, delivery_task, reclaim_task, retention_task, control_task);

    info!("mockmesh stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
