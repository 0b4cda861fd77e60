//! Manifest consumer loop
//!
//! Architecture:
//!   - One durable NATS pull consumer shared by all worker processes
//!   - Parallel Tokio task pool (configurable concurrency, default = CPU count)
//!   - Each delivery: parse → fetch chunks → reassemble → decrypt → write,
//!     then ack / nak / term per the handler's outcome
//!   - Prometheus metrics exposed on /metrics
//!   - Graceful shutdown on SIGTERM/SIGINT (drain in-flight work, exit 0)

use anyhow::{Context, Result};
use axum::extract::State;
use futures::StreamExt;
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::Semaphore,
};
use tracing::{error, info, warn};

use sbx_pipeline::Reconstructor;
use sbx_queue::{settle, HandlerOutcome, ManifestMessage, ManifestQueue};

// ── Metrics ───────────────────────────────────────────────────────────────

#[derive(Clone)]
struct WorkerMetrics {
    reconstructions: Family<Vec<(String, String)>, Counter>,
    duration: Family<Vec<(String, String)>, Histogram>,
}

impl WorkerMetrics {
    fn new(registry: &mut Registry) -> Self {
        let reconstructions = Family::default();
        let duration = Family::<Vec<(String, String)>, Histogram>::new_with_constructor(|| {
            Histogram::new([0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0])
        });

        registry.register(
            "sbx_reconstructions_total",
            "Manifest deliveries processed, labeled by outcome",
            reconstructions.clone(),
        );
        registry.register(
            "sbx_reconstruction_duration_seconds",
            "Reconstruction duration in seconds, labeled by outcome",
            duration.clone(),
        );

        WorkerMetrics {
            reconstructions,
            duration,
        }
    }

    fn outcome_labels(outcome: &HandlerOutcome) -> Vec<(String, String)> {
        let outcome = match outcome {
            HandlerOutcome::Success => "success",
            HandlerOutcome::Retryable(_) => "retryable",
            HandlerOutcome::Terminal(_) => "terminal",
        };
        vec![("outcome".to_string(), outcome.to_string())]
    }
}

// ── run() ─────────────────────────────────────────────────────────────────

pub async fn run(config: sbx_core::config::SbxConfig) -> Result<()> {
    info!("sbxd starting reconstruction worker");

    // Prometheus registry
    let mut registry = Registry::default();
    let metrics = WorkerMetrics::new(&mut registry);
    let registry = Arc::new(Mutex::new(registry));

    if let Some(metrics_addr) = config.daemon.metrics_addr.clone() {
        tokio::spawn(metrics_server(metrics_addr, registry.clone()));
    }

    // Credentials enter at the binary edge only.
    let access_key = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("SBX_ACCESS_KEY_ID"))
        .context("S3 credentials not set: export AWS_ACCESS_KEY_ID")?;
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("SBX_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY not set")?;

    let op = sbx_storage::build_operator(&config.storage, &access_key, &secret_key)
        .context("building storage operator")?;
    sbx_storage::check_health(&op)
        .await
        .context("storage health check")?;

    let queue = ManifestQueue::connect(&config.queue).await?;
    queue.ensure_stream().await?;

    let mut reconstructor = Reconstructor::new(op, &config.reconstruct);
    if let Ok(passphrase) = std::env::var("SBX_KEY_PASSPHRASE") {
        reconstructor = reconstructor.with_passphrase(passphrase);
    }
    let reconstructor = Arc::new(reconstructor);

    // Concurrency limit: config.reconstruct.workers, or CPU count
    let concurrency = if config.reconstruct.workers > 0 {
        config.reconstruct.workers
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    };
    info!(concurrency, "worker pool ready");
    let semaphore = Arc::new(Semaphore::new(concurrency));

    // Shutdown signal
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    // Extend the ack deadline at half the ack_wait so a slow reconstruction
    // is not redelivered while still in flight.
    let progress_every = Duration::from_secs((config.queue.ack_wait_secs / 2).max(1));

    let recon_clone = reconstructor.clone();
    let metrics_clone = metrics.clone();
    let sem_clone = semaphore.clone();

    let processor = tokio::spawn(async move {
        let manifest_stream = match queue.manifest_stream().await {
            Ok(s) => s,
            Err(e) => {
                error!("failed to open manifest stream: {e}");
                return;
            }
        };
        tokio::pin!(manifest_stream);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("worker: shutdown signal received, draining...");
                    break;
                }
                Some(msg_result) = manifest_stream.next() => {
                    let msg = match msg_result {
                        Ok(m) => m,
                        Err(e) => {
                            warn!("error reading manifest message: {e}");
                            continue;
                        }
                    };

                    let permit = sem_clone.clone().acquire_owned().await
                        .expect("semaphore closed");
                    let reconstructor = recon_clone.clone();
                    let metrics = metrics_clone.clone();

                    tokio::spawn(async move {
                        let _permit = permit; // released when the task completes
                        reconstruct_one(msg, reconstructor, metrics, progress_every).await;
                    });
                }
            }
        }

        // Drain: wait for all in-flight reconstructions
        let _ = sem_clone.acquire_many(concurrency as u32).await;
        info!("worker: all in-flight reconstructions complete");
    });

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
    let _ = shutdown_tx.send(());
    let _ = processor.await;

    info!("worker exiting cleanly");
    Ok(())
}

// ── Per-delivery processing ───────────────────────────────────────────────

async fn reconstruct_one(
    msg: ManifestMessage,
    reconstructor: Arc<Reconstructor>,
    metrics: WorkerMetrics,
    progress_every: Duration,
) {
    let start = std::time::Instant::now();

    let outcome = {
        let handle = reconstructor.handle(msg.payload());
        tokio::pin!(handle);
        let mut ticker = tokio::time::interval(progress_every);
        ticker.tick().await; // the first tick fires immediately
        loop {
            tokio::select! {
                outcome = &mut handle => break outcome,
                _ = ticker.tick() => {
                    if let Err(e) = msg.in_progress().await {
                        warn!("in-progress ack failed: {e}");
                    }
                }
            }
        }
    };
    let elapsed = start.elapsed().as_secs_f64();

    let labels = WorkerMetrics::outcome_labels(&outcome);
    metrics.reconstructions.get_or_create(&labels).inc();
    metrics.duration.get_or_create(&labels).observe(elapsed);

    settle(msg, outcome).await;
}

// ── Metrics HTTP server ───────────────────────────────────────────────────

async fn metrics_server(addr: String, registry: Arc<Mutex<Registry>>) {
    use axum::{routing::get, Router};

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("metrics server: failed to bind {addr}: {e}");
            return;
        }
    };
    info!("metrics: listening on http://{addr}/metrics");
    let _ = axum::serve(listener, app).await;
}

async fn metrics_handler(State(registry): State<Arc<Mutex<Registry>>>) -> String {
    let mut buf = String::new();
    let guard = registry.lock().expect("registry lock poisoned");
    encode(&mut buf, &guard).unwrap_or_default();
    buf
}
