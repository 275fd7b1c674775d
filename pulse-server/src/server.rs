//! Service wiring: builds the pipeline, serves HTTP, and shuts down in order.
//!
//! Shutdown sequence: stop accepting HTTP requests, then signal the
//! dispatcher, which drains admitted samples before exiting.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use pulse_engine::Analyzer;

use crate::api::{router, AppState};
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::metrics::Metrics;
use crate::sink::{probe_store, NullSink, SampleSink, StoreSink};

/// Runs the service on a freshly bound listener until `shutdown` resolves.
pub async fn run<F>(config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    serve(listener, config, shutdown).await
}

/// Runs the service on an existing listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let config = config.normalized();
    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let analyzer = Arc::new(Analyzer::new(config.window_size));
    let store = build_store(&config).await;

    let (ingest, dispatcher) = Dispatcher::new(
        config.queue_size,
        Arc::clone(&analyzer),
        metrics.clone(),
        store,
    );
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let consumer = dispatcher.spawn(async move {
        let _ = stop_rx.await;
    });
    let queue_capacity = ingest.capacity();

    let app = router(AppState {
        analyzer: Arc::clone(&analyzer),
        ingest,
        metrics: Arc::clone(&metrics),
    });

    let local_addr = listener.local_addr().context("listener has no local address")?;
    info!(
        addr = %local_addr,
        window_size = analyzer.capacity(),
        queue_size = queue_capacity,
        "pulse server listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed");

    info!("HTTP server stopped, draining ingest queue");
    let _ = stop_tx.send(());
    match consumer.await {
        Ok(processed) => {
            let totals = metrics.snapshot();
            info!(
                processed,
                processed_total = totals.processed_total,
                anomalies_total = totals.anomalies_total,
                retained = analyzer.len(),
                "dispatcher stopped"
            );
        }
        Err(err) => warn!(error = %err, "dispatcher task failed"),
    }

    served
}

async fn build_store(config: &ServerConfig) -> Arc<dyn SampleSink> {
    let Some(addr) = config.store_addr.as_deref() else {
        info!("persistence disabled");
        return Arc::new(NullSink);
    };

    probe_store(addr, config.probe_timeout).await;
    match StoreSink::new(addr, config.store_timeout) {
        Ok(sink) => Arc::new(sink),
        Err(err) => {
            warn!(addr, error = %err, "invalid store address, persistence disabled");
            Arc::new(NullSink)
        }
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
