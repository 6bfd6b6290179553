//! ebench storage proxy.
//!
//! Serves the product, sku, order, payment and user RPCs over HTTP/JSON
//! and funnels every call through one shared [`BatchCoordinator`] that
//! groups operations into envelopes for the document store.
//!
//! The proxy can run standalone (`ebench-proxy`) or embedded in the
//! `ebench` CLI.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use ebench_core::{ProxyConfig, MAX_RECV_MESSAGE_BYTES};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub mod batcher;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod shutdown;
pub mod state;
pub mod store;

pub use batcher::{BatchCoordinator, BatcherConfig};
pub use error::ProxyError;
pub use state::AppState;
pub use store::{DocumentStore, MemoryStore};

/// Initialize Prometheus metrics registry.
/// Should be called once before starting the server.
pub fn init_metrics() {
    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register Prometheus metrics: {}", e);
    }
}

/// Build the router with every RPC and health route.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(routes::health))
        .route("/ready", get(routes::ready))
        .route("/live", get(routes::live))
        .route("/metrics", get(routes::metrics))
        .route("/metrics/prometheus", get(routes::metrics_prometheus))
        // Domain services
        .route("/v1/:domain", post(routes::create).put(routes::upsert))
        .route("/v1/:domain/:id", get(routes::get))
        // Middleware
        .layer(DefaultBodyLimit::max(MAX_RECV_MESSAGE_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` is cancelled.
///
/// New connections stop being accepted on cancellation; in-flight requests
/// finish, then the coordinator flushes its open envelope.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = build_router(Arc::clone(&state));
    let signal = shutdown.clone();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await?;

    state.coordinator.shutdown().await;
    info!("Proxy stopped");
    Ok(())
}

/// Run the proxy server.
///
/// Binds `config.endpoint`. An endpoint that does not resolve or a store
/// that does not answer its ping aborts before any work is accepted.
/// Blocks until `shutdown` is cancelled; the coordinator is then drained
/// and stopped by [`serve`].
///
/// # Example
/// ```no_run
/// use ebench_core::ProxyConfig;
/// use ebench_proxy::{run_server, MemoryStore};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ProxyConfig::default();
///     run_server(config, Arc::new(MemoryStore::new()), CancellationToken::new()).await
/// }
/// ```
pub async fn run_server(
    config: ProxyConfig,
    store: Arc<dyn DocumentStore>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let config = config.validated()?;
    init_metrics();

    let addr = tokio::net::lookup_host(config.endpoint.as_str())
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("endpoint '{}' did not resolve", config.endpoint))?;

    info!(
        endpoint = %config.endpoint,
        batch_size = config.batch_size,
        turbo = config.turbo,
        allow_partial = config.allow_partial,
        read_preference = %config.read_preference,
        "Starting ebench proxy v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = store.ping().await {
        metrics::set_store_healthy(false);
        anyhow::bail!("document store not reachable: {}", e);
    }
    metrics::set_store_healthy(true);
    info!("Document store reachable");

    // The coordinator outlives the accept loop so in-flight requests can
    // still flush; `serve` shuts it down afterwards.
    let state = Arc::new(AppState::new(config, store));
    let listener = TcpListener::bind(addr).await?;
    info!("ebench proxy listening on http://{}", listener.local_addr()?);

    serve(listener, state, shutdown).await
}
