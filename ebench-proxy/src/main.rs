//! ebench-proxy: standalone storage proxy.
//!
//! ```bash
//! # Defaults: listen on 127.0.0.1:50051, batches of 16
//! ebench-proxy
//!
//! # Per-item failures, larger envelopes
//! EBENCH_ALLOW_PARTIAL=true EBENCH_BATCH_SIZE=64 ebench-proxy
//! ```

use ebench_core::ProxyConfig;
use ebench_proxy::{run_server, shutdown, MemoryStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ebench_proxy=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = ProxyConfig::from_env();
    let token = CancellationToken::new();
    let watcher = shutdown::cancel_on_signal(token.clone());

    let result = run_server(config, Arc::new(MemoryStore::new()), token).await;
    watcher.abort();
    result
}
