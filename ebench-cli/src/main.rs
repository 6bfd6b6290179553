use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ebench_amplifier::{
    run_seed_scenario, Amplifier, Connector, HttpConnector, MixedWorkload, OperationMix,
};
use ebench_core::{AmplifyConfig, Domain, ProxyConfig, ReadPreference};
use ebench_proxy::{run_server, shutdown, MemoryStore};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ebench")]
#[command(version = "0.1.0")]
#[command(about = "ebench - Storage proxy benchmark for e-commerce workloads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the storage proxy
    Serve {
        #[command(flatten)]
        proxy: ProxyArgs,
    },

    /// Drive load against a running proxy
    Amplify {
        #[command(flatten)]
        proxy: ProxyArgs,

        #[command(flatten)]
        amplify: AmplifyArgs,

        /// Output file for the report (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create a product with two SKUs and read it back
    Scenario {
        #[command(flatten)]
        proxy: ProxyArgs,
    },
}

/// Proxy settings; anything not given falls back to EBENCH_* variables
#[derive(Args, Debug, Default)]
struct ProxyArgs {
    /// Proxy address (host:port or URL)
    #[arg(long)]
    endpoint: Option<String>,

    /// Use TLS for bare host:port endpoints
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    secure: Option<bool>,

    /// Store call timeout in milliseconds
    #[arg(long)]
    rpc_timeout_ms: Option<u64>,

    /// Operations per envelope
    #[arg(long)]
    batch_size: Option<usize>,

    /// Longest wait of a pending operation before its envelope flushes
    #[arg(long)]
    batch_linger_ms: Option<u64>,

    /// Read preference (primary, primaryPreferred, secondary, secondaryPreferred, nearest)
    #[arg(long)]
    read_pref: Option<ReadPreference>,

    /// Report batch items independently
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    allow_partial: Option<bool>,

    /// Bypass batching
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    turbo: Option<bool>,
}

impl ProxyArgs {
    fn into_config(self) -> ProxyConfig {
        self.apply(ProxyConfig::from_env())
    }

    /// Apply the given flags over `config`
    fn apply(self, mut config: ProxyConfig) -> ProxyConfig {
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(secure) = self.secure {
            config.insecure = !secure;
        }
        if let Some(ms) = self.rpc_timeout_ms {
            config.rpc_timeout = Duration::from_millis(ms);
            config.batch_linger = config.rpc_timeout / 10;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(ms) = self.batch_linger_ms {
            config.batch_linger = Duration::from_millis(ms);
        }
        if let Some(pref) = self.read_pref {
            config.read_preference = pref;
        }
        if let Some(allow_partial) = self.allow_partial {
            config.allow_partial = allow_partial;
        }
        if let Some(turbo) = self.turbo {
            config.turbo = turbo;
        }

        config
    }
}

/// Load settings; anything not given falls back to EBENCH_* variables
#[derive(Args, Debug, Default)]
struct AmplifyArgs {
    /// Connection pool size
    #[arg(long)]
    connections: Option<usize>,

    /// Concurrent workers (at most 4 per connection)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Request budget, 0 runs until interrupted
    #[arg(short = 'n', long)]
    total_requests: Option<u64>,

    /// Aggregate request rate, 0 is unthrottled
    #[arg(long)]
    qps: Option<u64>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Runtime worker threads, 0 keeps the default
    #[arg(long)]
    cpus: Option<usize>,

    /// Domains to exercise (comma separated)
    #[arg(long, value_delimiter = ',')]
    domains: Vec<Domain>,

    /// Operation weights as create:read:upsert
    #[arg(long, value_parser = parse_mix, default_value = "2:6:2")]
    mix: OperationMix,

    /// Extra bytes of payload per written document
    #[arg(long, default_value_t = 0)]
    payload_bytes: usize,
}

impl AmplifyArgs {
    fn config(&self) -> AmplifyConfig {
        let mut config = AmplifyConfig::from_env();

        if let Some(n) = self.connections {
            config.connections = n;
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(n) = self.total_requests {
            config.total_requests = n;
        }
        if let Some(n) = self.qps {
            config.target_qps = n;
        }
        if let Some(ms) = self.timeout_ms {
            config.per_request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = self.cpus {
            config.cpu_affinity_hint = n;
        }

        config
    }

    fn workload(&self) -> MixedWorkload {
        MixedWorkload::new(self.domains.clone(), self.mix, self.payload_bytes)
    }
}

fn parse_mix(s: &str) -> Result<OperationMix, String> {
    let parts: Vec<u32> = s
        .split(':')
        .map(|p| p.trim().parse::<u32>().map_err(|e| format!("'{}': {}", p, e)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [create, read, upsert] if create + read + upsert > 0 => {
            Ok(OperationMix { create: *create, read: *read, upsert: *upsert })
        }
        [_, _, _] => Err("at least one weight must be non-zero".to_string()),
        _ => Err("expected create:read:upsert".to_string()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("ebench_proxy=info,ebench_amplifier=info,tower_http=info")
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn runtime(worker_threads: usize) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if worker_threads > 0 {
        builder.worker_threads(worker_threads);
    }
    builder.build()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let worker_threads = match &cli.command {
        Commands::Amplify { amplify, .. } => amplify.config().cpu_affinity_hint,
        _ => AmplifyConfig::from_env().cpu_affinity_hint,
    };
    let runtime = runtime(worker_threads).context("Failed to build tokio runtime")?;

    runtime.block_on(run(cli.command))
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    let watcher = shutdown::cancel_on_signal(token.clone());

    let result = match command {
        Commands::Serve { proxy } => {
            run_server(proxy.into_config(), Arc::new(MemoryStore::new()), token).await
        }
        Commands::Amplify { proxy, amplify, output } => {
            amplify_cmd(proxy.into_config(), amplify, output, token).await
        }
        Commands::Scenario { proxy } => scenario_cmd(proxy.into_config()).await,
    };

    watcher.abort();
    result
}

async fn amplify_cmd(
    proxy: ProxyConfig,
    args: AmplifyArgs,
    output: Option<PathBuf>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let config = args.config().validated().context("Invalid amplifier configuration")?;
    let connector = HttpConnector::resolve(&proxy)
        .await
        .context("Cannot reach the proxy endpoint")?;

    info!(endpoint = %connector.base_url(), "Amplifying");
    let workload = Arc::new(args.workload());
    let amplifier = Amplifier::new(config, connector, workload)?.with_cancellation(token);
    let report = amplifier.run().await?;

    report.print();

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

async fn scenario_cmd(proxy: ProxyConfig) -> anyhow::Result<()> {
    let connector = HttpConnector::resolve(&proxy)
        .await
        .context("Cannot reach the proxy endpoint")?;
    let mut connection = connector.connect(0).await?;

    let report = run_seed_scenario(&mut connection).await;
    for step in &report.steps {
        println!("  {:<24} {}", step.name, step.result.status);
    }
    if let Some(product) = report.fetched_product() {
        println!("{}", serde_json::to_string_pretty(product)?);
    }
    report.ensure_ok()?;

    Ok(())
}
