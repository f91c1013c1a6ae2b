//! reverser: dynamic reverse proxy. Targets registered at runtime under an
//! identifier are reachable at `/proxy/<identifier>/...`.

mod config;
mod error;
mod proxy;
mod registry;
mod server;
mod stats;

use std::time::Duration;

use config::ProxyConfig;
use registry::Registry;
use server::AppState;

fn main() -> anyhow::Result<()> {
    // Determine config path
    let config_path = {
        let args: Vec<String> = std::env::args().collect();
        args.iter()
            .position(|a| a == "--config")
            .and_then(|i| args.get(i + 1).cloned())
            .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
            .or_else(|| std::env::var("REVERSER_CONFIG").ok())
            .unwrap_or_else(|| "reverser.toml".to_string())
    };

    let config = ProxyConfig::load(&config_path)?;

    // The tonic gRPC exporter needs a reactor context, so build the runtime first.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = reverser_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            otlp_export = tracing_guard.exporting(),
            listen_address = %config.server.listen_address,
            seeded_targets = config.targets.len(),
            "Starting reverser"
        );

        run(config).await
    })
}

async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    // Redirects are relayed to the caller, never followed here.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.timeout_secs))
        .connect_timeout(Duration::from_secs(config.upstream.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let registry = Registry::new();
    config.seed(&registry)?;
    if registry.is_empty() {
        tracing::info!("No targets seeded, register them with POST /api/targets");
    }

    let state = AppState::new(registry, client, config.upstream.max_request_body_bytes);

    server::run(state, &config.server.listen_address).await
}
