//! Gateway binary
//!
//! Reads configuration from the environment, assembles the component graph,
//! and serves the REST edge until interrupted.

use anyhow::Context;
use clap::Parser;
use loom_gateway::config::GatewayConfig;
use loom_gateway::worker::WorkerResolver;
use loom_gateway::Gateway;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loom-gateway", version, about = "Run-orchestration gateway")]
struct Args {
    /// Listen port; overrides the PORT environment variable
    #[arg(long)]
    port: Option<u16>,

    /// Log filter, e.g. "info" or "loom_gateway=debug"
    #[arg(long, env = "LOOM_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = GatewayConfig::from_env().context("configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // Worker implementations are registered here; the core ships none.
    let resolver = WorkerResolver::new();

    let gateway = Gateway::build(config, resolver).context("gateway assembly")?;
    let state = gateway.app_state();
    let app = loom_gateway::api::rest::router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], gateway.config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server")?;

    gateway.shutdown().await.context("shutdown")?;
    Ok(())
}
