use clap::Parser;
use tracing::info;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    prelude::*,
};

use solana_gateway::cache::Cache;
use solana_gateway::pool::Pool;
use solana_gateway::web;
use solana_gateway::Config;

/// Initialize logging with functional configuration
fn initialize_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .init();
}

#[tokio::main]
async fn main() {
    initialize_logging();

    let config = Config::parse();

    let pool = Pool::initialize(config.clone())
        .await
        .expect("failed to initialize RPC client pool");
    let cache = Cache::open(config.cache_db_path.clone())
        .await
        .expect("failed to open response cache");

    info!(
        endpoints = ?config.resolve_endpoints(),
        host = %config.http_host,
        port = config.http_port,
        "starting Solana RPC gateway"
    );

    let server = web::create_web_server(pool, cache, &config);
    if let Err(e) = server.start_with_shutdown().await {
        tracing::error!("web server exited with error: {e}");
        std::process::exit(1);
    }
}
