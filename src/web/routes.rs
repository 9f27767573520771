use axum::routing::get;
use axum::Router;

use super::handlers::{mints_extract, mints_new, network_status, performance_metrics, rpc_nodes};
use super::state::AppState;

/// Read-only JSON surface (spec §6): network health, cluster topology,
/// performance metrics, and the two mint-scan endpoints.
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .route("/solana/network/status", get(network_status))
        .route("/solana/network/rpc-nodes", get(rpc_nodes))
        .route("/solana/performance/metrics", get(performance_metrics))
        .route("/mints/extract", get(mints_extract))
        .route("/mints/new", get(mints_new))
}

pub fn create_health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "ok"
}
