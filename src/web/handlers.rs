use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::GatewayError;

use crate::config::CacheKind;
use crate::query;
use crate::query::network_status::{version_distribution, Distribution};
use crate::query::NetworkStatus;
use crate::rpc::wire::{BlockProduction, ClusterNode, PerformanceSample};
use crate::scan::{self, ScanResult};

use super::models::{
    GatewayResponse, MintExtractParams, MintNewParams, NetworkStatusParams, PerformanceParams,
    RpcNodesParams,
};
use super::state::AppState;

fn cache_key(kind: CacheKind) -> &'static str {
    match kind {
        CacheKind::NetworkStatus => "NETWORK_STATUS",
        CacheKind::RpcNodes => "RPC_NODES",
        CacheKind::PerformanceMetrics => "PERFORMANCE_METRICS",
        CacheKind::LatestTokens => "LATEST_TOKENS",
        _ => "DEFAULT",
    }
}

/// Condensed projection of `NetworkStatus` returned when `summary_only=true`:
/// just the counts and headline status, without the distribution tables.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NetworkStatusSummary {
    pub node_count: usize,
    pub active_nodes: usize,
    pub delinquent_nodes: usize,
    pub average_tps: f64,
    pub status: String,
}

impl From<&NetworkStatus> for NetworkStatusSummary {
    fn from(status: &NetworkStatus) -> Self {
        Self {
            node_count: status.node_count,
            active_nodes: status.active_nodes,
            delinquent_nodes: status.delinquent_nodes,
            average_tps: status.average_tps,
            status: status.status.clone(),
        }
    }
}

/// Returns composed cluster-health, stake-distribution, and TPS data,
/// serving from the response cache when the entry is within its TTL, or
/// recomputing unconditionally when `refresh=true`. `summary_only=true`
/// trims the distribution tables out of the payload (spec §4.6.6, §6).
#[utoipa::path(
    get,
    path = "/solana/network/status",
    tag = "Network",
    params(NetworkStatusParams),
    responses((status = 200, description = "Network status", body = GatewayResponse<NetworkStatus>))
)]
pub async fn network_status(
    State(state): State<AppState>,
    Query(params): Query<NetworkStatusParams>,
) -> Json<GatewayResponse<serde_json::Value>> {
    let kind = CacheKind::NetworkStatus;
    if !params.refresh {
        if let Ok(Some(cached)) = state.cache.get(cache_key(kind), "{}", kind.ttl_seconds()).await {
            if let Ok(status) = serde_json::from_value::<NetworkStatus>(cached) {
                return Json(GatewayResponse::success(render_network_status(&status, params.summary_only)));
            }
        }
    }

    let status = query::get_network_status(&state.pool).await;
    if let Ok(payload) = serde_json::to_value(&status) {
        let _ = state.cache.put(cache_key(kind), &payload, "{}", kind.ttl_seconds()).await;
        let _ = state.cache.append_network_status(&payload).await;
    }

    let rendered = render_network_status(&status, params.summary_only);
    if status.errors.is_empty() {
        Json(GatewayResponse::success(rendered))
    } else {
        let errors = status.errors.clone();
        Json(GatewayResponse::warning(rendered, errors))
    }
}

fn render_network_status(status: &NetworkStatus, summary_only: bool) -> serde_json::Value {
    if summary_only {
        serde_json::to_value(NetworkStatusSummary::from(status)).unwrap_or(serde_json::Value::Null)
    } else {
        serde_json::to_value(status).unwrap_or(serde_json::Value::Null)
    }
}

/// `{status, total_rpc_nodes, version_distribution[top5], execution_time_ms,
/// rpc_nodes?[], errors?[]}` per spec §6.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RpcNodesResponse {
    pub status: String,
    pub total_rpc_nodes: usize,
    pub version_distribution: HashMap<String, Distribution>,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_nodes: Option<Vec<ClusterNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

/// Returns the current cluster topology via the fan-out discovery path
/// (spec §4.6.3, §6). `include_details`/`include_all` attach the raw node
/// list; `health_check` additionally probes every pool upstream endpoint
/// (not the discovered cluster nodes themselves) and folds any
/// `NodeBehind`/`NodeUnhealthy` failures into `errors[]`; `refresh` bypasses
/// the response cache.
#[utoipa::path(
    get,
    path = "/solana/network/rpc-nodes",
    tag = "Network",
    params(RpcNodesParams),
    responses((status = 200, description = "Cluster nodes", body = GatewayResponse<RpcNodesResponse>))
)]
pub async fn rpc_nodes(
    State(state): State<AppState>,
    Query(params): Query<RpcNodesParams>,
) -> Json<GatewayResponse<RpcNodesResponse>> {
    let started = std::time::Instant::now();
    let kind = CacheKind::RpcNodes;

    let nodes = if !params.refresh {
        match state.cache.get(cache_key(kind), "{}", kind.ttl_seconds()).await {
            Ok(Some(cached)) => match serde_json::from_value::<Vec<ClusterNode>>(cached) {
                Ok(nodes) => Some(nodes),
                Err(_) => None,
            },
            _ => None,
        }
    } else {
        None
    };
    let nodes = match nodes {
        Some(nodes) => nodes,
        None => {
            let nodes = query::get_cluster_nodes(&state.pool).await;
            if let Ok(payload) = serde_json::to_value(&nodes) {
                let _ = state.cache.put(cache_key(kind), &payload, "{}", kind.ttl_seconds()).await;
                let _ = state.cache.append_rpc_nodes(&payload).await;
            }
            nodes
        }
    };

    let mut errors = Vec::new();
    if nodes.is_empty() {
        errors.push("cluster node discovery returned no nodes".to_string());
    }

    if params.health_check {
        let endpoints: Vec<String> =
            state.pool.get_filtered_rpc_stats().await.into_iter().map(|s| s.endpoint).collect();
        for endpoint in endpoints {
            if let Err(e) = state.pool.check_endpoint_health(&endpoint).await {
                errors.push(e.to_string());
            }
        }
    }

    let response = RpcNodesResponse {
        status: if nodes.is_empty() { "error".to_string() } else if errors.is_empty() { "ok".to_string() } else { "degraded".to_string() },
        total_rpc_nodes: nodes.len(),
        version_distribution: top_n(version_distribution(&nodes), 5),
        execution_time_ms: started.elapsed().as_millis() as u64,
        rpc_nodes: (params.include_details || params.include_all).then_some(nodes),
        errors: (!errors.is_empty()).then_some(errors.clone()),
    };

    if errors.is_empty() {
        Json(GatewayResponse::success(response))
    } else {
        Json(GatewayResponse::warning(response, errors))
    }
}

/// Keeps the `n` highest-count entries, the "top5" projection named in §6.
fn top_n(distribution: HashMap<String, Distribution>, n: usize) -> HashMap<String, Distribution> {
    let mut entries: Vec<(String, Distribution)> = distribution.into_iter().collect();
    entries.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(&b.0)));
    entries.into_iter().take(n).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PerformanceMetricsResponse {
    pub performance_samples: Vec<PerformanceSample>,
    pub block_production: BlockProduction,
    pub average_tps: f64,
    pub status_message: Option<String>,
}

/// Returns recent performance samples and per-validator block production,
/// synthesizing a sample if no endpoint supports `getRecentPerformanceSamples`
/// (spec §4.6.4, §4.6.5, §6).
#[utoipa::path(
    get,
    path = "/solana/performance/metrics",
    tag = "Performance",
    params(PerformanceParams),
    responses((status = 200, description = "Performance metrics", body = GatewayResponse<PerformanceMetricsResponse>))
)]
pub async fn performance_metrics(
    State(state): State<AppState>,
    Query(params): Query<PerformanceParams>,
) -> Json<GatewayResponse<PerformanceMetricsResponse>> {
    let kind = CacheKind::PerformanceMetrics;
    if !params.refresh {
        if let Ok(Some(cached)) = state.cache.get(cache_key(kind), "{}", kind.ttl_seconds()).await {
            if let Ok(metrics) = serde_json::from_value::<PerformanceMetricsResponse>(cached) {
                return Json(GatewayResponse::success(metrics));
            }
        }
    }

    let samples = query::get_recent_performance(&state.pool).await;
    let block_production = query::get_block_production(&state.pool).await;
    let average_tps = if samples.is_empty() {
        0.0
    } else {
        samples.iter().map(|s| s.num_transactions as f64 / s.sample_period_secs.max(1) as f64).sum::<f64>()
            / samples.len() as f64
    };
    let status_message = samples
        .iter()
        .find(|s| s.synthetic)
        .and_then(|s| s.error.clone());

    let metrics = PerformanceMetricsResponse { performance_samples: samples, block_production, average_tps, status_message };

    if let Ok(payload) = serde_json::to_value(&metrics) {
        let _ = state.cache.put(cache_key(kind), &payload, "{}", kind.ttl_seconds()).await;
        let _ = state.cache.append_performance_metrics(&payload).await;
    }

    Json(GatewayResponse::success(metrics))
}

/// Walks up to `limit` recent blocks through the Mint Extractor and
/// returns the aggregated scan (spec §4.8, §6).
#[utoipa::path(
    get,
    path = "/mints/extract",
    tag = "Mints",
    params(MintExtractParams),
    responses((status = 200, description = "Mint extraction scan", body = GatewayResponse<ScanResult>))
)]
pub async fn mints_extract(
    State(state): State<AppState>,
    Query(params): Query<MintExtractParams>,
) -> Json<GatewayResponse<ScanResult>> {
    if let Err(e) = params.validate() {
        return Json(GatewayResponse::error(vec![
            GatewayError::ValidationError(e.to_string()).to_string()
        ]));
    }

    match scan::extract_mints(&state.pool, params.limit).await {
        Ok(result) => {
            if let Ok(payload) = serde_json::to_value(&result) {
                let _ = state.cache.append_mint_analytics(&payload, result.summary.blocks_scanned).await;
            }
            if result.summary.error_blocks > 0 && result.blocks.is_empty() {
                Json(GatewayResponse::error(vec![format!(
                    "all {} requested block(s) failed to decode",
                    result.summary.error_blocks
                )]))
            } else {
                Json(GatewayResponse::success(result))
            }
        }
        Err(e) => Json(GatewayResponse::error(vec![e.to_string()])),
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MintsNewResponse {
    pub blocks_scanned: u32,
    pub new_since_last_scan: Vec<String>,
    pub pump_tokens: Vec<String>,
    pub total_new_since_last_scan: usize,
}

/// Re-runs the Block-Scan Pipeline and diffs its mint set against the most
/// recent `mint_analytics_history` row recorded for the same block-count
/// window, so repeated polling only surfaces genuinely new mints. `min_
/// volume_change`/`min_price_change` have no effect: computing them needs
/// the out-of-scope upstream price/volume feed (spec §1 "OUT OF SCOPE").
#[utoipa::path(
    get,
    path = "/mints/new",
    tag = "Mints",
    params(MintNewParams),
    responses((status = 200, description = "Newly observed mints since the last scan", body = GatewayResponse<MintsNewResponse>))
)]
pub async fn mints_new(
    State(state): State<AppState>,
    Query(params): Query<MintNewParams>,
) -> Json<GatewayResponse<MintsNewResponse>> {
    if let Err(e) = params.validate() {
        return Json(GatewayResponse::error(vec![
            GatewayError::ValidationError(e.to_string()).to_string()
        ]));
    }

    let result = match scan::extract_mints(&state.pool, params.blocks).await {
        Ok(result) => result,
        Err(e) => return Json(GatewayResponse::error(vec![e.to_string()])),
    };

    let previous_mints: std::collections::HashSet<String> = state
        .cache
        .read_history(
            "mint_analytics_history",
            None,
            Some(1),
            Some(("block_count", result.summary.blocks_scanned.to_string())),
        )
        .await
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|row| serde_json::from_value::<ScanResult>(row.data).ok())
        .map(|prev| prev.blocks.iter().flat_map(|b| b.mint_addresses.iter().cloned()).collect())
        .unwrap_or_default();

    let min_transactions = params.min_transactions.unwrap_or(0);
    let mut new_since_last_scan = Vec::new();
    let mut pump_tokens = Vec::new();
    for entry in result.blocks.iter().filter(|b| b.transaction_count >= min_transactions) {
        for mint in &entry.mint_addresses {
            if !previous_mints.contains(mint) && !new_since_last_scan.contains(mint) {
                new_since_last_scan.push(mint.clone());
            }
        }
        for mint in &entry.pump_token_addresses {
            if !pump_tokens.contains(mint) {
                pump_tokens.push(mint.clone());
            }
        }
    }

    if let Ok(payload) = serde_json::to_value(&result) {
        let _ = state.cache.append_mint_analytics(&payload, result.summary.blocks_scanned).await;
    }

    let total_new_since_last_scan = new_since_last_scan.len();
    Json(GatewayResponse::success(MintsNewResponse {
        blocks_scanned: result.summary.blocks_scanned,
        new_since_last_scan,
        pump_tokens,
        total_new_since_last_scan,
    }))
}
