use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::rate_limiter::RateLimiter;
use crate::rpc::wire::{
    Block, BlockProduction, BlockProductionError, BlockProductionRange, ClusterNode, EpochInfo,
    JsonRpcRequest, JsonRpcResponse, PerformanceSample, VoteAccounts,
};
use crate::ssl_policy::SslPolicy;

const LATENCY_HISTORY_CAP: usize = 100;

/// Single-endpoint JSON-RPC transport. Owns the HTTP connection-reuse
/// session, a bounded latency ring buffer, and its own rate limiter.
pub struct RpcClient {
    pub endpoint: String,
    http: HttpClient,
    rate_limiter: RateLimiter,
    latencies: Mutex<VecDeque<Duration>>,
    connected: Mutex<bool>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl RpcClient {
    pub fn new(
        endpoint: impl Into<String>,
        ssl_policy: &SslPolicy,
        rate_limiter: RateLimiter,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        let bypass = ssl_policy.should_bypass(&endpoint);

        let builder = HttpClient::builder()
            .connect_timeout(connect_timeout.min(request_timeout / 2))
            .timeout(request_timeout)
            .danger_accept_invalid_certs(bypass);

        let http = builder
            .build()
            .map_err(|e| GatewayError::Retryable(format!("failed to build http client: {e}")))?;

        Ok(Self {
            endpoint,
            http,
            rate_limiter,
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_HISTORY_CAP)),
            connected: Mutex::new(false),
            connect_timeout,
            request_timeout,
        })
    }

    /// Idempotent. The first successful health probe marks the client open.
    pub async fn connect(&self) -> Result<()> {
        {
            let connected = self.connected.lock().await;
            if *connected {
                return Ok(());
            }
        }
        self.get_health().await?;
        *self.connected.lock().await = true;
        Ok(())
    }

    /// Idempotent; safe to call from a finalizer context.
    pub async fn close(&self) {
        let mut connected = self.connected.lock().await;
        *connected = false;
    }

    async fn record_latency(&self, latency: Duration) {
        let mut history = self.latencies.lock().await;
        if history.len() == LATENCY_HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(latency);
    }

    pub async fn average_latency(&self) -> Duration {
        let history = self.latencies.lock().await;
        if history.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = history.iter().sum();
        total / history.len() as u32
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// The sole call site to an upstream endpoint. Translates transport
    /// and JSON-RPC failures into `GatewayError` per SPEC_FULL §4.3.
    pub async fn rpc(&self, method: &str, params: Value, timeout: Option<Duration>) -> Result<Value> {
        let request = JsonRpcRequest::new(method, params);
        let effective_timeout = timeout.unwrap_or(self.request_timeout);
        let started = Instant::now();

        let send_result = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .timeout(effective_timeout)
            .send()
            .await;

        let latency = started.elapsed();
        self.record_latency(latency).await;

        let response = match send_result {
            Ok(resp) => resp,
            Err(e) => {
                let rate_limited = false;
                self.rate_limiter.update(false, rate_limited).await;
                if e.is_timeout() {
                    return Err(GatewayError::Retryable(format!("{method} timed out: {e}")));
                }
                return Err(GatewayError::Retryable(format!("{method} transport error: {e}")));
            }
        };

        if response.status().as_u16() == 429 {
            self.rate_limiter.update(false, true).await;
            return Err(GatewayError::RateLimit(format!("{method} returned HTTP 429")));
        }
        if response.status().is_server_error() || response.status().is_client_error() {
            self.rate_limiter.update(false, false).await;
            return Err(GatewayError::Retryable(format!(
                "{method} returned HTTP {}",
                response.status()
            )));
        }

        let body: std::result::Result<JsonRpcResponse, _> = response.json().await;
        let body = match body {
            Ok(b) => b,
            Err(e) => {
                self.rate_limiter.update(false, false).await;
                return Err(GatewayError::Retryable(format!(
                    "{method} JSON parse failure: {e}"
                )));
            }
        };

        if let Some(error) = body.error {
            let result = classify_rpc_error(method, &error.code, &error.message);
            let rate_limited = result.is_rate_limit();
            self.rate_limiter.update(false, rate_limited).await;
            return Err(result);
        }

        self.rate_limiter.update(true, false).await;
        Ok(body.result.unwrap_or(Value::Null))
    }

    pub async fn get_health(&self) -> Result<Value> {
        self.rpc("getHealth", json!([]), Some(self.connect_timeout.max(Duration::from_secs(5))))
            .await
    }

    pub async fn get_version(&self) -> Result<Value> {
        self.rpc("getVersion", json!([]), None).await
    }

    pub async fn get_slot(&self) -> Result<u64> {
        let value = self.rpc("getSlot", json!([]), None).await?;
        value
            .as_u64()
            .ok_or_else(|| GatewayError::Retryable("getSlot returned non-numeric result".into()))
    }

    /// Always sets `maxSupportedTransactionVersion=0` and defaults
    /// `encoding=json`, `transactionDetails=full` per §4.3.
    pub async fn get_block(&self, slot: u64, options: Value) -> Result<Block> {
        let mut opts = json!({
            "encoding": "json",
            "transactionDetails": "full",
            "rewards": false,
            "maxSupportedTransactionVersion": 0
        });
        if let Value::Object(overrides) = options {
            if let Value::Object(base) = &mut opts {
                for (k, v) in overrides {
                    base.insert(k, v);
                }
            }
        }
        let value = self
            .rpc("getBlock", json!([slot, opts]), Some(Duration::from_secs(30)))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Retryable(format!("getBlock decode failure: {e}")))
    }

    pub async fn get_block_height(&self) -> Result<u64> {
        let value = self.rpc("getBlockHeight", json!([]), None).await?;
        value
            .as_u64()
            .ok_or_else(|| GatewayError::Retryable("getBlockHeight returned non-numeric".into()))
    }

    pub async fn get_epoch_info(&self) -> Result<EpochInfo> {
        let value = self.rpc("getEpochInfo", json!([]), None).await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Retryable(format!("getEpochInfo decode failure: {e}")))
    }

    pub async fn get_vote_accounts(&self) -> Result<VoteAccounts> {
        let value = self.rpc("getVoteAccounts", json!([]), None).await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Retryable(format!("getVoteAccounts decode failure: {e}")))
    }

    pub async fn get_validator_info(&self) -> Result<Value> {
        self.rpc("getValidatorInfo", json!([]), None).await
    }

    /// Wraps a `MethodNotSupported` failure into a structured empty
    /// payload rather than propagating it, per §4.3.
    pub async fn get_block_production(&self, timeout: Option<Duration>) -> Result<BlockProduction> {
        match self.rpc("getBlockProduction", json!([]), timeout).await {
            Ok(value) => serde_json::from_value(value)
                .map_err(|e| GatewayError::Retryable(format!("getBlockProduction decode: {e}"))),
            Err(GatewayError::MethodNotSupported(_)) => Ok(BlockProduction {
                by_identity: Default::default(),
                range: BlockProductionRange::default(),
                error: Some(BlockProductionError {
                    code: -32601,
                    message: "Method not supported by this endpoint".to_string(),
                }),
            }),
            Err(e) => Err(e),
        }
    }

    pub async fn get_recent_performance_samples(
        &self,
        limit: u32,
        timeout: Option<Duration>,
    ) -> Result<Vec<PerformanceSample>> {
        let value = self
            .rpc("getRecentPerformanceSamples", json!([limit]), timeout)
            .await?;
        serde_json::from_value(value).map_err(|e| {
            GatewayError::Retryable(format!("getRecentPerformanceSamples decode: {e}"))
        })
    }

    pub async fn get_cluster_nodes(&self, timeout: Option<Duration>) -> Result<Vec<ClusterNode>> {
        let value = self.rpc("getClusterNodes", json!([]), timeout).await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Retryable(format!("getClusterNodes decode: {e}")))
    }

    pub async fn get_signatures_for_address(&self, address: &str, limit: u32) -> Result<Value> {
        self.rpc(
            "getSignaturesForAddress",
            json!([address, {"limit": limit}]),
            None,
        )
        .await
    }

    pub async fn get_transaction(&self, signature: &str) -> Result<Value> {
        self.rpc(
            "getTransaction",
            json!([signature, {"encoding": "json", "maxSupportedTransactionVersion": 0}]),
            None,
        )
        .await
    }

    pub async fn get_account_info(&self, address: &str) -> Result<Value> {
        self.rpc(
            "getAccountInfo",
            json!([address, {"encoding": "base64"}]),
            None,
        )
        .await
    }

    pub async fn get_latest_blockhash(&self) -> Result<Value> {
        self.rpc("getLatestBlockhash", json!([]), None).await
    }

    pub async fn get_recent_blockhash(&self) -> Result<Value> {
        self.rpc("getRecentBlockhash", json!([]), None).await
    }

    pub async fn simulate_transaction(&self, transaction: &str) -> Result<Value> {
        self.rpc(
            "simulateTransaction",
            json!([transaction, {"encoding": "base64"}]),
            None,
        )
        .await
    }
}

/// Shared ownership handle, used by the pool and by components that
/// outlive a single call.
pub type SharedRpcClient = Arc<RpcClient>;

fn classify_rpc_error(method: &str, code: &i64, message: &str) -> GatewayError {
    let lower = message.to_lowercase();

    if *code == -32005 || lower.contains("rate limit") {
        return GatewayError::RateLimit(message.to_string());
    }
    if *code == -32601 || lower.contains("method not found") {
        return GatewayError::MethodNotSupported(message.to_string());
    }
    if matches!(code, -32603 | -32002) || lower.contains("internal error") {
        return GatewayError::Retryable(message.to_string());
    }
    if method == "getBlock" && (lower.contains("slot skipped") || lower.contains("block not available")) {
        return GatewayError::SlotSkipped(message.to_string());
    }

    debug!("unclassified RPC error for {method}: {code} {message}");
    GatewayError::RpcError {
        code: *code,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_by_code() {
        let e = classify_rpc_error("getSlot", &-32005, "too fast");
        assert!(matches!(e, GatewayError::RateLimit(_)));
    }

    #[test]
    fn classifies_rate_limit_by_message() {
        let e = classify_rpc_error("getSlot", &1, "Rate limit exceeded");
        assert!(matches!(e, GatewayError::RateLimit(_)));
    }

    #[test]
    fn classifies_method_not_supported() {
        let e = classify_rpc_error("getBlockProduction", &-32601, "Method not found");
        assert!(matches!(e, GatewayError::MethodNotSupported(_)));
    }

    #[test]
    fn classifies_slot_skipped_only_for_get_block() {
        let e = classify_rpc_error("getBlock", &1, "Slot skipped, or missing due to ledger jump to recent snapshot");
        assert!(matches!(e, GatewayError::SlotSkipped(_)));
        let not_block = classify_rpc_error("getTransaction", &1, "slot skipped");
        assert!(matches!(not_block, GatewayError::RpcError { .. }));
    }

    #[test]
    fn classifies_internal_error_as_retryable() {
        let e = classify_rpc_error("getBlock", &-32603, "Internal error");
        assert!(matches!(e, GatewayError::Retryable(_)));
    }

    #[test]
    fn unmatched_error_is_terminal_rpc_error() {
        let e = classify_rpc_error("getSlot", &-1, "something else entirely");
        assert!(matches!(e, GatewayError::RpcError { code: -1, .. }));
        assert!(!e.is_retryable());
    }
}
