pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::IndexedRandom;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use crate::config::{Config, RateLimiterConfig};
use crate::error::{GatewayError, Result};
use crate::rate_limiter::RateLimiter;
use crate::rpc::{RpcClient, SharedRpcClient};
use crate::ssl_policy::SslPolicy;
use stats::EndpointStats;

const MIN_ATTEMPTS_FOR_SUCCESS_RATE_FILTER: u64 = 10;
const MIN_SUCCESS_RATE: f64 = 0.5;

struct PoolState {
    clients: HashMap<String, SharedRpcClient>,
    failures: HashMap<String, u32>,
    endpoint_stats: HashMap<String, EndpointStats>,
    rate_limited_until: HashMap<String, Instant>,
    current_index: usize,
}

impl PoolState {
    fn new() -> Self {
        Self {
            clients: HashMap::new(),
            failures: HashMap::new(),
            endpoint_stats: HashMap::new(),
            rate_limited_until: HashMap::new(),
            current_index: 0,
        }
    }
}

struct PoolInner {
    config: Config,
    ssl_policy: SslPolicy,
    state: Mutex<PoolState>,
}

/// Registry of clients keyed by endpoint URL, with performance scoring,
/// acquire/release with failure tracking, rotation and statistics (spec §4.4).
#[derive(Clone)]
pub struct Pool(Arc<PoolInner>);

/// Snapshot of one endpoint's statistics, safe to serialize into HTTP responses.
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub endpoint: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub rate_limited_count: u64,
    pub avg_latency_ms: f64,
    pub current_failures: u32,
    pub healthy: bool,
}

/// RAII handle returned by [`Pool::acquire`]. The caller marks the
/// outcome before the guard is dropped; if dropped unmarked (e.g. the
/// holding task was cancelled), the pool is released with `success=false`
/// so a cancelled call never leaks an "in use" client.
pub struct AcquiredClient {
    pool: Pool,
    endpoint: String,
    client: SharedRpcClient,
    acquired_at: Instant,
    outcome: Outcome,
    released: bool,
}

#[derive(Clone, Copy)]
enum Outcome {
    Pending,
    Success,
    Failure,
    RateLimited,
}

impl AcquiredClient {
    pub fn client(&self) -> &SharedRpcClient {
        &self.client
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn mark_success(&mut self) {
        self.outcome = Outcome::Success;
    }

    pub fn mark_failure(&mut self) {
        self.outcome = Outcome::Failure;
    }

    pub fn mark_rate_limited(&mut self) {
        self.outcome = Outcome::RateLimited;
    }

    /// Explicit release. Preferred over relying on `Drop` so the release
    /// can be awaited rather than fired into a detached task.
    pub async fn release(mut self) {
        self.do_release().await;
    }

    async fn do_release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let (success, rate_limited) = match self.outcome {
            Outcome::Pending | Outcome::Failure => (false, false),
            Outcome::Success => (true, false),
            Outcome::RateLimited => (false, true),
        };
        let latency = self.acquired_at.elapsed();
        self.pool
            .release(&self.endpoint, success, latency, rate_limited)
            .await;
    }
}

impl Drop for AcquiredClient {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let pool = self.pool.clone();
        let endpoint = self.endpoint.clone();
        let latency = self.acquired_at.elapsed();
        let (success, rate_limited) = match self.outcome {
            Outcome::Pending | Outcome::Failure => (false, false),
            Outcome::Success => (true, false),
            Outcome::RateLimited => (false, true),
        };
        tokio::spawn(async move {
            pool.release(&endpoint, success, latency, rate_limited).await;
        });
    }
}

impl Pool {
    /// Deduplicates, filters to well-formed `http(s)://` URLs, connects up
    /// to `config.pool_size` clients, and fails if zero connect.
    pub async fn initialize(config: Config) -> Result<Self> {
        let ssl_policy = SslPolicy::new();
        let inner = Arc::new(PoolInner {
            config: config.clone(),
            ssl_policy,
            state: Mutex::new(PoolState::new()),
        });
        let pool = Pool(inner);

        let mut seen = std::collections::HashSet::new();
        let candidates: Vec<String> = config
            .resolve_endpoints()
            .into_iter()
            .filter(|e| Url::parse(e).map(|u| matches!(u.scheme(), "http" | "https")).unwrap_or(false))
            .filter(|e| seen.insert(e.clone()))
            .collect();

        let mut connected = 0usize;
        for endpoint in candidates {
            if connected >= config.pool_size {
                break;
            }
            match pool.connect_new_client(&endpoint).await {
                Ok(()) => connected += 1,
                Err(e) => warn!("failed to connect to {endpoint}: {e}"),
            }
        }

        if connected == 0 {
            return Err(GatewayError::NoClientsAvailable(
                "no endpoints connected during pool initialization".to_string(),
            ));
        }

        info!("pool initialized with {connected} client(s)");
        Ok(pool)
    }

    async fn connect_new_client(&self, endpoint: &str) -> Result<()> {
        let client = Arc::new(RpcClient::new(
            endpoint,
            &self.0.ssl_policy,
            RateLimiter::new(self.0.config.rate_limiter.clone()),
            self.0.config.connect_timeout(),
            self.0.config.request_timeout(),
        )?);
        client.connect().await?;

        let mut state = self.0.state.lock().await;
        state.clients.insert(endpoint.to_string(), client);
        state.failures.insert(endpoint.to_string(), 0);
        state.endpoint_stats.entry(endpoint.to_string()).or_default();
        Ok(())
    }

    pub fn ssl_policy(&self) -> &SslPolicy {
        &self.0.ssl_policy
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Acquires a client per the default selection policy and returns an
    /// RAII guard. The caller marks the outcome and releases (or lets the
    /// guard's `Drop` release with `success=false`).
    pub async fn acquire(&self) -> Result<AcquiredClient> {
        let (endpoint, client) = self.get_client().await?;
        Ok(AcquiredClient {
            pool: self.clone(),
            endpoint,
            client,
            acquired_at: Instant::now(),
            outcome: Outcome::Pending,
            released: false,
        })
    }

    /// Default selection policy (spec §4.4 `get_client`).
    pub async fn get_client(&self) -> Result<(String, SharedRpcClient)> {
        let mut state = self.0.state.lock().await;
        let now = Instant::now();
        let max_consecutive_failures = self.0.config.max_consecutive_failures;

        let mut eligible: Vec<String> = state
            .clients
            .keys()
            .filter(|url| {
                let cooldown_ok = state
                    .rate_limited_until
                    .get(*url)
                    .map(|until| *until <= now)
                    .unwrap_or(true);
                let failures_ok = state
                    .failures
                    .get(*url)
                    .map(|f| *f < max_consecutive_failures)
                    .unwrap_or(true);
                let success_rate_ok = state
                    .endpoint_stats
                    .get(*url)
                    .map(|s| s.total_attempts() < MIN_ATTEMPTS_FOR_SUCCESS_RATE_FILTER
                        || s.success_rate() >= MIN_SUCCESS_RATE)
                    .unwrap_or(true);
                cooldown_ok && failures_ok && success_rate_ok
            })
            .cloned()
            .collect();

        eligible.sort_by_key(|url| state.failures.get(url).copied().unwrap_or(0));

        let chosen = if eligible.is_empty() {
            // Fall back to any client, breaking the filter.
            state.current_index = (state.current_index + 1) % state.clients.len().max(1);
            state.clients.keys().nth(state.current_index).cloned()
        } else {
            let top_n = eligible.len().min(3);
            eligible[..top_n].choose(&mut rand::rng()).cloned()
        };

        let endpoint = chosen.ok_or_else(|| {
            GatewayError::NoClientsAvailable("pool has no registered clients".to_string())
        })?;
        let client = state
            .clients
            .get(&endpoint)
            .cloned()
            .ok_or_else(|| GatewayError::NoClientsAvailable(endpoint.clone()))?;
        Ok((endpoint, client))
    }

    /// Exact URL match; for Helius-hosted URLs, also matches by host so
    /// differing API-key suffixes are treated as equivalent. Connects and
    /// inserts a fresh client when no match exists.
    pub async fn get_specific_client(&self, url: &str) -> Result<(String, SharedRpcClient)> {
        {
            let state = self.0.state.lock().await;
            if let Some(client) = state.clients.get(url) {
                return Ok((url.to_string(), client.clone()));
            }
            if is_helius_url(url) {
                if let Some((endpoint, client)) = state
                    .clients
                    .iter()
                    .find(|(candidate, _)| is_helius_url(candidate) && same_host(candidate, url))
                {
                    return Ok((endpoint.clone(), client.clone()));
                }
            }
        }

        self.connect_new_client(url).await?;
        let state = self.0.state.lock().await;
        let client = state
            .clients
            .get(url)
            .cloned()
            .ok_or_else(|| GatewayError::NoClientsAvailable(url.to_string()))?;
        Ok((url.to_string(), client))
    }

    /// Records a call outcome: rate-limit quarantine, failure counter,
    /// and endpoint statistics (EMA latency, counters).
    pub async fn release(&self, endpoint: &str, success: bool, latency: Duration, rate_limited: bool) {
        let mut state = self.0.state.lock().await;
        let now = Instant::now();

        if rate_limited {
            let cooldown = now + Duration::from_secs_f64(rand::rng().random_range(30.0..=60.0));
            state.rate_limited_until.insert(endpoint.to_string(), cooldown);
        }

        let failures = state.failures.entry(endpoint.to_string()).or_insert(0);
        if success {
            *failures = 0;
        } else {
            *failures += 1;
            if *failures >= self.0.config.max_consecutive_failures {
                warn!("endpoint {endpoint} crossed max_consecutive_failures ({failures})");
            }
        }

        let entry = state.endpoint_stats.entry(endpoint.to_string()).or_default();
        if success {
            entry.record_success(latency);
        } else {
            entry.record_failure();
        }
        if rate_limited {
            entry.record_rate_limited(now);
        }
    }

    /// Short-lived probe (5s timeout, no retries) via `getHealth`,
    /// distinguishing an explicit slot-lag report (`NodeBehind`) from any
    /// other non-`"ok"` outcome (`NodeUnhealthy`).
    pub async fn check_endpoint_health(&self, url: &str) -> Result<()> {
        let probe = RpcClient::new(
            url,
            &self.0.ssl_policy,
            RateLimiter::new(RateLimiterConfig::default()),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )?;

        let result = probe.get_health().await;
        probe.close().await;

        match result {
            Ok(v) if v.as_str() == Some("ok") => {
                self.release(url, true, Duration::from_millis(1), false).await;
                Ok(())
            }
            Ok(v) => {
                self.release(url, false, Duration::from_millis(1), false).await;
                Err(GatewayError::NodeUnhealthy(format!("{url} reported {v}")))
            }
            Err(GatewayError::RateLimit(msg)) => {
                self.release(url, false, Duration::from_millis(1), true).await;
                Err(GatewayError::NodeUnhealthy(format!("{url} rate-limited during health probe: {msg}")))
            }
            Err(GatewayError::RpcError { message, .. }) if message.to_lowercase().contains("behind") => {
                self.release(url, false, Duration::from_millis(1), false).await;
                Err(GatewayError::NodeBehind(format!("{url}: {message}")))
            }
            Err(e) => {
                self.release(url, false, Duration::from_millis(1), false).await;
                Err(GatewayError::NodeUnhealthy(format!("{url}: {e}")))
            }
        }
    }

    /// Pins the Helius-hosted endpoint (if any) at the head, then sorts
    /// the remainder by `performance_score` descending.
    pub async fn sort_endpoints_by_performance(&self) -> Vec<String> {
        let state = self.0.state.lock().await;
        let mut helius = Vec::new();
        let mut rest: Vec<(String, f64)> = Vec::new();

        for url in state.clients.keys() {
            if is_helius_url(url) {
                helius.push(url.clone());
            } else {
                let score = state
                    .endpoint_stats
                    .get(url)
                    .map(|s| s.performance_score())
                    .unwrap_or(0.0);
                rest.push((url.clone(), score));
            }
        }

        rest.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        helius.into_iter().chain(rest.into_iter().map(|(u, _)| u)).collect()
    }

    /// Closes the existing pool and re-initializes over the sorted union
    /// of `new_list` and the prior in-pool endpoints.
    pub async fn update_endpoints(&self, new_list: Vec<String>) -> Result<()> {
        let prior: Vec<String> = {
            let state = self.0.state.lock().await;
            state.clients.keys().cloned().collect()
        };

        for client in self.close_all().await {
            client.close().await;
        }

        let mut union: Vec<String> = new_list;
        for endpoint in prior {
            if !union.contains(&endpoint) {
                union.push(endpoint);
            }
        }

        let mut connected = 0usize;
        for endpoint in union {
            if connected >= self.0.config.pool_size {
                break;
            }
            if self.connect_new_client(&endpoint).await.is_ok() {
                connected += 1;
            }
        }

        if connected == 0 {
            return Err(GatewayError::NoClientsAvailable(
                "no endpoints connected while updating pool".to_string(),
            ));
        }
        Ok(())
    }

    async fn close_all(&self) -> Vec<SharedRpcClient> {
        let mut state = self.0.state.lock().await;
        let clients: Vec<SharedRpcClient> = state.clients.values().cloned().collect();
        state.clients.clear();
        state.failures.clear();
        state.endpoint_stats.clear();
        state.rate_limited_until.clear();
        clients
    }

    pub async fn get_stats(&self) -> Vec<EndpointSnapshot> {
        let state = self.0.state.lock().await;
        let now = Instant::now();
        state
            .clients
            .keys()
            .map(|url| {
                let stats = state.endpoint_stats.get(url).cloned().unwrap_or_default();
                let failures = state.failures.get(url).copied().unwrap_or(0);
                let rate_limited = state
                    .rate_limited_until
                    .get(url)
                    .map(|until| *until > now)
                    .unwrap_or(false);
                EndpointSnapshot {
                    endpoint: url.clone(),
                    success_count: stats.success_count,
                    failure_count: stats.failure_count,
                    rate_limited_count: stats.rate_limited_count,
                    avg_latency_ms: stats.avg_latency.as_secs_f64() * 1000.0,
                    current_failures: failures,
                    healthy: failures < self.0.config.max_consecutive_failures && !rate_limited,
                }
            })
            .collect()
    }

    pub async fn get_rpc_stats(&self) -> Vec<EndpointSnapshot> {
        self.get_stats().await
    }

    /// Excludes Helius-hosted URLs and any URL carrying an API-key query
    /// parameter.
    pub async fn get_filtered_rpc_stats(&self) -> Vec<EndpointSnapshot> {
        self.get_stats()
            .await
            .into_iter()
            .filter(|snap| !is_helius_url(&snap.endpoint) && !has_api_key_param(&snap.endpoint))
            .collect()
    }

    pub async fn endpoint_count(&self) -> usize {
        self.0.state.lock().await.clients.len()
    }

    pub async fn is_rate_limited(&self, endpoint: &str) -> bool {
        let state = self.0.state.lock().await;
        state
            .rate_limited_until
            .get(endpoint)
            .map(|until| *until > Instant::now())
            .unwrap_or(false)
    }
}

fn is_helius_url(url: &str) -> bool {
    url.contains("helius-rpc.com") || url.contains("helius.xyz")
}

fn same_host(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.host_str() == b.host_str(),
        _ => false,
    }
}

fn has_api_key_param(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.query_pairs().any(|(k, _)| k.eq_ignore_ascii_case("api-key") || k.eq_ignore_ascii_case("apikey")))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_helius_urls() {
        assert!(is_helius_url("https://mainnet.helius-rpc.com/?api-key=x"));
        assert!(!is_helius_url("https://api.mainnet-beta.solana.com"));
    }

    #[test]
    fn detects_api_key_params() {
        assert!(has_api_key_param("https://mainnet.helius-rpc.com/?api-key=x"));
        assert!(!has_api_key_param("https://api.mainnet-beta.solana.com"));
    }

    #[test]
    fn same_host_ignores_api_key_suffix() {
        assert!(same_host(
            "https://mainnet.helius-rpc.com/?api-key=aaa",
            "https://mainnet.helius-rpc.com/?api-key=bbb"
        ));
    }
}
