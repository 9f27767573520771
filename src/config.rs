use std::time::Duration;

use clap::Parser;

/// Startup configuration for the gateway. Built once in `main` and handed
/// to components by reference — no global mutable singleton (see
/// SPEC_FULL §9 Design Notes).
#[derive(Debug, Clone, Parser)]
#[command(name = "solana-gateway")]
pub struct Config {
    /// Upstream RPC endpoint URLs, most preferred first.
    #[arg(long = "endpoint", env = "SOLANA_GATEWAY_ENDPOINTS", value_delimiter = ',')]
    pub endpoints: Vec<String>,

    /// Helius API key. When present, a Helius endpoint is appended to the
    /// endpoint list and pinned at the head of the performance ordering.
    #[arg(long, env = "HELIUS_API_KEY")]
    pub helius_api_key: Option<String>,

    /// Maximum number of connected clients the pool will hold.
    #[arg(long, default_value_t = 10)]
    pub pool_size: usize,

    /// Per-call total timeout in seconds.
    #[arg(long, default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Per-call connect timeout in seconds.
    #[arg(long, default_value_t = 5)]
    pub connect_timeout_secs: u64,

    /// Maximum consecutive endpoint failures before a client is excluded
    /// from the default selection policy.
    #[arg(long, default_value_t = 5)]
    pub max_consecutive_failures: u32,

    /// Default max retries for `safe_rpc_call`.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Base retry delay in seconds for `safe_rpc_call`'s exponential backoff.
    #[arg(long, default_value_t = 1.0)]
    pub retry_delay_secs: f64,

    #[command(flatten)]
    pub rate_limiter: RateLimiterConfig,

    /// HTTP bind host.
    #[arg(long, default_value = "0.0.0.0")]
    pub http_host: String,

    /// HTTP bind port.
    #[arg(long, default_value_t = 8080)]
    pub http_port: u16,

    /// Path to the sqlite cache database file.
    #[arg(long, default_value = "gateway_cache.db")]
    pub cache_db_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: vec!["https://api.mainnet-beta.solana.com".to_string()],
            helius_api_key: None,
            pool_size: 10,
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
            max_consecutive_failures: 5,
            max_retries: 3,
            retry_delay_secs: 1.0,
            rate_limiter: RateLimiterConfig::default(),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            cache_db_path: "gateway_cache.db".to_string(),
        }
    }
}

impl Config {
    /// Resolve the final, de-duplicated endpoint list, including the
    /// Helius endpoint derived from `helius_api_key` when set.
    pub fn resolve_endpoints(&self) -> Vec<String> {
        let mut endpoints = if self.endpoints.is_empty() {
            vec!["https://api.mainnet-beta.solana.com".to_string()]
        } else {
            self.endpoints.clone()
        };

        if let Some(key) = &self.helius_api_key {
            endpoints.push(format!("https://mainnet.helius-rpc.com/?api-key={key}"));
        }

        let mut seen = std::collections::HashSet::new();
        endpoints.retain(|e| seen.insert(e.clone()));
        endpoints
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }
}

/// Defaults per spec §4.2.
#[derive(Debug, Clone, clap::Args)]
pub struct RateLimiterConfig {
    #[arg(long, default_value_t = 5.0)]
    pub initial_rate: f64,
    #[arg(long, default_value_t = 1.0)]
    pub min_rate: f64,
    #[arg(long, default_value_t = 15.0)]
    pub max_rate: f64,
    #[arg(long, default_value_t = 0.4)]
    pub decrease_factor: f64,
    #[arg(long, default_value_t = 1.02)]
    pub increase_factor: f64,
    #[arg(long, default_value_t = 2)]
    pub circuit_breaker_threshold: u32,
    #[arg(long, default_value_t = 120.0)]
    pub max_backoff_time: f64,
    #[arg(long, default_value_t = 0.2)]
    pub jitter_factor: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            initial_rate: 5.0,
            min_rate: 1.0,
            max_rate: 15.0,
            decrease_factor: 0.4,
            increase_factor: 1.02,
            circuit_breaker_threshold: 2,
            max_backoff_time: 120.0,
            jitter_factor: 0.2,
        }
    }
}

/// Named response-cache TTL table from spec §6. An enum rather than a
/// runtime map so an unknown cache key is a compile error, not a
/// lookup failure at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    MarketOverview,
    SolPrice,
    LatestTokens,
    TokenDetails,
    LatestTrades,
    TopPerformers,
    KingOfTheHill,
    SearchTokens,
    TokenPriceChart,
    TokenHolders,
    TokenSocialMetrics,
    NetworkStatus,
    PerformanceMetrics,
    RpcNodes,
    TokenInfo,
    SystemResources,
    RecentBlocks,
    ValidatorInfo,
    EpochInfo,
    VoteAccounts,
    Default,
    Short,
    Long,
    VeryLong,
}

impl CacheKind {
    pub fn ttl_seconds(self) -> u64 {
        match self {
            CacheKind::MarketOverview => 600,
            CacheKind::SolPrice => 600,
            CacheKind::LatestTokens => 900,
            CacheKind::TokenDetails => 1800,
            CacheKind::LatestTrades => 600,
            CacheKind::TopPerformers => 900,
            CacheKind::KingOfTheHill => 900,
            CacheKind::SearchTokens => 900,
            CacheKind::TokenPriceChart => 900,
            CacheKind::TokenHolders => 3600,
            CacheKind::TokenSocialMetrics => 1800,
            CacheKind::NetworkStatus => 300,
            CacheKind::PerformanceMetrics => 180,
            CacheKind::RpcNodes => 600,
            CacheKind::TokenInfo => 900,
            CacheKind::SystemResources => 3600,
            CacheKind::RecentBlocks => 180,
            CacheKind::ValidatorInfo => 1800,
            CacheKind::EpochInfo => 600,
            CacheKind::VoteAccounts => 600,
            CacheKind::Default => 300,
            CacheKind::Short => 60,
            CacheKind::Long => 1800,
            CacheKind::VeryLong => 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_endpoints_dedupes_and_appends_helius() {
        let mut cfg = Config {
            endpoints: vec![
                "https://a.example".to_string(),
                "https://a.example".to_string(),
            ],
            helius_api_key: Some("secret".to_string()),
            ..Config::default()
        };
        cfg.endpoints = vec![
            "https://a.example".to_string(),
            "https://a.example".to_string(),
        ];
        let resolved = cfg.resolve_endpoints();
        assert_eq!(resolved.len(), 2);
        assert!(resolved[1].contains("helius-rpc.com"));
    }

    #[test]
    fn ttl_table_matches_spec() {
        assert_eq!(CacheKind::NetworkStatus.ttl_seconds(), 300);
        assert_eq!(CacheKind::PerformanceMetrics.ttl_seconds(), 180);
        assert_eq!(CacheKind::TokenHolders.ttl_seconds(), 3600);
        assert_eq!(CacheKind::Short.ttl_seconds(), 60);
    }
}
