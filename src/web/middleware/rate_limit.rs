use std::sync::Arc;

use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::GovernorLayer;
use governor::middleware::NoOpMiddleware;

/// Edge-level rate limiting ahead of the per-upstream adaptive limiter in
/// `crate::rate_limiter` — this one protects the gateway's own HTTP
/// surface from a noisy client, not the upstream RPC nodes.
pub fn create_rate_limit_layer(
    requests_per_second: u64,
    burst_size: u32,
) -> GovernorLayer<PeerIpKeyExtractor, NoOpMiddleware, axum::body::Body> {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(requests_per_second)
            .burst_size(burst_size)
            .finish()
            .expect("static governor configuration is always valid"),
    );
    GovernorLayer::new(config)
}
