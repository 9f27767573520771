use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::error::GatewayError;
use crate::pool::Pool;
use crate::rpc::wire::{BlockProduction, PerformanceSample};

const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(4);
const MAX_ATTEMPTS: usize = 5;

/// Attempts up to five distinct endpoints. If every attempt reports
/// `MethodNotSupported`, synthesizes a single sample rather than failing
/// (spec §4.6.4).
pub async fn get_recent_performance(pool: &Pool) -> Vec<PerformanceSample> {
    let mut all_unsupported = true;

    for _ in 0..MAX_ATTEMPTS.min(pool.endpoint_count().await.max(1)) {
        let mut acquired = match pool.acquire().await {
            Ok(a) => a,
            Err(_) => break,
        };
        let client = acquired.client().clone();
        let result = tokio::time::timeout(
            PER_ATTEMPT_TIMEOUT,
            client.get_recent_performance_samples(5, Some(PER_ATTEMPT_TIMEOUT)),
        )
        .await;

        match result {
            Ok(Ok(samples)) if !samples.is_empty() => {
                acquired.mark_success();
                acquired.release().await;
                return samples;
            }
            Ok(Ok(_empty)) => {
                acquired.mark_success();
                acquired.release().await;
                all_unsupported = false;
            }
            Ok(Err(GatewayError::MethodNotSupported(_))) => {
                acquired.mark_failure();
                acquired.release().await;
            }
            _ => {
                acquired.mark_failure();
                acquired.release().await;
                all_unsupported = false;
            }
        }
    }

    if all_unsupported {
        warn!("no endpoint supports getRecentPerformanceSamples, synthesizing a sample");
        return vec![PerformanceSample {
            num_slots: 120,
            num_transactions: 1200,
            sample_period_secs: 60,
            slot: 0,
            timestamp: Some(Utc::now().timestamp() - 60),
            synthetic: true,
            error: Some("Method not supported by any endpoint".to_string()),
        }];
    }

    Vec::new()
}

/// Serial fan-out over endpoints, preferring Helius first when configured
/// (spec §4.6.5).
pub async fn get_block_production(pool: &Pool) -> BlockProduction {
    let ordered = pool.sort_endpoints_by_performance().await;

    for endpoint in ordered {
        let Ok((_, client)) = pool.get_specific_client(&endpoint).await else {
            continue;
        };
        match client.get_block_production(Some(PER_ATTEMPT_TIMEOUT)).await {
            Ok(production) if production.error.is_none() => return production,
            Ok(production) => {
                // This endpoint reported MethodNotSupported; keep trying others.
                let _ = production;
            }
            Err(_) => continue,
        }
    }

    BlockProduction {
        by_identity: Default::default(),
        range: Default::default(),
        error: Some(crate::rpc::wire::BlockProductionError {
            code: -32601,
            message: "Method not supported by any endpoint".to_string(),
        }),
    }
}
