use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pool::Pool;
use crate::rpc::wire::{ClusterNode, VoteAccountEntry};

use super::cluster::get_cluster_nodes;

#[derive(Debug, Clone, Serialize, Deserialize, Default, utoipa::ToSchema)]
pub struct Distribution {
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, utoipa::ToSchema)]
pub struct StakeBucket {
    pub count: u64,
    pub stake: u64,
    pub stake_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, utoipa::ToSchema)]
pub struct StakeDistribution {
    pub high: StakeBucket,
    pub medium: StakeBucket,
    pub low: StakeBucket,
    pub delinquent: StakeBucket,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NetworkStatus {
    pub node_count: usize,
    pub active_nodes: usize,
    pub delinquent_nodes: usize,
    pub version_distribution: HashMap<String, Distribution>,
    pub feature_set_distribution: HashMap<String, Distribution>,
    pub stake_distribution: StakeDistribution,
    pub average_tps: f64,
    pub status: String,
    pub errors: Vec<String>,
}

/// Composes cluster nodes, vote accounts, and recent performance into a
/// single network-health summary (spec §4.6.6). Every sub-failure is
/// captured into `errors[]` without aborting the whole result.
pub async fn get_network_status(pool: &Pool) -> NetworkStatus {
    let mut errors = Vec::new();

    let nodes = get_cluster_nodes(pool).await;
    if nodes.is_empty() {
        errors.push("cluster node discovery returned no nodes".to_string());
    }

    let (current, delinquent) = match fetch_vote_accounts(pool).await {
        Ok(v) => v,
        Err(e) => {
            errors.push(format!("getVoteAccounts failed: {e}"));
            (Vec::new(), Vec::new())
        }
    };

    let average_tps = match fetch_average_tps(pool).await {
        Ok(tps) => tps,
        Err(e) => {
            errors.push(format!("getRecentPerformanceSamples failed: {e}"));
            0.0
        }
    };

    let version_distribution = version_distribution(&nodes);
    let feature_set_distribution = feature_set_distribution(&nodes);
    let stake_distribution = stake_distribution(&current, &delinquent);

    let node_count = nodes.len();
    let delinquent_nodes = delinquent.len();
    let active_nodes = current.len();
    let total = active_nodes + delinquent_nodes;
    let status = if total == 0 {
        "unhealthy"
    } else {
        let ratio = active_nodes as f64 / total as f64;
        if ratio >= 0.95 {
            "healthy"
        } else if ratio >= 0.80 {
            "degraded"
        } else {
            "unhealthy"
        }
    };

    NetworkStatus {
        node_count,
        active_nodes,
        delinquent_nodes,
        version_distribution,
        feature_set_distribution,
        stake_distribution,
        average_tps,
        status: status.to_string(),
        errors,
    }
}

async fn fetch_vote_accounts(
    pool: &Pool,
) -> crate::error::Result<(Vec<VoteAccountEntry>, Vec<VoteAccountEntry>)> {
    let mut acquired = pool.acquire().await?;
    let client = acquired.client().clone();
    match client.get_vote_accounts().await {
        Ok(accounts) => {
            acquired.mark_success();
            acquired.release().await;
            Ok((accounts.current, accounts.delinquent))
        }
        Err(e) => {
            acquired.mark_failure();
            acquired.release().await;
            Err(e)
        }
    }
}

async fn fetch_average_tps(pool: &Pool) -> crate::error::Result<f64> {
    let mut acquired = pool.acquire().await?;
    let client = acquired.client().clone();
    match client.get_recent_performance_samples(5, None).await {
        Ok(samples) if !samples.is_empty() => {
            acquired.mark_success();
            acquired.release().await;
            let total: f64 = samples
                .iter()
                .map(|s| s.num_transactions as f64 / s.sample_period_secs.max(1) as f64)
                .sum();
            Ok(total / samples.len() as f64)
        }
        Ok(_) => {
            acquired.mark_success();
            acquired.release().await;
            Ok(0.0)
        }
        Err(e) => {
            acquired.mark_failure();
            acquired.release().await;
            Err(e)
        }
    }
}

pub(crate) fn version_distribution(nodes: &[ClusterNode]) -> HashMap<String, Distribution> {
    distribution(nodes.iter().map(|n| n.version.clone().unwrap_or_else(|| "unknown".to_string())))
}

fn feature_set_distribution(nodes: &[ClusterNode]) -> HashMap<String, Distribution> {
    distribution(
        nodes
            .iter()
            .map(|n| n.feature_set.map(|f| f.to_string()).unwrap_or_else(|| "unknown".to_string())),
    )
}

fn distribution(values: impl Iterator<Item = String>) -> HashMap<String, Distribution> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut total = 0u64;
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
        total += 1;
    }
    counts
        .into_iter()
        .map(|(k, count)| {
            let percentage = if total == 0 { 0.0 } else { count as f64 / total as f64 * 100.0 };
            (k, Distribution { count, percentage })
        })
        .collect()
}

/// Partitions active validators by activated-stake rank into
/// high (top 10%), medium (next 40%), low (bottom 50%), and a separate
/// delinquent bucket, each weighted by share of total stake.
fn stake_distribution(current: &[VoteAccountEntry], delinquent: &[VoteAccountEntry]) -> StakeDistribution {
    let mut sorted: Vec<&VoteAccountEntry> = current.iter().collect();
    sorted.sort_by(|a, b| b.activated_stake.cmp(&a.activated_stake));

    let total_stake: u64 = current.iter().map(|v| v.activated_stake).sum::<u64>()
        + delinquent.iter().map(|v| v.activated_stake).sum::<u64>();

    let n = sorted.len();
    let high_cut = (n as f64 * 0.10).ceil() as usize;
    let medium_cut = (n as f64 * 0.50).ceil() as usize;

    let mut high = StakeBucket::default();
    let mut medium = StakeBucket::default();
    let mut low = StakeBucket::default();

    for (i, entry) in sorted.iter().enumerate() {
        let bucket = if i < high_cut {
            &mut high
        } else if i < medium_cut {
            &mut medium
        } else {
            &mut low
        };
        bucket.count += 1;
        bucket.stake += entry.activated_stake;
    }

    let mut delinquent_bucket = StakeBucket::default();
    for entry in delinquent {
        delinquent_bucket.count += 1;
        delinquent_bucket.stake += entry.activated_stake;
    }

    let pct = |stake: u64| {
        if total_stake == 0 {
            0.0
        } else {
            stake as f64 / total_stake as f64 * 100.0
        }
    };
    high.stake_percentage = pct(high.stake);
    medium.stake_percentage = pct(medium.stake);
    low.stake_percentage = pct(low.stake);
    delinquent_bucket.stake_percentage = pct(delinquent_bucket.stake);

    StakeDistribution {
        high,
        medium,
        low,
        delinquent: delinquent_bucket,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(stake: u64) -> VoteAccountEntry {
        VoteAccountEntry {
            vote_pubkey: "x".to_string(),
            activated_stake: stake,
            epoch_vote_account: true,
        }
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(compute_status(95, 5), "healthy");
        assert_eq!(compute_status(80, 20), "degraded");
        assert_eq!(compute_status(50, 50), "unhealthy");
    }

    fn compute_status(active: usize, delinquent: usize) -> &'static str {
        let total = active + delinquent;
        let ratio = active as f64 / total as f64;
        if ratio >= 0.95 {
            "healthy"
        } else if ratio >= 0.80 {
            "degraded"
        } else {
            "unhealthy"
        }
    }

    #[test]
    fn stake_distribution_buckets_sum_to_total_count() {
        let current: Vec<VoteAccountEntry> = (0..10).map(|i| vote(100 * (10 - i))).collect();
        let delinquent = vec![vote(50)];
        let dist = stake_distribution(&current, &delinquent);
        assert_eq!(dist.high.count + dist.medium.count + dist.low.count, 10);
        assert_eq!(dist.delinquent.count, 1);
    }
}
