use std::time::Duration;

use futures::future::select_all;
use tracing::warn;

use crate::pool::Pool;
use crate::rpc::wire::ClusterNode;

const FAN_OUT_ATTEMPTS: usize = 3;
const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
const OVERALL_TIMEOUT: Duration = Duration::from_secs(5);
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(4);

/// A result counts as a usable node list only if at least one of its
/// first 1-5 elements carries an identifying field (spec §4.6.3).
fn is_usable(nodes: &[ClusterNode]) -> bool {
    !nodes.is_empty() && nodes.iter().take(5).any(ClusterNode::has_identifying_field)
}

/// Launches up to three concurrent attempts against distinct acquired
/// clients; the first usable result wins. An attempt that finishes with
/// an unusable (empty/untyped) result is discarded but its siblings are
/// left running, so a slower-but-usable attempt can still win. Falls
/// back to a serial sweep over whatever endpoints remain, then to an
/// empty list.
pub async fn get_cluster_nodes(pool: &Pool) -> Vec<ClusterNode> {
    let mut tasks = Vec::new();
    for _ in 0..FAN_OUT_ATTEMPTS {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move { attempt_once(&pool).await }));
    }

    let overall = tokio::time::timeout(OVERALL_TIMEOUT, async {
        let mut remaining = tasks;
        loop {
            if remaining.is_empty() {
                return None;
            }
            let (result, _index, rest) = select_all(remaining).await;
            remaining = rest;
            match result {
                Ok(Some(nodes)) if is_usable(&nodes) => return Some(nodes),
                _ => continue,
            }
        }
    })
    .await;

    if let Ok(Some(nodes)) = overall {
        return nodes;
    }

    warn!("cluster-node fan-out produced no usable result, falling back to serial sweep");
    if let Some(nodes) = fallback_serial_sweep(pool).await {
        return nodes;
    }

    warn!("cluster-node discovery exhausted all endpoints");
    Vec::new()
}

async fn attempt_once(pool: &Pool) -> Option<Vec<ClusterNode>> {
    let mut acquired = pool.acquire().await.ok()?;
    let client = acquired.client().clone();
    let result = tokio::time::timeout(PER_ATTEMPT_TIMEOUT, client.get_cluster_nodes(Some(PER_ATTEMPT_TIMEOUT))).await;
    match result {
        Ok(Ok(nodes)) if is_usable(&nodes) => {
            acquired.mark_success();
            acquired.release().await;
            Some(nodes)
        }
        _ => {
            acquired.mark_failure();
            acquired.release().await;
            None
        }
    }
}

/// `RPCNodeExtractor` fallback: a plain serial sweep over endpoints with a
/// shorter timeout, used once the parallel fan-out has failed outright.
async fn fallback_serial_sweep(pool: &Pool) -> Option<Vec<ClusterNode>> {
    let endpoint_count = pool.endpoint_count().await.max(1);
    for _ in 0..endpoint_count {
        let mut acquired = pool.acquire().await.ok()?;
        let client = acquired.client().clone();
        let result = tokio::time::timeout(FALLBACK_TIMEOUT, client.get_cluster_nodes(Some(FALLBACK_TIMEOUT))).await;
        match result {
            Ok(Ok(nodes)) if is_usable(&nodes) => {
                acquired.mark_success();
                acquired.release().await;
                return Some(nodes);
            }
            _ => {
                acquired.mark_failure();
                acquired.release().await;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(pubkey: Option<&str>) -> ClusterNode {
        ClusterNode {
            pubkey: pubkey.map(|s| s.to_string()),
            gossip: None,
            tpu: None,
            rpc: None,
            version: None,
            feature_set: None,
        }
    }

    #[test]
    fn empty_list_is_not_usable() {
        assert!(!is_usable(&[]));
    }

    #[test]
    fn list_without_identifying_fields_is_not_usable() {
        let nodes = vec![ClusterNode {
            pubkey: None,
            gossip: None,
            tpu: None,
            rpc: None,
            version: Some("1.18.0".to_string()),
            feature_set: None,
        }];
        assert!(!is_usable(&nodes));
    }

    #[test]
    fn list_with_one_identifying_field_is_usable() {
        let nodes = vec![node(Some("abc"))];
        assert!(is_usable(&nodes));
    }
}
