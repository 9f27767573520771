pub mod block;
pub mod cluster;
pub mod network_status;
pub mod performance;

pub use block::{get_block, process_blocks, ProcessBlocksResult};
pub use cluster::get_cluster_nodes;
pub use network_status::{get_network_status, NetworkStatus};
pub use performance::{get_block_production, get_recent_performance};

use crate::error::Result;
use crate::pool::Pool;

/// Acquires a client and returns the current slot, releasing the client
/// on either outcome. Used as the default anchor for `process_blocks`
/// when no explicit `start_slot` is given.
pub async fn get_slot(pool: &Pool) -> Result<u64> {
    let mut acquired = pool.acquire().await?;
    let client = acquired.client().clone();
    match client.get_slot().await {
        Ok(slot) => {
            acquired.mark_success();
            acquired.release().await;
            Ok(slot)
        }
        Err(e) => {
            acquired.mark_failure();
            acquired.release().await;
            Err(e)
        }
    }
}
