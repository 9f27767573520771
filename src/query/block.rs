use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::pool::Pool;
use crate::rpc::wire::Block;

const MAX_CONSECUTIVE_SKIPS: u32 = 10;
const RETRY_CAP_SECS: f64 = 60.0;

/// `getBlock` with slot-skip fallback and method-not-supported endpoint
/// rotation (spec §4.6.1).
pub async fn get_block(pool: &Pool, mut slot: u64, max_retries: u32) -> Result<Block> {
    let mut attempt = 0u32;
    let mut skipped_slots = 0u32;

    loop {
        let mut acquired = pool.acquire().await?;
        let client = acquired.client().clone();

        match client
            .get_block(
                slot,
                json!({"encoding": "json", "transactionDetails": "full", "rewards": false, "maxSupportedTransactionVersion": 0}),
            )
            .await
        {
            Ok(block) => {
                acquired.mark_success();
                acquired.release().await;
                return Ok(block);
            }
            Err(GatewayError::SlotSkipped(msg)) => {
                acquired.mark_success();
                acquired.release().await;
                debug!("slot {slot} skipped: {msg}");
                slot += 1;
                skipped_slots += 1;
                if skipped_slots >= MAX_CONSECUTIVE_SKIPS {
                    return Err(GatewayError::MissingBlocks(format!(
                        "{skipped_slots} consecutive slots skipped starting near slot {slot}"
                    )));
                }
                continue;
            }
            Err(GatewayError::MethodNotSupported(msg)) => {
                acquired.mark_failure();
                acquired.release().await;
                attempt += 1;
                if attempt > max_retries {
                    return Err(GatewayError::MethodNotSupported(msg));
                }
                continue;
            }
            Err(e) if e.is_retryable() => {
                acquired.mark_failure();
                acquired.release().await;
                attempt += 1;
                if attempt > max_retries {
                    return Err(e);
                }
                let backoff = (1.0 * 2f64.powi(attempt as i32)).min(RETRY_CAP_SECS);
                tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                continue;
            }
            Err(e) => {
                acquired.mark_failure();
                acquired.release().await;
                return Err(e);
            }
        }
    }
}

/// Aggregate statistics produced by iterating a batch of blocks.
#[derive(Debug, Default, Clone)]
pub struct ProcessBlocksResult {
    pub blocks: Vec<(u64, Block)>,
    pub processed: u32,
    pub empty: u32,
    pub error_blocks: u32,
    pub total_transactions: u64,
    pub total_instructions: u64,
    pub elapsed_ms: u64,
}

/// Walks `num_blocks` slots backward from `start_slot` (or the current
/// slot), in batches of `batch_size`, sleeping between calls to smooth
/// upstream load. Per-slot failures are tolerated and counted.
pub async fn process_blocks(
    pool: &Pool,
    num_blocks: u32,
    start_slot: Option<u64>,
    batch_size: u32,
    max_retries: u32,
) -> Result<ProcessBlocksResult> {
    let started = std::time::Instant::now();
    let current_slot = match start_slot {
        Some(s) => s,
        None => super::get_slot(pool).await?,
    };

    let slots: Vec<u64> = (0..num_blocks as u64)
        .filter_map(|i| current_slot.checked_sub(i))
        .collect();

    let mut result = ProcessBlocksResult::default();

    for batch in slots.chunks(batch_size.max(1) as usize) {
        for &slot in batch {
            match get_block(pool, slot, max_retries).await {
                Ok(block) => {
                    result.processed += 1;
                    let tx_count = block.transactions.len() as u64;
                    result.total_transactions += tx_count;
                    result.total_instructions += block
                        .transactions
                        .iter()
                        .map(|t| t.transaction.message.instructions.len() as u64)
                        .sum::<u64>();
                    if tx_count == 0 {
                        result.empty += 1;
                    }
                    result.blocks.push((slot, block));
                }
                Err(e) => {
                    debug!("slot {slot} failed during process_blocks: {e}");
                    result.error_blocks += 1;
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    result.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(result)
}

#[allow(dead_code)]
pub(crate) fn first_available_block_hint(message: &str) -> Option<u64> {
    let marker = "First available block: ";
    message.find(marker).and_then(|idx| {
        message[idx + marker.len()..]
            .split_whitespace()
            .next()
            .and_then(|s| s.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_available_block_hint() {
        let msg = "Block cleaned up, does not exist on node. First available block: 12345678";
        assert_eq!(first_available_block_hint(msg), Some(12345678));
    }

    #[test]
    fn returns_none_without_hint() {
        assert_eq!(first_available_block_hint("some other error"), None);
    }
}
