use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::mint::MintExtractor;
use crate::pool::Pool;
use crate::query;
use crate::rpc::wire::Block;

const MAX_NUM_BLOCKS: u32 = 10;
const BLOCK_MAX_RETRIES: u32 = 3;
const INTER_BLOCK_DELAY: Duration = Duration::from_millis(200);

/// Per-block outcome of a scan: the block's own mint-extraction results
/// plus timing and instruction-shape statistics (spec §4.8 step 4).
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BlockScanEntry {
    pub slot: u64,
    pub transaction_count: u64,
    pub new_mint_addresses: Vec<String>,
    pub mint_addresses: Vec<String>,
    pub pump_token_addresses: Vec<String>,
    pub instruction_type_counts: HashMap<String, u64>,
    pub processing_time_ms: u64,
}

/// Cumulative counts across every block in the scan (spec §4.8 step 5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ScanSummary {
    pub blocks_scanned: u32,
    pub error_blocks: u32,
    pub total_transactions: u64,
    pub total_new_mint_addresses: usize,
    pub total_pump_tokens: usize,
    pub unique_mint_addresses: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ScanResult {
    pub blocks: Vec<BlockScanEntry>,
    pub summary: ScanSummary,
}

/// Walks the `num_blocks` most recent finalized blocks backward from the
/// current slot, feeding each one into a fresh Mint Extractor, and
/// aggregates per-block and cumulative summaries (spec §4.8).
///
/// `num_blocks` is clamped to `[1, 10]`. A per-block decode failure is
/// skipped and counted in `error_blocks`; the scan as a whole only fails
/// if the starting slot cannot be discovered.
pub async fn extract_mints(pool: &Pool, num_blocks: u32) -> Result<ScanResult> {
    let num_blocks = num_blocks.clamp(1, MAX_NUM_BLOCKS);
    let started = Instant::now();

    let latest_slot = query::get_slot(pool).await?;

    let mut window = scan_window(pool, latest_slot, num_blocks).await;

    // "Block cleaned up" recovery (spec §4.8 step 2): if this window
    // produced nothing but carried a "First available block: K" hint,
    // rescan starting at K for whatever budget remains up to `latest`.
    if window.entries.is_empty() {
        if let Some(hint_slot) = window.first_available_hint {
            let remaining = num_blocks.min(latest_slot.saturating_sub(hint_slot).saturating_add(1) as u32);
            if remaining > 0 {
                let rescan_start = hint_slot.saturating_add(remaining as u64 - 1);
                window = scan_window(pool, rescan_start, remaining).await;
            }
        }
    }

    let mut unique_mints = HashSet::new();
    let mut total_transactions = 0u64;
    let mut total_new = 0usize;
    let mut total_pump = 0usize;
    for entry in &window.entries {
        total_transactions += entry.transaction_count;
        total_new += entry.new_mint_addresses.len();
        total_pump += entry.pump_token_addresses.len();
        unique_mints.extend(entry.mint_addresses.iter().cloned());
    }

    let summary = ScanSummary {
        blocks_scanned: window.entries.len() as u32,
        error_blocks: window.error_blocks,
        total_transactions,
        total_new_mint_addresses: total_new,
        total_pump_tokens: total_pump,
        unique_mint_addresses: unique_mints.len(),
        processing_time_ms: started.elapsed().as_millis() as u64,
    };

    Ok(ScanResult { blocks: window.entries, summary })
}

struct ScanWindow {
    entries: Vec<BlockScanEntry>,
    error_blocks: u32,
    first_available_hint: Option<u64>,
}

/// Walks `num_blocks` slots backward from `start_slot`, decoding each via
/// `getBlock` and running it through a fresh Mint Extractor.
async fn scan_window(pool: &Pool, start_slot: u64, num_blocks: u32) -> ScanWindow {
    let mut entries = Vec::new();
    let mut error_blocks = 0u32;
    let mut first_available_hint = None;

    let slots: Vec<u64> = (0..num_blocks as u64).filter_map(|i| start_slot.checked_sub(i)).collect();

    for slot in slots {
        let block_started = Instant::now();
        match query::get_block(pool, slot, BLOCK_MAX_RETRIES).await {
            Ok(block) => {
                let mut extractor = MintExtractor::new();
                extractor.process_block(&block);
                let results = extractor.results();
                entries.push(BlockScanEntry {
                    slot,
                    transaction_count: block.transactions.len() as u64,
                    instruction_type_counts: instruction_type_counts(&block),
                    new_mint_addresses: results.new_mints,
                    mint_addresses: results.all_mints,
                    pump_token_addresses: results.pump_tokens,
                    processing_time_ms: block_started.elapsed().as_millis() as u64,
                });
            }
            Err(e) => {
                let message = e.to_string();
                debug!("slot {slot} failed during block scan: {message}");
                if first_available_hint.is_none() {
                    first_available_hint = query::block::first_available_block_hint(&message);
                }
                error_blocks += 1;
            }
        }
        tokio::time::sleep(INTER_BLOCK_DELAY).await;
    }

    ScanWindow { entries, error_blocks, first_available_hint }
}

/// Counts instructions per resolved program ID, used as the per-block
/// "instruction type" breakdown (spec §4.8 step 4).
fn instruction_type_counts(block: &Block) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for tx in &block.transactions {
        let keys = &tx.transaction.message.account_keys;
        for ix in &tx.transaction.message.instructions {
            if let Some(program_id) = keys.get(ix.program_id_index) {
                *counts.entry(program_id.clone()).or_insert(0) += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::wire::{BlockTransaction, Instruction, TransactionEnvelope, TransactionMessage};

    fn empty_block(slot_marker: i64) -> Block {
        Block {
            parent_slot: Some(0),
            block_time: Some(slot_marker),
            transactions: vec![BlockTransaction {
                transaction: TransactionEnvelope {
                    message: TransactionMessage {
                        account_keys: vec!["11111111111111111111111111111111".to_string()],
                        instructions: vec![Instruction { program_id_index: 0, accounts: vec![], data: "x".to_string() }],
                    },
                },
                meta: None,
            }],
        }
    }

    #[test]
    fn instruction_type_counts_groups_by_program_id() {
        let block = empty_block(1);
        let counts = instruction_type_counts(&block);
        assert_eq!(counts.get("11111111111111111111111111111111"), Some(&1));
    }

    #[test]
    fn scan_summary_aggregates_across_entries() {
        let entries = vec![
            BlockScanEntry {
                slot: 10,
                transaction_count: 5,
                new_mint_addresses: vec!["a".to_string()],
                mint_addresses: vec!["a".to_string(), "b".to_string()],
                pump_token_addresses: vec![],
                instruction_type_counts: HashMap::new(),
                processing_time_ms: 1,
            },
            BlockScanEntry {
                slot: 9,
                transaction_count: 3,
                new_mint_addresses: vec!["c".to_string()],
                mint_addresses: vec!["b".to_string(), "c".to_string()],
                pump_token_addresses: vec!["c".to_string()],
                instruction_type_counts: HashMap::new(),
                processing_time_ms: 1,
            },
        ];

        let mut unique = HashSet::new();
        let mut total_new = 0usize;
        for entry in &entries {
            total_new += entry.new_mint_addresses.len();
            unique.extend(entry.mint_addresses.iter().cloned());
        }
        assert_eq!(total_new, 2);
        assert_eq!(unique.len(), 3);
    }
}
