//! JSON-RPC 2.0 wire types and the concrete, per-method result structs that
//! replace the source's dynamic attribute probing (see SPEC_FULL §6, §9).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: Uuid,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Uuid::new_v4(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<Uuid>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A single cluster-topology entry as returned by `getClusterNodes`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ClusterNode {
    pub pubkey: Option<String>,
    pub gossip: Option<String>,
    pub tpu: Option<String>,
    pub rpc: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "featureSet")]
    pub feature_set: Option<u32>,
}

impl ClusterNode {
    /// A node object carries at least one of the four addressable
    /// endpoints; objects with none of these are not real topology entries.
    pub fn has_identifying_field(&self) -> bool {
        self.pubkey.is_some() || self.gossip.is_some() || self.tpu.is_some() || self.rpc.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PerformanceSample {
    #[serde(rename = "numSlots")]
    pub num_slots: u64,
    #[serde(rename = "numTransactions")]
    pub num_transactions: u64,
    #[serde(rename = "samplePeriodSecs")]
    pub sample_period_secs: u32,
    pub slot: u64,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, utoipa::ToSchema)]
pub struct BlockProduction {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub by_identity: std::collections::HashMap<String, (u64, u64)>,
    pub range: BlockProductionRange,
    #[serde(default)]
    pub error: Option<BlockProductionError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, utoipa::ToSchema)]
pub struct BlockProductionRange {
    #[serde(rename = "firstSlot", default)]
    pub first_slot: u64,
    #[serde(rename = "lastSlot", default)]
    pub last_slot: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BlockProductionError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteAccountEntry {
    #[serde(rename = "votePubkey")]
    pub vote_pubkey: String,
    #[serde(rename = "activatedStake")]
    pub activated_stake: u64,
    #[serde(rename = "epochVoteAccount")]
    pub epoch_vote_account: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteAccounts {
    pub current: Vec<VoteAccountEntry>,
    pub delinquent: Vec<VoteAccountEntry>,
}

/// A decoded block, trimmed to the fields the mint extractor and the
/// block-scan pipeline actually consume.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    #[serde(rename = "parentSlot", default)]
    pub parent_slot: Option<u64>,
    #[serde(rename = "blockTime", default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub transactions: Vec<BlockTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockTransaction {
    pub transaction: TransactionEnvelope,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionEnvelope {
    pub message: TransactionMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionMessage {
    #[serde(rename = "accountKeys", default)]
    pub account_keys: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Instruction {
    #[serde(rename = "programIdIndex")]
    pub program_id_index: usize,
    #[serde(default)]
    pub accounts: Vec<usize>,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TransactionMeta {
    #[serde(rename = "innerInstructions", default)]
    pub inner_instructions: Vec<InnerInstructionGroup>,
    #[serde(rename = "preTokenBalances", default)]
    pub pre_token_balances: Vec<TokenBalance>,
    #[serde(rename = "postTokenBalances", default)]
    pub post_token_balances: Vec<TokenBalance>,
    #[serde(rename = "logMessages", default)]
    pub log_messages: Vec<String>,
    #[serde(rename = "loadedAddresses", default)]
    pub loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoadedAddresses {
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub readonly: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InnerInstructionGroup {
    pub index: usize,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenBalance {
    #[serde(rename = "accountIndex")]
    pub account_index: usize,
    pub mint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EpochInfo {
    pub epoch: u64,
    #[serde(rename = "slotIndex")]
    pub slot_index: u64,
    #[serde(rename = "slotsInEpoch")]
    pub slots_in_epoch: u64,
    #[serde(rename = "absoluteSlot")]
    pub absolute_slot: u64,
    #[serde(rename = "blockHeight", default)]
    pub block_height: Option<u64>,
}
