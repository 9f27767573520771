use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::rpc::wire::{Block, Instruction, TokenBalance};

/// Per-transaction state machine that identifies newly created token
/// mints and tagged pump mints across instructions, inner instructions,
/// token-balance deltas, and log messages (spec §4.9).
#[derive(Debug, Default)]
pub struct MintExtractor {
    all_mints: HashSet<String>,
    new_mints: HashSet<String>,
    pump_tokens: HashSet<String>,
    stats: ExtractorStats,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractorStats {
    pub mint_operations: u64,
    pub token_operations: u64,
}

#[derive(Debug, Clone)]
pub struct MintExtractionResults {
    pub all_mints: Vec<String>,
    pub new_mints: Vec<String>,
    pub pump_tokens: Vec<String>,
    pub total_all_mints: usize,
    pub total_new_mints: usize,
    pub total_pump_tokens: usize,
    pub mint_operations: u64,
    pub token_operations: u64,
}

const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const TOKEN_2022_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBxvf9Ss623VQ5DA";
const METADATA_PROGRAM_ID: &str = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";

const DISCRIMINATOR_INITIALIZE_MINT: char = '0';
const DISCRIMINATOR_INITIALIZE_MINT_2: char = '8';

fn token_programs() -> &'static HashSet<&'static str> {
    static SET: Lazy<HashSet<&'static str>> =
        Lazy::new(|| HashSet::from([TOKEN_PROGRAM, TOKEN_2022_PROGRAM]));
    &SET
}

/// Known excluded mints (wrapped SOL, USDC, USDT, BONK, PYTH) plus
/// system/utility program IDs (system, vote, config, compute-budget,
/// memo) that must never be registered as a mint candidate.
fn known_excluded() -> &'static HashSet<&'static str> {
    static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
        HashSet::from([
            "So11111111111111111111111111111111111111112",
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
            "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
            "7i5KKsX2weiTkry7jA4ZwSJ4zRWqW2PPkiupCAMMQCLQ",
            "11111111111111111111111111111111",
            "Vote111111111111111111111111111111111111111",
            "Config1111111111111111111111111111111111111",
            "ComputeBudget111111111111111111111111111111",
            "Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo",
            "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr",
        ])
    });
    &SET
}

/// Base58-decodes `address` and checks it decodes to exactly 32 bytes
/// (spec §4.9's shared validator, §3 invariant 4).
pub fn is_valid_base58_mint(address: &str) -> bool {
    bs58::decode(address)
        .into_vec()
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

fn enhanced_mint_validation(address: &str) -> bool {
    is_valid_base58_mint(address) && !known_excluded().contains(address)
}

impl MintExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds every transaction in `block` through the extractor,
    /// tolerating malformed individual transactions.
    pub fn process_block(&mut self, block: &Block) {
        for tx_wrapper in &block.transactions {
            self.process_transaction(
                &tx_wrapper.transaction.message.instructions,
                &tx_wrapper.transaction.message.account_keys,
                tx_wrapper.meta.as_ref(),
            );
        }
    }

    fn process_transaction(
        &mut self,
        instructions: &[Instruction],
        account_keys: &[String],
        meta: Option<&crate::rpc::wire::TransactionMeta>,
    ) {
        let full_account_keys = full_account_keys(account_keys, meta);
        if full_account_keys.is_empty() {
            return;
        }

        let inner_instructions: Vec<&Instruction> = meta
            .map(|m| m.inner_instructions.iter().flat_map(|g| g.instructions.iter()).collect())
            .unwrap_or_default();

        // 1. Direct instructions + inner instructions.
        for ix in instructions.iter().chain(inner_instructions) {
            if let Some(mint) = extract_mint_from_instruction(ix, &full_account_keys) {
                self.register_mint(&mint);
            }
        }

        let Some(meta) = meta else { return };

        // 2. Token-balance tracking: every observed mint enters all_mints,
        // regardless of whether it changed between pre and post.
        for balance in meta.pre_token_balances.iter().chain(meta.post_token_balances.iter()) {
            if enhanced_mint_validation(&balance.mint) {
                self.all_mints.insert(balance.mint.clone());
            }
        }
        for mint in analyze_token_balance_deltas(&meta.pre_token_balances, &meta.post_token_balances) {
            self.register_mint(&mint);
        }

        // 3. Log-message scan.
        for mint in process_log_messages(&meta.log_messages) {
            self.register_mint(&mint);
        }

        // 4. Metadata-program fallback: only consulted when a top-level
        // instruction actually targets the metadata program.
        let saw_metadata_instruction = instructions
            .iter()
            .any(|ix| is_metadata_instruction(ix, &full_account_keys));
        if saw_metadata_instruction {
            if let Some(mint) = extract_metadata_mint(&meta.log_messages) {
                self.register_mint(&mint);
            }
        }
    }

    fn register_mint(&mut self, address: &str) {
        if !enhanced_mint_validation(address) {
            return;
        }
        self.all_mints.insert(address.to_string());

        if !self.new_mints.contains(address) {
            self.new_mints.insert(address.to_string());
            self.stats.mint_operations += 1;
        }

        if address.to_lowercase().ends_with("pump") {
            self.pump_tokens.insert(address.to_string());
        }
    }

    pub fn results(&self) -> MintExtractionResults {
        MintExtractionResults {
            all_mints: self.all_mints.iter().cloned().collect(),
            new_mints: self.new_mints.iter().cloned().collect(),
            pump_tokens: self.pump_tokens.iter().cloned().collect(),
            total_all_mints: self.all_mints.len(),
            total_new_mints: self.new_mints.len(),
            total_pump_tokens: self.pump_tokens.len(),
            mint_operations: self.stats.mint_operations,
            token_operations: self.stats.token_operations,
        }
    }
}

fn full_account_keys(
    account_keys: &[String],
    meta: Option<&crate::rpc::wire::TransactionMeta>,
) -> Vec<String> {
    let mut keys: Vec<String> = account_keys.to_vec();
    if let Some(loaded) = meta.and_then(|m| m.loaded_addresses.as_ref()) {
        keys.extend(loaded.writable.iter().cloned());
        keys.extend(loaded.readonly.iter().cloned());
    }
    keys
}

fn is_initialize_mint(instruction: &Instruction) -> bool {
    instruction
        .data
        .chars()
        .next()
        .map(|d| d == DISCRIMINATOR_INITIALIZE_MINT || d == DISCRIMINATOR_INITIALIZE_MINT_2)
        .unwrap_or(false)
}

fn is_metadata_instruction(instruction: &Instruction, account_keys: &[String]) -> bool {
    account_keys
        .get(instruction.program_id_index)
        .map(|id| id == METADATA_PROGRAM_ID)
        .unwrap_or(false)
}

/// The mint account is the first account of a token-program
/// `initializeMint`/`initializeMint2` instruction.
fn extract_mint_from_instruction(instruction: &Instruction, account_keys: &[String]) -> Option<String> {
    let program_id = account_keys.get(instruction.program_id_index)?;
    if !token_programs().contains(program_id.as_str()) {
        return None;
    }
    if !is_initialize_mint(instruction) {
        return None;
    }
    if instruction.accounts.len() < 2 {
        return None;
    }
    let mint_index = *instruction.accounts.first()?;
    let candidate = account_keys.get(mint_index)?;
    if enhanced_mint_validation(candidate) {
        Some(candidate.clone())
    } else {
        None
    }
}

fn analyze_token_balance_deltas(pre: &[TokenBalance], post: &[TokenBalance]) -> HashSet<String> {
    let mut new_mints = HashSet::new();
    for (pre, post) in pre.iter().zip(post.iter()) {
        if pre.mint != post.mint && enhanced_mint_validation(&post.mint) {
            new_mints.insert(post.mint.clone());
        }
    }
    new_mints
}

fn process_log_messages(logs: &[String]) -> HashSet<String> {
    let mut mints = HashSet::new();
    for log in logs {
        if log.contains("initializeMint") || log.contains("createMetadata") {
            if let Some(candidate) = log.split_whitespace().nth(2) {
                if enhanced_mint_validation(candidate) {
                    mints.insert(candidate.to_string());
                }
            }
        }
    }
    mints
}

fn extract_metadata_mint(logs: &[String]) -> Option<String> {
    for log in logs {
        if log.contains("initializeMint") {
            if let Some(candidate) = log.split_whitespace().nth(2) {
                if is_valid_base58_mint(candidate) {
                    return Some(candidate.to_string());
                }
            }
        } else if log.contains("createMetadata") {
            if let Some(candidate) = log.split_whitespace().nth(3) {
                if is_valid_base58_mint(candidate) {
                    return Some(candidate.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::wire::{
        Block, BlockTransaction, Instruction, TransactionEnvelope, TransactionMessage,
        TransactionMeta,
    };

    fn initialize_mint_tx(mint: &str) -> BlockTransaction {
        BlockTransaction {
            transaction: TransactionEnvelope {
                message: TransactionMessage {
                    account_keys: vec![TOKEN_PROGRAM.to_string(), mint.to_string(), "authority".to_string()],
                    instructions: vec![Instruction {
                        program_id_index: 0,
                        accounts: vec![1, 2],
                        data: "0".to_string(),
                    }],
                },
            },
            meta: Some(TransactionMeta {
                inner_instructions: vec![],
                pre_token_balances: vec![],
                post_token_balances: vec![],
                log_messages: vec![],
                loaded_addresses: None,
            }),
        }
    }

    #[test]
    fn extracts_new_mint_from_initialize_mint_instruction() {
        let mint = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
        let block = Block {
            parent_slot: Some(999),
            block_time: Some(0),
            transactions: vec![initialize_mint_tx(mint)],
        };
        let mut extractor = MintExtractor::new();
        extractor.process_block(&block);
        let results = extractor.results();
        assert_eq!(results.new_mints, vec![mint.to_string()]);
        assert_eq!(results.total_pump_tokens, 0);
    }

    #[test]
    fn excludes_known_mints() {
        let block = Block {
            parent_slot: Some(1),
            block_time: Some(0),
            transactions: vec![initialize_mint_tx("So11111111111111111111111111111111111111112")],
        };
        let mut extractor = MintExtractor::new();
        extractor.process_block(&block);
        assert!(extractor.results().all_mints.is_empty());
    }

    #[test]
    fn pump_tokens_is_always_a_subset_of_all_mints() {
        // register_mint only ever inserts into pump_tokens after the same
        // address has already entered all_mints, so this holds regardless
        // of which valid mint happens to end in "pump".
        let mint = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
        let mut extractor = MintExtractor::new();
        extractor.register_mint(mint);
        let results = extractor.results();
        for p in &results.pump_tokens {
            assert!(results.all_mints.contains(p));
        }
    }

    #[test]
    fn repeated_registration_does_not_inflate_mint_operations() {
        let mint = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
        let mut extractor = MintExtractor::new();
        extractor.register_mint(mint);
        extractor.register_mint(mint);
        assert_eq!(extractor.results().mint_operations, 1);
    }
}
