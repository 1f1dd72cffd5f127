//! Request and response models exchanged with the chain RPC capability.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{name::Name, transaction::Transaction};

/// Chain head summary returned by `get_info`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Node software version.
    #[serde(default)]
    pub server_version: String,
    /// Chain id used to bind signatures to this chain.
    pub chain_id: String,
    /// Current head block number.
    pub head_block_num: u32,
    /// Last irreversible block number.
    pub last_irreversible_block_num: u32,
    /// Last irreversible block id.
    #[serde(default)]
    pub last_irreversible_block_id: String,
    /// Current head block id.
    pub head_block_id: String,
    /// Head block timestamp (`YYYY-MM-DDTHH:MM:SS.sss`, UTC).
    pub head_block_time: String,
    /// Producer of the head block.
    #[serde(default)]
    pub head_block_producer: String,
}

/// Subset of a block returned by `get_block` that TAPOS derivation needs.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block id (hex).
    pub id: String,
    /// Block number.
    pub block_num: u32,
    /// Reference block prefix; derived from `id` when the node omits it.
    #[serde(default)]
    pub ref_block_prefix: Option<u32>,
    /// Block timestamp.
    #[serde(default)]
    pub timestamp: String,
    /// Block producer.
    #[serde(default)]
    pub producer: String,
}

impl BlockInfo {
    /// Returns the reference block prefix, deriving it from bytes 8..12 of the block id when the
    /// node did not report it.
    #[must_use]
    pub fn reference_prefix(&self) -> Option<u32> {
        if let Some(prefix) = self.ref_block_prefix {
            return Some(prefix);
        }
        let bytes = hex::decode(&self.id).ok()?;
        let prefix: [u8; 4] = bytes.get(8..12)?.try_into().ok()?;
        Some(u32::from_le_bytes(prefix))
    }
}

/// Raw ABI as returned by `get_raw_abi`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RawAbi {
    /// Contract account.
    pub account_name: Name,
    /// SHA-256 of the contract code (hex).
    #[serde(default)]
    pub code_hash: String,
    /// SHA-256 of the packed ABI bytes (hex).
    pub abi_hash: String,
    /// Base64-encoded packed ABI; absent when no contract is deployed.
    #[serde(default)]
    pub abi: Option<String>,
}

/// Input to `get_required_keys`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequiredKeysRequest {
    /// Prepared transaction in chain JSON layout.
    pub transaction: Transaction,
    /// Public keys the signing capability can sign with.
    pub available_keys: Vec<String>,
    /// Packed form of `transaction` (hex).
    #[serde(skip)]
    pub packed_transaction: String,
}

/// Body of `get_required_keys` responses.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct RequiredKeysResponse {
    /// Keys the chain requires, in chain order.
    pub required_keys: Vec<String>,
}

/// Input to `push_transaction`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct PushTransactionRequest {
    /// Signatures over the packed transaction, in required-key order.
    pub signatures: Vec<String>,
    /// Compression flag; always zero (none).
    pub compression: u8,
    /// Packed context-free data (hex, possibly empty).
    pub packed_context_free_data: String,
    /// Packed transaction (hex).
    pub packed_trx: String,
}

/// Execution receipt header inside a processed transaction.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceiptHeader {
    /// Execution status (`executed`, `soft_fail`, `hard_fail`, `delayed`, `expired`).
    pub status: String,
    /// Billed CPU in microseconds.
    #[serde(default)]
    pub cpu_usage_us: u64,
    /// Billed NET in 8-byte words.
    #[serde(default)]
    pub net_usage_words: u64,
}

/// Chain trace of a pushed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    /// Transaction id.
    #[serde(default)]
    pub id: String,
    /// Block the transaction was included in.
    #[serde(default)]
    pub block_num: u32,
    /// Timestamp of that block.
    #[serde(default)]
    pub block_time: String,
    /// Execution receipt.
    #[serde(default)]
    pub receipt: Option<TransactionReceiptHeader>,
    /// Wall-clock execution time in microseconds.
    #[serde(default)]
    pub elapsed: u64,
    /// Exception reported inside the trace, if any.
    #[serde(default)]
    pub except: Option<Value>,
}

/// Response of `push_transaction`; the receipt surfaced to callers of `broadcast`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushTransactionResponse {
    /// Transaction id assigned by the chain.
    pub transaction_id: String,
    /// Execution trace.
    pub processed: ProcessedTransaction,
}

impl PushTransactionResponse {
    /// Returns the block the transaction was included in.
    #[must_use]
    pub const fn block_num(&self) -> u32 {
        self.processed.block_num
    }

    /// Returns the execution status when the chain reported one.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.processed
            .receipt
            .as_ref()
            .map(|receipt| receipt.status.as_str())
    }
}
