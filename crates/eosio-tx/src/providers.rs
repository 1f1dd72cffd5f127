//! Capability traits consumed by the transaction processor and their error types.
//!
//! The processor never talks to the chain, a key store, or an ABI codec directly. Each of those
//! effects sits behind one of the traits here so that any implementation (including test doubles)
//! can be plugged into a [`crate::TransactionSession`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    models::{
        BlockInfo, ChainInfo, PushTransactionRequest, PushTransactionResponse, RawAbi,
        RequiredKeysRequest,
    },
    name::Name,
    transaction::Transaction,
};

/// Boxed lower-level error preserved as an error source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Serialization capability errors.
#[derive(Debug, Error)]
pub enum SerializationProviderError {
    /// Packing the full transaction failed.
    #[error("failed to serialize transaction: {message}")]
    SerializeTransaction {
        /// Human-readable cause.
        message: String,
        /// Wrapped lower-level error.
        source: Option<BoxError>,
    },
    /// Unpacking a packed transaction failed.
    #[error("failed to deserialize transaction: {message}")]
    DeserializeTransaction {
        /// Human-readable cause.
        message: String,
        /// Wrapped lower-level error.
        source: Option<BoxError>,
    },
    /// Packing one action payload against its ABI failed.
    #[error("failed to serialize action data: {message}")]
    SerializeActionData {
        /// Human-readable cause.
        message: String,
        /// Wrapped lower-level error.
        source: Option<BoxError>,
    },
    /// Packing context-free data failed.
    #[error("failed to serialize context-free data: {message}")]
    SerializeContextFreeData {
        /// Human-readable cause.
        message: String,
        /// Wrapped lower-level error.
        source: Option<BoxError>,
    },
    /// Packing an ABI definition failed.
    #[error("failed to serialize abi: {message}")]
    SerializeAbi {
        /// Human-readable cause.
        message: String,
        /// Wrapped lower-level error.
        source: Option<BoxError>,
    },
    /// Decoding a packed ABI failed.
    #[error("failed to deserialize abi: {message}")]
    DeserializeAbi {
        /// Human-readable cause.
        message: String,
        /// Wrapped lower-level error.
        source: Option<BoxError>,
    },
}

/// Structured rejection reported by the chain.
#[derive(Debug, Error, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[error("chain error {code} `{name}`: {what}")]
pub struct ChainError {
    /// Chain exception code (e.g. `3040005`).
    pub code: i64,
    /// Chain exception name (e.g. `expired_tx_exception`).
    pub name: String,
    /// Short description.
    pub what: String,
    /// Detailed messages, innermost first.
    #[serde(default)]
    pub details: Vec<ChainErrorDetail>,
}

impl ChainError {
    /// Creates a chain error without details.
    #[must_use]
    pub fn new(code: i64, name: impl Into<String>, what: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            what: what.into(),
            details: Vec::new(),
        }
    }
}

/// One detail line of a [`ChainError`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChainErrorDetail {
    /// Detail message.
    pub message: String,
    /// Source file on the node.
    #[serde(default)]
    pub file: String,
    /// Source line on the node.
    #[serde(default)]
    pub line_number: u64,
    /// Method on the node.
    #[serde(default)]
    pub method: String,
}

/// RPC capability errors.
#[derive(Debug, Error)]
pub enum RpcProviderError {
    /// Endpoint could not be reached or the exchange failed below the chain layer.
    #[error("rpc `{method}` transport failure: {source}")]
    Transport {
        /// RPC method name.
        method: &'static str,
        /// Transport error.
        source: BoxError,
    },
    /// Endpoint answered with something that is not the expected payload.
    #[error("rpc `{method}` returned an invalid response: {message}")]
    InvalidResponse {
        /// RPC method name.
        method: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Chain processed the call and rejected it.
    #[error("rpc `{method}` rejected by chain: {source}")]
    Chain {
        /// RPC method name.
        method: &'static str,
        /// Chain-reported error.
        source: ChainError,
    },
}

impl RpcProviderError {
    /// Returns the chain-reported error when this is a chain rejection.
    #[must_use]
    pub const fn chain_error(&self) -> Option<&ChainError> {
        match self {
            Self::Chain { source, .. } => Some(source),
            Self::Transport { .. } | Self::InvalidResponse { .. } => None,
        }
    }
}

/// ABI capability errors.
#[derive(Debug, Error)]
pub enum AbiProviderError {
    /// Account has no deployed contract or ABI.
    #[error("account `{account}` has no abi")]
    NoAbi {
        /// Requested account.
        account: Name,
    },
    /// Fetching the raw ABI failed.
    #[error("failed to fetch abi for `{account}`: {source}")]
    Rpc {
        /// Requested account.
        account: Name,
        /// RPC failure.
        source: RpcProviderError,
    },
    /// Raw ABI was not valid base64.
    #[error("abi for `{account}` is not valid base64: {source}")]
    InvalidEncoding {
        /// Requested account.
        account: Name,
        /// Decoding error.
        source: base64::DecodeError,
    },
    /// Raw ABI bytes did not match the chain-reported hash.
    #[error("abi hash mismatch for `{account}`: expected {expected}, computed {actual}")]
    HashMismatch {
        /// Requested account.
        account: Name,
        /// Hash reported by the chain.
        expected: String,
        /// Hash of the received bytes.
        actual: String,
    },
    /// Packed ABI could not be decoded to its JSON definition.
    #[error("failed to decode abi for `{account}`: {source}")]
    Decode {
        /// Requested account.
        account: Name,
        /// Serialization failure.
        source: SerializationProviderError,
    },
}

/// Input to [`SerializationProvider::serialize_action_data`].
#[derive(Debug, Clone, Copy)]
pub struct ActionDataRequest<'request> {
    /// ABI definition (JSON) of `account`.
    pub abi: &'request str,
    /// Contract account.
    pub account: &'request Name,
    /// Action name.
    pub name: &'request Name,
    /// Human-readable payload.
    pub data: &'request Value,
}

/// Converts between human-readable and packed chain encodings.
pub trait SerializationProvider: Send + Sync {
    /// Packs a complete transaction and returns it as hex.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationProviderError::SerializeTransaction`] when encoding fails.
    fn serialize_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<String, SerializationProviderError>;

    /// Unpacks a hex transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationProviderError::DeserializeTransaction`] when decoding fails.
    fn deserialize_transaction(
        &self,
        packed_trx: &str,
    ) -> Result<Transaction, SerializationProviderError>;

    /// Packs one action payload using its account ABI and returns it as hex.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationProviderError::SerializeActionData`] when encoding fails.
    fn serialize_action_data(
        &self,
        request: &ActionDataRequest<'_>,
    ) -> Result<String, SerializationProviderError>;

    /// Packs context-free data blobs and returns them as hex.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationProviderError::SerializeContextFreeData`] when encoding fails.
    fn serialize_context_free_data(
        &self,
        data: &[Vec<u8>],
    ) -> Result<String, SerializationProviderError>;

    /// Packs an ABI JSON definition and returns it as hex.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationProviderError::SerializeAbi`] when encoding fails.
    fn serialize_abi(&self, abi_json: &str) -> Result<String, SerializationProviderError>;

    /// Decodes a packed ABI (hex) to its JSON definition.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationProviderError::DeserializeAbi`] when decoding fails.
    fn deserialize_abi(&self, abi_hex: &str) -> Result<String, SerializationProviderError>;
}

/// Chain RPC capability.
#[async_trait]
pub trait RpcProvider: Send + Sync {
    /// Returns the chain head summary.
    async fn get_info(&self) -> Result<ChainInfo, RpcProviderError>;

    /// Returns one block by number.
    async fn get_block(&self, block_num: u32) -> Result<BlockInfo, RpcProviderError>;

    /// Returns the raw ABI of an account.
    async fn get_raw_abi(&self, account: &Name) -> Result<RawAbi, RpcProviderError>;

    /// Returns the subset of available keys required to authorize the transaction, in chain order.
    async fn get_required_keys(
        &self,
        request: &RequiredKeysRequest,
    ) -> Result<Vec<String>, RpcProviderError>;

    /// Submits a signed packed transaction.
    async fn push_transaction(
        &self,
        request: &PushTransactionRequest,
    ) -> Result<PushTransactionResponse, RpcProviderError>;
}

/// ABI resolution capability.
///
/// Implementations shared between processors must be safe for concurrent use.
#[async_trait]
pub trait AbiProvider: Send + Sync {
    /// Returns the ABI definition (JSON) of `account`, fetching it when not cached.
    async fn get_abi(&self, account: &Name) -> Result<Arc<str>, AbiProviderError>;
}
