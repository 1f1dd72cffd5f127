//! Processor states and the top-level error type.

use std::fmt;

use thiserror::Error;

use crate::{
    name::Name,
    providers::{
        AbiProviderError, ChainError, RpcProviderError, SerializationProviderError,
    },
    signing::SignatureProviderError,
    transaction::TransactionError,
};

/// Pipeline position of one processor.
///
/// Ordering follows pipeline progress; `Failed` sorts last.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ProcessorState {
    /// Nothing fetched or packed yet.
    Empty,
    /// Reference block and expiration are set.
    Prepared,
    /// Packed transaction is current.
    Serialized,
    /// Signatures cover the current packed transaction.
    Signed,
    /// Chain accepted the transaction.
    Broadcast,
    /// A fatal error ended the pipeline.
    Failed,
}

impl ProcessorState {
    /// Returns true for states no step can leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Broadcast | Self::Failed)
    }

    /// Returns a stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Prepared => "prepared",
            Self::Serialized => "serialized",
            Self::Signed => "signed",
            Self::Broadcast => "broadcast",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error families callers typically branch on.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorCategory {
    /// Invalid input when building a processor or transaction.
    Construction,
    /// Step invoked out of order or on a terminal processor.
    InvalidState,
    /// Chain head or reference block could not be obtained.
    ChainInfo,
    /// ABI resolution or encoding failed.
    Serialization,
    /// Keys could not be resolved or signing failed.
    Signing,
    /// Chain rejected the transaction (unrecoverable, or recoverable with retries exhausted).
    ChainRejection,
    /// Push failed below the chain layer.
    Broadcast,
}

/// Transaction processing errors.
#[derive(Debug, Error)]
pub enum TransactionProcessorError {
    /// Preset transaction was rejected.
    #[error("invalid transaction: {source}")]
    Construction {
        /// Validation failure.
        source: TransactionError,
    },
    /// Step is not allowed in the current state.
    #[error("`{operation}` is not allowed while the processor is {state}")]
    InvalidState {
        /// Requested step.
        operation: &'static str,
        /// Current state.
        state: ProcessorState,
    },
    /// `prepare` was called before any action was added.
    #[error("transaction has no actions")]
    NoActions,
    /// Chain info or reference block fetch failed.
    #[error("failed to fetch chain info: {source}")]
    ChainInfo {
        /// RPC failure.
        source: RpcProviderError,
    },
    /// Chain info or block payload could not be used.
    #[error("malformed chain info: {message}")]
    MalformedChainInfo {
        /// Human-readable description.
        message: String,
    },
    /// Node reported a different chain than the pinned one.
    #[error("chain id mismatch: expected {expected}, node reported {actual}")]
    ChainIdMismatch {
        /// Pinned chain id.
        expected: String,
        /// Chain id reported by the node.
        actual: String,
    },
    /// ABI of an action's account could not be resolved.
    #[error("failed to resolve abi for action `{account}::{action}`: {source}")]
    AbiResolution {
        /// Contract account.
        account: Name,
        /// Action name.
        action: Name,
        /// ABI capability failure.
        source: AbiProviderError,
    },
    /// Action payload could not be packed.
    #[error("failed to serialize data of action `{account}::{action}`: {source}")]
    ActionSerialization {
        /// Contract account.
        account: Name,
        /// Action name.
        action: Name,
        /// Serialization failure.
        source: SerializationProviderError,
    },
    /// Transaction or context-free data could not be packed.
    #[error("failed to serialize transaction: {source}")]
    TransactionSerialization {
        /// Serialization failure.
        source: SerializationProviderError,
    },
    /// Signing capability could not list its keys.
    #[error("failed to list available keys: {source}")]
    AvailableKeys {
        /// Signing failure.
        source: SignatureProviderError,
    },
    /// Signing capability holds no keys.
    #[error("signature provider has no available keys")]
    NoAvailableKeys,
    /// Required keys could not be fetched.
    #[error("failed to fetch required keys: {source}")]
    RequiredKeys {
        /// RPC failure.
        source: RpcProviderError,
    },
    /// None of the available keys can authorize the transaction.
    #[error("no available key is required to authorize the transaction")]
    NoRequiredKeys,
    /// Signing capability failed or declined.
    #[error("failed to sign transaction: {source}")]
    SignatureRequest {
        /// Signing failure.
        source: SignatureProviderError,
    },
    /// Signing capability returned the wrong number of signatures.
    #[error("signer returned {received} signatures for {required} required keys")]
    SignatureCountMismatch {
        /// Required key count.
        required: usize,
        /// Returned signature count.
        received: usize,
    },
    /// Signing capability altered the transaction without permission.
    #[error("signer modified the transaction but modification is not allowed")]
    TransactionModified,
    /// Signer-modified transaction could not be decoded.
    #[error("failed to decode signer-modified transaction: {source}")]
    ModifiedTransactionDecode {
        /// Serialization failure.
        source: SerializationProviderError,
    },
    /// Chain rejected the transaction with an unrecoverable error.
    #[error("transaction rejected: {source}")]
    ChainRejected {
        /// Chain-reported error, verbatim.
        source: ChainError,
    },
    /// Chain kept rejecting the transaction with recoverable errors.
    #[error("transaction rejected after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Push attempts made.
        attempts: u32,
        /// Last chain-reported error, verbatim.
        source: ChainError,
    },
    /// Push failed below the chain layer.
    #[error("failed to push transaction: {source}")]
    Broadcast {
        /// RPC failure.
        source: RpcProviderError,
    },
}

impl TransactionProcessorError {
    /// Returns the error family.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Construction { .. } | Self::NoActions => ErrorCategory::Construction,
            Self::InvalidState { .. } => ErrorCategory::InvalidState,
            Self::ChainInfo { .. }
            | Self::MalformedChainInfo { .. }
            | Self::ChainIdMismatch { .. } => ErrorCategory::ChainInfo,
            Self::AbiResolution { .. }
            | Self::ActionSerialization { .. }
            | Self::TransactionSerialization { .. } => ErrorCategory::Serialization,
            Self::AvailableKeys { .. }
            | Self::NoAvailableKeys
            | Self::RequiredKeys { .. }
            | Self::NoRequiredKeys
            | Self::SignatureRequest { .. }
            | Self::SignatureCountMismatch { .. }
            | Self::TransactionModified
            | Self::ModifiedTransactionDecode { .. } => ErrorCategory::Signing,
            Self::ChainRejected { .. } | Self::RetriesExhausted { .. } => {
                ErrorCategory::ChainRejection
            }
            Self::Broadcast { .. } => ErrorCategory::Broadcast,
        }
    }

    /// Returns the chain-reported error for chain rejections.
    #[must_use]
    pub const fn chain_error(&self) -> Option<&ChainError> {
        match self {
            Self::ChainRejected { source } | Self::RetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}
