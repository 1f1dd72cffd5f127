#![forbid(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::indexing_slicing,
        clippy::missing_docs_in_private_items
    )
)]

//! Client-side transaction engine for EOSIO-style chains.
//!
//! A [`TransactionSession`] binds four capabilities (serialization, RPC, ABI, signing) and hands out
//! [`TransactionProcessor`]s that drive one transaction each through prepare, serialize, sign, and
//! broadcast, restarting the pipeline on recoverable chain rejections.

/// ABI capability with a shared per-account cache.
pub mod abi;
/// Processor settings and environment overrides.
pub mod config;
/// Tracing subscriber setup.
pub mod logging;
/// Chain API request and response models.
pub mod models;
/// Validated chain names.
pub mod name;
/// Transaction processor state machine.
pub mod processor;
/// Capability traits and their error types.
pub mod providers;
/// Chain rejection classification and retry bounds.
pub mod retry;
/// HTTP/JSON RPC capability.
pub mod rpc;
/// Processor factory.
pub mod session;
/// Signing boundary types.
pub mod signing;
/// Transaction entity and construction validation.
pub mod transaction;

#[cfg(test)]
/// Mock capabilities shared by unit tests.
mod test_support;

pub use abi::{AbiCacheEntry, CachingAbiProvider};
pub use config::ProcessorConfig;
pub use logging::init_tracing;
pub use models::{
    BlockInfo, ChainInfo, PushTransactionRequest, PushTransactionResponse, RawAbi,
    RequiredKeysRequest,
};
pub use name::{Name, NameError};
pub use processor::{ErrorCategory, ProcessorState, TransactionProcessor, TransactionProcessorError};
pub use providers::{
    AbiProvider, AbiProviderError, ActionDataRequest, BoxError, ChainError, RpcProvider,
    RpcProviderError, SerializationProvider, SerializationProviderError,
};
pub use retry::{RejectionClass, RetryPolicy};
pub use rpc::{HttpRpcConfig, HttpRpcProvider};
pub use session::TransactionSession;
pub use signing::{
    AbiEntry, SignatureProvider, SignatureProviderError, TransactionSignatureRequest,
    TransactionSignatureResponse,
};
pub use transaction::{Action, ActionData, PermissionLevel, Transaction, TransactionError};
