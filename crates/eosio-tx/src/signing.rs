//! Signing capability boundary types.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{name::Name, providers::BoxError};

/// Signing capability errors.
#[derive(Debug, Error)]
pub enum SignatureProviderError {
    /// A requested key is not held by the signer.
    #[error("signing key {key} is not available")]
    KeyUnavailable {
        /// Public key that could not be used.
        key: String,
    },
    /// The signer (or its user) declined to sign.
    #[error("signing declined: {message}")]
    Declined {
        /// Human-readable reason.
        message: String,
    },
    /// The signer failed for another reason.
    #[error("signer failure: {source}")]
    Failure {
        /// Underlying error.
        source: BoxError,
    },
}

/// ABI of one contract account referenced by a transaction.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AbiEntry {
    /// Contract account.
    pub account: Name,
    /// ABI definition (JSON).
    pub abi: Arc<str>,
}

/// Input to [`SignatureProvider::sign_transaction`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TransactionSignatureRequest {
    /// Packed transaction (hex) to sign.
    pub serialized_transaction: String,
    /// Packed context-free data (hex), included in the signing digest when present.
    pub packed_context_free_data: Option<String>,
    /// Keys to sign with, in the order the chain requires them.
    pub signing_public_keys: Vec<String>,
    /// Chain id the signatures are bound to.
    pub chain_id: String,
    /// ABIs of every contract account in the transaction.
    pub abis: Vec<AbiEntry>,
    /// Whether the signer may alter the transaction before signing.
    pub is_modification_allowed: bool,
}

/// Output of [`SignatureProvider::sign_transaction`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TransactionSignatureResponse {
    /// Packed transaction (hex) the signatures cover.
    pub serialized_transaction: String,
    /// One signature per requested key, in request order.
    pub signatures: Vec<String>,
}

/// Key management and signing capability.
#[async_trait]
pub trait SignatureProvider: Send + Sync {
    /// Returns every public key this signer can sign with.
    async fn get_available_keys(&self) -> Result<Vec<String>, SignatureProviderError>;

    /// Signs a packed transaction with exactly the requested keys.
    async fn sign_transaction(
        &self,
        request: &TransactionSignatureRequest,
    ) -> Result<TransactionSignatureResponse, SignatureProviderError>;
}
