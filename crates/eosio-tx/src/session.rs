//! Session binding one set of capabilities and producing processors.

use std::sync::Arc;

use crate::{
    config::ProcessorConfig,
    processor::{TransactionProcessor, TransactionProcessorError},
    providers::{AbiProvider, RpcProvider, SerializationProvider},
    signing::SignatureProvider,
    transaction::Transaction,
};

/// Factory for independent transaction processors sharing one set of capabilities.
///
/// Every processor created here uses the same capability instances, so the ABI cache and any
/// pooled RPC transport are shared between them.
#[derive(Clone)]
pub struct TransactionSession {
    /// Serialization capability.
    serialization: Arc<dyn SerializationProvider>,
    /// RPC capability.
    rpc: Arc<dyn RpcProvider>,
    /// ABI capability.
    abi: Arc<dyn AbiProvider>,
    /// Signing capability.
    signer: Arc<dyn SignatureProvider>,
    /// Settings handed to each new processor.
    config: ProcessorConfig,
}

impl TransactionSession {
    /// Creates a session with default processor settings.
    #[must_use]
    pub fn new(
        serialization: Arc<dyn SerializationProvider>,
        rpc: Arc<dyn RpcProvider>,
        abi: Arc<dyn AbiProvider>,
        signer: Arc<dyn SignatureProvider>,
    ) -> Self {
        Self {
            serialization,
            rpc,
            abi,
            signer,
            config: ProcessorConfig::default(),
        }
    }

    /// Replaces the settings used for new processors.
    #[must_use]
    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the settings used for new processors.
    #[must_use]
    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Returns the shared serialization capability.
    #[must_use]
    pub fn serialization_provider(&self) -> Arc<dyn SerializationProvider> {
        Arc::clone(&self.serialization)
    }

    /// Returns the shared RPC capability.
    #[must_use]
    pub fn rpc_provider(&self) -> Arc<dyn RpcProvider> {
        Arc::clone(&self.rpc)
    }

    /// Returns the shared ABI capability.
    #[must_use]
    pub fn abi_provider(&self) -> Arc<dyn AbiProvider> {
        Arc::clone(&self.abi)
    }

    /// Returns the shared signing capability.
    #[must_use]
    pub fn signature_provider(&self) -> Arc<dyn SignatureProvider> {
        Arc::clone(&self.signer)
    }

    /// Creates a processor with an empty transaction.
    #[must_use]
    pub fn transaction_processor(&self) -> TransactionProcessor {
        TransactionProcessor::new(
            Arc::clone(&self.serialization),
            Arc::clone(&self.rpc),
            Arc::clone(&self.abi),
            Arc::clone(&self.signer),
        )
        .with_config(self.config.clone())
    }

    /// Creates a processor seeded with `transaction`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionProcessorError::Construction`] when the transaction fails validation.
    pub fn transaction_processor_with(
        &self,
        transaction: Transaction,
    ) -> Result<TransactionProcessor, TransactionProcessorError> {
        self.transaction_processor().with_transaction(transaction)
    }
}

impl std::fmt::Debug for TransactionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
