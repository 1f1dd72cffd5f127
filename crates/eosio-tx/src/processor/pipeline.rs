//! Transaction processor pipeline: prepare, serialize, sign, broadcast.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{NaiveDateTime, TimeDelta, Timelike};

use super::types::{ProcessorState, TransactionProcessorError};
use crate::{
    config::ProcessorConfig,
    models::{ChainInfo, PushTransactionRequest, PushTransactionResponse, RequiredKeysRequest},
    name::Name,
    providers::{
        AbiProvider, ActionDataRequest, RpcProvider, RpcProviderError, SerializationProvider,
    },
    retry::RejectionClass,
    signing::{AbiEntry, SignatureProvider, TransactionSignatureRequest},
    transaction::{Action, ActionData, Transaction},
};

/// Packed artifacts of one serialization pass.
#[derive(Debug, Clone, Eq, PartialEq)]
struct PackedTransaction {
    /// Packed transaction (hex).
    packed_trx: String,
    /// Packed context-free data (hex), when the transaction carries any.
    packed_context_free_data: Option<String>,
}

/// Drives one transaction through prepare, serialize, sign, and broadcast.
///
/// A processor is single-owner; independent processors may run concurrently against the same
/// capability instances.
pub struct TransactionProcessor {
    /// Serialization capability.
    serialization: Arc<dyn SerializationProvider>,
    /// RPC capability.
    rpc: Arc<dyn RpcProvider>,
    /// ABI capability.
    abi: Arc<dyn AbiProvider>,
    /// Signing capability.
    signer: Arc<dyn SignatureProvider>,
    /// Processor settings.
    config: ProcessorConfig,
    /// Transaction being processed.
    transaction: Transaction,
    /// Current pipeline state.
    state: ProcessorState,
    /// Last packed form.
    packed: Option<PackedTransaction>,
    /// Set when the transaction changed after `packed` was produced.
    packed_stale: bool,
    /// ABIs resolved while serializing, by account.
    abis: BTreeMap<Name, Arc<str>>,
    /// Signatures over the current packed form.
    signatures: Vec<String>,
    /// Chain id learned from `get_info`.
    chain_id: Option<String>,
    /// Keys held by the signing capability.
    available_keys: Vec<String>,
    /// Keys the chain requires for the current packed form.
    required_keys: Vec<String>,
    /// Pipeline restarts performed after recoverable rejections.
    retry_count: u32,
}

impl TransactionProcessor {
    /// Creates a processor with an empty transaction and default settings.
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
            transaction: Transaction::new(),
            state: ProcessorState::Empty,
            packed: None,
            packed_stale: false,
            abis: BTreeMap::new(),
            signatures: Vec::new(),
            chain_id: None,
            available_keys: Vec::new(),
            required_keys: Vec::new(),
            retry_count: 0,
        }
    }

    /// Replaces processor settings.
    #[must_use]
    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Seeds the processor with a caller-built transaction.
    ///
    /// Everything derived from a previous transaction is dropped and the processor restarts from
    /// `Empty`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionProcessorError::Construction`] when the transaction fails validation.
    pub fn with_transaction(
        mut self,
        transaction: Transaction,
    ) -> Result<Self, TransactionProcessorError> {
        transaction
            .validate()
            .map_err(|source| TransactionProcessorError::Construction { source })?;
        self.transaction = transaction;
        self.packed = None;
        self.packed_stale = false;
        self.abis.clear();
        self.signatures.clear();
        self.required_keys.clear();
        self.retry_count = 0;
        self.state = ProcessorState::Empty;
        Ok(self)
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> ProcessorState {
        self.state
    }

    /// Returns the number of pipeline restarts performed so far.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the transaction being processed.
    #[must_use]
    pub const fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Returns processor settings.
    #[must_use]
    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Returns the packed transaction when it matches the current transaction.
    #[must_use]
    pub fn serialized_transaction(&self) -> Option<&str> {
        self.fresh_packed().map(|packed| packed.packed_trx.as_str())
    }

    /// Returns signatures over the current packed transaction.
    #[must_use]
    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    /// Returns the chain id learned from the node.
    #[must_use]
    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    /// Returns the current transaction in chain JSON layout.
    ///
    /// # Errors
    ///
    /// Returns the JSON encoder error.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.transaction)
    }

    /// Appends authorized actions.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionProcessorError::InvalidState`] after broadcast or failure.
    pub fn add_actions<I>(&mut self, actions: I) -> Result<(), TransactionProcessorError>
    where
        I: IntoIterator<Item = Action>,
    {
        self.ensure_mutable("add_actions")?;
        self.transaction.actions.extend(actions);
        self.invalidate_packed();
        Ok(())
    }

    /// Appends context-free actions.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionProcessorError::InvalidState`] after broadcast or failure.
    pub fn add_context_free_actions<I>(
        &mut self,
        actions: I,
    ) -> Result<(), TransactionProcessorError>
    where
        I: IntoIterator<Item = Action>,
    {
        self.ensure_mutable("add_context_free_actions")?;
        self.transaction.context_free_actions.extend(actions);
        self.invalidate_packed();
        Ok(())
    }

    /// Appends context-free data blobs.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionProcessorError::InvalidState`] after broadcast or failure.
    pub fn add_context_free_data<I>(&mut self, blobs: I) -> Result<(), TransactionProcessorError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        self.ensure_mutable("add_context_free_data")?;
        self.transaction.context_free_data.extend(blobs);
        self.invalidate_packed();
        Ok(())
    }

    /// Sets the reference block and expiration from chain state unless already set.
    ///
    /// # Errors
    ///
    /// Returns a chain-info error when the node cannot be reached, reports malformed data, or
    /// reports a chain other than the pinned one.
    pub async fn prepare(&mut self) -> Result<(), TransactionProcessorError> {
        self.ensure_mutable("prepare")?;
        if self.transaction.actions.is_empty() {
            return Err(TransactionProcessorError::NoActions);
        }
        if self.transaction.has_reference_block() {
            tracing::debug!(state = %self.state, "reference block already set");
            if self.state == ProcessorState::Empty {
                self.state = ProcessorState::Prepared;
            }
            return Ok(());
        }
        match self.fetch_reference_block().await {
            Ok(()) => Ok(()),
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Packs every human-readable payload and then the whole transaction.
    ///
    /// # Errors
    ///
    /// Returns a serialization error naming the offending action when its ABI cannot be resolved
    /// or encoding fails. The transaction is left unchanged in that case.
    pub async fn serialize(&mut self) -> Result<String, TransactionProcessorError> {
        if !matches!(
            self.state,
            ProcessorState::Prepared | ProcessorState::Serialized
        ) {
            return Err(self.invalid_state("serialize"));
        }
        match self.pack().await {
            Ok(packed_trx) => Ok(packed_trx),
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Signs the packed transaction with exactly the keys the chain requires.
    ///
    /// # Errors
    ///
    /// Returns a signing error when no key resolves, the signer declines or returns too few
    /// signatures, or the signer alters the transaction without permission.
    pub async fn sign(&mut self) -> Result<Vec<String>, TransactionProcessorError> {
        if self.state != ProcessorState::Serialized {
            return Err(self.invalid_state("sign"));
        }
        let Some(packed) = self.fresh_packed().cloned() else {
            return Err(self.invalid_state("sign"));
        };
        match self.sign_packed(packed).await {
            Ok(signatures) => Ok(signatures),
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Pushes the signed transaction, restarting the pipeline on recoverable rejections.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionProcessorError::ChainRejected`] for unrecoverable rejections,
    /// [`TransactionProcessorError::RetriesExhausted`] once the retry bound is hit, and any error
    /// of a restarted step.
    pub async fn broadcast(&mut self) -> Result<PushTransactionResponse, TransactionProcessorError> {
        if self.state != ProcessorState::Signed {
            return Err(self.invalid_state("broadcast"));
        }
        loop {
            let Some(request) = self.push_request() else {
                return Err(self.invalid_state("broadcast"));
            };
            let attempt = self.retry_count.saturating_add(1);
            let source = match self.rpc.push_transaction(&request).await {
                Ok(receipt) => {
                    self.state = ProcessorState::Broadcast;
                    tracing::info!(
                        transaction_id = %receipt.transaction_id,
                        block_num = receipt.block_num(),
                        attempt,
                        "transaction broadcast"
                    );
                    return Ok(receipt);
                }
                Err(RpcProviderError::Chain { source, .. }) => source,
                Err(source) => {
                    return Err(self.fail(TransactionProcessorError::Broadcast { source }));
                }
            };
            match self.config.retry.classify(&source) {
                RejectionClass::Unrecoverable => {
                    return Err(self.fail(TransactionProcessorError::ChainRejected { source }));
                }
                RejectionClass::Recoverable if !self.config.retry.allows_retry(self.retry_count) => {
                    return Err(self.fail(TransactionProcessorError::RetriesExhausted {
                        attempts: attempt,
                        source,
                    }));
                }
                RejectionClass::Recoverable => {
                    tracing::warn!(
                        code = source.code,
                        name = %source.name,
                        attempt,
                        max_retries = self.config.retry.max_retries,
                        "recoverable rejection; restarting pipeline"
                    );
                    self.retry_count = attempt;
                    self.reset_reference_block();
                    self.prepare().await?;
                    let _ = self.serialize().await?;
                    let _ = self.sign().await?;
                }
            }
        }
    }

    /// Signs and broadcasts a transaction the caller already serialized.
    ///
    /// # Errors
    ///
    /// Returns the first error of `sign` or `broadcast`.
    pub async fn sign_and_broadcast(
        &mut self,
    ) -> Result<PushTransactionResponse, TransactionProcessorError> {
        let _ = self.sign().await?;
        self.broadcast().await
    }

    /// Runs the remaining steps through broadcast.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of any step.
    pub async fn process(&mut self) -> Result<PushTransactionResponse, TransactionProcessorError> {
        if self.state < ProcessorState::Serialized {
            self.prepare().await?;
            let _ = self.serialize().await?;
        }
        if self.state == ProcessorState::Serialized {
            let _ = self.sign().await?;
        }
        self.broadcast().await
    }

    /// Fetches chain info and the reference block, then sets TAPOS fields and expiration.
    async fn fetch_reference_block(&mut self) -> Result<(), TransactionProcessorError> {
        let info = self.fetch_chain_info().await?;
        let head_time = parse_chain_time(&info.head_block_time)?;
        let block_num = if self.config.use_last_irreversible {
            info.last_irreversible_block_num
        } else {
            info.head_block_num
                .saturating_sub(self.config.blocks_behind)
                .max(1)
        };
        let block = self
            .rpc
            .get_block(block_num)
            .await
            .map_err(|source| TransactionProcessorError::ChainInfo { source })?;
        let ref_block_prefix = block.reference_prefix().ok_or_else(|| {
            TransactionProcessorError::MalformedChainInfo {
                message: format!("block {} has no usable reference prefix", block.block_num),
            }
        })?;
        let [low, high, _, _] = block.block_num.to_le_bytes();
        let ref_block_num = u16::from_le_bytes([low, high]);
        let expiration = TimeDelta::try_seconds(i64::from(self.config.expire_seconds))
            .and_then(|window| head_time.checked_add_signed(window))
            .and_then(|expiration| expiration.with_nanosecond(0))
            .ok_or_else(|| TransactionProcessorError::MalformedChainInfo {
                message: format!("expiration overflows head block time {head_time}"),
            })?;

        self.transaction.ref_block_num = Some(ref_block_num);
        self.transaction.ref_block_prefix = Some(ref_block_prefix);
        self.transaction.expiration = Some(expiration);
        self.invalidate_packed();
        self.state = ProcessorState::Prepared;
        tracing::debug!(
            block_num = block.block_num,
            ref_block_num,
            ref_block_prefix,
            expiration = %expiration,
            "transaction prepared"
        );
        Ok(())
    }

    /// Fetches `get_info`, enforcing the pinned chain id and remembering the reported one.
    async fn fetch_chain_info(&mut self) -> Result<ChainInfo, TransactionProcessorError> {
        let info = self
            .rpc
            .get_info()
            .await
            .map_err(|source| TransactionProcessorError::ChainInfo { source })?;
        if let Some(expected) = &self.config.chain_id
            && !expected.eq_ignore_ascii_case(&info.chain_id)
        {
            return Err(TransactionProcessorError::ChainIdMismatch {
                expected: expected.clone(),
                actual: info.chain_id,
            });
        }
        self.chain_id = Some(info.chain_id.clone());
        Ok(info)
    }

    /// Converts JSON payloads on a copy, then packs it; commits only when everything succeeds.
    async fn pack(&mut self) -> Result<String, TransactionProcessorError> {
        let mut transaction = self.transaction.clone();
        let mut abis = BTreeMap::new();
        for action in transaction
            .context_free_actions
            .iter_mut()
            .chain(transaction.actions.iter_mut())
        {
            self.pack_action_data(action, &mut abis).await?;
        }
        let packed_trx = self
            .serialization
            .serialize_transaction(&transaction)
            .map_err(|source| TransactionProcessorError::TransactionSerialization { source })?;
        let packed_context_free_data = if transaction.context_free_data.is_empty() {
            None
        } else {
            Some(
                self.serialization
                    .serialize_context_free_data(&transaction.context_free_data)
                    .map_err(|source| TransactionProcessorError::TransactionSerialization {
                        source,
                    })?,
            )
        };

        self.transaction = transaction;
        self.abis.extend(abis);
        self.packed = Some(PackedTransaction {
            packed_trx: packed_trx.clone(),
            packed_context_free_data,
        });
        self.packed_stale = false;
        self.signatures.clear();
        self.required_keys.clear();
        self.state = ProcessorState::Serialized;
        tracing::debug!(hex_len = packed_trx.len(), "transaction serialized");
        Ok(packed_trx)
    }

    /// Packs the payload of one action when it is still human-readable.
    async fn pack_action_data(
        &self,
        action: &mut Action,
        abis: &mut BTreeMap<Name, Arc<str>>,
    ) -> Result<(), TransactionProcessorError> {
        let ActionData::Json(data) = &action.data else {
            return Ok(());
        };
        let abi = match abis.get(&action.account) {
            Some(abi) => Arc::clone(abi),
            None => {
                let abi = self.abi.get_abi(&action.account).await.map_err(|source| {
                    TransactionProcessorError::AbiResolution {
                        account: action.account.clone(),
                        action: action.name.clone(),
                        source,
                    }
                })?;
                let _ = abis.insert(action.account.clone(), Arc::clone(&abi));
                abi
            }
        };
        let hex_data = self
            .serialization
            .serialize_action_data(&ActionDataRequest {
                abi: &abi,
                account: &action.account,
                name: &action.name,
                data,
            })
            .map_err(|source| TransactionProcessorError::ActionSerialization {
                account: action.account.clone(),
                action: action.name.clone(),
                source,
            })?;
        action.data = ActionData::Packed(hex_data);
        Ok(())
    }

    /// Resolves keys, requests signatures, and checks what the signer returned.
    async fn sign_packed(
        &mut self,
        packed: PackedTransaction,
    ) -> Result<Vec<String>, TransactionProcessorError> {
        let chain_id = if let Some(chain_id) = self.chain_id.clone() {
            chain_id
        } else {
            self.fetch_chain_info().await?.chain_id
        };
        if self.available_keys.is_empty() {
            let keys = self
                .signer
                .get_available_keys()
                .await
                .map_err(|source| TransactionProcessorError::AvailableKeys { source })?;
            if keys.is_empty() {
                return Err(TransactionProcessorError::NoAvailableKeys);
            }
            self.available_keys = keys;
        }
        if self.required_keys.is_empty() {
            let request = RequiredKeysRequest {
                transaction: self.transaction.clone(),
                available_keys: self.available_keys.clone(),
                packed_transaction: packed.packed_trx.clone(),
            };
            let required = self
                .rpc
                .get_required_keys(&request)
                .await
                .map_err(|source| TransactionProcessorError::RequiredKeys { source })?;
            if required.is_empty() {
                return Err(TransactionProcessorError::NoRequiredKeys);
            }
            self.required_keys = required;
        }

        let request = TransactionSignatureRequest {
            serialized_transaction: packed.packed_trx.clone(),
            packed_context_free_data: packed.packed_context_free_data.clone(),
            signing_public_keys: self.required_keys.clone(),
            chain_id,
            abis: self.signing_abis().await,
            is_modification_allowed: self.config.allow_transaction_modification,
        };
        let response = self
            .signer
            .sign_transaction(&request)
            .await
            .map_err(|source| TransactionProcessorError::SignatureRequest { source })?;
        if response.signatures.len() != self.required_keys.len() {
            return Err(TransactionProcessorError::SignatureCountMismatch {
                required: self.required_keys.len(),
                received: response.signatures.len(),
            });
        }
        if response.serialized_transaction != packed.packed_trx {
            if !self.config.allow_transaction_modification {
                return Err(TransactionProcessorError::TransactionModified);
            }
            let mut modified = self
                .serialization
                .deserialize_transaction(&response.serialized_transaction)
                .map_err(|source| TransactionProcessorError::ModifiedTransactionDecode {
                    source,
                })?;
            modified.context_free_data = std::mem::take(&mut self.transaction.context_free_data);
            self.transaction = modified;
            self.packed = Some(PackedTransaction {
                packed_trx: response.serialized_transaction,
                packed_context_free_data: packed.packed_context_free_data,
            });
            tracing::debug!("adopted signer-modified transaction");
        }

        self.signatures = response.signatures;
        self.state = ProcessorState::Signed;
        tracing::debug!(signatures = self.signatures.len(), "transaction signed");
        Ok(self.signatures.clone())
    }

    /// Returns ABIs for every contract account, resolving any not seen while serializing.
    ///
    /// Accounts whose ABI cannot be resolved are left out; their payloads are already packed.
    async fn signing_abis(&mut self) -> Vec<AbiEntry> {
        for account in self.transaction.contract_accounts() {
            if self.abis.contains_key(&account) {
                continue;
            }
            match self.abi.get_abi(&account).await {
                Ok(abi) => {
                    let _ = self.abis.insert(account, abi);
                }
                Err(error) => {
                    tracing::debug!(account = %account, error = %error, "abi unavailable for signer");
                }
            }
        }
        self.abis
            .iter()
            .map(|(account, abi)| AbiEntry {
                account: account.clone(),
                abi: Arc::clone(abi),
            })
            .collect()
    }

    /// Builds the push body from the current packed form and signatures.
    fn push_request(&self) -> Option<PushTransactionRequest> {
        let packed = self.fresh_packed()?;
        if self.signatures.is_empty() {
            return None;
        }
        Some(PushTransactionRequest {
            signatures: self.signatures.clone(),
            compression: 0,
            packed_context_free_data: packed.packed_context_free_data.clone().unwrap_or_default(),
            packed_trx: packed.packed_trx.clone(),
        })
    }

    /// Returns the packed form unless the transaction changed since it was produced.
    fn fresh_packed(&self) -> Option<&PackedTransaction> {
        self.packed.as_ref().filter(|_| !self.packed_stale)
    }

    /// Marks derived artifacts stale after the transaction changed.
    fn invalidate_packed(&mut self) {
        if self.packed.is_some() {
            self.packed_stale = true;
        }
        self.signatures.clear();
        self.required_keys.clear();
        if matches!(
            self.state,
            ProcessorState::Serialized | ProcessorState::Signed
        ) {
            self.state = ProcessorState::Prepared;
        }
    }

    /// Drops reference block fields so the next `prepare` fetches fresh chain state.
    fn reset_reference_block(&mut self) {
        self.transaction.clear_reference_block();
        self.invalidate_packed();
        self.state = ProcessorState::Prepared;
    }

    /// Rejects mutation and preparation once the pipeline ended.
    fn ensure_mutable(&self, operation: &'static str) -> Result<(), TransactionProcessorError> {
        if self.state.is_terminal() {
            return Err(self.invalid_state(operation));
        }
        Ok(())
    }

    /// Builds an out-of-order step error without changing state.
    const fn invalid_state(&self, operation: &'static str) -> TransactionProcessorError {
        TransactionProcessorError::InvalidState {
            operation,
            state: self.state,
        }
    }

    /// Moves to `Failed` and hands the error back.
    fn fail(&mut self, error: TransactionProcessorError) -> TransactionProcessorError {
        tracing::warn!(state = %self.state, error = %error, "transaction processing failed");
        self.state = ProcessorState::Failed;
        error
    }
}

impl std::fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionProcessor")
            .field("state", &self.state)
            .field("retry_count", &self.retry_count)
            .field("transaction", &self.transaction)
            .field("packed_stale", &self.packed_stale)
            .field("signatures", &self.signatures.len())
            .finish_non_exhaustive()
    }
}

/// Parses a chain timestamp (`2024-05-01T12:00:00.500`, optional trailing `Z`).
fn parse_chain_time(value: &str) -> Result<NaiveDateTime, TransactionProcessorError> {
    value
        .trim_end_matches('Z')
        .parse::<NaiveDateTime>()
        .map_err(|error| TransactionProcessorError::MalformedChainInfo {
            message: format!("head_block_time `{value}`: {error}"),
        })
}
