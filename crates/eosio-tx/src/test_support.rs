//! Mock capabilities shared by unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{
    models::{
        BlockInfo, ChainInfo, ProcessedTransaction, PushTransactionRequest,
        PushTransactionResponse, RawAbi, RequiredKeysRequest, TransactionReceiptHeader,
    },
    name::Name,
    providers::{
        AbiProvider, AbiProviderError, ActionDataRequest, ChainError, RpcProvider,
        RpcProviderError, SerializationProvider, SerializationProviderError,
    },
    signing::{
        SignatureProvider, SignatureProviderError, TransactionSignatureRequest,
        TransactionSignatureResponse,
    },
    transaction::{Action, ActionData, PermissionLevel, Transaction},
};

pub(crate) const CHAIN_ID: &str = "aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906";

pub(crate) fn name(value: &str) -> Name {
    Name::new(value).expect("valid test name")
}

pub(crate) fn transfer(from: &str, to: &str, quantity: &str) -> Action {
    Action::new(
        name("eosio.token"),
        name("transfer"),
        vec![PermissionLevel::new(name(from), name("active"))],
        json!({"from": from, "to": to, "quantity": quantity, "memo": ""}),
    )
}

pub(crate) fn chain_info(head_block_num: u32, head_block_time: &str) -> ChainInfo {
    ChainInfo {
        server_version: "v5.0.0".to_owned(),
        chain_id: CHAIN_ID.to_owned(),
        head_block_num,
        last_irreversible_block_num: head_block_num.saturating_sub(300),
        last_irreversible_block_id: String::new(),
        head_block_id: format!("{head_block_num:08x}"),
        head_block_time: head_block_time.to_owned(),
        head_block_producer: "eosio".to_owned(),
    }
}

pub(crate) fn receipt(transaction_id: &str, block_num: u32) -> PushTransactionResponse {
    PushTransactionResponse {
        transaction_id: transaction_id.to_owned(),
        processed: ProcessedTransaction {
            id: transaction_id.to_owned(),
            block_num,
            block_time: "2024-05-01T12:00:01.000".to_owned(),
            receipt: Some(TransactionReceiptHeader {
                status: "executed".to_owned(),
                cpu_usage_us: 100,
                net_usage_words: 16,
            }),
            elapsed: 100,
            except: None,
        },
    }
}

pub(crate) fn expired() -> ChainError {
    ChainError::new(3_040_005, "expired_tx_exception", "Expired Transaction")
}

pub(crate) fn raw_abi_for(account: &str, abi_json: &str) -> RawAbi {
    use base64::Engine as _;
    RawAbi {
        account_name: name(account),
        code_hash: String::new(),
        abi_hash: hex::encode(Sha256::digest(abi_json.as_bytes())),
        abi: Some(base64::engine::general_purpose::STANDARD_NO_PAD.encode(abi_json)),
    }
}

/// Reads a call counter.
pub(crate) fn count(counter: &Mutex<u64>) -> u64 {
    counter.lock().map(|calls| *calls).unwrap_or_default()
}

/// Increments a call counter.
fn bump(counter: &Mutex<u64>) {
    if let Ok(mut calls) = counter.lock() {
        *calls = calls.saturating_add(1);
    }
}

/// Scripted outcome of one `push_transaction` call.
#[derive(Debug, Clone)]
pub(crate) enum PushOutcome {
    Accept,
    Reject(ChainError),
    Transport,
}

/// Mock RPC capability with scripted pushes and call counters.
#[derive(Debug)]
pub(crate) struct MockRpc {
    pub info: Mutex<ChainInfo>,
    pub info_fails: bool,
    pub required_keys: Mutex<Vec<String>>,
    pub push_script: Mutex<VecDeque<PushOutcome>>,
    pub default_push: PushOutcome,
    pub raw_abis: Mutex<HashMap<Name, RawAbi>>,
    pub abi_delay: Option<Duration>,
    pub get_info_calls: Mutex<u64>,
    pub get_block_calls: Mutex<u64>,
    pub get_raw_abi_calls: Mutex<u64>,
    pub required_keys_calls: Mutex<u64>,
    pub push_calls: Mutex<u64>,
    pub pushed: Mutex<Vec<PushTransactionRequest>>,
    pub required_requests: Mutex<Vec<RequiredKeysRequest>>,
}

impl MockRpc {
    pub(crate) fn new() -> Self {
        Self {
            info: Mutex::new(chain_info(1_000, "2024-05-01T12:00:00.500")),
            info_fails: false,
            required_keys: Mutex::new(vec!["PUB_K1_alice".to_owned()]),
            push_script: Mutex::new(VecDeque::new()),
            default_push: PushOutcome::Accept,
            raw_abis: Mutex::new(HashMap::new()),
            abi_delay: None,
            get_info_calls: Mutex::new(0),
            get_block_calls: Mutex::new(0),
            get_raw_abi_calls: Mutex::new(0),
            required_keys_calls: Mutex::new(0),
            push_calls: Mutex::new(0),
            pushed: Mutex::new(Vec::new()),
            required_requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_push_script<I>(self, outcomes: I) -> Self
    where
        I: IntoIterator<Item = PushOutcome>,
    {
        Self {
            push_script: Mutex::new(outcomes.into_iter().collect()),
            ..self
        }
    }

    pub(crate) fn with_default_push(self, default_push: PushOutcome) -> Self {
        Self {
            default_push,
            ..self
        }
    }

    pub(crate) fn with_required_keys(self, keys: &[&str]) -> Self {
        Self {
            required_keys: Mutex::new(keys.iter().map(|key| (*key).to_owned()).collect()),
            ..self
        }
    }

    pub(crate) fn with_raw_abi(self, raw: RawAbi) -> Self {
        if let Ok(mut abis) = self.raw_abis.lock() {
            let _ = abis.insert(raw.account_name.clone(), raw);
        }
        self
    }

    pub(crate) fn set_head(&self, head_block_num: u32, head_block_time: &str) {
        if let Ok(mut info) = self.info.lock() {
            *info = chain_info(head_block_num, head_block_time);
        }
    }
}

#[async_trait]
impl RpcProvider for MockRpc {
    async fn get_info(&self) -> Result<ChainInfo, RpcProviderError> {
        bump(&self.get_info_calls);
        if self.info_fails {
            return Err(RpcProviderError::Transport {
                method: "get_info",
                source: "connection refused".into(),
            });
        }
        self.info
            .lock()
            .map(|info| info.clone())
            .map_err(|_| RpcProviderError::InvalidResponse {
                method: "get_info",
                message: "poisoned".to_owned(),
            })
    }

    async fn get_block(&self, block_num: u32) -> Result<BlockInfo, RpcProviderError> {
        bump(&self.get_block_calls);
        Ok(BlockInfo {
            id: format!("{block_num:08x}"),
            block_num,
            ref_block_prefix: Some(block_num.wrapping_mul(7)),
            timestamp: String::new(),
            producer: "eosio".to_owned(),
        })
    }

    async fn get_raw_abi(&self, account: &Name) -> Result<RawAbi, RpcProviderError> {
        bump(&self.get_raw_abi_calls);
        if let Some(delay) = self.abi_delay {
            tokio::time::sleep(delay).await;
        }
        let raw = self
            .raw_abis
            .lock()
            .ok()
            .and_then(|abis| abis.get(account).cloned());
        Ok(raw.unwrap_or_else(|| RawAbi {
            account_name: account.clone(),
            code_hash: String::new(),
            abi_hash: String::new(),
            abi: None,
        }))
    }

    async fn get_required_keys(
        &self,
        request: &RequiredKeysRequest,
    ) -> Result<Vec<String>, RpcProviderError> {
        bump(&self.required_keys_calls);
        if let Ok(mut requests) = self.required_requests.lock() {
            requests.push(request.clone());
        }
        let required = self
            .required_keys
            .lock()
            .map(|keys| keys.clone())
            .unwrap_or_default();
        Ok(required
            .into_iter()
            .filter(|key| request.available_keys.contains(key))
            .collect())
    }

    async fn push_transaction(
        &self,
        request: &PushTransactionRequest,
    ) -> Result<PushTransactionResponse, RpcProviderError> {
        bump(&self.push_calls);
        if let Ok(mut pushed) = self.pushed.lock() {
            pushed.push(request.clone());
        }
        let outcome = self
            .push_script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.default_push.clone());
        match outcome {
            PushOutcome::Accept => {
                let transaction_id: String = request.packed_trx.chars().take(16).collect();
                Ok(receipt(&transaction_id, 1_001))
            }
            PushOutcome::Reject(source) => Err(RpcProviderError::Chain {
                method: "push_transaction",
                source,
            }),
            PushOutcome::Transport => Err(RpcProviderError::Transport {
                method: "push_transaction",
                source: "connection reset".into(),
            }),
        }
    }
}

/// Serializer that packs transactions as hex-encoded JSON.
///
/// It refuses to pack a transaction that still holds human-readable action data, which is what a
/// real ABI serializer would do as well.
#[derive(Debug, Default)]
pub(crate) struct JsonHexSerializer {
    pub action_data_calls: Mutex<u64>,
    pub transaction_calls: Mutex<u64>,
    pub fail_transaction: bool,
}

impl SerializationProvider for JsonHexSerializer {
    fn serialize_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<String, SerializationProviderError> {
        bump(&self.transaction_calls);
        if self.fail_transaction {
            return Err(SerializationProviderError::SerializeTransaction {
                message: "encoder exploded".to_owned(),
                source: None,
            });
        }
        let unpacked = transaction
            .context_free_actions
            .iter()
            .chain(transaction.actions.iter())
            .find(|action| !action.is_packed());
        if let Some(action) = unpacked {
            return Err(SerializationProviderError::SerializeTransaction {
                message: format!("action {}::{} is not packed", action.account, action.name),
                source: None,
            });
        }
        serde_json::to_vec(transaction)
            .map(hex::encode)
            .map_err(|source| SerializationProviderError::SerializeTransaction {
                message: "json encoding failed".to_owned(),
                source: Some(Box::new(source)),
            })
    }

    fn deserialize_transaction(
        &self,
        packed_trx: &str,
    ) -> Result<Transaction, SerializationProviderError> {
        let bytes = hex::decode(packed_trx).map_err(|source| {
            SerializationProviderError::DeserializeTransaction {
                message: "not hex".to_owned(),
                source: Some(Box::new(source)),
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|source| {
            SerializationProviderError::DeserializeTransaction {
                message: "not a transaction".to_owned(),
                source: Some(Box::new(source)),
            }
        })
    }

    fn serialize_action_data(
        &self,
        request: &ActionDataRequest<'_>,
    ) -> Result<String, SerializationProviderError> {
        bump(&self.action_data_calls);
        if !request.abi.contains(request.account.as_str()) {
            return Err(SerializationProviderError::SerializeActionData {
                message: format!("abi does not describe {}", request.account),
                source: None,
            });
        }
        Ok(hex::encode(format!(
            "{}:{}:{}",
            request.account, request.name, request.data
        )))
    }

    fn serialize_context_free_data(
        &self,
        data: &[Vec<u8>],
    ) -> Result<String, SerializationProviderError> {
        Ok(data.iter().map(hex::encode).collect::<Vec<_>>().join("00"))
    }

    fn serialize_abi(&self, abi_json: &str) -> Result<String, SerializationProviderError> {
        serde_json::from_str::<serde_json::Value>(abi_json)
            .map(|_| hex::encode(abi_json))
            .map_err(|source| SerializationProviderError::SerializeAbi {
                message: "abi is not valid json".to_owned(),
                source: Some(Box::new(source)),
            })
    }

    fn deserialize_abi(&self, abi_hex: &str) -> Result<String, SerializationProviderError> {
        hex::decode(abi_hex)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| SerializationProviderError::DeserializeAbi {
                message: "abi is not utf-8 hex".to_owned(),
                source: None,
            })
    }
}

/// ABI capability backed by a static map.
#[derive(Debug, Default)]
pub(crate) struct StaticAbis {
    pub abis: HashMap<Name, Arc<str>>,
    pub calls: Mutex<u64>,
}

impl StaticAbis {
    pub(crate) fn with(accounts: &[&str]) -> Self {
        Self {
            abis: accounts
                .iter()
                .map(|account| {
                    let abi: Arc<str> = Arc::from(format!("{{\"account\":\"{account}\"}}"));
                    (name(account), abi)
                })
                .collect(),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl AbiProvider for StaticAbis {
    async fn get_abi(&self, account: &Name) -> Result<Arc<str>, AbiProviderError> {
        bump(&self.calls);
        self.abis
            .get(account)
            .cloned()
            .ok_or_else(|| AbiProviderError::NoAbi {
                account: account.clone(),
            })
    }
}

/// Signer that "signs" by tagging each requested key.
#[derive(Debug)]
pub(crate) struct MockSigner {
    pub available: Vec<String>,
    pub decline: bool,
    pub drop_last_signature: bool,
    pub rewrite_transaction: Option<String>,
    pub available_calls: Mutex<u64>,
    pub requests: Mutex<Vec<TransactionSignatureRequest>>,
}

impl MockSigner {
    pub(crate) fn with_keys(keys: &[&str]) -> Self {
        Self {
            available: keys.iter().map(|key| (*key).to_owned()).collect(),
            decline: false,
            drop_last_signature: false,
            rewrite_transaction: None,
            available_calls: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SignatureProvider for MockSigner {
    async fn get_available_keys(&self) -> Result<Vec<String>, SignatureProviderError> {
        bump(&self.available_calls);
        Ok(self.available.clone())
    }

    async fn sign_transaction(
        &self,
        request: &TransactionSignatureRequest,
    ) -> Result<TransactionSignatureResponse, SignatureProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if self.decline {
            return Err(SignatureProviderError::Declined {
                message: "user rejected".to_owned(),
            });
        }
        let mut signatures: Vec<String> = request
            .signing_public_keys
            .iter()
            .map(|key| format!("SIG_{key}"))
            .collect();
        if self.drop_last_signature {
            let _ = signatures.pop();
        }
        Ok(TransactionSignatureResponse {
            serialized_transaction: self
                .rewrite_transaction
                .clone()
                .unwrap_or_else(|| request.serialized_transaction.clone()),
            signatures,
        })
    }
}

/// Returns the packed payload of an action as the mock serializer produced it.
pub(crate) fn packed_payload(action: &Action) -> Option<String> {
    match &action.data {
        ActionData::Packed(hex_data) => hex::decode(hex_data)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok()),
        ActionData::Json(_) => None,
    }
}
