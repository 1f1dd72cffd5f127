//! ABI capability that fetches raw ABIs over RPC and caches them per account.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::{
    name::Name,
    providers::{AbiProvider, AbiProviderError, RpcProvider, SerializationProvider},
};

/// Nodes return raw ABIs with or without base64 padding.
const RAW_ABI_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One cached ABI definition.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AbiCacheEntry {
    /// Contract account the ABI belongs to.
    pub account: Name,
    /// ABI definition (JSON).
    pub abi: Arc<str>,
    /// SHA-256 of the packed ABI; identifies the ABI version that was fetched.
    pub abi_hash: String,
}

/// Per-account slot; initialized at most once, failed fetches leave it empty.
type AbiSlot = Arc<OnceCell<Arc<AbiCacheEntry>>>;

/// Shared ABI cache backed by an RPC capability.
///
/// Concurrent lookups for the same uncached account share a single `get_raw_abi` round-trip.
/// Entries live until [`CachingAbiProvider::invalidate`] is called.
pub struct CachingAbiProvider {
    /// Source of raw ABIs.
    rpc: Arc<dyn RpcProvider>,
    /// Decoder for packed ABIs.
    serialization: Arc<dyn SerializationProvider>,
    /// Cache slots by account.
    slots: RwLock<HashMap<Name, AbiSlot>>,
}

impl CachingAbiProvider {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(
        rpc: Arc<dyn RpcProvider>,
        serialization: Arc<dyn SerializationProvider>,
    ) -> Self {
        Self {
            rpc,
            serialization,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached entry for `account` without fetching.
    #[must_use]
    pub fn cached(&self, account: &Name) -> Option<Arc<AbiCacheEntry>> {
        self.slots
            .read()
            .ok()?
            .get(account)
            .and_then(|slot| slot.get().cloned())
    }

    /// Drops the cached entry for `account`; returns true when one was present.
    pub fn invalidate(&self, account: &Name) -> bool {
        self.slots
            .write()
            .map(|mut slots| slots.remove(account).is_some())
            .unwrap_or(false)
    }

    /// Returns the number of accounts with a cached ABI.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().map_or(0, |slots| {
            slots.values().filter(|slot| slot.initialized()).count()
        })
    }

    /// Returns true when no ABI is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the slot for `account`, creating it when missing.
    fn slot(&self, account: &Name) -> AbiSlot {
        if let Ok(slots) = self.slots.read()
            && let Some(slot) = slots.get(account)
        {
            return Arc::clone(slot);
        }
        match self.slots.write() {
            Ok(mut slots) => Arc::clone(slots.entry(account.clone()).or_default()),
            // A poisoned map still yields a working, uncached lookup.
            Err(_) => Arc::new(OnceCell::new()),
        }
    }

    /// Removes `slot` from the map when it is still the registered slot and holds no entry.
    fn discard_empty_slot(&self, account: &Name, slot: &AbiSlot) {
        if let Ok(mut slots) = self.slots.write()
            && slots
                .get(account)
                .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized())
        {
            let _ = slots.remove(account);
        }
    }

    /// Fetches, verifies, and decodes the ABI of `account`.
    async fn fetch(&self, account: &Name) -> Result<Arc<AbiCacheEntry>, AbiProviderError> {
        tracing::debug!(account = %account, "fetching raw abi");
        let raw = self
            .rpc
            .get_raw_abi(account)
            .await
            .map_err(|source| AbiProviderError::Rpc {
                account: account.clone(),
                source,
            })?;
        if raw.account_name != *account {
            return Err(AbiProviderError::NoAbi {
                account: account.clone(),
            });
        }
        let encoded = raw
            .abi
            .filter(|abi| !abi.is_empty())
            .ok_or_else(|| AbiProviderError::NoAbi {
                account: account.clone(),
            })?;
        let bytes = RAW_ABI_BASE64.decode(encoded.as_bytes()).map_err(|source| {
            AbiProviderError::InvalidEncoding {
                account: account.clone(),
                source,
            }
        })?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if !raw.abi_hash.eq_ignore_ascii_case(&actual) {
            return Err(AbiProviderError::HashMismatch {
                account: account.clone(),
                expected: raw.abi_hash,
                actual,
            });
        }
        let abi = self
            .serialization
            .deserialize_abi(&hex::encode(&bytes))
            .map_err(|source| AbiProviderError::Decode {
                account: account.clone(),
                source,
            })?;
        tracing::debug!(account = %account, abi_hash = %actual, "cached abi");
        Ok(Arc::new(AbiCacheEntry {
            account: account.clone(),
            abi: Arc::from(abi),
            abi_hash: actual,
        }))
    }
}

#[async_trait]
impl AbiProvider for CachingAbiProvider {
    async fn get_abi(&self, account: &Name) -> Result<Arc<str>, AbiProviderError> {
        let slot = self.slot(account);
        match slot.get_or_try_init(|| self.fetch(account)).await {
            Ok(entry) => Ok(Arc::clone(&entry.abi)),
            Err(error) => {
                self.discard_empty_slot(account, &slot);
                Err(error)
            }
        }
    }
}
