//! Transaction entity, actions, and construction-time validation.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::name::Name;

/// Construction errors for actions and caller-supplied transactions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransactionError {
    /// Preset transaction carried no actions.
    #[error("transaction has no actions")]
    EmptyActions,
    /// An action carried no authorization.
    #[error("action #{index} `{account}::{name}` has no authorization")]
    MissingAuthorization {
        /// Position in the action list.
        index: usize,
        /// Target account.
        account: Name,
        /// Action name.
        name: Name,
    },
    /// A context-free action carried authorization.
    #[error("context-free action #{index} `{account}::{name}` must not carry authorization")]
    ContextFreeActionAuthorized {
        /// Position in the context-free action list.
        index: usize,
        /// Target account.
        account: Name,
        /// Action name.
        name: Name,
    },
    /// Only one of `ref_block_num` / `ref_block_prefix` was preset.
    #[error("reference block fields must be set together (ref_block_num={num:?}, ref_block_prefix={prefix:?})")]
    PartialReferenceBlock {
        /// Preset block number.
        num: Option<u16>,
        /// Preset block prefix.
        prefix: Option<u32>,
    },
    /// Packed action data was not valid hex.
    #[error("packed data for `{account}::{name}` is not valid hex: {source}")]
    InvalidHexData {
        /// Target account.
        account: Name,
        /// Action name.
        name: Name,
        /// Hex decoding error.
        source: hex::FromHexError,
    },
}

/// One `actor@permission` authorization entry.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PermissionLevel {
    /// Authorizing account.
    pub actor: Name,
    /// Permission of the authorizing account.
    pub permission: Name,
}

impl PermissionLevel {
    /// Creates an authorization entry.
    #[must_use]
    pub const fn new(actor: Name, permission: Name) -> Self {
        Self { actor, permission }
    }
}

/// Action payload, either human-readable or already packed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionData {
    /// Hex-encoded binary payload.
    Packed(String),
    /// Human-readable payload that still needs the account ABI to be packed.
    Json(Value),
}

/// One operation targeting a chain account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Contract account.
    pub account: Name,
    /// Action name on the contract.
    pub name: Name,
    /// Authorization list; must be empty for context-free actions.
    #[serde(default)]
    pub authorization: Vec<PermissionLevel>,
    /// Argument payload.
    pub data: ActionData,
}

impl Action {
    /// Creates an action with a human-readable payload.
    #[must_use]
    pub const fn new(
        account: Name,
        name: Name,
        authorization: Vec<PermissionLevel>,
        data: Value,
    ) -> Self {
        Self {
            account,
            name,
            authorization,
            data: ActionData::Json(data),
        }
    }

    /// Creates an action whose payload is already packed.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::InvalidHexData`] when `hex_data` is not valid hex.
    pub fn with_packed_data(
        account: Name,
        name: Name,
        authorization: Vec<PermissionLevel>,
        hex_data: impl Into<String>,
    ) -> Result<Self, TransactionError> {
        let hex_data = hex_data.into();
        if let Err(source) = hex::decode(&hex_data) {
            return Err(TransactionError::InvalidHexData {
                account,
                name,
                source,
            });
        }
        Ok(Self {
            account,
            name,
            authorization,
            data: ActionData::Packed(hex_data),
        })
    }

    /// Returns true when the payload no longer needs ABI serialization.
    #[must_use]
    pub const fn is_packed(&self) -> bool {
        matches!(self.data, ActionData::Packed(_))
    }
}

/// Transaction entity driven through the processor pipeline.
///
/// Field names and JSON layout follow the chain's transaction format. `context_free_data` is not
/// part of that format; it is packed separately and pushed next to the packed transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Second-precision expiration time (UTC).
    #[serde(default)]
    pub expiration: Option<NaiveDateTime>,
    /// Lower 16 bits of the reference block number.
    #[serde(default)]
    pub ref_block_num: Option<u16>,
    /// Reference block prefix taken from the reference block id.
    #[serde(default)]
    pub ref_block_prefix: Option<u32>,
    /// Net usage limit in 8-byte words; zero means no explicit limit.
    #[serde(default)]
    pub max_net_usage_words: u32,
    /// CPU usage limit in milliseconds; zero means no explicit limit.
    #[serde(default)]
    pub max_cpu_usage_ms: u8,
    /// Delay before execution in seconds.
    #[serde(default)]
    pub delay_sec: u32,
    /// Actions executed without authorization checks.
    #[serde(default)]
    pub context_free_actions: Vec<Action>,
    /// Authorized actions, in execution order.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Extension pairs of `(type, hex data)`.
    #[serde(default)]
    pub transaction_extensions: Vec<(u16, String)>,
    /// Context-free data blobs.
    #[serde(skip)]
    pub context_free_data: Vec<Vec<u8>>,
}

impl Transaction {
    /// Creates an empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one action.
    #[must_use]
    pub fn add_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Appends many actions.
    #[must_use]
    pub fn add_actions<I>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = Action>,
    {
        self.actions.extend(actions);
        self
    }

    /// Appends one context-free action.
    #[must_use]
    pub fn add_context_free_action(mut self, action: Action) -> Self {
        self.context_free_actions.push(action);
        self
    }

    /// Sets the reference block and expiration explicitly.
    #[must_use]
    pub fn with_reference_block(
        mut self,
        ref_block_num: u16,
        ref_block_prefix: u32,
        expiration: NaiveDateTime,
    ) -> Self {
        self.ref_block_num = Some(ref_block_num);
        self.ref_block_prefix = Some(ref_block_prefix);
        self.expiration = Some(expiration);
        self
    }

    /// Returns true when reference block fields and expiration are all present.
    #[must_use]
    pub const fn has_reference_block(&self) -> bool {
        self.ref_block_num.is_some()
            && self.ref_block_prefix.is_some()
            && self.expiration.is_some()
    }

    /// Clears reference block fields and expiration.
    pub fn clear_reference_block(&mut self) {
        self.ref_block_num = None;
        self.ref_block_prefix = None;
        self.expiration = None;
    }

    /// Returns every distinct contract account targeted by this transaction.
    #[must_use]
    pub fn contract_accounts(&self) -> BTreeSet<Name> {
        self.context_free_actions
            .iter()
            .chain(self.actions.iter())
            .map(|action| action.account.clone())
            .collect()
    }

    /// Validates a caller-supplied transaction before a processor adopts it.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError`] when the transaction has no actions, an action lacks
    /// authorization, a context-free action carries authorization, or the reference block is only
    /// partially set.
    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.actions.is_empty() {
            return Err(TransactionError::EmptyActions);
        }
        if self.ref_block_num.is_some() != self.ref_block_prefix.is_some() {
            return Err(TransactionError::PartialReferenceBlock {
                num: self.ref_block_num,
                prefix: self.ref_block_prefix,
            });
        }
        for (index, action) in self.actions.iter().enumerate() {
            if action.authorization.is_empty() {
                return Err(TransactionError::MissingAuthorization {
                    index,
                    account: action.account.clone(),
                    name: action.name.clone(),
                });
            }
        }
        for (index, action) in self.context_free_actions.iter().enumerate() {
            if !action.authorization.is_empty() {
                return Err(TransactionError::ContextFreeActionAuthorized {
                    index,
                    account: action.account.clone(),
                    name: action.name.clone(),
                });
            }
        }
        Ok(())
    }
}
