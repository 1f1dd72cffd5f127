//! Processor configuration and environment overrides.

use crate::retry::RetryPolicy;

/// Environment variable for [`ProcessorConfig::expire_seconds`].
pub const EXPIRE_SECONDS_ENV: &str = "EOSIO_TX_EXPIRE_SECONDS";
/// Environment variable for [`ProcessorConfig::blocks_behind`].
pub const BLOCKS_BEHIND_ENV: &str = "EOSIO_TX_BLOCKS_BEHIND";
/// Environment variable for [`ProcessorConfig::use_last_irreversible`].
pub const USE_LAST_IRREVERSIBLE_ENV: &str = "EOSIO_TX_USE_LAST_IRREVERSIBLE";
/// Environment variable for [`ProcessorConfig::allow_transaction_modification`].
pub const ALLOW_MODIFICATION_ENV: &str = "EOSIO_TX_ALLOW_MODIFICATION";
/// Environment variable for [`ProcessorConfig::chain_id`].
pub const CHAIN_ID_ENV: &str = "EOSIO_TX_CHAIN_ID";
/// Environment variable for [`RetryPolicy::max_retries`].
pub const MAX_RETRIES_ENV: &str = "EOSIO_TX_MAX_RETRIES";
/// Environment variable replacing [`RetryPolicy::recoverable_codes`] (comma-separated).
pub const RECOVERABLE_CODES_ENV: &str = "EOSIO_TX_RECOVERABLE_CODES";

/// Default expiration window in seconds.
pub const DEFAULT_EXPIRE_SECONDS: u32 = 300;
/// Default distance behind head for the reference block.
pub const DEFAULT_BLOCKS_BEHIND: u32 = 3;

/// Per-processor settings shared by every processor a session creates.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProcessorConfig {
    /// Seconds added to the chain head time to form the expiration.
    pub expire_seconds: u32,
    /// Blocks behind head used as reference when not using the last irreversible block.
    pub blocks_behind: u32,
    /// Use the last irreversible block as the reference block.
    pub use_last_irreversible: bool,
    /// Accept a transaction altered by the signing capability.
    pub allow_transaction_modification: bool,
    /// Chain id the processor must be talking to, when pinned.
    pub chain_id: Option<String>,
    /// Broadcast retry policy.
    pub retry: RetryPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            expire_seconds: DEFAULT_EXPIRE_SECONDS,
            blocks_behind: DEFAULT_BLOCKS_BEHIND,
            use_last_irreversible: true,
            allow_transaction_modification: false,
            chain_id: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl ProcessorConfig {
    /// Builds a config from defaults overridden by `EOSIO_TX_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from defaults overridden by values returned from `lookup`.
    ///
    /// Unparseable or out-of-range values fall back to the default.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut retry = defaults.retry.with_max_retries(read_u32(
            &lookup,
            MAX_RETRIES_ENV,
            RetryPolicy::default().max_retries,
        ));
        if let Some(codes) = read_codes(&lookup, RECOVERABLE_CODES_ENV) {
            retry = retry.with_recoverable_codes(codes);
        }
        Self {
            expire_seconds: read_u32(&lookup, EXPIRE_SECONDS_ENV, DEFAULT_EXPIRE_SECONDS)
                .max(1),
            blocks_behind: read_u32(&lookup, BLOCKS_BEHIND_ENV, DEFAULT_BLOCKS_BEHIND),
            use_last_irreversible: read_bool(
                &lookup,
                USE_LAST_IRREVERSIBLE_ENV,
                defaults.use_last_irreversible,
            ),
            allow_transaction_modification: read_bool(
                &lookup,
                ALLOW_MODIFICATION_ENV,
                defaults.allow_transaction_modification,
            ),
            chain_id: lookup(CHAIN_ID_ENV)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            retry,
        }
    }

    /// Sets the expiration window; zero is raised to one second.
    #[must_use]
    pub fn with_expire_seconds(mut self, expire_seconds: u32) -> Self {
        self.expire_seconds = expire_seconds.max(1);
        self
    }

    /// Sets how far behind head the reference block is taken.
    #[must_use]
    pub const fn with_blocks_behind(mut self, blocks_behind: u32) -> Self {
        self.blocks_behind = blocks_behind;
        self
    }

    /// Chooses between the last irreversible block and `head - blocks_behind` as reference.
    #[must_use]
    pub const fn with_use_last_irreversible(mut self, use_last_irreversible: bool) -> Self {
        self.use_last_irreversible = use_last_irreversible;
        self
    }

    /// Allows or forbids signer-side transaction modification.
    #[must_use]
    pub const fn with_allow_transaction_modification(mut self, allow: bool) -> Self {
        self.allow_transaction_modification = allow;
        self
    }

    /// Pins the chain id.
    #[must_use]
    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Reads a `u32` variable, falling back to `default` when missing or unparseable.
fn read_u32<F>(lookup: &F, name: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

/// Reads a boolean variable, falling back to `default` when missing or unrecognized.
fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Reads a comma-separated code list; `None` when missing or when any entry is unparseable.
fn read_codes<F>(lookup: &F, name: &str) -> Option<Vec<i64>>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)?;
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.parse::<i64>().ok())
        .collect()
}
