//! Broadcast retry bound and chain-rejection classification.

use std::collections::BTreeSet;

use crate::providers::ChainError;

/// Chain code for an expired transaction.
pub const EXPIRED_TX_EXCEPTION: i64 = 3_040_005;
/// Chain code for a reference block that is no longer in the node's history.
pub const INVALID_REF_BLOCK_EXCEPTION: i64 = 3_040_007;
/// Chain code for a transaction id the chain has already seen.
pub const TX_DUPLICATE: i64 = 3_040_008;

/// Chain exception names matching the default recoverable codes.
const DEFAULT_RECOVERABLE_NAMES: [&str; 3] = [
    "expired_tx_exception",
    "invalid_ref_block_exception",
    "tx_duplicate",
];

/// How a chain rejection is handled by `broadcast`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RejectionClass {
    /// Fresh reference block and expiration may fix it; the pipeline is rerun.
    Recoverable,
    /// Surfaced to the caller as-is.
    Unrecoverable,
}

/// Retry controls applied to chain rejections during `broadcast`.
///
/// A rejection is recoverable when either its code or its name is listed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Number of pipeline restarts allowed after the first push.
    pub max_retries: u32,
    /// Chain error codes treated as recoverable.
    pub recoverable_codes: BTreeSet<i64>,
    /// Chain error names treated as recoverable.
    pub recoverable_names: BTreeSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            recoverable_codes: BTreeSet::from([
                EXPIRED_TX_EXCEPTION,
                INVALID_REF_BLOCK_EXCEPTION,
                TX_DUPLICATE,
            ]),
            recoverable_names: DEFAULT_RECOVERABLE_NAMES
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Returns a policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the retry bound.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replaces the recoverable classification with exactly these codes.
    #[must_use]
    pub fn with_recoverable_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        self.recoverable_codes = codes.into_iter().collect();
        self.recoverable_names.clear();
        self
    }

    /// Adds one recoverable chain error name.
    #[must_use]
    pub fn with_recoverable_name(mut self, name: impl Into<String>) -> Self {
        let _ = self.recoverable_names.insert(name.into());
        self
    }

    /// Classifies one chain rejection.
    #[must_use]
    pub fn classify(&self, error: &ChainError) -> RejectionClass {
        if self.recoverable_codes.contains(&error.code)
            || self.recoverable_names.contains(&error.name)
        {
            RejectionClass::Recoverable
        } else {
            RejectionClass::Unrecoverable
        }
    }

    /// Returns true when another pipeline restart is allowed after `retries_done` restarts.
    #[must_use]
    pub const fn allows_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}
