use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::account::Account;
use super::crypto::{hash_json, CryptoError, Hash};

/// What a transaction does to the balance table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    /// Moves `value` from `from` to `to`
    #[default]
    Transfer,

    /// Mints `value` into `to` without debiting anyone
    Reward,
}

/// Represents a transaction in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Tx {
    /// Sender's account
    pub from: Account,

    /// Recipient's account
    pub to: Account,

    /// Amount being transferred
    pub value: u64,

    /// Free-form payload
    #[serde(default)]
    pub data: String,

    /// Unix timestamp of creation
    pub time: u64,

    #[serde(default)]
    pub kind: TxKind,
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

impl Tx {
    /// Creates a new transfer stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `from` - The account being debited
    /// * `to` - The account being credited
    /// * `value` - The amount to transfer
    /// * `data` - Free-form payload
    ///
    /// # Returns
    ///
    /// A new Tx instance
    pub fn new(from: Account, to: Account, value: u64, data: impl Into<String>) -> Self {
        Tx {
            from,
            to,
            value,
            data: data.into(),
            time: unix_now(),
            kind: TxKind::Transfer,
        }
    }

    /// Creates a reward transaction minting `value` into `to`
    pub fn reward(to: Account, value: u64) -> Self {
        Tx {
            from: to.clone(),
            to,
            value,
            data: String::new(),
            time: unix_now(),
            kind: TxKind::Reward,
        }
    }

    pub fn with_time(mut self, time: u64) -> Self {
        self.time = time;
        self
    }

    pub fn is_reward(&self) -> bool {
        self.kind == TxKind::Reward
    }

    /// Hash of the canonical form, used to identify pending transactions
    pub fn hash(&self) -> Result<Hash, CryptoError> {
        hash_json(self)
    }
}
