use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::collections::BTreeMap;
use std::fmt;

use super::transaction::Tx;

/// Errors that can occur during balance operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Insufficient balance on {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: Account,
        required: u64,
        available: u64,
    },

    #[error("Balance overflow on {0}")]
    Overflow(Account),
}

/// An opaque account identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Account(pub String);

impl Account {
    pub fn new(value: impl Into<String>) -> Self {
        Account(value.into())
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Account {
    fn from(value: &str) -> Self {
        Account(value.to_string())
    }
}

/// The balance table: every account that ever held coins mapped to its balance
///
/// Ordered by account so listings and serialized snapshots are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances(BTreeMap<Account, u64>);

impl Balances {
    pub fn new(initial: BTreeMap<Account, u64>) -> Self {
        Balances(initial)
    }

    /// Gets the balance of an account, zero if it never held coins
    pub fn get(&self, account: &Account) -> u64 {
        self.0.get(account).copied().unwrap_or(0)
    }

    /// Adds coins to an account
    ///
    /// # Arguments
    ///
    /// * `account` - The account to credit
    /// * `value` - The amount to add
    ///
    /// # Returns
    ///
    /// Result indicating success or failure
    pub fn credit(&mut self, account: &Account, value: u64) -> Result<(), AccountError> {
        let balance = self.0.entry(account.clone()).or_insert(0);
        *balance = balance
            .checked_add(value)
            .ok_or_else(|| AccountError::Overflow(account.clone()))?;
        Ok(())
    }

    /// Removes coins from an account, refusing to go below zero
    pub fn debit(&mut self, account: &Account, value: u64) -> Result<(), AccountError> {
        let available = self.get(account);
        if value > available {
            return Err(AccountError::InsufficientFunds {
                account: account.clone(),
                required: value,
                available,
            });
        }

        self.0.insert(account.clone(), available - value);
        Ok(())
    }

    /// Moves coins between two accounts
    pub fn transfer(&mut self, from: &Account, to: &Account, value: u64) -> Result<(), AccountError> {
        self.debit(from, value)?;
        self.credit(to, value)
    }

    /// Applies a single transaction: rewards mint into `to`, transfers move
    /// coins from `from` to `to`
    pub fn apply_tx(&mut self, tx: &Tx) -> Result<(), AccountError> {
        if tx.is_reward() {
            return self.credit(&tx.to, tx.value);
        }

        self.transfer(&tx.from, &tx.to, tx.value)
    }

    /// Sum of all balances
    pub fn total(&self) -> u128 {
        self.0.values().map(|v| u128::from(*v)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Account, &u64)> {
        self.0.iter()
    }
}
