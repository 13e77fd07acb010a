use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use log::{info, warn};
use thiserror::Error;

use crate::blockchain::crypto::CryptoError;
use crate::blockchain::{Account, Balances, Block, Hash, Tx};

/// Errors that can occur when submitting a transaction
#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("Insufficient balance on {account}: required {required}, available {available}")]
    InsufficientBalance {
        account: Account,
        required: u64,
        available: u64,
    },

    #[error("Reward transactions cannot be submitted")]
    RewardNotAllowed,

    #[error("Transaction {0} is already pending")]
    Duplicate(Hash),

    #[error("Hashing error: {0}")]
    Hashing(#[from] CryptoError),
}

/// Transactions waiting to be included in a block, keyed by hash
///
/// `admission` serializes the balance check and insert of `add` with
/// `revalidate`, so the pending set always fits the balances it was last
/// checked against.
#[derive(Debug, Default)]
pub struct Mempool {
    txs: DashMap<Hash, Tx>,
    admission: Mutex<()>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool::default()
    }

    /// Adds a transaction to the pool
    ///
    /// A transaction already in the pool is refused with `Duplicate`. A
    /// transfer is refused when the sender's committed balance cannot cover it
    /// together with the sender's other pending transfers.
    ///
    /// # Arguments
    ///
    /// * `tx` - The transaction to add
    /// * `balances` - Committed balances to check against
    ///
    /// # Returns
    ///
    /// The hash identifying the transaction
    pub fn add(&self, tx: Tx, balances: &Balances) -> Result<Hash, MempoolError> {
        if tx.is_reward() {
            return Err(MempoolError::RewardNotAllowed);
        }

        let hash = tx.hash()?;
        let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        if self.txs.contains_key(&hash) {
            return Err(MempoolError::Duplicate(hash));
        }

        let available = balances.get(&tx.from);
        let required = self
            .pending_spend(&tx.from)
            .saturating_add(u128::from(tx.value));
        if required > u128::from(available) {
            return Err(MempoolError::InsufficientBalance {
                account: tx.from,
                required: u64::try_from(required).unwrap_or(u64::MAX),
                available,
            });
        }

        info!("Added pending tx {} ({} -> {}: {})", hash, tx.from, tx.to, tx.value);
        self.txs.insert(hash, tx);
        Ok(hash)
    }

    fn pending_spend(&self, account: &Account) -> u128 {
        self.txs
            .iter()
            .filter(|entry| &entry.value().from == account)
            .map(|entry| u128::from(entry.value().value))
            .sum()
    }

    /// All pending transactions, oldest first
    pub fn pending(&self) -> Vec<Tx> {
        let mut txs: Vec<Tx> = self.txs.iter().map(|entry| entry.value().clone()).collect();
        txs.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.from.cmp(&b.from)));
        txs
    }

    /// Drops every transaction contained in a committed block
    pub fn remove_included(&self, block: &Block) -> usize {
        block
            .txs
            .iter()
            .filter_map(|tx| tx.hash().ok())
            .filter(|hash| self.txs.remove(hash).is_some())
            .count()
    }

    /// Replays the pending set in time order on a copy of `balances` and
    /// evicts every transaction that no longer applies
    ///
    /// # Arguments
    ///
    /// * `balances` - Committed balances after the latest block
    ///
    /// # Returns
    ///
    /// The number of evicted transactions
    pub fn revalidate(&self, balances: &Balances) -> usize {
        let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        let mut balances = balances.clone();
        let mut evicted = 0;

        for tx in self.pending() {
            if let Err(err) = balances.apply_tx(&tx) {
                let Ok(hash) = tx.hash() else { continue };
                warn!("Evicted pending tx {}: {}", hash, err);
                self.txs.remove(&hash);
                evicted += 1;
            }
        }

        evicted
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn balances() -> Balances {
        Balances::new(BTreeMap::from([(Account::from("andrej"), 100)]))
    }

    fn transfer(value: u64, time: u64) -> Tx {
        Tx::new(Account::from("andrej"), Account::from("babayaga"), value, "").with_time(time)
    }

    #[test]
    fn test_add_and_list() {
        let pool = Mempool::new();
        pool.add(transfer(20, 2), &balances()).unwrap();
        pool.add(transfer(10, 1), &balances()).unwrap();

        let pending = pool.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].time, 1);
        assert_eq!(pending[1].time, 2);
    }

    #[test]
    fn test_duplicate_is_refused() {
        let pool = Mempool::new();
        let first = pool.add(transfer(60, 1), &balances()).unwrap();
        let second = pool.add(transfer(60, 1), &balances());

        assert!(matches!(second, Err(MempoolError::Duplicate(hash)) if hash == first));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pending_spends_count_against_balance() {
        let pool = Mempool::new();
        pool.add(transfer(60, 1), &balances()).unwrap();

        let result = pool.add(transfer(60, 2), &balances());
        assert!(matches!(
            result,
            Err(MempoolError::InsufficientBalance { required: 120, available: 100, .. })
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_reward_rejected() {
        let pool = Mempool::new();
        let result = pool.add(Tx::reward(Account::from("andrej"), 5), &balances());

        assert!(matches!(result, Err(MempoolError::RewardNotAllowed)));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_remove_included() {
        let pool = Mempool::new();
        let included = transfer(10, 1);
        pool.add(included.clone(), &balances()).unwrap();
        pool.add(transfer(20, 2), &balances()).unwrap();

        let block = Block::new(Hash::default(), 0, 0, 0, Account::from("andrej"), vec![included]);

        assert_eq!(pool.remove_included(&block), 1);
        assert_eq!(pool.pending(), vec![transfer(20, 2)]);
    }

    #[test]
    fn test_revalidate_evicts_unaffordable() {
        let pool = Mempool::new();
        let stale = transfer(60, 1);
        pool.add(stale.clone(), &balances()).unwrap();
        pool.add(transfer(30, 2), &balances()).unwrap();

        // a committed block spent 50 of andrej's 100 elsewhere
        let after_block = Balances::new(BTreeMap::from([(Account::from("andrej"), 50)]));

        assert_eq!(pool.revalidate(&after_block), 1);
        assert_eq!(pool.pending(), vec![transfer(30, 2)]);

        pool.add(transfer(20, 3), &after_block).unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_revalidate_follows_time_order() {
        let pool = Mempool::new();
        let rich = Balances::new(BTreeMap::from([(Account::from("andrej"), 100)]));
        pool.add(transfer(100, 1), &rich).unwrap();
        // babayaga spends coins that only arrive with the earlier transfer
        let onward = Tx::new(Account::from("babayaga"), Account::from("caesar"), 100, "").with_time(2);
        pool.txs.insert(onward.hash().unwrap(), onward);

        assert_eq!(pool.revalidate(&rich), 0);
        assert_eq!(pool.len(), 2);
    }
}
