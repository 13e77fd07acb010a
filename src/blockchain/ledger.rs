use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use log::{info, warn};
use thiserror::Error;

use super::account::{Account, AccountError, Balances};
use super::block::Block;
use super::crypto::{is_valid_proof_of_work, CryptoError, Hash};
use super::storage::{BlockStore, DataDir, Genesis, StorageError};

/// Coins credited to a block's miner on top of its transactions
pub const BLOCK_REWARD: u64 = 100;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Out of sequence block: expected number {expected}, got {got}")]
    Sequence { expected: u64, got: u64 },

    #[error("Fork rejected: expected parent {expected}, got {got}")]
    Fork { expected: Hash, got: Hash },

    #[error("Invalid proof of work: {0}")]
    InvalidProofOfWork(Hash),

    #[error("Insufficient balance on {account}: required {required}, available {available}")]
    InsufficientBalance {
        account: Account,
        required: u64,
        available: u64,
    },

    #[error("Balance overflow on {0}")]
    BalanceOverflow(Account),

    #[error("Block {number} rejected after {applied} applied: {source}")]
    BlockRejected {
        number: u64,
        applied: usize,
        #[source]
        source: Box<LedgerError>,
    },

    #[error("Corrupt block store: {0}")]
    CorruptStore(String),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Hashing error: {0}")]
    Hashing(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<AccountError> for LedgerError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientFunds {
                account,
                required,
                available,
            } => LedgerError::InsufficientBalance {
                account,
                required,
                available,
            },
            AccountError::Overflow(account) => LedgerError::BalanceOverflow(account),
        }
    }
}

/// Balances and chain head derived from every accepted block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
    pub balances: Balances,
    pub latest_block: Block,
    pub latest_block_hash: Hash,
    pub has_genesis: bool,
}

impl LedgerState {
    pub fn from_genesis(genesis: Genesis) -> Self {
        LedgerState {
            balances: Balances::new(genesis.balances),
            latest_block: Block::default(),
            latest_block_hash: Hash::default(),
            has_genesis: false,
        }
    }

    /// Number the next accepted block must carry; 0 on an empty chain, where
    /// the first block is accepted at any number
    pub fn next_block_number(&self) -> u64 {
        if self.has_genesis {
            self.latest_block.number() + 1
        } else {
            0
        }
    }

    /// Validates `block` against this state and applies it in place
    ///
    /// On error the state may be partially mutated, so callers run this on a
    /// copy and only keep the copy when it succeeds.
    fn apply_block(&mut self, block: &Block) -> Result<Hash, LedgerError> {
        // the first block may carry any number; later ones extend the head
        if self.has_genesis {
            let expected = self.next_block_number();
            if block.number() != expected {
                return Err(LedgerError::Sequence {
                    expected,
                    got: block.number(),
                });
            }

            if block.header.parent != self.latest_block_hash {
                return Err(LedgerError::Fork {
                    expected: self.latest_block_hash,
                    got: block.header.parent,
                });
            }
        }

        let hash = block.hash()?;
        if !is_valid_proof_of_work(&hash) {
            return Err(LedgerError::InvalidProofOfWork(hash));
        }

        // stable sort: equal timestamps keep their order in the block
        let mut txs: Vec<_> = block.txs.iter().collect();
        txs.sort_by_key(|tx| tx.time);
        for tx in txs {
            self.balances.apply_tx(tx)?;
        }

        self.balances.credit(&block.header.miner, BLOCK_REWARD)?;
        self.latest_block = block.clone();
        self.latest_block_hash = hash;
        self.has_genesis = true;

        Ok(hash)
    }
}

/// The account ledger: state derived from the append-only block store
///
/// `store` doubles as the writer lock: every commit holds it across
/// copy-validate-append-commit, so at most one block is applied at a time.
/// Readers only take `state` and see the last committed snapshot.
/// `persisted` counts the complete records in the store file and is only
/// raised after a record has been flushed.
#[derive(Debug)]
pub struct Ledger {
    state: RwLock<LedgerState>,
    store: Mutex<Option<BlockStore>>,
    store_path: PathBuf,
    persisted: AtomicUsize,
}

impl Ledger {
    /// Loads the ledger from a data directory
    ///
    /// Initializes the directory if it is empty, seeds balances from the
    /// genesis file and replays the block store.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - The node's data directory
    ///
    /// # Returns
    ///
    /// A ledger positioned at the last persisted block
    pub fn load(data_dir: &DataDir) -> Result<Self, LedgerError> {
        data_dir.init_if_missing()?;

        let genesis = Genesis::load(data_dir.genesis_path())?;
        let store = BlockStore::open(data_dir.block_db_path())?;

        Self::from_parts(genesis, store)
    }

    /// Builds a ledger from a genesis record and an opened store, replaying
    /// every persisted record through the same validation as live blocks
    pub fn from_parts(genesis: Genesis, store: BlockStore) -> Result<Self, LedgerError> {
        let records = store.read_records().map_err(|err| match err {
            StorageError::Corrupt { line, reason } => {
                LedgerError::CorruptStore(format!("line {}: {}", line, reason))
            }
            other => LedgerError::Storage(other),
        })?;

        let mut state = LedgerState::from_genesis(genesis);
        for record in &records {
            let number = record.block.number();
            let hash = state
                .apply_block(&record.block)
                .map_err(|e| LedgerError::InvalidChain(format!("block {}: {}", number, e)))?;

            if hash != record.hash {
                return Err(LedgerError::InvalidChain(format!(
                    "block {}: recorded hash {} does not match computed {}",
                    number, record.hash, hash
                )));
            }
        }

        info!(
            "Loaded ledger from {}: {} blocks replayed",
            store.path().display(),
            records.len()
        );

        Ok(Ledger {
            state: RwLock::new(state),
            store_path: store.path().to_path_buf(),
            persisted: AtomicUsize::new(records.len()),
            store: Mutex::new(Some(store)),
        })
    }

    /// Validates and commits a single block
    ///
    /// The block is applied to a copy of the current state; the copy becomes
    /// canonical only after the record has been appended to the store. A
    /// rejected block leaves the ledger untouched.
    ///
    /// # Arguments
    ///
    /// * `block` - The block to add
    ///
    /// # Returns
    ///
    /// The hash of the accepted block
    pub fn add_block(&self, block: &Block) -> Result<Hash, LedgerError> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let store = store.as_mut().ok_or(StorageError::Closed)?;

        let mut pending = self.snapshot();
        let hash = pending.apply_block(block)?;

        store.append(&hash, block)?;
        self.persisted.fetch_add(1, Ordering::Release);
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = pending;

        info!("Accepted block {} {}", block.number(), hash);
        Ok(hash)
    }

    /// Adds blocks in order, stopping at the first failure
    ///
    /// Blocks applied before the failure stay committed.
    ///
    /// # Returns
    ///
    /// The number of blocks applied, or `BlockRejected` naming the failing
    /// block
    pub fn add_blocks(&self, blocks: &[Block]) -> Result<usize, LedgerError> {
        let mut applied = 0;
        for block in blocks {
            let number = block.number();
            if let Err(err) = self.add_block(block) {
                warn!("Block {} rejected: {}", number, err);
                return Err(LedgerError::BlockRejected {
                    number,
                    applied,
                    source: Box::new(err),
                });
            }
            applied += 1;
        }

        Ok(applied)
    }

    /// Every persisted block with `number >= from`, in ascending order
    ///
    /// Reads through its own file handle and does not block commits. A block
    /// committed while the read is in flight may be left out.
    pub fn blocks_from(&self, from: u64) -> Result<Vec<Block>, LedgerError> {
        if self.store.lock().unwrap_or_else(PoisonError::into_inner).is_none() {
            return Err(StorageError::Closed.into());
        }

        let persisted = self.persisted.load(Ordering::Acquire);
        Ok(BlockStore::read_prefix(&self.store_path, persisted)?
            .into_iter()
            .map(|record| record.block)
            .filter(|block| block.number() >= from)
            .collect())
    }

    /// Point-in-time copy of the committed state
    pub fn snapshot(&self) -> LedgerState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn latest_block(&self) -> Block {
        self.state.read().unwrap_or_else(PoisonError::into_inner).latest_block.clone()
    }

    pub fn latest_block_hash(&self) -> Hash {
        self.state.read().unwrap_or_else(PoisonError::into_inner).latest_block_hash
    }

    pub fn balances(&self) -> Balances {
        self.state.read().unwrap_or_else(PoisonError::into_inner).balances.clone()
    }

    pub fn next_block_number(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).next_block_number()
    }

    /// Releases the block store; later writes fail with `StorageError::Closed`
    pub fn close(&self) -> Result<(), LedgerError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(store) = store {
            store.sync()?;
            info!("Closed block store {}", store.path().display());
        }
        Ok(())
    }
}
