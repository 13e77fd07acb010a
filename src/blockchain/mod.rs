// Blockchain module
//
// This module contains the ledger/state engine:
// - Hashing and the proof-of-work predicate
// - Accounts and the balance table
// - Transaction and block structures
// - The append-only block store
// - The ledger that validates and commits blocks

pub mod account;
pub mod block;
pub mod crypto;
pub mod ledger;
pub mod storage;
pub mod transaction;

#[cfg(test)]
pub mod testing;

// Re-export main components for easier access
pub use account::{Account, Balances};
pub use block::{Block, BlockFs, BlockHeader};
pub use crypto::Hash;
pub use ledger::{Ledger, LedgerError, BLOCK_REWARD};
pub use storage::DataDir;
pub use transaction::{Tx, TxKind};
