//! Helpers shared by unit tests across the crate

use std::collections::BTreeMap;

use tempfile::TempDir;

use super::account::Account;
use super::block::Block;
use super::crypto::is_valid_proof_of_work;
use super::ledger::Ledger;
use super::storage::{BlockStore, DataDir, Genesis};

/// Searches nonces sequentially until the block satisfies proof of work
pub fn seal(mut block: Block) -> Block {
    loop {
        if is_valid_proof_of_work(&block.hash().unwrap()) {
            return block;
        }
        block.header.nonce = block.header.nonce.wrapping_add(1);
    }
}

/// A ledger backed by a fresh data directory with the given genesis balances
pub fn temp_ledger(balances: &[(&str, u64)]) -> (TempDir, Ledger) {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = DataDir::new(dir.path());
    std::fs::create_dir_all(data_dir.database_dir()).unwrap();

    let genesis = Genesis {
        balances: balances
            .iter()
            .map(|(account, value)| (Account::from(*account), *value))
            .collect::<BTreeMap<_, _>>(),
    };
    genesis.save(data_dir.genesis_path()).unwrap();

    let store = BlockStore::open(data_dir.block_db_path()).unwrap();
    let ledger = Ledger::from_parts(genesis, store).unwrap();

    (dir, ledger)
}
