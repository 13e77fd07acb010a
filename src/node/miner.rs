use std::time::Instant;

use log::info;
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::blockchain::crypto::{is_valid_proof_of_work, CryptoError};
use crate::blockchain::transaction::unix_now;
use crate::blockchain::{Account, Block, Hash, Tx};

/// How often the search loop reports progress
const PROGRESS_EVERY: u64 = 1_000_000;

/// Errors that can occur while mining
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("Mining an empty block is not allowed")]
    EmptyBlock,

    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Failed to hash candidate block: {0}")]
    Hashing(#[from] CryptoError),
}

/// Everything a block needs except its nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlock {
    pub parent: Hash,
    pub number: u64,
    pub time: u64,
    pub miner: Account,
    pub txs: Vec<Tx>,
}

impl PendingBlock {
    /// Drafts a block stamped with the current time
    pub fn new(parent: Hash, number: u64, miner: Account, txs: Vec<Tx>) -> Self {
        PendingBlock {
            parent,
            number,
            time: unix_now(),
            miner,
            txs,
        }
    }
}

/// Searches random nonces until the draft hashes under the proof-of-work
/// target
///
/// The token is polled before every attempt, never during a hash
/// computation. A token that is already cancelled returns before the first
/// hash is computed.
///
/// # Arguments
///
/// * `token` - Cancels the search between attempts
/// * `pending` - The draft to seal
///
/// # Returns
///
/// The sealed block
pub fn mine(token: &CancellationToken, pending: PendingBlock) -> Result<Block, MinerError> {
    if pending.txs.is_empty() {
        return Err(MinerError::EmptyBlock);
    }

    let start = Instant::now();
    let tx_count = pending.txs.len();
    let mut rng = rand::thread_rng();
    let mut attempts: u64 = 0;
    let mut block = Block::new(
        pending.parent,
        pending.number,
        0,
        pending.time,
        pending.miner,
        pending.txs,
    );

    loop {
        if token.is_cancelled() {
            info!("Mining cancelled after {} attempts", attempts);
            return Err(MinerError::Cancelled { attempts });
        }

        attempts += 1;
        if attempts == 1 || attempts % PROGRESS_EVERY == 0 {
            info!("Mining {} pending txs. Attempt: {}", tx_count, attempts);
        }

        block.header.nonce = rng.gen();
        let hash = block.hash()?;
        if is_valid_proof_of_work(&hash) {
            info!(
                "Mined new block {} using PoW: height {}, nonce {}, miner {}, parent {}, attempts {}, took {:?}",
                hash,
                block.header.number,
                block.header.nonce,
                block.header.miner,
                block.header.parent,
                attempts,
                start.elapsed()
            );
            return Ok(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(txs: Vec<Tx>) -> PendingBlock {
        PendingBlock::new(Hash::default(), 0, Account::from("andrej"), txs)
    }

    fn transfer() -> Tx {
        Tx::new(Account::from("andrej"), Account::from("babayaga"), 1, "")
    }

    #[test]
    fn test_mine_produces_valid_block() {
        let pending = draft(vec![transfer()]);
        let block = mine(&CancellationToken::new(), pending.clone()).unwrap();

        assert!(is_valid_proof_of_work(&block.hash().unwrap()));
        assert_eq!(block.header.number, pending.number);
        assert_eq!(block.header.time, pending.time);
        assert_eq!(block.header.miner, pending.miner);
        assert_eq!(block.txs, pending.txs);
    }

    #[test]
    fn test_empty_block_is_rejected() {
        let result = mine(&CancellationToken::new(), draft(Vec::new()));
        assert!(matches!(result, Err(MinerError::EmptyBlock)));
    }

    #[test]
    fn test_cancelled_token_stops_before_hashing() {
        let token = CancellationToken::new();
        token.cancel();

        let result = mine(&token, draft(vec![transfer()]));
        assert!(matches!(result, Err(MinerError::Cancelled { attempts: 0 })));
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let token = CancellationToken::new();
        let canceller = token.clone();

        // the search may still win before the cancel lands
        let handle = std::thread::spawn(move || mine(&token, draft(vec![transfer()])));
        canceller.cancel();

        match handle.join().unwrap() {
            Ok(block) => assert!(is_valid_proof_of_work(&block.hash().unwrap())),
            Err(err) => assert!(matches!(err, MinerError::Cancelled { .. })),
        }
    }
}
