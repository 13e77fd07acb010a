use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::account::Account;
use super::crypto::{hash_json, CryptoError, Hash};
use super::transaction::Tx;

/// Header fields covered by the block hash
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BlockHeader {
    /// Hash of the previous block
    #[schema(value_type = String)]
    pub parent: Hash,

    /// Height of the block in the chain, starting at 0
    pub number: u64,

    /// Proof of work
    pub nonce: u32,

    /// Unix timestamp when the block was drafted
    pub time: u64,

    /// Account credited with the block reward
    pub miner: Account,
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    pub header: BlockHeader,

    /// Transactions in submission order
    #[serde(rename = "payload")]
    pub txs: Vec<Tx>,
}

impl Block {
    /// Creates a new block
    ///
    /// # Arguments
    ///
    /// * `parent` - The hash of the previous block
    /// * `number` - The height of the block
    /// * `nonce` - The proof of work
    /// * `time` - Unix timestamp of the draft
    /// * `miner` - The account receiving the block reward
    /// * `txs` - The list of transactions to include in the block
    ///
    /// # Returns
    ///
    /// A new Block instance
    pub fn new(parent: Hash, number: u64, nonce: u32, time: u64, miner: Account, txs: Vec<Tx>) -> Self {
        Block {
            header: BlockHeader {
                parent,
                number,
                nonce,
                time,
                miner,
            },
            txs,
        }
    }

    /// Calculates the canonical hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block's JSON form
    pub fn hash(&self) -> Result<Hash, CryptoError> {
        hash_json(self)
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }
}

/// One line of the block store: a block together with its hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFs {
    pub hash: Hash,
    pub block: Block,
}
