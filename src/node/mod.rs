// Node module
//
// Ties one ledger to the rest of the network:
// - Proof-of-work miner
// - Pending transaction pool
// - Peer registry and the HTTP peer client
// - Periodic sync with known peers

pub mod client;
pub mod mempool;
pub mod miner;
pub mod peer;
pub mod sync;

use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::schema::StatusRes;
use crate::blockchain::{Hash, Ledger, LedgerError, Tx};
use crate::config::NodeConfig;

use client::PeerClient;
use mempool::{Mempool, MempoolError};
use miner::{MinerError, PendingBlock};
use peer::{PeerNode, PeerRegistry};
use sync::Synchronizer;

/// Errors that can occur while running a node
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Miner error: {0}")]
    Miner(#[from] MinerError),

    #[error("Mempool error: {0}")]
    Mempool(#[from] MempoolError),

    #[error("Mining task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A running node: the ledger it owns plus its view of the network
pub struct Node {
    config: NodeConfig,
    ledger: Arc<Ledger>,
    peers: Arc<PeerRegistry>,
    mempool: Arc<Mempool>,
    sync: Synchronizer,
    /// Token of the search in flight, if any
    search: Mutex<Option<CancellationToken>>,
}

impl Node {
    /// Creates a node around a loaded ledger
    ///
    /// # Arguments
    ///
    /// * `config` - Node configuration
    /// * `ledger` - The ledger this node owns
    /// * `client` - How to reach peers
    ///
    /// # Returns
    ///
    /// A new Node, registered with its bootstrap peer
    pub fn new(config: NodeConfig, ledger: Ledger, client: Arc<dyn PeerClient>) -> Arc<Self> {
        let me = config.own_peer();
        let ledger = Arc::new(ledger);
        let peers = Arc::new(PeerRegistry::new(&me));
        let mempool = Arc::new(Mempool::new());

        if let Some(bootstrap) = config.bootstrap.clone() {
            peers.add_peer(bootstrap);
        }

        let sync = Synchronizer::new(
            me,
            ledger.clone(),
            peers.clone(),
            mempool.clone(),
            client,
            config.peer_timeout,
        );

        Arc::new(Node {
            config,
            ledger,
            peers,
            mempool,
            sync,
            search: Mutex::new(None),
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn info(&self) -> PeerNode {
        self.config.own_peer()
    }

    /// Submits a transaction to the pending pool
    pub fn add_tx(&self, tx: Tx) -> Result<Hash, NodeError> {
        Ok(self.mempool.add(tx, &self.ledger.balances())?)
    }

    /// Registers a peer reported by a client or another node
    pub fn add_peer(&self, peer: PeerNode) -> bool {
        self.peers.add_peer(peer)
    }

    pub fn status(&self) -> StatusRes {
        let state = self.ledger.snapshot();
        StatusRes {
            block_hash: state.latest_block_hash,
            block_number: state.latest_block.number(),
            next_block_number: state.next_block_number(),
            peers_known: self.peers.known_peers(),
            pending_txs: self.mempool.pending(),
        }
    }

    /// Mines the pending pool into one block and commits it
    ///
    /// Pending transactions that no longer apply to the current head are
    /// evicted before drafting.
    ///
    /// # Returns
    ///
    /// The hash of the committed block, or `None` when there was nothing to
    /// mine or the search was cancelled
    pub async fn mine_pending(&self, token: &CancellationToken) -> Result<Option<Hash>, NodeError> {
        let state = self.ledger.snapshot();
        self.mempool.revalidate(&state.balances);

        let txs = self.mempool.pending();
        if txs.is_empty() {
            return Ok(None);
        }

        let draft = PendingBlock::new(
            state.latest_block_hash,
            state.next_block_number(),
            self.config.miner.clone(),
            txs,
        );

        let search = token.child_token();
        *self.search.lock().unwrap_or_else(PoisonError::into_inner) = Some(search.clone());

        let result = tokio::task::spawn_blocking(move || miner::mine(&search, draft)).await;
        self.search.lock().unwrap_or_else(PoisonError::into_inner).take();

        let block = match result? {
            Ok(block) => block,
            Err(MinerError::Cancelled { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let hash = self.ledger.add_block(&block)?;
        self.mempool.remove_included(&block);
        self.mempool.revalidate(&self.ledger.balances());
        Ok(Some(hash))
    }

    /// Stops the search in flight; its draft no longer extends the head
    fn cancel_search(&self) {
        if let Some(search) = self.search.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            info!("New blocks synced, cancelling mining");
            search.cancel();
        }
    }

    /// Runs sync rounds on a fixed interval until the token fires
    pub async fn run_sync(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sync_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sync.sync_cycle().await;
                    if report.blocks_applied > 0 {
                        self.cancel_search();
                    }
                }
            }
        }
        info!("Sync loop stopped");
    }

    /// Mines pending transactions on a fixed interval until the token fires
    pub async fn run_mining(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.mining_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    match self.mine_pending(&token).await {
                        Ok(Some(hash)) => info!("Committed mined block {}", hash),
                        Ok(None) => {}
                        Err(NodeError::Ledger(err)) => warn!("Mined block rejected: {}", err),
                        Err(err) => error!("Mining failed: {}", err),
                    }
                }
            }
        }
        info!("Mining loop stopped");
    }

    /// Releases the ledger's block store
    pub fn close(&self) -> Result<(), NodeError> {
        Ok(self.ledger.close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::testing::temp_ledger;
    use crate::blockchain::{Account, BLOCK_REWARD};
    use async_trait::async_trait;
    use client::PeerError;

    struct Offline;

    #[async_trait]
    impl PeerClient for Offline {
        async fn status(&self, peer: &PeerNode) -> Result<StatusRes, PeerError> {
            Err(PeerError::Refused {
                peer: peer.tcp_address(),
                reason: "offline".to_string(),
            })
        }

        async fn blocks_from(&self, peer: &PeerNode, _from: u64) -> Result<Vec<crate::blockchain::Block>, PeerError> {
            self.status(peer).await.map(|_| Vec::new())
        }

        async fn announce(&self, peer: &PeerNode, _me: &PeerNode) -> Result<(), PeerError> {
            self.status(peer).await.map(|_| ())
        }
    }

    fn node(balances: &[(&str, u64)]) -> (tempfile::TempDir, Arc<Node>) {
        let (dir, ledger) = temp_ledger(balances);
        let config = NodeConfig::new(dir.path());
        (dir, Node::new(config, ledger, Arc::new(Offline)))
    }

    #[test]
    fn test_bootstrap_is_registered() {
        let (dir, ledger) = temp_ledger(&[]);
        let mut config = NodeConfig::new(dir.path());
        config.bootstrap = Some(PeerNode::new("127.0.0.1", 8081, true, false));
        let node = Node::new(config, ledger, Arc::new(Offline));

        let status = node.status();
        assert_eq!(status.next_block_number, 0);
        assert!(status.peers_known["127.0.0.1:8081"].is_bootstrap);
    }

    #[test]
    fn test_own_address_is_never_a_peer() {
        // the default bootstrap address is the default listen address
        let (_dir, node) = node(&[]);

        assert!(node.status().peers_known.is_empty());
        assert!(node.peers().is_known_peer(&node.info()));
    }

    #[tokio::test]
    async fn test_mine_pending_commits_block() {
        let (_dir, node) = node(&[("andrej", 1_000_000)]);
        node.add_tx(Tx::new(Account::from("andrej"), Account::from("babayaga"), 2000, ""))
            .unwrap();

        let hash = node.mine_pending(&CancellationToken::new()).await.unwrap().unwrap();

        let balances = node.ledger().balances();
        assert_eq!(node.ledger().latest_block_hash(), hash);
        assert_eq!(balances.get(&Account::from("andrej")), 998_000 + BLOCK_REWARD);
        assert_eq!(balances.get(&Account::from("babayaga")), 2000);
        assert!(node.mempool().is_empty());
    }

    #[tokio::test]
    async fn test_mine_pending_with_empty_pool() {
        let (_dir, node) = node(&[("andrej", 1_000_000)]);

        let result = node.mine_pending(&CancellationToken::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_mining_keeps_pool() {
        let (_dir, node) = node(&[("andrej", 1_000_000)]);
        node.add_tx(Tx::new(Account::from("andrej"), Account::from("babayaga"), 1, ""))
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = node.mine_pending(&token).await.unwrap();

        assert!(result.is_none());
        assert_eq!(node.mempool().len(), 1);
        assert_eq!(node.ledger().next_block_number(), 0);
    }

    #[test]
    fn test_add_tx_checks_balance() {
        let (_dir, node) = node(&[("andrej", 10)]);

        let result = node.add_tx(Tx::new(Account::from("andrej"), Account::from("babayaga"), 11, ""));
        assert!(matches!(
            result,
            Err(NodeError::Mempool(MempoolError::InsufficientBalance { .. }))
        ));
    }

    #[tokio::test]
    async fn test_synced_spend_does_not_wedge_mining() {
        let (_dir, node) = node(&[("andrej", 1000)]);
        node.add_tx(Tx::new(Account::from("andrej"), Account::from("x"), 600, "").with_time(1))
            .unwrap();

        // another node's block spends the same coins first
        let spend = Tx::new(Account::from("andrej"), Account::from("y"), 600, "").with_time(2);
        let synced = crate::blockchain::testing::seal(crate::blockchain::Block::new(
            Hash::default(),
            0,
            0,
            1,
            Account::from("caesar"),
            vec![spend],
        ));
        node.ledger().add_block(&synced).unwrap();

        let result = node.mine_pending(&CancellationToken::new()).await.unwrap();
        assert!(result.is_none());
        assert!(node.mempool().is_empty());

        node.add_tx(Tx::new(Account::from("andrej"), Account::from("x"), 100, "").with_time(3))
            .unwrap();
        let hash = node.mine_pending(&CancellationToken::new()).await.unwrap().unwrap();

        assert_eq!(node.ledger().latest_block_hash(), hash);
        assert_eq!(node.ledger().balances().get(&Account::from("andrej")), 300 + BLOCK_REWARD);
        assert_eq!(node.ledger().balances().get(&Account::from("x")), 100);
    }
}
