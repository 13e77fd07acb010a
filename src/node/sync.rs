use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};

use crate::api::schema::StatusRes;
use crate::blockchain::{Block, Ledger, LedgerError};

use super::client::{PeerClient, PeerError};
use super::mempool::Mempool;
use super::peer::{PeerNode, PeerRegistry};

/// What one sync round achieved across all peers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub reachable: usize,
    pub unreachable: usize,
    pub blocks_applied: usize,
    pub peers_learned: usize,
}

#[derive(Debug, Default)]
struct PeerOutcome {
    blocks_applied: usize,
    peers_learned: usize,
}

/// Pulls blocks, peers and pending transactions from every known peer
pub struct Synchronizer {
    me: PeerNode,
    ledger: Arc<Ledger>,
    peers: Arc<PeerRegistry>,
    mempool: Arc<Mempool>,
    client: Arc<dyn PeerClient>,
    timeout: Duration,
}

impl Synchronizer {
    pub fn new(
        me: PeerNode,
        ledger: Arc<Ledger>,
        peers: Arc<PeerRegistry>,
        mempool: Arc<Mempool>,
        client: Arc<dyn PeerClient>,
        timeout: Duration,
    ) -> Self {
        Synchronizer {
            me,
            ledger,
            peers,
            mempool,
            client,
            timeout,
        }
    }

    /// Runs one sync round against every known peer
    ///
    /// Peers are polled concurrently. A peer that fails or times out is
    /// marked disconnected and skipped; it stays registered and is retried
    /// next round.
    pub async fn sync_cycle(&self) -> SyncReport {
        let peers: Vec<PeerNode> = self.peers.known_peers().into_values().collect();
        let outcomes = join_all(peers.iter().map(|peer| self.sync_with(peer))).await;

        let mut report = SyncReport::default();
        for (peer, outcome) in peers.iter().zip(outcomes) {
            match outcome {
                Ok(outcome) => {
                    report.reachable += 1;
                    report.blocks_applied += outcome.blocks_applied;
                    report.peers_learned += outcome.peers_learned;
                }
                Err(err) => {
                    warn!("Sync with {} failed: {}", peer.tcp_address(), err);
                    self.peers.set_connected(&peer.tcp_address(), false);
                    report.unreachable += 1;
                }
            }
        }

        debug!("Sync round finished: {:?}", report);
        report
    }

    async fn sync_with(&self, peer: &PeerNode) -> Result<PeerOutcome, PeerError> {
        let status = self.bounded(peer, self.client.status(peer)).await?;

        if !peer.connected {
            self.join(peer).await;
        }

        let blocks_applied = self.sync_blocks(peer, &status).await?;
        let peers_learned = self.sync_known_peers(&status);
        self.sync_pending_txs(peer, status);

        Ok(PeerOutcome {
            blocks_applied,
            peers_learned,
        })
    }

    /// Announces this node to `peer`; a refusal only delays `connected`
    async fn join(&self, peer: &PeerNode) {
        match self.bounded(peer, self.client.announce(peer, &self.me)).await {
            Ok(()) => {
                info!("Joined peer {}", peer.tcp_address());
                self.peers.set_connected(&peer.tcp_address(), true);
            }
            Err(err) => warn!("Failed to join peer {}: {}", peer.tcp_address(), err),
        }
    }

    async fn sync_blocks(&self, peer: &PeerNode, status: &StatusRes) -> Result<usize, PeerError> {
        let local_next = self.ledger.next_block_number();
        if status.next_block_number <= local_next {
            return Ok(0);
        }

        info!(
            "Found {} new blocks from peer {}",
            status.next_block_number - local_next,
            peer.tcp_address()
        );

        let mut blocks = self
            .bounded(peer, self.client.blocks_from(peer, local_next))
            .await?;
        blocks.sort_by_key(Block::number);

        let applied = match self.ledger.add_blocks(&blocks) {
            Ok(applied) => applied,
            Err(LedgerError::BlockRejected { applied, .. }) => applied,
            Err(err) => {
                warn!("Failed to apply blocks from {}: {}", peer.tcp_address(), err);
                0
            }
        };

        for block in &blocks[..applied] {
            self.mempool.remove_included(block);
        }
        if applied > 0 {
            self.mempool.revalidate(&self.ledger.balances());
        }

        Ok(applied)
    }

    fn sync_known_peers(&self, status: &StatusRes) -> usize {
        let mut learned = 0;
        for peer in status.peers_known.values() {
            if self.peers.is_known_peer(peer) {
                continue;
            }

            let mut peer = peer.clone();
            peer.connected = false;
            if self.peers.add_peer(peer) {
                learned += 1;
            }
        }
        learned
    }

    fn sync_pending_txs(&self, peer: &PeerNode, status: StatusRes) {
        let balances = self.ledger.balances();
        for tx in status.pending_txs {
            if let Err(err) = self.mempool.add(tx, &balances) {
                debug!("Skipped pending tx from {}: {}", peer.tcp_address(), err);
            }
        }
    }

    async fn bounded<T, F>(&self, peer: &PeerNode, request: F) -> Result<T, PeerError>
    where
        F: Future<Output = Result<T, PeerError>>,
    {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| PeerError::Timeout {
                peer: peer.tcp_address(),
                after: self.timeout,
            })?
    }
}
