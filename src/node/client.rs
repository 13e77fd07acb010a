use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::schema::{AddPeerRes, StatusRes, SyncRes};
use crate::blockchain::Block;

use super::peer::PeerNode;

/// Errors that can occur while talking to a peer
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Request to {peer} failed: {source}")]
    Request {
        peer: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Peer {peer} did not answer within {after:?}")]
    Timeout { peer: String, after: Duration },

    #[error("Peer {peer} refused the request: {reason}")]
    Refused { peer: String, reason: String },
}

/// The requests a node makes to its peers during sync
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Head, known peers and pending transactions of `peer`
    async fn status(&self, peer: &PeerNode) -> Result<StatusRes, PeerError>;

    /// Every block `peer` holds with number >= `from`
    async fn blocks_from(&self, peer: &PeerNode, from: u64) -> Result<Vec<Block>, PeerError>;

    /// Asks `peer` to register `me` as a known peer
    async fn announce(&self, peer: &PeerNode, me: &PeerNode) -> Result<(), PeerError>;
}

/// `PeerClient` speaking the node's HTTP API
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    /// Creates a client whose every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpPeerClient { client })
    }

    async fn get_json<T>(&self, peer: &PeerNode, path: &str, query: &[(&str, String)]) -> Result<T, PeerError>
    where
        T: serde::de::DeserializeOwned,
    {
        let request_error = |source| PeerError::Request {
            peer: peer.tcp_address(),
            source,
        };

        self.client
            .get(format!("{}{}", peer.base_url(), path))
            .query(query)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(request_error)?
            .json::<T>()
            .await
            .map_err(request_error)
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn status(&self, peer: &PeerNode) -> Result<StatusRes, PeerError> {
        self.get_json(peer, "/node/status", &[]).await
    }

    async fn blocks_from(&self, peer: &PeerNode, from: u64) -> Result<Vec<Block>, PeerError> {
        let res: SyncRes = self
            .get_json(peer, "/node/sync", &[("fromBlock", from.to_string())])
            .await?;
        Ok(res.blocks)
    }

    async fn announce(&self, peer: &PeerNode, me: &PeerNode) -> Result<(), PeerError> {
        let query = [("ip", me.ip.clone()), ("port", me.port.to_string())];
        let res: AddPeerRes = self.get_json(peer, "/node/peer", &query).await?;

        if !res.success {
            return Err(PeerError::Refused {
                peer: peer.tcp_address(),
                reason: res.error,
            });
        }
        Ok(())
    }
}
