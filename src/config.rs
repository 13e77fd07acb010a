use std::path::PathBuf;
use std::time::Duration;

use crate::blockchain::Account;
use crate::node::peer::PeerNode;

pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MINER: &str = "andrej";
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MINING_INTERVAL: Duration = Duration::from_secs(10);

/// Everything a node needs to start
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub ip: String,
    pub port: u16,
    pub miner: Account,
    pub bootstrap: Option<PeerNode>,
    pub sync_interval: Duration,
    pub peer_timeout: Duration,
    pub mining_interval: Duration,
}

impl NodeConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        NodeConfig {
            data_dir: data_dir.into(),
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_HTTP_PORT,
            miner: Account::from(DEFAULT_MINER),
            bootstrap: Some(PeerNode::new(DEFAULT_IP, DEFAULT_HTTP_PORT, true, false)),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            mining_interval: DEFAULT_MINING_INTERVAL,
        }
    }

    /// This node as peers see it
    pub fn own_peer(&self) -> PeerNode {
        PeerNode::new(self.ip.clone(), self.port, false, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::new("/tmp/tbb");

        assert_eq!(config.own_peer().tcp_address(), "127.0.0.1:8080");
        assert!(config.bootstrap.as_ref().unwrap().is_bootstrap);
        assert_eq!(config.miner, Account::from("andrej"));
    }
}
