use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A remote node, identified by `ip:port`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PeerNode {
    pub ip: String,
    pub port: u16,
    pub is_bootstrap: bool,

    /// Local liveness marker, never sent over the wire
    #[serde(skip)]
    pub connected: bool,
}

impl PeerNode {
    pub fn new(ip: impl Into<String>, port: u16, is_bootstrap: bool, connected: bool) -> Self {
        PeerNode {
            ip: ip.into(),
            port,
            is_bootstrap,
            connected,
        }
    }

    pub fn tcp_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.tcp_address())
    }
}

/// Known peers keyed by `ip:port`
///
/// Every operation takes the map's shard lock only for its own duration, so
/// nothing here is ever held across a network call.
#[derive(Debug)]
pub struct PeerRegistry {
    own_address: String,
    peers: DashMap<String, PeerNode>,
}

impl PeerRegistry {
    /// Creates a registry for the node listening on `own`
    pub fn new(own: &PeerNode) -> Self {
        PeerRegistry {
            own_address: own.tcp_address(),
            peers: DashMap::new(),
        }
    }

    /// Registers a peer unless it is this node or already known
    ///
    /// An existing entry is never overwritten, so a peer first seen as a
    /// bootstrap node keeps that flag.
    ///
    /// # Returns
    ///
    /// true if the peer was newly registered
    pub fn add_peer(&self, peer: PeerNode) -> bool {
        let address = peer.tcp_address();
        if address == self.own_address {
            return false;
        }

        match self.peers.entry(address) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                info!("Registered peer {}", entry.key());
                entry.insert(peer);
                true
            }
        }
    }

    pub fn remove_peer(&self, peer: &PeerNode) -> Option<PeerNode> {
        self.peers.remove(&peer.tcp_address()).map(|(_, peer)| peer)
    }

    /// Whether the peer is registered; this node always counts as known
    pub fn is_known_peer(&self, peer: &PeerNode) -> bool {
        let address = peer.tcp_address();
        address == self.own_address || self.peers.contains_key(&address)
    }

    pub fn set_connected(&self, address: &str, connected: bool) {
        if let Some(mut peer) = self.peers.get_mut(address) {
            peer.connected = connected;
        }
    }

    pub fn get(&self, address: &str) -> Option<PeerNode> {
        self.peers.get(address).map(|peer| peer.clone())
    }

    /// Snapshot of every known peer, keyed and ordered by address
    pub fn known_peers(&self) -> BTreeMap<String, PeerNode> {
        self.peers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PeerRegistry {
        PeerRegistry::new(&PeerNode::new("127.0.0.1", 8080, false, true))
    }

    #[test]
    fn test_add_and_know_peer() {
        let peers = registry();
        let peer = PeerNode::new("127.0.0.1", 8081, false, false);

        assert!(!peers.is_known_peer(&peer));
        assert!(peers.add_peer(peer.clone()));
        assert!(peers.is_known_peer(&peer));
        assert_eq!(peers.len(), 1);
    }

    #[test]
    fn test_self_is_always_known_and_never_added() {
        let peers = registry();
        let me = PeerNode::new("127.0.0.1", 8080, false, false);

        assert!(peers.is_known_peer(&me));
        assert!(!peers.add_peer(me));
        assert_eq!(peers.len(), 0);
    }

    #[test]
    fn test_add_never_overwrites_bootstrap_flag() {
        let peers = registry();
        peers.add_peer(PeerNode::new("10.0.0.1", 8080, true, false));

        assert!(!peers.add_peer(PeerNode::new("10.0.0.1", 8080, false, true)));

        let stored = peers.get("10.0.0.1:8080").unwrap();
        assert!(stored.is_bootstrap);
        assert!(!stored.connected);
    }

    #[test]
    fn test_remove_and_connected_flag() {
        let peers = registry();
        let peer = PeerNode::new("10.0.0.2", 9000, false, false);
        peers.add_peer(peer.clone());

        peers.set_connected("10.0.0.2:9000", true);
        assert!(peers.get("10.0.0.2:9000").unwrap().connected);

        assert!(peers.remove_peer(&peer).is_some());
        assert!(!peers.is_known_peer(&peer));
    }

    #[test]
    fn test_connected_is_not_serialized() {
        let peer = PeerNode::new("10.0.0.3", 9000, true, true);
        let json = serde_json::to_value(&peer).unwrap();

        assert_eq!(json, serde_json::json!({"ip": "10.0.0.3", "port": 9000, "is_bootstrap": true}));

        let decoded: PeerNode = serde_json::from_value(json).unwrap();
        assert!(!decoded.connected);
    }
}
