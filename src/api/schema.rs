//! Request and response bodies shared by the HTTP handlers and the peer client

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::blockchain::{Balances, Block, Hash, Tx};
use crate::node::peer::PeerNode;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrRes {
    pub error: String,
}

/// Committed balances at a given chain head
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalancesRes {
    #[schema(value_type = String)]
    pub block_hash: Hash,

    #[schema(value_type = Object)]
    pub balances: Balances,
}

/// A transfer submitted by a client
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TxAddReq {
    pub from: String,
    pub to: String,
    pub value: u64,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TxAddRes {
    #[schema(value_type = String)]
    pub hash: Hash,
}

/// What a node reports about itself to clients and peers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusRes {
    #[schema(value_type = String)]
    pub block_hash: Hash,
    pub block_number: u64,
    pub next_block_number: u64,
    pub peers_known: BTreeMap<String, PeerNode>,
    pub pending_txs: Vec<Tx>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SyncQuery {
    /// First block number to return
    #[serde(rename = "fromBlock")]
    pub from_block: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncRes {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AddPeerQuery {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddPeerRes {
    pub success: bool,
    #[serde(default)]
    pub error: String,
}
