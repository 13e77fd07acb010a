use actix_web::{web, HttpResponse, Responder};
use log::warn;

use crate::blockchain::{Account, Tx};
use crate::node::peer::PeerNode;
use crate::node::{Node, NodeError};

use super::schema::{
    AddPeerQuery, AddPeerRes, BalancesRes, ErrRes, StatusRes, SyncQuery, SyncRes, TxAddReq, TxAddRes,
};

/// Data structure for the node state
pub type NodeData = web::Data<Node>;

fn error_response(err: NodeError) -> HttpResponse {
    let body = ErrRes {
        error: err.to_string(),
    };

    match err {
        NodeError::Mempool(_) => HttpResponse::BadRequest().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// List balances
///
/// Returns the committed balances and the hash of the block they reflect
#[utoipa::path(
    get,
    path = "/balances/list",
    responses(
        (status = 200, description = "Balances retrieved successfully", body = BalancesRes)
    )
)]
pub async fn list_balances(node: NodeData) -> impl Responder {
    let state = node.ledger().snapshot();

    HttpResponse::Ok().json(BalancesRes {
        block_hash: state.latest_block_hash,
        balances: state.balances,
    })
}

/// Submit a transaction
///
/// Adds a transfer to the pending pool; it is committed once mined
#[utoipa::path(
    post,
    path = "/tx/add",
    request_body = TxAddReq,
    responses(
        (status = 201, description = "Transaction accepted", body = TxAddRes),
        (status = 400, description = "Invalid transaction", body = ErrRes)
    )
)]
pub async fn add_tx(node: NodeData, req: web::Json<TxAddReq>) -> impl Responder {
    let req = req.into_inner();
    let tx = Tx::new(Account::new(req.from), Account::new(req.to), req.value, req.data);

    match node.add_tx(tx) {
        Ok(hash) => HttpResponse::Created().json(TxAddRes { hash }),
        Err(err) => error_response(err),
    }
}

/// Node status
///
/// Reports the chain head, known peers and pending transactions
#[utoipa::path(
    get,
    path = "/node/status",
    responses(
        (status = 200, description = "Status retrieved successfully", body = StatusRes)
    )
)]
pub async fn node_status(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.status())
}

/// Blocks from a given number onward
#[utoipa::path(
    get,
    path = "/node/sync",
    params(SyncQuery),
    responses(
        (status = 200, description = "Blocks retrieved successfully", body = SyncRes),
        (status = 500, description = "Block store unavailable", body = ErrRes)
    )
)]
pub async fn sync_blocks(node: NodeData, query: web::Query<SyncQuery>) -> impl Responder {
    match node.ledger().blocks_from(query.from_block) {
        Ok(blocks) => HttpResponse::Ok().json(SyncRes { blocks }),
        Err(err) => {
            warn!("Failed to read blocks from {}: {}", query.from_block, err);
            error_response(err.into())
        }
    }
}

/// Register a peer
#[utoipa::path(
    get,
    path = "/node/peer",
    params(AddPeerQuery),
    responses(
        (status = 200, description = "Peer registered or already known", body = AddPeerRes)
    )
)]
pub async fn add_peer(node: NodeData, query: web::Query<AddPeerQuery>) -> impl Responder {
    let query = query.into_inner();
    let peer = PeerNode::new(query.ip, query.port, false, true);

    if peer.tcp_address() == node.info().tcp_address() {
        return HttpResponse::Ok().json(AddPeerRes {
            success: false,
            error: "cannot add self as a peer".to_string(),
        });
    }

    node.add_peer(peer);
    HttpResponse::Ok().json(AddPeerRes {
        success: true,
        error: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::blockchain::testing::temp_ledger;
    use crate::blockchain::Block;
    use crate::config::NodeConfig;
    use crate::node::client::{PeerClient, PeerError};
    use actix_web::{test, App};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Offline;

    #[async_trait]
    impl PeerClient for Offline {
        async fn status(&self, peer: &PeerNode) -> Result<StatusRes, PeerError> {
            Err(PeerError::Refused {
                peer: peer.tcp_address(),
                reason: "offline".to_string(),
            })
        }

        async fn blocks_from(&self, _peer: &PeerNode, _from: u64) -> Result<Vec<Block>, PeerError> {
            Ok(Vec::new())
        }

        async fn announce(&self, _peer: &PeerNode, _me: &PeerNode) -> Result<(), PeerError> {
            Ok(())
        }
    }

    fn node_data() -> (tempfile::TempDir, NodeData) {
        let (dir, ledger) = temp_ledger(&[("andrej", 1_000_000)]);
        let mut config = NodeConfig::new(dir.path());
        config.bootstrap = None;
        let node = Node::new(config, ledger, Arc::new(Offline));
        (dir, web::Data::from(node))
    }

    #[actix_web::test]
    async fn test_list_balances() {
        let (_dir, data) = node_data();
        let app = test::init_service(App::new().app_data(data).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/balances/list").to_request();
        let res: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(res["balances"]["andrej"], 1_000_000);
        assert_eq!(res["block_hash"], "0".repeat(64));
    }

    #[actix_web::test]
    async fn test_add_tx_and_status() {
        let (_dir, data) = node_data();
        let app = test::init_service(App::new().app_data(data).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/tx/add")
            .set_json(serde_json::json!({"from": "andrej", "to": "babayaga", "value": 2000}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 201);

        let req = test::TestRequest::get().uri("/node/status").to_request();
        let status: StatusRes = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status.pending_txs.len(), 1);
        assert_eq!(status.next_block_number, 0);
    }

    #[actix_web::test]
    async fn test_add_tx_insufficient_balance() {
        let (_dir, data) = node_data();
        let app = test::init_service(App::new().app_data(data).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/tx/add")
            .set_json(serde_json::json!({"from": "babayaga", "to": "andrej", "value": 1}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 400);

        let body: ErrRes = test::read_body_json(res).await;
        assert!(body.error.contains("Insufficient balance"));
    }

    #[actix_web::test]
    async fn test_add_peer_and_sync_blocks() {
        let (_dir, data) = node_data();
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure_routes)).await;

        let req = test::TestRequest::get()
            .uri("/node/peer?ip=10.0.0.7&port=9090")
            .to_request();
        let res: AddPeerRes = test::call_and_read_body_json(&app, req).await;
        assert!(res.success);
        assert!(data.peers().get("10.0.0.7:9090").is_some());

        let req = test::TestRequest::get()
            .uri("/node/peer?ip=127.0.0.1&port=8080")
            .to_request();
        let res: AddPeerRes = test::call_and_read_body_json(&app, req).await;
        assert!(!res.success);

        let req = test::TestRequest::get().uri("/node/sync?fromBlock=0").to_request();
        let res: SyncRes = test::call_and_read_body_json(&app, req).await;
        assert!(res.blocks.is_empty());
    }
}
