use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::info;
use tokio_util::sync::CancellationToken;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod cli;
mod config;
mod node;

use blockchain::{DataDir, Ledger};
use cli::{Cli, Commands};
use config::NodeConfig;
use node::client::HttpPeerClient;
use node::Node;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::list_balances,
        api::handlers::add_tx,
        api::handlers::node_status,
        api::handlers::sync_blocks,
        api::handlers::add_peer
    ),
    components(
        schemas(
            blockchain::Account,
            blockchain::Block,
            blockchain::BlockHeader,
            blockchain::Tx,
            blockchain::TxKind,
            node::peer::PeerNode,
            api::schema::ErrRes,
            api::schema::BalancesRes,
            api::schema::TxAddReq,
            api::schema::TxAddRes,
            api::schema::StatusRes,
            api::schema::SyncRes,
            api::schema::AddPeerRes
        )
    ),
    tags(
        (name = "tbb", description = "Blockchain node API")
    ),
    info(
        title = "TBB Node API",
        version = "0.1.0",
        description = "Balances, transactions and peer sync of a TBB node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

/// Prints the committed balances of a data directory
fn list_balances(data_dir: &DataDir) -> anyhow::Result<()> {
    let ledger = Ledger::load(data_dir).context("failed to load ledger")?;

    println!("Accounts balances at {}:", ledger.latest_block_hash());
    println!("__________________");
    for (account, balance) in ledger.balances().iter() {
        println!("{}: {}", account, balance);
    }

    ledger.close()?;
    Ok(())
}

async fn run_node(config: NodeConfig) -> anyhow::Result<()> {
    let ledger = Ledger::load(&DataDir::new(&config.data_dir)).context("failed to load ledger")?;
    let client = HttpPeerClient::new(config.peer_timeout).context("failed to build peer client")?;
    let node = Node::new(config.clone(), ledger, Arc::new(client));

    let token = CancellationToken::new();
    let sync_task = tokio::spawn(node.clone().run_sync(token.clone()));
    let mining_task = tokio::spawn(node.clone().run_mining(token.clone()));

    info!("Starting HTTP server at http://{}:{}", config.ip, config.port);

    let data = web::Data::from(node.clone());
    let server = HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(data.clone())
            .configure(api::configure_routes)
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
    })
    .bind((config.ip.as_str(), config.port))?
    .run()
    .await;

    // The server returns on SIGINT/SIGTERM; stop background work before
    // releasing the store
    token.cancel();
    let _ = tokio::join!(sync_task, mining_task);
    node.close()?;

    server.context("HTTP server failed")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    match cli.command {
        Commands::Version => {
            println!("tbb {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Balances { datadir } => list_balances(&DataDir::new(datadir)),
        Commands::Run(args) => run_node(NodeConfig::from(args)).await,
    }
}
