// CLI commands

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::blockchain::Account;
use crate::config::{NodeConfig, DEFAULT_HTTP_PORT, DEFAULT_IP, DEFAULT_MINER};
use crate::node::peer::PeerNode;

#[derive(Parser)]
#[command(name = "tbb")]
#[command(about = "The Blockchain Bar CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launches the node and its HTTP API
    Run(RunArgs),

    /// Lists committed balances
    Balances {
        /// Directory holding the node's database
        #[arg(long)]
        datadir: PathBuf,
    },

    /// Prints the CLI version
    Version,
}

#[derive(Args)]
pub struct RunArgs {
    /// Directory holding the node's database
    #[arg(long)]
    pub datadir: PathBuf,

    /// IP this node listens on and advertises to peers
    #[arg(long, default_value = DEFAULT_IP)]
    pub ip: String,

    /// Exposed HTTP port for communication with peers
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// Account credited with block rewards
    #[arg(long, default_value = DEFAULT_MINER)]
    pub miner: String,

    /// IP of the bootstrap peer
    #[arg(long, default_value = DEFAULT_IP)]
    pub bootstrap_ip: String,

    /// Port of the bootstrap peer
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    pub bootstrap_port: u16,

    /// Start without a bootstrap peer
    #[arg(long)]
    pub disable_bootstrap: bool,
}

impl From<RunArgs> for NodeConfig {
    fn from(args: RunArgs) -> Self {
        let mut config = NodeConfig::new(args.datadir);
        config.ip = args.ip;
        config.port = args.port;
        config.miner = Account::new(args.miner);
        config.bootstrap = if args.disable_bootstrap {
            None
        } else {
            Some(PeerNode::new(args.bootstrap_ip, args.bootstrap_port, true, false))
        };
        config
    }
}
