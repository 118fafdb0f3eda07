use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gossip-ledger")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a node and join the gossip network")]
    StartNode {
        #[arg(long = "miner-id", help = "Identity recorded in blocks this node mines")]
        miner_id: Option<String>,
        #[arg(
            long = "mine-interval",
            help = "Mine pending transactions every N milliseconds"
        )]
        mine_interval: Option<u64>,
        #[arg(long, help = "Path to a TOML config file")]
        config: Option<PathBuf>,
    },
    #[command(name = "genesis", about = "Print the canonical genesis block as JSON")]
    Genesis,
    #[command(name = "newwallet", about = "Generate a key pair and print its address")]
    NewWallet,
}
