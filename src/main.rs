// This is the entry point for the ledger node CLI
use clap::Parser;
use gossip_ledger::{Block, Command, Config, MiningReport, NatsTransport, Node, Opt, Wallet};
use log::{error, info, warn, LevelFilter};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// How often an idle node without a mining interval checks in
const IDLE_TICK_MS: u64 = 30_000;

fn main() {
    // Info level by default; RUST_LOG still overrides it
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Genesis => {
            println!("{}", serde_json::to_string_pretty(&Block::genesis())?);
        }
        Command::NewWallet => {
            let wallet = Wallet::new()?;
            println!("Your new address: {}", wallet.get_address());
        }
        Command::StartNode {
            miner_id,
            mine_interval,
            config,
        } => {
            let mut config = Config::load(config.as_deref())?;
            // Flags beat the file and the environment
            if miner_id.is_some() {
                config.miner_id = miner_id;
            }
            if mine_interval.is_some() {
                config.mine_interval_ms = mine_interval;
            }
            run_node(config)?;
        }
    }
    Ok(())
}

fn run_node(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let transport = NatsTransport::new(&config.nats_url, "gossip-ledger")?;
    let node = Node::new(Arc::new(transport), config.gossip_settings())?;

    if !node.start() {
        warn!(
            "Broker at {} unreachable; retrying in the background",
            config.nats_url
        );
    }
    let wallet = node.wallet_info()?;
    info!("Wallet {} holds {}", wallet.address, wallet.balance);

    let miner_id = config
        .miner_id
        .clone()
        .unwrap_or_else(|| node.gossip().node_id().to_string());

    match config.mine_interval_ms {
        Some(interval) => {
            info!("Mining as {miner_id} every {interval}ms");
            loop {
                thread::sleep(Duration::from_millis(interval));
                match node.mine_transactions(&miner_id) {
                    Ok(MiningReport::Mined(block)) => info!("Mined block {}", block.get_hash()),
                    Ok(MiningReport::Rejected(reason)) => warn!("Block rejected: {reason}"),
                    Ok(MiningReport::Cancelled) => info!("Mining round cancelled"),
                    Err(e) => error!("Mining failed: {e}"),
                }
            }
        }
        None => loop {
            thread::sleep(Duration::from_millis(IDLE_TICK_MS));
            let height = node.chain_snapshot()?.len() - 1;
            let status = format!("height {height}, {} pending", node.pool().len());
            info!("Node {}: {status}", node.gossip().node_id());
            node.gossip().broadcast_status(&status);
        },
    }
}
