use crate::core::{Block, Blockchain, Transaction};
use crate::network::MessageHandler;
use crate::node::miner::MiningSlot;
use crate::storage::TransactionPool;
use log::{error, info};
use std::sync::{Arc, Mutex};

/// Applies inbound gossip to the local chain and pool
pub struct ChainSync {
    blockchain: Arc<Mutex<Blockchain>>,
    pool: Arc<TransactionPool>,
    mining: MiningSlot,
}

impl ChainSync {
    pub fn new(
        blockchain: Arc<Mutex<Blockchain>>,
        pool: Arc<TransactionPool>,
        mining: MiningSlot,
    ) -> ChainSync {
        ChainSync {
            blockchain,
            pool,
            mining,
        }
    }
}

impl MessageHandler for ChainSync {
    fn on_chain(&self, sender: &str, chain: Vec<Block>) {
        let mut blockchain = match self.blockchain.lock() {
            Ok(blockchain) => blockchain,
            Err(_) => {
                error!("Chain lock poisoned; ignoring chain from {sender}");
                return;
            }
        };

        let pool = &self.pool;
        let mining = &self.mining;
        let accepted = blockchain.replace_chain(chain, true, |accepted| {
            pool.clear_blockchain_transactions(accepted);
            // A local search atop the old tip can no longer win
            mining.cancel_active();
        });
        if accepted.is_ok() {
            info!(
                "Replaced chain with {} blocks from {sender}",
                blockchain.len()
            );
        }
    }

    fn on_transaction(&self, _sender: &str, transaction: Transaction) {
        self.pool.set_transaction(transaction);
    }
}
