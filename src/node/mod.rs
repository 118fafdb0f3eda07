//! A running ledger node
//!
//! Wires the chain, the transaction pool, the wallet and the gossip layer
//! together and exposes the operations a request surface would call.

pub mod miner;
pub mod sync;

pub use miner::{MiningReport, MiningSlot, TransactionMiner};
pub use sync::ChainSync;

use crate::core::{Block, Blockchain, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::{Gossip, GossipSettings, Transport};
use crate::storage::TransactionPool;
use crate::wallet::Wallet;
use log::info;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) fn lock_chain(blockchain: &Mutex<Blockchain>) -> Result<MutexGuard<'_, Blockchain>> {
    blockchain
        .lock()
        .map_err(|_| BlockchainError::Poisoned("blockchain".to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletInfo {
    pub address: String,
    pub balance: u64,
}

pub struct Node {
    blockchain: Arc<Mutex<Blockchain>>,
    pool: Arc<TransactionPool>,
    wallet: Wallet,
    gossip: Gossip,
    miner: TransactionMiner,
}

impl Node {
    pub fn new(transport: Arc<dyn Transport>, settings: GossipSettings) -> Result<Node> {
        let blockchain = Arc::new(Mutex::new(Blockchain::new()));
        let pool = Arc::new(TransactionPool::new());
        let wallet = Wallet::new()?;
        let mining = MiningSlot::new();

        let sync = ChainSync::new(Arc::clone(&blockchain), Arc::clone(&pool), mining.clone());
        let gossip = Gossip::new(transport, Arc::new(sync), settings);
        let miner = TransactionMiner::new(
            Arc::clone(&blockchain),
            Arc::clone(&pool),
            gossip.clone(),
            wallet.get_address(),
            mining,
        );

        Ok(Node {
            blockchain,
            pool,
            wallet,
            gossip,
            miner,
        })
    }

    /// Connect to the broker; false means the background reconnect loop is now running
    pub fn start(&self) -> bool {
        info!(
            "Starting node {} with wallet {}",
            self.gossip.node_id(),
            self.wallet.get_address()
        );
        self.gossip.initialize()
    }

    pub fn chain_snapshot(&self) -> Result<Vec<Block>> {
        Ok(lock_chain(&self.blockchain)?.get_chain().to_vec())
    }

    /// Mine `data` into a block right away and broadcast the new chain
    pub fn submit_block(&self, data: Vec<Transaction>, miner_id: &str) -> Result<Block> {
        match self.miner.submit_block(data, miner_id)? {
            MiningReport::Mined(block) => Ok(block),
            MiningReport::Rejected(reason) => Err(BlockchainError::Mining(reason)),
            MiningReport::Cancelled => Err(BlockchainError::Mining(
                "a peer chain was adopted while mining".to_string(),
            )),
        }
    }

    /// Pay `amount` to `recipient`, folding it into this wallet's pending
    /// transaction when there is one
    pub fn submit_transaction(&self, recipient: &str, amount: u64) -> Result<Transaction> {
        let transaction = match self.pool.existing_transaction(self.wallet.get_address()) {
            Some(mut pending) => {
                pending.update(&self.wallet, recipient, amount)?;
                pending
            }
            None => {
                let chain = self.chain_snapshot()?;
                self.wallet.create_transaction(recipient, amount, &chain)?
            }
        };

        self.pool.set_transaction(transaction.clone());
        self.gossip.broadcast_transaction(&transaction);
        Ok(transaction)
    }

    pub fn mine_transactions(&self, miner_id: &str) -> Result<MiningReport> {
        self.miner.mine_transactions(miner_id)
    }

    pub fn wallet_info(&self) -> Result<WalletInfo> {
        let blockchain = lock_chain(&self.blockchain)?;
        Ok(WalletInfo {
            address: self.wallet.get_address().to_string(),
            balance: self.wallet.balance(blockchain.get_chain()),
        })
    }

    pub fn gossip(&self) -> &Gossip {
        &self.gossip
    }

    pub fn pool(&self) -> &TransactionPool {
        self.pool.as_ref()
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn shutdown(&self) {
        self.gossip.close();
    }
}
