// This is the mining orchestrator. It appends optimistically, checks the
// resulting chain, and either rolls the block back or broadcasts it. The
// activity and monopoly rules are defined over the chain including the new
// block, so they cannot be checked before appending.

use crate::core::{Block, Blockchain, CancelToken, ConsensusRules, MineOutcome, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::Gossip;
use crate::node::lock_chain;
use crate::storage::TransactionPool;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

/// Cancel tokens of every mining search currently in flight
#[derive(Clone, Default)]
pub struct MiningSlot {
    active: Arc<Mutex<HashMap<u64, CancelToken>>>,
    next_job: Arc<AtomicU64>,
}

impl MiningSlot {
    pub fn new() -> MiningSlot {
        MiningSlot::default()
    }

    fn begin(&self) -> (u64, CancelToken) {
        let job = self.next_job.fetch_add(1, Ordering::SeqCst);
        let token = CancelToken::new();
        if let Ok(mut active) = self.active.lock() {
            active.insert(job, token.clone());
        }
        (job, token)
    }

    fn finish(&self, job: u64) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&job);
        }
    }

    pub fn cancel_active(&self) {
        if let Ok(active) = self.active.lock() {
            for token in active.values() {
                token.cancel();
            }
            if !active.is_empty() {
                info!("Cancelled {} in-flight mining job(s)", active.len());
            }
        }
    }

    pub fn is_mining(&self) -> bool {
        self.active.lock().map(|a| !a.is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningReport {
    /// Appended, self-checked and broadcast
    Mined(Block),
    /// Mined but rolled back or discarded; the reason names the failed rule
    Rejected(String),
    /// The search was aborted before a nonce was found
    Cancelled,
}

pub struct TransactionMiner {
    blockchain: Arc<Mutex<Blockchain>>,
    pool: Arc<TransactionPool>,
    gossip: Gossip,
    reward_address: String,
    mining: MiningSlot,
}

impl TransactionMiner {
    pub fn new(
        blockchain: Arc<Mutex<Blockchain>>,
        pool: Arc<TransactionPool>,
        gossip: Gossip,
        reward_address: &str,
        mining: MiningSlot,
    ) -> TransactionMiner {
        TransactionMiner {
            blockchain,
            pool,
            gossip,
            reward_address: reward_address.to_string(),
            mining,
        }
    }

    pub fn mine_transactions(&self, miner_id: &str) -> Result<MiningReport> {
        let validator = lock_chain(&self.blockchain)?.get_validator();
        let mut data = self.pool.valid_transactions(validator.as_ref());
        let pending = data.len();
        data.push(Transaction::reward(&self.reward_address));

        let report = self.mine_and_append(data, miner_id, true)?;
        if matches!(report, MiningReport::Mined(_)) {
            self.pool.clear();
            info!("Mined {pending} pending transaction(s) for {miner_id}");
        }
        Ok(report)
    }

    /// Mine `data` exactly as given and append it. Only the chain validity
    /// check runs; the consensus rules are left to the peers receiving it.
    pub fn submit_block(&self, data: Vec<Transaction>, miner_id: &str) -> Result<MiningReport> {
        self.mine_and_append(data, miner_id, false)
    }

    fn mine_and_append(
        &self,
        data: Vec<Transaction>,
        miner_id: &str,
        enforce_rules: bool,
    ) -> Result<MiningReport> {
        let tip = lock_chain(&self.blockchain)?.get_last_block().clone();

        // The search runs without the chain lock so inbound gossip keeps flowing
        let (job, cancel) = self.mining.begin();
        let (sender, receiver) = mpsc::sync_channel(1);
        let worker_miner = miner_id.to_string();
        let worker = thread::Builder::new()
            .name(format!("miner-{miner_id}"))
            .spawn(move || {
                let _ = sender.send(Block::mine(&tip, data, &worker_miner, &cancel));
            });
        let outcome = match worker {
            Ok(handle) => {
                let outcome = receiver.recv().map_err(|_| {
                    BlockchainError::Mining("mining worker exited without a result".to_string())
                });
                if handle.join().is_err() {
                    error!("Mining worker panicked");
                }
                outcome
            }
            Err(e) => Err(BlockchainError::from(e)),
        };
        self.mining.finish(job);

        match outcome?? {
            MineOutcome::Mined(block) => self.append_mined(block, miner_id, enforce_rules),
            MineOutcome::Cancelled => {
                info!("Mining by {miner_id} cancelled; a peer chain was adopted");
                Ok(MiningReport::Cancelled)
            }
        }
    }

    fn append_mined(
        &self,
        block: Block,
        miner_id: &str,
        enforce_rules: bool,
    ) -> Result<MiningReport> {
        let snapshot = {
            let mut blockchain = lock_chain(&self.blockchain)?;
            if blockchain.get_last_block().get_hash() != block.get_last_hash() {
                warn!(
                    "Discarding block {} by {miner_id}: chain tip moved while mining",
                    block.get_hash()
                );
                return Ok(MiningReport::Rejected(
                    "chain tip moved while mining".to_string(),
                ));
            }

            blockchain.push_block(block.clone())?;
            let checked = if enforce_rules {
                Self::self_check(blockchain.get_chain(), miner_id)
            } else {
                Blockchain::validate_chain(blockchain.get_chain())
            };
            if let Err(reason) = checked {
                blockchain.pop_last();
                error!(
                    "Rolled back block {} by {miner_id}: {reason}",
                    block.get_hash()
                );
                return Ok(MiningReport::Rejected(reason.to_string()));
            }
            blockchain.get_chain().to_vec()
        };

        if !self.gossip.broadcast_chain(&snapshot) {
            warn!("Block {} mined but the broadcast failed", block.get_hash());
        }
        info!(
            "Appended block {} by {miner_id}; chain height {}",
            block.get_hash(),
            snapshot.len() - 1
        );
        Ok(MiningReport::Mined(block))
    }

    fn self_check(chain: &[Block], miner_id: &str) -> Result<()> {
        Blockchain::validate_chain(chain)?;
        ConsensusRules::check_consecutive_miners(chain)?;
        if !Blockchain::validate_miner_activity(chain, miner_id) {
            return Err(BlockchainError::ConsensusRule {
                rule: "miner activity limit".to_string(),
                miner: miner_id.to_string(),
            });
        }
        Ok(())
    }
}
