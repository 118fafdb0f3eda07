use crate::core::{Block, DifficultyAdjustment, Transaction};
use crate::error::Result;
use crate::utils::{current_timestamp, to_json_string};
use data_encoding::HEXLOWER;
use log::info;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal for a mining search
///
/// Clones share the same flag; the search polls it once per nonce attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result of a mining search: either a sealed block or an external abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    Mined(Block),
    Cancelled,
}

pub struct ProofOfWork {
    last_block: Block,
    data: Vec<Transaction>,
    miner_id: String,
}

impl ProofOfWork {
    pub fn new_proof_of_work(last_block: &Block, data: Vec<Transaction>, miner_id: &str) -> ProofOfWork {
        ProofOfWork {
            last_block: last_block.clone(),
            data,
            miner_id: miner_id.to_string(),
        }
    }

    /// Whether the leading `difficulty` bits of the hex `hash` are all zero
    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        let bytes = match HEXLOWER.decode(hash.as_bytes()) {
            Ok(bytes) if bytes.len() == 32 => bytes,
            _ => return false,
        };
        if difficulty > 256 {
            return false;
        }

        let mut target = BigInt::from(1);
        target.shl_assign(256 - difficulty);
        BigInt::from_bytes_be(Sign::Plus, bytes.as_slice()) < target
    }

    /// Validate proof-of-work for a block
    pub fn validate(block: &Block) -> bool {
        Self::meets_difficulty(block.get_hash(), block.get_difficulty())
    }

    /// Search for a nonce atop the last block.
    ///
    /// Every attempt takes a fresh timestamp and re-derives the difficulty from
    /// it. The cancel token is checked before each attempt.
    pub fn run(self, cancel: &CancelToken) -> Result<MineOutcome> {
        let merkle_root = Block::compute_merkle_root(&self.data)?;
        let last_hash = self.last_block.get_hash().to_string();
        let last_hash_json = to_json_string(&last_hash)?;
        let data_json = to_json_string(&self.data)?;

        info!(
            "Mining block atop {} with {} transactions",
            last_hash,
            self.data.len()
        );

        let mut nonce: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                info!("Mining atop {last_hash} cancelled after {nonce} attempts");
                return Ok(MineOutcome::Cancelled);
            }

            nonce += 1;
            let timestamp = current_timestamp()?;
            let difficulty = DifficultyAdjustment::adjust_difficulty(&self.last_block, timestamp);
            let hash =
                Block::hash_encoded(timestamp, &last_hash_json, &data_json, nonce, difficulty);

            if Self::meets_difficulty(&hash, difficulty) {
                info!("Proof-of-work completed for block: {hash} (difficulty: {difficulty}, nonce: {nonce})");
                return Ok(MineOutcome::Mined(Block::from_parts(
                    timestamp,
                    last_hash,
                    hash,
                    self.data,
                    nonce,
                    difficulty,
                    self.miner_id,
                    merkle_root,
                )));
            }
        }
    }

    /// Search for a nonce with the timestamp and difficulty held fixed.
    ///
    /// Used to assemble chains with chosen timestamps (replays, simulations,
    /// tests); the result passes the same checks as a block from `run`.
    pub fn seal(self, timestamp: u64, difficulty: u32) -> Result<Block> {
        let merkle_root = Block::compute_merkle_root(&self.data)?;
        let last_hash = self.last_block.get_hash().to_string();
        let last_hash_json = to_json_string(&last_hash)?;
        let data_json = to_json_string(&self.data)?;

        let mut nonce: u64 = 0;
        loop {
            let hash =
                Block::hash_encoded(timestamp, &last_hash_json, &data_json, nonce, difficulty);
            if Self::meets_difficulty(&hash, difficulty) {
                return Ok(Block::from_parts(
                    timestamp,
                    last_hash,
                    hash,
                    self.data,
                    nonce,
                    difficulty,
                    self.miner_id,
                    merkle_root,
                ));
            }
            nonce += 1;
        }
    }
}
