//! Test utilities for chain and consensus testing

use crate::core::{Block, ProofOfWork, Transaction};
use crate::utils::current_timestamp;

/// A chain holding only the canonical genesis block
pub fn genesis_chain() -> Vec<Block> {
    vec![Block::genesis()]
}

/// Unsealed block with chosen timestamp, miner and difficulty
pub fn test_block(timestamp: u64, miner_id: &str, difficulty: u32) -> Block {
    Block::new_test_block(timestamp, miner_id, difficulty)
}

/// Seal `data` atop the chain tip at the current time and append it.
///
/// Difficulty steps down by one per block until it reaches 1, which keeps the
/// ±1 rule satisfied and the nonce search trivial.
pub fn append_sealed(chain: &mut Vec<Block>, data: Vec<Transaction>, miner_id: &str) -> Block {
    let timestamp = current_timestamp().unwrap();
    append_sealed_at(chain, data, miner_id, timestamp)
}

pub fn append_sealed_at(
    chain: &mut Vec<Block>,
    data: Vec<Transaction>,
    miner_id: &str,
    timestamp: u64,
) -> Block {
    let last = chain.last().unwrap().clone();
    let difficulty = last.get_difficulty().saturating_sub(1).max(1);
    let block = ProofOfWork::new_proof_of_work(&last, data, miner_id)
        .seal(timestamp, difficulty)
        .unwrap();
    chain.push(block.clone());
    block
}

/// A valid chain with one reward-only block per listed miner
pub fn sealed_chain(miners: &[&str]) -> Vec<Block> {
    let mut chain = genesis_chain();
    for miner in miners {
        append_sealed(&mut chain, vec![Transaction::reward(miner)], miner);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Blockchain;

    #[test]
    fn test_sealed_chain_is_valid() {
        let chain = sealed_chain(&["a", "b", "c", "a"]);
        assert_eq!(chain.len(), 5);
        assert!(Blockchain::is_valid_chain(&chain));
    }

    #[test]
    fn test_difficulty_steps_down_to_one() {
        let chain = sealed_chain(&["a", "b", "c", "d"]);
        let difficulties: Vec<u32> = chain.iter().map(Block::get_difficulty).collect();
        assert_eq!(difficulties, vec![3, 2, 1, 1, 1]);
    }
}
