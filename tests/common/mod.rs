//! Shared helpers for integration tests

#![allow(dead_code)]

use data_encoding::HEXLOWER;
use gossip_ledger::core::monetary::STARTING_BALANCE;
use gossip_ledger::{current_timestamp, Block, ProofOfWork, Transaction, Wallet};
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

/// Seal a reward-only block per miner atop genesis, stepping difficulty down to 1
pub fn sealed_chain(miners: &[&str]) -> Vec<Block> {
    let mut chain = vec![Block::genesis()];
    for miner in miners {
        append_sealed(&mut chain, vec![Transaction::reward(miner)], miner);
    }
    chain
}

pub fn append_sealed(chain: &mut Vec<Block>, data: Vec<Transaction>, miner_id: &str) -> Block {
    let last = chain.last().unwrap().clone();
    let difficulty = last.get_difficulty().saturating_sub(1).max(1);
    let block = ProofOfWork::new_proof_of_work(&last, data, miner_id)
        .seal(current_timestamp().unwrap(), difficulty)
        .unwrap();
    chain.push(block.clone());
    block
}

/// Poll `condition` until it holds or five seconds pass
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

/// A correctly signed spend whose outputs only balance the input once the
/// `u64` sum wraps around
pub fn wrapping_transaction(sender: &Wallet, thief: &str) -> Transaction {
    let mut output_map = BTreeMap::new();
    output_map.insert(thief.to_string(), u64::MAX);
    output_map.insert(sender.get_address().to_string(), STARTING_BALANCE + 1);
    let message = serde_json::to_string(&output_map).unwrap();
    let signature = sender.sign(message.as_bytes()).unwrap();

    serde_json::from_value(serde_json::json!({
        "id": "wrapping-spend",
        "outputMap": output_map,
        "input": {
            "timestamp": current_timestamp().unwrap(),
            "amount": STARTING_BALANCE,
            "address": sender.get_address(),
            "signature": HEXLOWER.encode(&signature),
        },
    }))
    .unwrap()
}
