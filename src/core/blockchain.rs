// This is the core ledger: an in-memory, hash-linked sequence of blocks rooted at the
// shared genesis block. It grows by appending locally mined blocks and is swapped
// wholesale when a peer gossips a longer chain that passes every consensus rule.

use crate::core::consensus::ConsensusRules;
use crate::core::monetary::rewards;
use crate::core::{
    BalanceCalculator, Block, CancelToken, DifficultyAdjustment, LedgerBalance, MineOutcome,
    ProofOfWork, SignatureValidator, Transaction, TransactionValidator,
};
use crate::error::{BlockchainError, Result};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

pub struct Blockchain {
    // Never empty: index 0 is always the canonical genesis block
    chain: Vec<Block>,
    validator: Arc<dyn TransactionValidator>,
    balances: Arc<dyn BalanceCalculator>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    pub fn new() -> Blockchain {
        Self::with_rules(Arc::new(SignatureValidator), Arc::new(LedgerBalance))
    }

    // When I want the chain to judge transactions with a different provider
    pub fn with_rules(
        validator: Arc<dyn TransactionValidator>,
        balances: Arc<dyn BalanceCalculator>,
    ) -> Blockchain {
        Blockchain {
            chain: vec![Block::genesis()],
            validator,
            balances,
        }
    }

    pub fn get_chain(&self) -> &[Block] {
        self.chain.as_slice()
    }

    pub fn get_last_block(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always false, as the genesis block can never be removed. Kept next to `len`
    /// for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get_validator(&self) -> Arc<dyn TransactionValidator> {
        Arc::clone(&self.validator)
    }

    // Mines atop the current tip and appends the result. Consensus rules are
    // deliberately left to the caller, who checks the chain including this block.
    pub fn add_block(&mut self, data: Vec<Transaction>, miner_id: &str) -> Result<Block> {
        match Block::mine(self.get_last_block(), data, miner_id, &CancelToken::new())? {
            MineOutcome::Mined(block) => {
                self.chain.push(block.clone());
                info!(
                    "Appended block {} by {miner_id} at height {}",
                    block.get_hash(),
                    self.chain.len() - 1
                );
                Ok(block)
            }
            MineOutcome::Cancelled => Err(BlockchainError::Mining(
                "mining was cancelled".to_string(),
            )),
        }
    }

    /// Append a block mined elsewhere; it must extend the current tip
    pub fn push_block(&mut self, block: Block) -> Result<()> {
        if block.get_last_hash() != self.get_last_block().get_hash() {
            return Err(BlockchainError::Validation(format!(
                "Block {} does not extend tip {}",
                block.get_hash(),
                self.get_last_block().get_hash()
            )));
        }
        self.chain.push(block);
        Ok(())
    }

    /// Undo the most recent append. The genesis block is never removed.
    pub fn pop_last(&mut self) -> Option<Block> {
        if self.chain.len() > 1 {
            self.chain.pop()
        } else {
            None
        }
    }

    pub fn is_valid_chain(chain: &[Block]) -> bool {
        Self::validate_chain(chain).is_ok()
    }

    pub fn validate_chain(chain: &[Block]) -> Result<()> {
        if chain.first() != Some(&Block::genesis()) {
            return Err(BlockchainError::Validation(
                "Chain does not start with the canonical genesis block".to_string(),
            ));
        }

        for (i, pair) in chain.windows(2).enumerate() {
            let (previous, block) = (&pair[0], &pair[1]);
            let index = i + 1;

            if block.get_last_hash() != previous.get_hash() {
                return Err(BlockchainError::Validation(format!(
                    "Block {index} does not link to its predecessor"
                )));
            }

            if block.recompute_hash()? != block.get_hash() {
                return Err(BlockchainError::Validation(format!(
                    "Block {index} hash does not match its contents"
                )));
            }

            if !DifficultyAdjustment::is_valid_step(previous.get_difficulty(), block.get_difficulty())
            {
                return Err(BlockchainError::Validation(format!(
                    "Block {index} difficulty jumped from {} to {}",
                    previous.get_difficulty(),
                    block.get_difficulty()
                )));
            }

            if !ProofOfWork::validate(block) {
                return Err(BlockchainError::Validation(format!(
                    "Block {index} hash does not meet difficulty {}",
                    block.get_difficulty()
                )));
            }

            if !block.verify_merkle_root().unwrap_or(false) {
                return Err(BlockchainError::Validation(format!(
                    "Block {index} merkle root does not match its data"
                )));
            }
        }

        Ok(())
    }

    pub fn has_consecutive_same_miner(chain: &[Block]) -> bool {
        ConsensusRules::has_consecutive_same_miner(chain)
    }

    pub fn validate_miner_activity(chain: &[Block], miner_id: &str) -> bool {
        ConsensusRules::validate_miner_activity(chain, miner_id)
    }

    pub fn valid_transaction_data(&self, chain: &[Block]) -> bool {
        self.validate_transaction_data(chain).is_ok()
    }

    pub fn validate_transaction_data(&self, chain: &[Block]) -> Result<()> {
        for (i, block) in chain.iter().enumerate().skip(1) {
            let mut seen = HashSet::new();
            let mut reward_count = 0;

            for transaction in block.get_data() {
                if !seen.insert(transaction.get_id()) {
                    return Err(BlockchainError::Validation(format!(
                        "Transaction {} appears more than once in block {i}",
                        transaction.get_id()
                    )));
                }

                if transaction.is_reward() {
                    reward_count += 1;
                    if reward_count > 1 {
                        return Err(BlockchainError::Validation(format!(
                            "Miner rewards exceed limit in block {i}"
                        )));
                    }

                    let outputs: Vec<u64> = transaction.get_output_map().values().copied().collect();
                    if outputs.len() != 1 || !rewards::is_exact_reward(outputs[0]) {
                        return Err(BlockchainError::Validation(format!(
                            "Miner reward amount is invalid in block {i}"
                        )));
                    }
                    continue;
                }

                if !self.validator.valid_transaction(transaction) {
                    return Err(BlockchainError::Validation(format!(
                        "Invalid transaction {} in block {i}",
                        transaction.get_id()
                    )));
                }

                let sender = transaction.get_input().get_address();
                let true_balance = self.balances.calculate_balance(&chain[..i], sender);
                if transaction.get_input().get_amount() > true_balance {
                    return Err(BlockchainError::Validation(format!(
                        "Transaction {} in block {i} spends {} but {sender} holds {true_balance}",
                        transaction.get_id(),
                        transaction.get_input().get_amount()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Swap in `candidate` if it is longer and passes every rule.
    ///
    /// `on_accept` runs exactly once, after the swap, with the new chain. On any
    /// failed check the local chain is untouched and the reason is logged and
    /// returned.
    pub fn replace_chain<F>(
        &mut self,
        candidate: Vec<Block>,
        verify_transactions: bool,
        on_accept: F,
    ) -> Result<()>
    where
        F: FnOnce(&[Block]),
    {
        if candidate.len() <= self.chain.len() {
            return Self::reject(BlockchainError::Validation(format!(
                "The incoming chain must be longer (incoming {}, local {})",
                candidate.len(),
                self.chain.len()
            )));
        }

        if let Err(e) = Self::validate_chain(&candidate) {
            return Self::reject(e);
        }

        if let Err(e) = ConsensusRules::check_consecutive_miners(&candidate) {
            return Self::reject(e);
        }

        if verify_transactions {
            if let Err(e) = self.validate_transaction_data(&candidate) {
                return Self::reject(e);
            }
        }

        let miner_id = candidate[candidate.len() - 1].get_miner_id().to_string();
        if !ConsensusRules::validate_miner_activity(&candidate, &miner_id) {
            return Self::reject(BlockchainError::ConsensusRule {
                rule: "miner activity limit".to_string(),
                miner: miner_id,
            });
        }

        info!(
            "Miner {miner_id} passed activity validation; replacing chain ({} -> {} blocks)",
            self.chain.len(),
            candidate.len()
        );
        self.chain = candidate;
        on_accept(self.chain.as_slice());
        Ok(())
    }

    fn reject(err: BlockchainError) -> Result<()> {
        warn!("Rejected incoming chain: {err}");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monetary::{MINING_REWARD, STARTING_BALANCE};
    use crate::testnet::{append_sealed, genesis_chain, sealed_chain};
    use crate::wallet::Wallet;
    use std::cell::Cell;

    fn mined_blockchain(miners: &[&str]) -> Blockchain {
        let mut blockchain = Blockchain::new();
        for miner in miners {
            blockchain
                .add_block(vec![Transaction::reward(miner)], miner)
                .unwrap();
        }
        blockchain
    }

    #[test]
    fn test_starts_with_genesis() {
        let blockchain = Blockchain::new();
        assert_eq!(blockchain.len(), 1);
        assert_eq!(blockchain.get_last_block(), &Block::genesis());
    }

    #[test]
    fn test_add_block_links_to_tip() {
        let blockchain = mined_blockchain(&["a", "b", "c"]);
        assert_eq!(blockchain.len(), 4);
        let chain = blockchain.get_chain();
        for pair in chain.windows(2) {
            assert_eq!(pair[1].get_last_hash(), pair[0].get_hash());
        }
        assert!(Blockchain::is_valid_chain(chain));
    }

    #[test]
    fn test_add_block_rejects_empty_data() {
        let mut blockchain = Blockchain::new();
        assert!(matches!(
            blockchain.add_block(Vec::new(), "a"),
            Err(BlockchainError::EmptyInput(_))
        ));
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_pop_last_never_removes_genesis() {
        let mut blockchain = mined_blockchain(&["a"]);
        assert!(blockchain.pop_last().is_some());
        assert!(blockchain.pop_last().is_none());
        assert_eq!(blockchain.len(), 1);
        assert!(!blockchain.is_empty());
    }

    #[test]
    fn test_push_block_requires_tip_link() {
        let mut blockchain = Blockchain::new();
        let other = sealed_chain(&["a", "b"]);
        assert!(blockchain.push_block(other[2].clone()).is_err());
        assert!(blockchain.push_block(other[1].clone()).is_ok());
        assert_eq!(blockchain.len(), 2);
    }

    #[test]
    fn test_invalid_genesis_rejected() {
        let mut chain = sealed_chain(&["a"]);
        chain[0] = chain[1].clone();
        assert!(!Blockchain::is_valid_chain(&chain));
    }

    fn tamper(chain: &[Block], index: usize, edit: impl FnOnce(&mut serde_json::Value)) -> Vec<Block> {
        let mut json = serde_json::to_value(chain).unwrap();
        edit(&mut json[index]);
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_tampered_fields_invalidate_chain() {
        let chain = mined_blockchain(&["a", "b"]).get_chain().to_vec();
        assert!(Blockchain::is_valid_chain(&chain));

        let edits: Vec<Box<dyn Fn(&mut serde_json::Value)>> = vec![
            Box::new(|b| b["lastHash"] = serde_json::json!("broken")),
            Box::new(|b| b["timestamp"] = serde_json::json!(b["timestamp"].as_u64().unwrap() + 1)),
            Box::new(|b| b["nonce"] = serde_json::json!(b["nonce"].as_u64().unwrap() + 1)),
            Box::new(|b| b["merkleRoot"] = serde_json::json!("00".repeat(32))),
            Box::new(|b| b["hash"] = serde_json::json!("ff".repeat(32))),
            Box::new(|b| {
                let extra = serde_json::to_value(Transaction::reward("evil")).unwrap();
                b["data"].as_array_mut().unwrap().push(extra);
            }),
        ];

        for edit in edits {
            let tampered = tamper(&chain, 2, |b| edit(b));
            assert!(!Blockchain::is_valid_chain(&tampered));
        }
    }

    #[test]
    fn test_difficulty_jump_rejected() {
        let mut chain = genesis_chain();
        let last = chain[0].clone();
        // genesis difficulty is 3; jumping straight to 5 breaks the ±1 rule
        let block = ProofOfWork::new_proof_of_work(&last, vec![Transaction::reward("a")], "a")
            .seal(10, 5)
            .unwrap();
        chain.push(block);
        assert!(matches!(
            Blockchain::validate_chain(&chain),
            Err(BlockchainError::Validation(msg)) if msg.contains("difficulty")
        ));
    }

    #[test]
    fn test_replace_rejects_shorter_or_equal() {
        let mut blockchain = mined_blockchain(&["a", "b"]);
        let before = blockchain.get_chain().to_vec();
        let called = Cell::new(0);

        let candidate = sealed_chain(&["x", "y"]);
        assert!(blockchain
            .replace_chain(candidate, true, |_| called.set(called.get() + 1))
            .is_err());
        assert_eq!(blockchain.get_chain(), before.as_slice());
        assert_eq!(called.get(), 0);
    }

    #[test]
    fn test_replace_rejects_invalid_chain() {
        let mut blockchain = Blockchain::new();
        let candidate = tamper(&sealed_chain(&["x", "y"]), 1, |b| {
            b["nonce"] = serde_json::json!(b["nonce"].as_u64().unwrap() + 1)
        });
        assert!(blockchain.replace_chain(candidate, false, |_| {}).is_err());
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_replace_rejects_consecutive_miner() {
        let mut blockchain = Blockchain::new();
        let candidate = sealed_chain(&["x", "y", "y"]);
        assert!(matches!(
            blockchain.replace_chain(candidate, true, |_| {}),
            Err(BlockchainError::ConsensusRule { miner, .. }) if miner == "y"
        ));
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_replace_rejects_hyperactive_miner() {
        let mut blockchain = Blockchain::new();
        let miners = ["m", "x", "m", "x", "m", "x", "m", "x", "m", "x", "m", "x", "m"];
        let candidate = sealed_chain(&miners);
        assert!(matches!(
            blockchain.replace_chain(candidate, true, |_| {}),
            Err(BlockchainError::ConsensusRule { miner, .. }) if miner == "m"
        ));
        assert_eq!(blockchain.len(), 1);
    }

    #[test]
    fn test_replace_accepts_valid_longer_chain_once() {
        let mut blockchain = mined_blockchain(&["a"]);
        let candidate = sealed_chain(&["x", "y", "x"]);
        let called = Cell::new(0);

        blockchain
            .replace_chain(candidate.clone(), true, |accepted| {
                assert_eq!(accepted.len(), 4);
                called.set(called.get() + 1);
            })
            .unwrap();

        assert_eq!(called.get(), 1);
        assert_eq!(blockchain.get_chain(), candidate.as_slice());
    }

    #[test]
    fn test_transaction_data_accepts_honest_block() {
        let blockchain = Blockchain::new();
        let sender = Wallet::new().unwrap();
        let mut chain = genesis_chain();
        let tx = sender.create_transaction("bob", 10, &chain).unwrap();
        append_sealed(&mut chain, vec![tx, Transaction::reward("m")], "m");
        assert!(blockchain.valid_transaction_data(&chain));
    }

    #[test]
    fn test_transaction_data_rejects_two_rewards() {
        let blockchain = Blockchain::new();
        let mut chain = genesis_chain();
        append_sealed(
            &mut chain,
            vec![Transaction::reward("m"), Transaction::reward("m")],
            "m",
        );
        assert!(!blockchain.valid_transaction_data(&chain));
    }

    #[test]
    fn test_transaction_data_rejects_inflated_reward() {
        let blockchain = Blockchain::new();
        let mut reward = Transaction::reward("m");
        let mut json = serde_json::to_value(&reward).unwrap();
        json["outputMap"]["m"] = serde_json::json!(MINING_REWARD * 2);
        reward = serde_json::from_value(json).unwrap();

        let mut chain = genesis_chain();
        append_sealed(&mut chain, vec![reward], "m");
        assert!(!blockchain.valid_transaction_data(&chain));
    }

    #[test]
    fn test_transaction_data_rejects_bad_signature() {
        let blockchain = Blockchain::new();
        let sender = Wallet::new().unwrap();
        let tx = sender.create_transaction("bob", 10, &genesis_chain()).unwrap();
        let mut json = serde_json::to_value(&tx).unwrap();
        json["outputMap"]["bob"] = serde_json::json!(500);
        json["outputMap"][sender.get_address()] = serde_json::json!(STARTING_BALANCE - 500);
        let forged: Transaction = serde_json::from_value(json).unwrap();

        let mut chain = genesis_chain();
        append_sealed(&mut chain, vec![forged], "m");
        assert!(!blockchain.valid_transaction_data(&chain));
    }

    #[test]
    fn test_transaction_data_rejects_overspend() {
        let blockchain = Blockchain::new();
        let sender = Wallet::new().unwrap();
        // Signed against a balance the chain never granted
        let tx = Transaction::new(&sender, "bob", 10, STARTING_BALANCE * 5).unwrap();
        let mut chain = genesis_chain();
        append_sealed(&mut chain, vec![tx], "m");
        assert!(!blockchain.valid_transaction_data(&chain));
    }

    #[test]
    fn test_transaction_data_rejects_duplicate_in_block() {
        let blockchain = Blockchain::new();
        let sender = Wallet::new().unwrap();
        let tx = sender.create_transaction("bob", 10, &genesis_chain()).unwrap();
        let mut chain = genesis_chain();
        append_sealed(&mut chain, vec![tx.clone(), tx], "m");
        assert!(!blockchain.valid_transaction_data(&chain));
    }

    #[test]
    fn test_replace_with_invalid_transactions_only_checked_when_asked() {
        let mut chain = genesis_chain();
        append_sealed(
            &mut chain,
            vec![Transaction::reward("m"), Transaction::reward("m")],
            "m",
        );
        append_sealed(&mut chain, vec![Transaction::reward("n")], "n");

        let mut strict = Blockchain::new();
        assert!(strict.replace_chain(chain.clone(), true, |_| {}).is_err());

        let mut lenient = Blockchain::new();
        assert!(lenient.replace_chain(chain, false, |_| {}).is_ok());
    }
}
