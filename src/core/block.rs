use crate::core::difficulty::INITIAL_DIFFICULTY;
use crate::core::{merkle_root, CancelToken, MineOutcome, ProofOfWork, Transaction};
use crate::error::Result;
use crate::utils::{crypto_hash, to_json_string};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Canonical genesis block shared by every node.
///
/// Nodes that disagree on any field here can never accept each other's chains.
static GENESIS_BLOCK: Lazy<Block> = Lazy::new(|| {
    let data = vec![
        Transaction::seed("1001", "foo1"),
        Transaction::seed("1002", "foo2"),
        Transaction::seed("1003", "foo3"),
    ];
    // The seed data is a non-empty literal, so the root always exists
    let merkle_root = Block::compute_merkle_root(&data).unwrap_or_default();
    Block {
        timestamp: 1,
        last_hash: String::from("-----"),
        hash: String::from("hash-one"),
        data,
        nonce: 0,
        difficulty: INITIAL_DIFFICULTY,
        miner_id: String::new(),
        merkle_root,
    }
});

/// An immutable, hash-linked unit of the chain.
///
/// Serialized field names match the wire format exchanged over gossip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    timestamp: u64,
    last_hash: String,
    hash: String,
    data: Vec<Transaction>,
    nonce: u64,
    difficulty: u32,
    miner_id: String,
    merkle_root: String,
}

impl Block {
    pub fn genesis() -> Block {
        GENESIS_BLOCK.clone()
    }

    /// Mine a block atop `last_block`, polling `cancel` between nonce attempts
    pub fn mine(
        last_block: &Block,
        data: Vec<Transaction>,
        miner_id: &str,
        cancel: &CancelToken,
    ) -> Result<MineOutcome> {
        ProofOfWork::new_proof_of_work(last_block, data, miner_id).run(cancel)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        timestamp: u64,
        last_hash: String,
        hash: String,
        data: Vec<Transaction>,
        nonce: u64,
        difficulty: u32,
        miner_id: String,
        merkle_root: String,
    ) -> Block {
        Block {
            timestamp,
            last_hash,
            hash,
            data,
            nonce,
            difficulty,
            miner_id,
            merkle_root,
        }
    }

    /// H(timestamp, lastHash, data, nonce, difficulty)
    pub fn calculate_hash(
        timestamp: u64,
        last_hash: &str,
        data: &[Transaction],
        nonce: u64,
        difficulty: u32,
    ) -> Result<String> {
        Ok(Self::hash_encoded(
            timestamp,
            &to_json_string(last_hash)?,
            &to_json_string(data)?,
            nonce,
            difficulty,
        ))
    }

    // Same digest as calculate_hash with the two expensive fields pre-encoded
    pub(crate) fn hash_encoded(
        timestamp: u64,
        last_hash_json: &str,
        data_json: &str,
        nonce: u64,
        difficulty: u32,
    ) -> String {
        crypto_hash(vec![
            timestamp.to_string(),
            last_hash_json.to_string(),
            data_json.to_string(),
            nonce.to_string(),
            difficulty.to_string(),
        ])
    }

    /// Recompute this block's hash from its own fields
    pub fn recompute_hash(&self) -> Result<String> {
        Self::calculate_hash(
            self.timestamp,
            &self.last_hash,
            &self.data,
            self.nonce,
            self.difficulty,
        )
    }

    /// Merkle root over the fingerprints of `data`
    pub fn compute_merkle_root(data: &[Transaction]) -> Result<String> {
        let fingerprints = data
            .iter()
            .map(Transaction::fingerprint)
            .collect::<Result<Vec<String>>>()?;
        merkle_root(&fingerprints)
    }

    /// Verify that the block's Merkle root matches its transactions
    pub fn verify_merkle_root(&self) -> Result<bool> {
        Ok(Self::compute_merkle_root(&self.data)? == self.merkle_root)
    }

    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn get_last_hash(&self) -> &str {
        self.last_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_data(&self) -> &[Transaction] {
        self.data.as_slice()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_miner_id(&self) -> &str {
        self.miner_id.as_str()
    }

    pub fn get_merkle_root(&self) -> &str {
        self.merkle_root.as_str()
    }
}

#[cfg(test)]
impl Block {
    /// Block with arbitrary timestamp, miner and difficulty; the hash is not valid
    pub(crate) fn new_test_block(timestamp: u64, miner_id: &str, difficulty: u32) -> Block {
        Block {
            timestamp,
            last_hash: "test_last_hash".to_string(),
            hash: "test_hash".to_string(),
            data: Vec::new(),
            nonce: 0,
            difficulty,
            miner_id: miner_id.to_string(),
            merkle_root: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mined_block() -> Block {
        match Block::mine(
            &Block::genesis(),
            vec![Transaction::reward("miner")],
            "miner-1",
            &CancelToken::new(),
        )
        .unwrap()
        {
            MineOutcome::Mined(block) => block,
            MineOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[test]
    fn test_genesis_is_stable() {
        let a = Block::genesis();
        let b = Block::genesis();
        assert_eq!(a, b);
        assert_eq!(a.get_hash(), "hash-one");
        assert_eq!(a.get_difficulty(), INITIAL_DIFFICULTY);
        assert_eq!(a.get_data().len(), 3);
        assert!(!a.get_merkle_root().is_empty());
    }

    #[test]
    fn test_mined_block_links_and_hashes() {
        let block = mined_block();
        let genesis = Block::genesis();

        assert_eq!(block.get_last_hash(), genesis.get_hash());
        assert_eq!(block.recompute_hash().unwrap(), block.get_hash());
        assert!(ProofOfWork::validate(&block));
        assert!(block.verify_merkle_root().unwrap());
    }

    #[test]
    fn test_mined_difficulty_follows_previous_block() {
        let block = mined_block();
        // genesis is far in the past, so the first block is one step easier
        assert_eq!(block.get_difficulty(), INITIAL_DIFFICULTY - 1);
    }

    #[test]
    fn test_hash_is_sensitive_to_each_field() {
        let block = mined_block();
        let base = block.get_hash().to_string();
        let ts = block.get_timestamp();
        let data = block.get_data().to_vec();

        let variants = [
            Block::calculate_hash(ts + 1, block.get_last_hash(), &data, block.get_nonce(), block.get_difficulty()),
            Block::calculate_hash(ts, "other", &data, block.get_nonce(), block.get_difficulty()),
            Block::calculate_hash(ts, block.get_last_hash(), &[], block.get_nonce(), block.get_difficulty()),
            Block::calculate_hash(ts, block.get_last_hash(), &data, block.get_nonce() + 1, block.get_difficulty()),
            Block::calculate_hash(ts, block.get_last_hash(), &data, block.get_nonce(), block.get_difficulty() + 1),
        ];
        for variant in variants {
            assert_ne!(variant.unwrap(), base);
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(Block::genesis()).unwrap();
        let mut keys: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "data",
                "difficulty",
                "hash",
                "lastHash",
                "merkleRoot",
                "minerId",
                "nonce",
                "timestamp"
            ]
        );
    }

    #[test]
    fn test_tampered_data_breaks_merkle_root() {
        let mut block = mined_block();
        block.data.push(Transaction::reward("intruder"));
        assert!(!block.verify_merkle_root().unwrap());
    }
}
