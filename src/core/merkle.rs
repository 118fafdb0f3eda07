use crate::error::{BlockchainError, Result};
use crate::utils::sha256_hex;
use serde::{Deserialize, Serialize};

/// Merkle tree over an ordered list of transaction fingerprints
///
/// The tree is kept as explicit levels: `levels[0]` holds the hashed leaves and
/// the last level holds the single root. Each parent is the hash of the
/// concatenated hex digests of its two children; an odd node at the end of a
/// level is paired with itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    levels: Vec<Vec<String>>,
}

impl MerkleTree {
    /// Build the tree from raw leaf inputs (they are hashed here).
    pub fn build<S: AsRef<str>>(leaves: &[S]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(BlockchainError::EmptyInput(
                "Cannot build Merkle tree from an empty leaf list".to_string(),
            ));
        }

        let mut levels = vec![leaves
            .iter()
            .map(|leaf| sha256_hex(leaf.as_ref()))
            .collect::<Vec<String>>()];

        while let Some(level) = levels.last() {
            if level.len() == 1 {
                break;
            }
            let parents = level
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    let right = pair.get(1).unwrap_or(left);
                    Self::hash_pair(left, right)
                })
                .collect();
            levels.push(parents);
        }

        Ok(MerkleTree { levels })
    }

    /// The root digest (hex).
    pub fn root(&self) -> &str {
        // build() guarantees at least one level with exactly one node at the top
        self.levels
            .last()
            .and_then(|level| level.first())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    fn hash_pair(left: &str, right: &str) -> String {
        let mut combined = String::with_capacity(left.len() + right.len());
        combined.push_str(left);
        combined.push_str(right);
        sha256_hex(&combined)
    }
}

/// Root digest over the given leaves
pub fn merkle_root<S: AsRef<str>>(leaves: &[S]) -> Result<String> {
    Ok(MerkleTree::build(leaves)?.root().to_string())
}
