//! Anti-abuse consensus rules
//!
//! These run over a whole candidate chain, including the newest block, which is
//! why a locally mined block has to be appended before it can be checked.

use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::current_timestamp;
use log::{error, warn};

/// Width of the activity bucket; buckets are aligned to multiples of this
pub const ACTIVITY_INTERVAL_MS: u64 = 90_000;
/// Number of trailing blocks inspected regardless of timestamp
pub const RECENT_WINDOW: usize = 10;

/// (bucket threshold, allowed share of the recent window) pairs, strictest first
const ACTIVITY_LIMITS: [(usize, usize); 2] = [(29, 1), (5, 2)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MinerActivityStats {
    /// Blocks by the miner with a timestamp inside the current bucket
    pub blocks_this_interval: usize,
    /// Blocks by the miner among the last `RECENT_WINDOW` chain entries
    pub blocks_in_last_10: usize,
}

pub struct ConsensusRules;

impl ConsensusRules {
    /// True when two adjacent blocks carry the same miner id
    pub fn has_consecutive_same_miner(chain: &[Block]) -> bool {
        Self::check_consecutive_miners(chain).is_err()
    }

    pub fn check_consecutive_miners(chain: &[Block]) -> Result<()> {
        for (i, pair) in chain.windows(2).enumerate() {
            let previous = pair[0].get_miner_id();
            let current = pair[1].get_miner_id();
            if !previous.is_empty() && previous == current {
                warn!(
                    "Consecutive blocks by same miner detected: {previous} at index {i} and {}",
                    i + 1
                );
                return Err(BlockchainError::ConsensusRule {
                    rule: format!("consecutive blocks at index {i} and {}", i + 1),
                    miner: current.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn get_miner_activity_stats(chain: &[Block], miner_id: &str) -> MinerActivityStats {
        Self::miner_activity_stats_at(chain, miner_id, Self::now())
    }

    pub fn miner_activity_stats_at(chain: &[Block], miner_id: &str, now: u64) -> MinerActivityStats {
        let bucket_start = now - (now % ACTIVITY_INTERVAL_MS);

        let blocks_this_interval = chain
            .iter()
            .filter(|b| b.get_miner_id() == miner_id && b.get_timestamp() >= bucket_start)
            .count();

        let recent = &chain[chain.len().saturating_sub(RECENT_WINDOW)..];
        let blocks_in_last_10 = recent
            .iter()
            .filter(|b| b.get_miner_id() == miner_id)
            .count();

        MinerActivityStats {
            blocks_this_interval,
            blocks_in_last_10,
        }
    }

    pub fn validate_miner_activity(chain: &[Block], miner_id: &str) -> bool {
        Self::check_miner_activity_at(chain, miner_id, Self::now()).is_ok()
    }

    /// The more blocks a miner has produced in the current bucket, the smaller
    /// its allowed share of the recent window.
    pub fn check_miner_activity_at(chain: &[Block], miner_id: &str, now: u64) -> Result<()> {
        let stats = Self::miner_activity_stats_at(chain, miner_id, now);

        for (bucket_threshold, recent_limit) in ACTIVITY_LIMITS {
            if stats.blocks_this_interval > bucket_threshold
                && stats.blocks_in_last_10 > recent_limit
            {
                let rule = format!(
                    "exceeded {recent_limit} block(s) in last {RECENT_WINDOW} after {bucket_threshold} blocks in current {}s window ({} in window, {} recent)",
                    ACTIVITY_INTERVAL_MS / 1000,
                    stats.blocks_this_interval,
                    stats.blocks_in_last_10
                );
                error!("Rejected: miner {miner_id} {rule}");
                return Err(BlockchainError::ConsensusRule {
                    rule,
                    miner: miner_id.to_string(),
                });
            }
        }

        Ok(())
    }

    fn now() -> u64 {
        // An unreadable clock puts the bucket at the epoch, which counts every block
        current_timestamp().unwrap_or_else(|e| {
            error!("Falling back to epoch bucket: {e}");
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::test_block;

    const NOW: u64 = 1_700_000_045_000;

    fn bucket_start() -> u64 {
        NOW - NOW % ACTIVITY_INTERVAL_MS
    }

    fn chain_of(miners: &[&str], timestamp: u64) -> Vec<Block> {
        let mut chain = vec![Block::genesis()];
        chain.extend(miners.iter().map(|m| test_block(timestamp, m, 1)));
        chain
    }

    #[test]
    fn test_detects_consecutive_same_miner() {
        let chain = chain_of(&["a", "b", "b", "c"], NOW);
        assert!(ConsensusRules::has_consecutive_same_miner(&chain));
        assert!(matches!(
            ConsensusRules::check_consecutive_miners(&chain),
            Err(BlockchainError::ConsensusRule { miner, .. }) if miner == "b"
        ));
    }

    #[test]
    fn test_alternating_miners_pass() {
        let chain = chain_of(&["a", "b", "a", "b"], NOW);
        assert!(!ConsensusRules::has_consecutive_same_miner(&chain));
    }

    #[test]
    fn test_numeric_like_ids_use_strict_equality() {
        let chain = chain_of(&["3000", "4111", "3000"], NOW);
        assert!(!ConsensusRules::has_consecutive_same_miner(&chain));
        let chain = chain_of(&["3000", "3000"], NOW);
        assert!(ConsensusRules::has_consecutive_same_miner(&chain));
    }

    #[test]
    fn test_stats_count_bucket_and_recent_window() {
        let mut chain = chain_of(&["m", "x", "m"], bucket_start() - 1);
        chain.extend(chain_of(&["m", "x", "m", "x"], bucket_start()).into_iter().skip(1));

        let stats = ConsensusRules::miner_activity_stats_at(&chain, "m", NOW);
        assert_eq!(stats.blocks_this_interval, 2);
        assert_eq!(stats.blocks_in_last_10, 4);
    }

    #[test]
    fn test_recent_window_is_last_ten_entries() {
        let mut miners = vec!["m"; 5];
        miners.extend(vec!["x"; 10]);
        let chain = chain_of(&miners, 0);
        let stats = ConsensusRules::miner_activity_stats_at(&chain, "m", NOW);
        assert_eq!(stats.blocks_in_last_10, 0);
        assert_eq!(stats.blocks_this_interval, 0);
    }

    #[test]
    fn test_thirty_blocks_in_bucket_with_full_window_rejected() {
        let chain = chain_of(&["m"; 30], bucket_start() + 10);
        let stats = ConsensusRules::miner_activity_stats_at(&chain, "m", NOW);
        assert_eq!(stats.blocks_this_interval, 30);
        assert_eq!(stats.blocks_in_last_10, 10);
        assert!(ConsensusRules::check_miner_activity_at(&chain, "m", NOW).is_err());
    }

    #[test]
    fn test_second_rule_rejects_three_recent_after_six() {
        let chain = chain_of(&["m", "x", "m", "x", "m", "x", "m", "x", "m", "x", "m"], bucket_start());
        // 6 in bucket, 5 in the last 10
        assert!(ConsensusRules::check_miner_activity_at(&chain, "m", NOW).is_err());
    }

    #[test]
    fn test_five_in_bucket_is_allowed() {
        let chain = chain_of(&["m", "x", "m", "x", "m", "x", "m", "x", "m"], bucket_start());
        assert!(ConsensusRules::check_miner_activity_at(&chain, "m", NOW).is_ok());
    }

    #[test]
    fn test_old_blocks_do_not_count_toward_bucket() {
        let chain = chain_of(&["m", "x", "m", "x", "m", "x", "m", "x", "m", "x", "m"], bucket_start() - 1);
        assert!(ConsensusRules::check_miner_activity_at(&chain, "m", NOW).is_ok());
    }

    #[test]
    fn test_unknown_miner_has_no_activity() {
        let chain = chain_of(&["a", "b"], NOW);
        assert_eq!(
            ConsensusRules::miner_activity_stats_at(&chain, "zed", NOW),
            MinerActivityStats::default()
        );
    }
}
