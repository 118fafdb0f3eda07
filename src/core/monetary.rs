/// Ledger monetary constants
///
/// Every node must agree on these values: a block whose reward differs from
/// `MINING_REWARD` is rejected by `validTransactionData`-style checks, and
/// balances are derived from `STARTING_BALANCE` when an address has never spent.
///
/// Reward paid to the miner of each block
pub const MINING_REWARD: u64 = 50;

/// Balance every address starts with before its first outgoing transaction
pub const STARTING_BALANCE: u64 = 1000;

/// Sentinel input address marking a reward transaction
pub const REWARD_INPUT_ADDRESS: &str = "*authorized-reward*";

/// Utility functions for reward transactions
pub mod rewards {
    use super::*;

    /// Check whether an input address is the reward sentinel
    pub fn is_reward_address(address: &str) -> bool {
        address == REWARD_INPUT_ADDRESS
    }

    /// Check whether a reward output carries exactly the fixed reward
    pub fn is_exact_reward(amount: u64) -> bool {
        amount == MINING_REWARD
    }
}

#[cfg(test)]
mod tests {
    use super::rewards::*;
    use super::*;

    #[test]
    fn test_reward_sentinel() {
        assert!(is_reward_address("*authorized-reward*"));
        assert!(!is_reward_address("04abcdef"));
    }

    #[test]
    fn test_exact_reward() {
        assert!(is_exact_reward(MINING_REWARD));
        assert!(!is_exact_reward(MINING_REWARD + 1));
    }
}
