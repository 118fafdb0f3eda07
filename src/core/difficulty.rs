use crate::core::Block;

// Difficulty adjustment constants
pub const MINE_RATE: u64 = 2_000; // Target gap between blocks in milliseconds
pub const INITIAL_DIFFICULTY: u32 = 3; // Difficulty carried by the genesis block
pub const MIN_DIFFICULTY: u32 = 1; // Difficulty never drops below this

/// Single-sample difficulty retarget
///
/// The next difficulty is derived from the gap between the previous block and
/// the candidate timestamp only: one step easier when the gap exceeds
/// `MINE_RATE`, one step harder otherwise. Mining re-evaluates this on every
/// nonce attempt, so a search that runs long relaxes its own target.
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    pub fn adjust_difficulty(original_block: &Block, timestamp: u64) -> u32 {
        let difficulty = original_block.get_difficulty();

        if difficulty < MIN_DIFFICULTY {
            return MIN_DIFFICULTY;
        }

        if timestamp.saturating_sub(original_block.get_timestamp()) > MINE_RATE {
            return (difficulty - 1).max(MIN_DIFFICULTY);
        }

        difficulty + 1
    }

    pub fn get_initial_difficulty() -> u32 {
        INITIAL_DIFFICULTY
    }

    pub fn get_mine_rate() -> u64 {
        MINE_RATE
    }

    /// Whether `next` is within one step of `previous`
    pub fn is_valid_step(previous: u32, next: u32) -> bool {
        previous.abs_diff(next) <= 1
    }
}
