//! Core ledger functionality
//!
//! This module contains the fundamental ledger components including blocks,
//! transactions, chain management, proof-of-work and the consensus rules.

pub mod block;
pub mod blockchain;
pub mod consensus;
pub mod difficulty;
pub mod ledger;
pub mod merkle;
pub mod monetary;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::Blockchain;
pub use consensus::{ConsensusRules, MinerActivityStats};
pub use difficulty::DifficultyAdjustment;
pub use ledger::{BalanceCalculator, LedgerBalance, SignatureValidator, TransactionValidator};
pub use merkle::{merkle_root, MerkleTree};
pub use monetary::{MINING_REWARD, REWARD_INPUT_ADDRESS, STARTING_BALANCE};
pub use proof_of_work::{CancelToken, MineOutcome, ProofOfWork};
pub use transaction::{OutputMap, Transaction, TransactionInput};
