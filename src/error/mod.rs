//! Error handling for the ledger node
//!
//! Validation and consensus failures are ordinary values here: they are logged
//! and turned into rejections, never propagated across the gossip boundary.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error types for ledger, mining and gossip operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// A block, chain or transaction failed a structural or cryptographic check
    Validation(String),
    /// An anti-abuse rule (monopoly, activity throttling) was tripped by a miner
    ConsensusRule { rule: String, miner: String },
    /// Transport failure while talking to the gossip broker
    Connectivity(String),
    /// A Merkle tree was requested over zero leaves
    EmptyInput(String),
    /// Transaction construction errors
    Transaction(String),
    /// Mining could not produce a block
    Mining(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// A lock guarding shared node state was poisoned
    Poisoned(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Validation(msg) => write!(f, "Validation error: {msg}"),
            BlockchainError::ConsensusRule { rule, miner } => {
                write!(f, "Consensus rule violated by miner {miner}: {rule}")
            }
            BlockchainError::Connectivity(msg) => write!(f, "Connectivity error: {msg}"),
            BlockchainError::EmptyInput(msg) => write!(f, "Empty input: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Poisoned(msg) => write!(f, "Lock poisoned: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
