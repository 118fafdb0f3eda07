//! # Gossip Ledger
//!
//! A peer-to-peer ledger node. Each node keeps its own copy of a hash-linked
//! chain, grows it with proof-of-work mining, and converges with its peers by
//! gossiping whole chains over a publish/subscribe broker.
//!
//! ## Layout
//! - `core/`: blocks, transactions, Merkle roots, mining, chain validation and
//!   the consensus rules (longest valid chain, no back-to-back blocks by one
//!   miner, activity throttling)
//! - `wallet/`: ECDSA P-256 keys and balance calculation
//! - `storage/`: the pool of transactions waiting to be mined
//! - `network/`: envelope codec, transports (NATS and in-process) and the gossip layer
//! - `node/`: the mining orchestrator and the handler applying inbound gossip
//! - `config/`, `cli/`, `utils/`, `error/`: the usual plumbing
//!
//! ## Where to start
//! 1. `node/mod.rs` for the operations a node exposes
//! 2. `core/blockchain.rs` for validation and `replace_chain`
//! 3. `node/miner.rs` for append, self-check, rollback or broadcast
//! 4. `network/gossip.rs` for connection lifecycle and dispatch

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod node;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use crate::core::{
    Block, Blockchain, CancelToken, ConsensusRules, MerkleTree, MineOutcome, ProofOfWork,
    Transaction,
};
pub use error::{BlockchainError, Result};
pub use network::{
    ConnectionState, Gossip, GossipMessage, GossipSettings, MemoryBroker, NatsTransport, Topic,
    Transport,
};
pub use node::{MiningReport, Node, WalletInfo};
pub use storage::TransactionPool;
pub use utils::{crypto_hash, current_timestamp};
pub use wallet::{calculate_balance, Wallet};
