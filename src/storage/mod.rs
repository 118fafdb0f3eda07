//! Node-local state that lives outside the chain
//!
//! Currently this is the pool of transactions waiting to be mined.

pub mod memory_pool;

pub use memory_pool::TransactionPool;
